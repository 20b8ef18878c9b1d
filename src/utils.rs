// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::{Context, Result};
use chrono::{DateTime, Days, NaiveDateTime, NaiveTime, Utc};
use comfy_table::{Cell, Table, presets::UTF8_FULL};
use uuid::Uuid;

use crate::models::GroupId;

/// Fixed-width timestamp format; lexical order of stored values is time order.
const TS_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

pub fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.format(TS_FORMAT).to_string()
}

pub fn parse_ts(s: &str) -> rusqlite::Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, TS_FORMAT)
        .map(|n| n.and_utc())
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })
}

/// Most recent daily cutoff at or before `now`.
pub fn current_cutoff(now: DateTime<Utc>, cutoff: NaiveTime) -> DateTime<Utc> {
    let today = now.date_naive().and_time(cutoff).and_utc();
    if today <= now {
        today
    } else {
        today.checked_sub_days(Days::new(1)).unwrap_or(today)
    }
}

pub fn next_cutoff(now: DateTime<Utc>, cutoff: NaiveTime) -> DateTime<Utc> {
    let current = current_cutoff(now, cutoff);
    current.checked_add_days(Days::new(1)).unwrap_or(current)
}

pub fn parse_group_id(s: &str) -> Result<GroupId> {
    s.trim()
        .parse::<i64>()
        .map(GroupId)
        .with_context(|| format!("Invalid group id '{}'", s))
}

pub fn parse_group_list(s: &str) -> Result<Vec<GroupId>> {
    s.split(',')
        .filter(|p| !p.trim().is_empty())
        .map(parse_group_id)
        .collect()
}

pub fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s.trim()).with_context(|| format!("Invalid order id '{}'", s))
}

pub fn parse_amount(s: &str) -> Result<i64> {
    s.trim()
        .parse::<i64>()
        .with_context(|| format!("Invalid token amount '{}'", s))
}

pub fn pretty_table(headers: &[&str], rows: Vec<Vec<String>>) -> Table {
    let mut t = Table::new();
    t.load_preset(UTF8_FULL);
    t.set_header(headers.iter().map(|h| Cell::new(*h)));
    for r in rows {
        t.add_row(r.into_iter().map(Cell::new));
    }
    t
}

pub fn maybe_print_json<T: serde::Serialize>(json_flag: bool, v: &T) -> Result<bool> {
    if json_flag {
        println!("{}", serde_json::to_string_pretty(v)?);
        return Ok(true);
    }
    Ok(false)
}
