// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::{Context, Result};

use super::required;
use crate::service::TokenEconomy;
use crate::utils::{fmt_ts, parse_group_id};

pub fn handle(eco: &TokenEconomy, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("ledger", sub)) => export_ledger(eco, sub),
        _ => Ok(()),
    }
}

fn export_ledger(eco: &TokenEconomy, sub: &clap::ArgMatches) -> Result<()> {
    let group = parse_group_id(required(sub, "group")?)?;
    let out = required(sub, "out")?;
    let rows = eco.transactions(group)?;

    let mut wtr =
        csv::Writer::from_path(out).with_context(|| format!("Create export file {}", out))?;
    wtr.write_record([
        "id",
        "group_id",
        "transaction_group",
        "transaction_type",
        "amount",
        "amount_before_discount",
        "created_time",
    ])?;
    for t in &rows {
        wtr.write_record([
            t.id.to_string(),
            t.group_id.to_string(),
            t.transaction_group.to_string(),
            t.transaction_type.to_string(),
            t.amount.to_string(),
            t.amount_before_discount.to_string(),
            fmt_ts(t.created_time),
        ])?;
    }
    wtr.flush()?;
    println!("Exported {} ledger rows to {}", rows.len(), out);
    Ok(())
}
