// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;
use std::collections::BTreeSet;

use super::{opt_ts, required};
use crate::models::BalanceInfo;
use crate::service::TokenEconomy;
use crate::utils::{fmt_ts, maybe_print_json, parse_group_id, parse_group_list, pretty_table};

const HEADERS: [&str; 9] = [
    "Group",
    "Daily",
    "Max Daily",
    "Subscription",
    "Max Subscription",
    "Permanent",
    "Total",
    "Next Daily Refresh",
    "Next Subscription Refresh",
];

pub(crate) fn row(b: &BalanceInfo) -> Vec<String> {
    vec![
        b.group_id.to_string(),
        b.daily_tokens.to_string(),
        b.max_daily_tokens.to_string(),
        b.subscription_tokens.to_string(),
        b.max_subscription_tokens
            .map(|v| v.to_string())
            .unwrap_or_else(|| "-".to_string()),
        b.permanent_tokens.to_string(),
        b.total_tokens().to_string(),
        fmt_ts(b.next_daily_token_refresh),
        opt_ts(b.next_subscription_token_refresh),
    ]
}

pub(crate) fn print_balance(json_flag: bool, b: &BalanceInfo) -> Result<()> {
    if maybe_print_json(json_flag, b)? {
        return Ok(());
    }
    println!("{}", pretty_table(&HEADERS, vec![row(b)]));
    Ok(())
}

pub fn handle(eco: &TokenEconomy, m: &clap::ArgMatches) -> Result<()> {
    let group = parse_group_id(required(m, "group")?)?;
    let balance = eco.get_balance(group)?;
    print_balance(m.get_flag("json"), &balance)
}

pub fn handle_many(eco: &TokenEconomy, m: &clap::ArgMatches) -> Result<()> {
    let ids: BTreeSet<_> = parse_group_list(required(m, "groups")?)?
        .into_iter()
        .collect();
    let balances = eco.get_balances(&ids)?;
    let ordered: Vec<&BalanceInfo> = ids.iter().filter_map(|id| balances.get(id)).collect();
    if maybe_print_json(m.get_flag("json"), &ordered)? {
        return Ok(());
    }
    let rows = ordered.into_iter().map(row).collect();
    println!("{}", pretty_table(&HEADERS, rows));
    Ok(())
}
