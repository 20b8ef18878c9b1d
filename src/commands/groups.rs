// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::{Context, Result};

use super::required;
use crate::models::ProductId;
use crate::service::TokenEconomy;
use crate::utils::{fmt_ts, maybe_print_json, parse_group_id, parse_uuid, pretty_table};

pub fn handle(eco: &mut TokenEconomy, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => {
            let group = parse_group_id(required(sub, "group")?)?;
            eco.register_group(group)
                .with_context(|| format!("Register group {}", group))?;
            println!("Registered group {}", group);
        }
        Some(("block", sub)) => {
            let group = parse_group_id(required(sub, "group")?)?;
            eco.block_group(group, true)?;
            println!("Blocked group {}", group);
        }
        Some(("unblock", sub)) => {
            let group = parse_group_id(required(sub, "group")?)?;
            eco.block_group(group, false)?;
            println!("Unblocked group {}", group);
        }
        Some(("delete", sub)) => {
            let group = parse_group_id(required(sub, "group")?)?;
            eco.delete_group(group)?;
            println!("Deleted group {}", group);
        }
        Some(("transactions", sub)) => list_transactions(eco, sub)?,
        _ => {}
    }
    Ok(())
}

fn list_transactions(eco: &TokenEconomy, sub: &clap::ArgMatches) -> Result<()> {
    let group = parse_group_id(required(sub, "group")?)?;
    let rows = eco.transactions(group)?;
    if maybe_print_json(sub.get_flag("json"), &rows)? {
        return Ok(());
    }
    let table_rows = rows
        .iter()
        .map(|t| {
            vec![
                fmt_ts(t.created_time),
                t.transaction_type.to_string(),
                t.amount.to_string(),
                t.transaction_group.to_string(),
            ]
        })
        .collect();
    println!(
        "{}",
        pretty_table(&["Time", "Type", "Amount", "Correlation"], table_rows)
    );
    Ok(())
}

pub fn handle_order(eco: &TokenEconomy, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("record", sub)) => {
            let order = parse_uuid(required(sub, "order")?)?;
            let group = parse_group_id(required(sub, "group")?)?;
            let product = ProductId(required(sub, "product")?.to_string());
            eco.record_purchase_order(order, group, &product)?;
            println!("Recorded order {} ({}) for group {}", order, product, group);
        }
        Some(("refund", sub)) => {
            let order = parse_uuid(required(sub, "order")?)?;
            eco.mark_order_refunded(order)?;
            println!("Order {} marked refunded", order);
        }
        _ => {}
    }
    Ok(())
}
