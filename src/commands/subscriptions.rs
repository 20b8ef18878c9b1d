// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::{Context, Result};

use super::balance::print_balance;
use super::refill::report;
use super::{opt_ts, required};
use crate::models::ProductId;
use crate::service::TokenEconomy;
use crate::utils::{fmt_ts, maybe_print_json, parse_group_id, parse_uuid, pretty_table};

pub fn handle(eco: &mut TokenEconomy, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("activate", sub)) => {
            let order = parse_uuid(required(sub, "order")?)?;
            let product = ProductId(required(sub, "product")?.to_string());
            let balance = eco
                .activate_subscription(order, &product)
                .with_context(|| format!("Activate order {}", order))?;
            print_balance(sub.get_flag("json"), &balance)?;
        }
        Some(("renew", sub)) => {
            if let Some(raw) = sub.get_one::<String>("group") {
                let balance = eco.renew_group_subscription(parse_group_id(raw)?)?;
                print_balance(sub.get_flag("json"), &balance)?;
            } else {
                let summary = eco.renew_subscription_tokens()?;
                report("subscription renewal", sub.get_flag("json"), &summary)?;
            }
        }
        Some(("cancel", sub)) => {
            let group = parse_group_id(required(sub, "group")?)?;
            let n = eco.cancel_all_subscriptions(group)?;
            println!("Cancelled {} subscription(s) for group {}", n, group);
        }
        Some(("list", sub)) => list(eco, sub)?,
        _ => {}
    }
    Ok(())
}

fn list(eco: &TokenEconomy, sub: &clap::ArgMatches) -> Result<()> {
    let group = parse_group_id(required(sub, "group")?)?;
    let subs = eco.subscriptions(group)?;
    if maybe_print_json(sub.get_flag("json"), &subs)? {
        return Ok(());
    }
    let rows = subs
        .iter()
        .map(|s| {
            vec![
                s.id.to_string(),
                s.order_id.to_string(),
                s.product_id.to_string(),
                fmt_ts(s.activated_at),
                fmt_ts(s.current_period_end),
                opt_ts(s.cancelled_at),
            ]
        })
        .collect();
    println!(
        "{}",
        pretty_table(
            &["Id", "Order", "Product", "Activated", "Period End", "Cancelled"],
            rows
        )
    );
    Ok(())
}
