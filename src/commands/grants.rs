// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;

use super::required;
use crate::service::TokenEconomy;
use crate::utils::{parse_amount, parse_group_id};

pub fn handle(eco: &TokenEconomy, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("purchase", sub)) => {
            let group = parse_group_id(required(sub, "group")?)?;
            let amount = parse_amount(required(sub, "amount")?)?;
            let list_price = match sub.get_one::<String>("list-price") {
                Some(raw) => parse_amount(raw)?,
                None => amount,
            };
            let tg = eco.grant_purchase(group, amount, list_price)?;
            println!("Granted {} tokens to group {} ({})", amount, group, tg);
        }
        Some(("admin", sub)) => {
            let group = parse_group_id(required(sub, "group")?)?;
            let amount = parse_amount(required(sub, "amount")?)?;
            let tg = eco.admin_grant(group, amount)?;
            println!("Adjusted group {} by {} ({})", group, amount, tg);
        }
        _ => {}
    }
    Ok(())
}

pub fn handle_consume(eco: &mut TokenEconomy, m: &clap::ArgMatches) -> Result<()> {
    let group = parse_group_id(required(m, "group")?)?;
    let amount = parse_amount(required(m, "amount")?)?;
    let rows = eco.consume_tokens(group, amount)?;
    for t in &rows {
        println!("{:<24} {:>8}", t.transaction_type.as_str(), t.amount);
    }
    println!("Consumed {} tokens from group {}", amount, group);
    Ok(())
}
