// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::{Result, bail};

use crate::daily::RefillOutcome;
use crate::models::BatchSummary;
use crate::service::TokenEconomy;
use crate::utils::{maybe_print_json, parse_group_id, pretty_table};

pub fn handle(eco: &mut TokenEconomy, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("daily", sub)) => daily(eco, sub),
        _ => Ok(()),
    }
}

fn daily(eco: &mut TokenEconomy, sub: &clap::ArgMatches) -> Result<()> {
    if let Some(raw) = sub.get_one::<String>("group") {
        let group = parse_group_id(raw)?;
        match eco.refill_daily_tokens(group)? {
            RefillOutcome::Refilled {
                burned, granted, ..
            } => println!("Group {}: burned {}, granted {}", group, burned, granted),
            RefillOutcome::Skipped(reason) => println!("Group {}: skipped ({:?})", group, reason),
        }
        return Ok(());
    }
    let summary = eco.batch_refill_daily_tokens(sub.get_flag("force"))?;
    report("daily refill", sub.get_flag("json"), &summary)
}

/// Print a batch summary; fails when any group could not be processed.
pub(crate) fn report(job: &str, json_flag: bool, s: &BatchSummary) -> Result<()> {
    if !maybe_print_json(json_flag, s)? {
        println!(
            "{}",
            pretty_table(
                &["Job", "Chunks", "Processed", "Written", "Skipped", "Failed"],
                vec![vec![
                    job.to_string(),
                    s.chunks.to_string(),
                    s.processed.to_string(),
                    s.written.to_string(),
                    s.skipped.to_string(),
                    s.failed.to_string(),
                ]],
            )
        );
    }
    if !s.is_clean() {
        bail!("{}: {} group(s) failed", job, s.failed);
    }
    Ok(())
}
