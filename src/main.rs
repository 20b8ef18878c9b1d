// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use tokenledger::{EconomyConfig, TokenEconomy, cli, commands, db};

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("tokenledger=info"))?)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let matches = cli::build_cli().get_matches();

    let cfg_path = match matches.get_one::<String>("config") {
        Some(p) => PathBuf::from(p),
        None => EconomyConfig::default_path()?,
    };
    let cfg = EconomyConfig::load(&cfg_path)
        .with_context(|| format!("Load config from {}", cfg_path.display()))?;
    let conn = db::open_or_init(cfg.busy_timeout())?;
    let mut eco = TokenEconomy::new(conn, cfg);

    match matches.subcommand() {
        Some(("init", _)) => {
            println!("Database initialized at {}", db::db_path()?.display());
        }
        Some(("group", sub)) => commands::groups::handle(&mut eco, sub)?,
        Some(("order", sub)) => commands::groups::handle_order(&eco, sub)?,
        Some(("balance", sub)) => commands::balance::handle(&eco, sub)?,
        Some(("balances", sub)) => commands::balance::handle_many(&eco, sub)?,
        Some(("refill", sub)) => commands::refill::handle(&mut eco, sub)?,
        Some(("subscription", sub)) => commands::subscriptions::handle(&mut eco, sub)?,
        Some(("grant", sub)) => commands::grants::handle(&eco, sub)?,
        Some(("consume", sub)) => commands::grants::handle_consume(&mut eco, sub)?,
        Some(("export", sub)) => commands::export::handle(&eco, sub)?,
        _ => {
            cli::build_cli().print_help()?;
            println!();
        }
    }
    Ok(())
}
