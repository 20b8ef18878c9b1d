// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

pub mod balance;
pub mod export;
pub mod grants;
pub mod groups;
pub mod refill;
pub mod subscriptions;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::utils::fmt_ts;

pub(crate) fn required<'a>(m: &'a clap::ArgMatches, name: &str) -> Result<&'a str> {
    m.get_one::<String>(name)
        .map(|s| s.trim())
        .with_context(|| format!("Missing --{}", name))
}

pub(crate) fn opt_ts(ts: Option<DateTime<Utc>>) -> String {
    ts.map(fmt_ts).unwrap_or_else(|| "-".to_string())
}
