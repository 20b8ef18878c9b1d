// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Read-facing balances: ledger buckets joined with subscription metadata.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::collections::{BTreeSet, HashMap};

use crate::balance::{TokenBuckets, aggregate_balances};
use crate::config::EconomyConfig;
use crate::error::Result;
use crate::ledger;
use crate::models::{BalanceInfo, GroupId, SubscriptionRecord};
use crate::utils::next_cutoff;

/// Daily allotment for a group: its active subscription's tier, else the configured default.
pub fn daily_allotment(cfg: &EconomyConfig, active: Option<&SubscriptionRecord>) -> Result<i64> {
    match active {
        Some(sub) => Ok(cfg.product(&sub.product_id)?.daily_tokens),
        None => Ok(cfg.daily_allotment),
    }
}

/// Newest non-cancelled subscription of one group.
pub fn active_subscription(
    conn: &Connection,
    group_id: GroupId,
) -> Result<Option<SubscriptionRecord>> {
    Ok(ledger::active_subscriptions(conn, &[group_id])?
        .into_iter()
        .next())
}

pub fn compose(
    cfg: &EconomyConfig,
    group_id: GroupId,
    buckets: TokenBuckets,
    active: Option<&SubscriptionRecord>,
    now: DateTime<Utc>,
) -> Result<BalanceInfo> {
    let tier = active.map(|s| cfg.product(&s.product_id)).transpose()?;
    Ok(BalanceInfo {
        group_id,
        daily_tokens: buckets.daily,
        max_daily_tokens: daily_allotment(cfg, active)?,
        subscription_tokens: buckets.subscription,
        max_subscription_tokens: tier.map(|t| t.monthly_tokens),
        permanent_tokens: buckets.permanent,
        next_daily_token_refresh: next_cutoff(now, cfg.daily_cutoff),
        next_subscription_token_refresh: active.map(|s| s.current_period_end),
        active_subscription_id: active.map(|s| s.id),
    })
}

/// Balances for many groups, two queries per slice of ids. Unknown ids resolve to zero balances.
pub fn get_balances(
    conn: &Connection,
    cfg: &EconomyConfig,
    group_ids: &BTreeSet<GroupId>,
    now: DateTime<Utc>,
) -> Result<HashMap<GroupId, BalanceInfo>> {
    let buckets = aggregate_balances(conn, group_ids, now)?;
    let ids: Vec<GroupId> = group_ids.iter().copied().collect();

    let mut active: HashMap<GroupId, SubscriptionRecord> = HashMap::new();
    for sub in ledger::active_subscriptions(conn, &ids)? {
        active.entry(sub.group_id).or_insert(sub);
    }

    let mut out = HashMap::with_capacity(ids.len());
    for (group_id, b) in buckets {
        let info = compose(cfg, group_id, b, active.get(&group_id), now)?;
        out.insert(group_id, info);
    }
    Ok(out)
}

pub fn get_balance(
    conn: &Connection,
    cfg: &EconomyConfig,
    group_id: GroupId,
    now: DateTime<Utc>,
) -> Result<BalanceInfo> {
    ledger::require_group(conn, group_id)?;
    let ids = BTreeSet::from([group_id]);
    match get_balances(conn, cfg, &ids, now)?.remove(&group_id) {
        Some(info) => Ok(info),
        None => compose(cfg, group_id, TokenBuckets::default(), None, now),
    }
}
