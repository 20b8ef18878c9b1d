// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Subscription activation, periodic renewal and cancellation.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, TransactionBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::balance::group_buckets;
use crate::batch::{ItemOutcome, run_in_chunks};
use crate::config::EconomyConfig;
use crate::error::{LedgerError, Result};
use crate::generator::build_at;
use crate::ledger;
use crate::models::{
    BalanceInfo, BatchSummary, GroupId, ProductId, Transaction, TransactionGroup, TransactionType,
};
use crate::query::get_balance;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewOutcome {
    Renewed {
        burned: i64,
        granted: i64,
        period_end: DateTime<Utc>,
    },
    Expired {
        burned: i64,
    },
    Skipped,
}

/// Burn the leftover subscription tokens (if any) and grant `monthly_tokens`.
fn burn_and_refill(
    group_id: GroupId,
    leftover: i64,
    monthly_tokens: i64,
    transaction_group: TransactionGroup,
    now: DateTime<Utc>,
) -> Result<Vec<Transaction>> {
    let mut rows = Vec::with_capacity(2);
    if leftover > 0 {
        rows.push(build_at(
            group_id,
            TransactionType::MonthlySubscriptionBurn,
            leftover,
            transaction_group,
            now,
        )?);
    }
    rows.push(build_at(
        group_id,
        TransactionType::MonthlySubscriptionRefill,
        monthly_tokens,
        transaction_group,
        now,
    )?);
    Ok(rows)
}

/// Activate the subscription bought with a receipt-validated order.
///
/// Idempotent on `order_id`: a second call for the same order writes nothing and returns the
/// current balance. A still-active subscription of the group is superseded.
pub fn activate_subscription(
    conn: &mut Connection,
    cfg: &EconomyConfig,
    order_id: Uuid,
    product_id: &ProductId,
    now: DateTime<Utc>,
) -> Result<BalanceInfo> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    if let Some(existing) = ledger::subscription_by_order(&tx, order_id)? {
        info!(order_id = %order_id, subscription_id = existing.id, "order already activated");
        drop(tx);
        return get_balance(conn, cfg, existing.group_id, now);
    }

    let order = ledger::purchase_order(&tx, order_id)?.ok_or(LedgerError::UnknownOrder(order_id))?;
    if order.refunded {
        return Err(LedgerError::InvalidOrder {
            order_id,
            reason: "order was refunded".into(),
        });
    }
    if &order.product_id != product_id {
        return Err(LedgerError::InvalidOrder {
            order_id,
            reason: format!(
                "order is for product '{}', not '{}'",
                order.product_id, product_id
            ),
        });
    }
    let tier = cfg.product(product_id)?;
    let group_id = order.group_id;
    if !ledger::require_group(&tx, group_id)?.is_eligible() {
        return Err(LedgerError::InvalidOrder {
            order_id,
            reason: format!("group {} is blocked or deleted", group_id),
        });
    }

    let superseded = ledger::cancel_group_subscriptions(&tx, group_id, now)?;
    if superseded > 0 {
        info!(group_id = %group_id, superseded, "previous subscription superseded");
    }

    let buckets = group_buckets(&tx, group_id, now)?;
    let transaction_group = TransactionGroup::from(order_id);
    let rows = burn_and_refill(
        group_id,
        buckets.subscription,
        tier.monthly_tokens,
        transaction_group,
        now,
    )?;
    let record = ledger::insert_subscription(
        &tx,
        group_id,
        order_id,
        product_id,
        now,
        now + cfg.subscription_period(),
    )?;
    ledger::append(&tx, &rows)?;
    tx.commit()?;

    info!(
        group_id = %group_id,
        order_id = %order_id,
        subscription_id = record.id,
        product_id = %product_id,
        monthly_tokens = tier.monthly_tokens,
        "subscription activated"
    );
    get_balance(conn, cfg, group_id, now)
}

fn advance_period(
    mut end: DateTime<Utc>,
    period: chrono::Duration,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    while end <= now {
        end += period;
    }
    end
}

/// Renew one subscription if its period has elapsed; re-checked under the caller's transaction.
pub fn renew_subscription(
    conn: &Connection,
    cfg: &EconomyConfig,
    subscription_id: i64,
    now: DateTime<Utc>,
) -> Result<RenewOutcome> {
    let Some(sub) = ledger::subscription(conn, subscription_id)? else {
        return Ok(RenewOutcome::Skipped);
    };
    if !sub.is_active() || sub.current_period_end > now {
        debug!(subscription_id, "not due for renewal");
        return Ok(RenewOutcome::Skipped);
    }
    if !ledger::require_group(conn, sub.group_id)?.is_eligible() {
        return Ok(RenewOutcome::Skipped);
    }

    let tier = cfg.product(&sub.product_id)?;
    let buckets = group_buckets(conn, sub.group_id, now)?;
    let transaction_group = TransactionGroup::new();
    let rows = burn_and_refill(
        sub.group_id,
        buckets.subscription,
        tier.monthly_tokens,
        transaction_group,
        now,
    )?;
    let period_end = advance_period(sub.current_period_end, cfg.subscription_period(), now);
    ledger::extend_subscription(conn, sub.id, period_end)?;
    ledger::append(conn, &rows)?;

    info!(
        group_id = %sub.group_id,
        subscription_id = sub.id,
        transaction_group = %transaction_group,
        burned = buckets.subscription.max(0),
        granted = tier.monthly_tokens,
        period_end = %period_end,
        "subscription renewed"
    );
    Ok(RenewOutcome::Renewed {
        burned: buckets.subscription.max(0),
        granted: tier.monthly_tokens,
        period_end,
    })
}

/// Burn leftover tokens of a group whose subscriptions are all cancelled and ended.
pub fn expire_group_subscription(
    conn: &Connection,
    group_id: GroupId,
    now: DateTime<Utc>,
) -> Result<RenewOutcome> {
    let subs = ledger::group_subscriptions(conn, group_id)?;
    if subs.is_empty() || subs.iter().any(|s| s.is_active()) {
        return Ok(RenewOutcome::Skipped);
    }
    if subs.iter().any(|s| s.current_period_end > now) {
        return Ok(RenewOutcome::Skipped);
    }
    let buckets = group_buckets(conn, group_id, now)?;
    if buckets.subscription <= 0 {
        return Ok(RenewOutcome::Skipped);
    }

    let burn = build_at(
        group_id,
        TransactionType::MonthlySubscriptionBurn,
        buckets.subscription,
        TransactionGroup::new(),
        now,
    )?;
    ledger::append(conn, &[burn])?;
    info!(group_id = %group_id, burned = buckets.subscription, "cancelled subscription expired");
    Ok(RenewOutcome::Expired {
        burned: buckets.subscription,
    })
}

/// Scheduled renewal of every due subscription, followed by the expiry burns.
pub fn renew_subscription_tokens(
    conn: &mut Connection,
    cfg: &EconomyConfig,
    now: DateTime<Utc>,
) -> Result<BatchSummary> {
    info!("subscription renewal batch started");
    let renewed = run_in_chunks(
        conn,
        "subscription_renewal",
        cfg.batch_size,
        cfg.chunk_retry_attempts,
        |c, after, limit| ledger::renewable_subscriptions(c, now, after, limit),
        |c, id| match renew_subscription(c, cfg, id, now)? {
            RenewOutcome::Skipped => Ok(ItemOutcome::Skipped),
            _ => Ok(ItemOutcome::Written),
        },
    )?;
    let expired = run_in_chunks(
        conn,
        "subscription_expiry",
        cfg.batch_size,
        cfg.chunk_retry_attempts,
        |c, after, limit| ledger::expired_subscription_groups(c, now, after, limit),
        |c, group_id| match expire_group_subscription(c, group_id, now)? {
            RenewOutcome::Skipped => Ok(ItemOutcome::Skipped),
            _ => Ok(ItemOutcome::Written),
        },
    )?;

    Ok(BatchSummary {
        chunks: renewed.chunks + expired.chunks,
        processed: renewed.processed + expired.processed,
        written: renewed.written + expired.written,
        skipped: renewed.skipped + expired.skipped,
        failed: renewed.failed + expired.failed,
    })
}

/// Renewal for a single group, returning its balance afterwards.
pub fn renew_group_subscription(
    conn: &mut Connection,
    cfg: &EconomyConfig,
    group_id: GroupId,
    now: DateTime<Utc>,
) -> Result<BalanceInfo> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    ledger::require_group(&tx, group_id)?;
    let active = ledger::active_subscriptions(&tx, &[group_id])?;
    if active.is_empty() {
        expire_group_subscription(&tx, group_id, now)?;
    } else {
        for sub in &active {
            renew_subscription(&tx, cfg, sub.id, now)?;
        }
    }
    tx.commit()?;
    get_balance(conn, cfg, group_id, now)
}

/// Cancel every active subscription of the group. Tokens already granted stay spendable.
pub fn cancel_all_subscriptions(
    conn: &mut Connection,
    group_id: GroupId,
    now: DateTime<Utc>,
) -> Result<usize> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    ledger::require_group(&tx, group_id)?;
    let cancelled = ledger::cancel_group_subscriptions(&tx, group_id, now)?;
    tx.commit()?;
    if cancelled == 0 {
        warn!(group_id = %group_id, "no active subscription to cancel");
    } else {
        info!(group_id = %group_id, cancelled, "subscriptions cancelled");
    }
    Ok(cancelled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn period_advances_past_now_in_whole_periods() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let period = Duration::days(30);
        let now = start + Duration::days(65);
        assert_eq!(advance_period(start, period, now), start + Duration::days(90));
        assert_eq!(
            advance_period(start, period, start),
            start + Duration::days(30)
        );
    }
}
