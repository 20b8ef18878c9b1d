// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Purchases, administrative adjustments and feature usage.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, TransactionBehavior};
use tracing::info;

use crate::balance::group_buckets;
use crate::error::{LedgerError, Result};
use crate::generator::{build_at, purchase_at};
use crate::ledger;
use crate::models::{GroupId, Sign, Transaction, TransactionGroup, TransactionType};

pub fn grant_purchase(
    conn: &Connection,
    group_id: GroupId,
    amount: i64,
    amount_before_discount: i64,
    now: DateTime<Utc>,
) -> Result<TransactionGroup> {
    ledger::require_group(conn, group_id)?;
    let transaction_group = TransactionGroup::new();
    let row = purchase_at(group_id, amount, amount_before_discount, transaction_group, now)?;
    ledger::append(conn, &[row])?;
    info!(group_id = %group_id, amount, amount_before_discount, "purchase granted");
    Ok(transaction_group)
}

/// Signed adjustment of the permanent bucket.
pub fn admin_grant(
    conn: &Connection,
    group_id: GroupId,
    signed_amount: i64,
    now: DateTime<Utc>,
) -> Result<TransactionGroup> {
    ledger::require_group(conn, group_id)?;
    let sign = if signed_amount < 0 {
        Sign::Debit
    } else {
        Sign::Credit
    };
    let magnitude = signed_amount
        .checked_abs()
        .ok_or(LedgerError::InvalidAmount {
            transaction_type: TransactionType::AdminGrant(sign),
            amount: signed_amount,
        })?;
    let transaction_group = TransactionGroup::new();
    let row = build_at(
        group_id,
        TransactionType::AdminGrant(sign),
        magnitude,
        transaction_group,
        now,
    )?;
    ledger::append(conn, &[row])?;
    info!(group_id = %group_id, amount = signed_amount, "admin grant");
    Ok(transaction_group)
}

/// Split `amount` across the buckets: daily first, then subscription, then permanent.
/// Negative bucket balances contribute nothing.
fn split_spend(amount: i64, daily: i64, subscription: i64, permanent: i64) -> [i64; 3] {
    let mut left = amount;
    let mut take = |available: i64| {
        let t = left.min(available.max(0));
        left -= t;
        t
    };
    let d = take(daily);
    let s = take(subscription);
    let p = take(permanent);
    [d, s, p]
}

/// Spend tokens for feature usage. Fails without writing when the group cannot cover `amount`.
pub fn consume_tokens(
    conn: &mut Connection,
    group_id: GroupId,
    amount: i64,
    now: DateTime<Utc>,
) -> Result<Vec<Transaction>> {
    if amount <= 0 {
        return Err(LedgerError::InvalidAmount {
            transaction_type: TransactionType::UsageConsumption,
            amount,
        });
    }
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    ledger::require_group(&tx, group_id)?;
    let buckets = group_buckets(&tx, group_id, now)?;
    let available =
        buckets.daily.max(0) + buckets.subscription.max(0) + buckets.permanent.max(0);
    if available < amount {
        return Err(LedgerError::InsufficientBalance {
            group_id,
            available,
            requested: amount,
        });
    }

    let [daily, subscription, permanent] = split_spend(
        amount,
        buckets.daily,
        buckets.subscription,
        buckets.permanent,
    );
    let transaction_group = TransactionGroup::new();
    let mut rows = Vec::with_capacity(3);
    for (transaction_type, part) in [
        (TransactionType::DailyBurn, daily),
        (TransactionType::MonthlySubscriptionBurn, subscription),
        (TransactionType::UsageConsumption, permanent),
    ] {
        if part > 0 {
            rows.push(build_at(group_id, transaction_type, part, transaction_group, now)?);
        }
    }
    ledger::append(&tx, &rows)?;
    tx.commit()?;

    info!(
        group_id = %group_id,
        transaction_group = %transaction_group,
        amount,
        daily,
        subscription,
        permanent,
        "tokens consumed"
    );
    Ok(rows)
}
