// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! SQLite adapter for the ledger store and the tables the refill engines read.
//!
//! Every function takes a plain `&Connection`; callers that need atomicity pass a
//! `Transaction` or `Savepoint`, both of which deref to a connection.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use uuid::Uuid;

use crate::error::{LedgerError, Result};
use crate::models::{
    GroupId, GroupStatus, ProductId, PurchaseOrder, SubscriptionRecord, Transaction,
    TransactionGroup, TransactionType,
};
use crate::utils::{fmt_ts, parse_ts};

fn parse_uuid_col(s: &str, idx: usize) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Largest IN list bound into one statement; bigger id sets are queried slice by slice.
pub(crate) const MAX_IDS_PER_QUERY: usize = 1000;

/// `?,?,?` for an IN list of `n` parameters.
pub(crate) fn placeholders(n: usize) -> String {
    vec!["?"; n].join(",")
}

// Groups

pub fn insert_group(conn: &Connection, id: GroupId, now: DateTime<Utc>) -> Result<()> {
    if group_status(conn, id)?.is_some() {
        return Err(LedgerError::Conflict(format!("group {} already exists", id)));
    }
    conn.execute(
        "INSERT INTO groups(id, created_at) VALUES (?1, ?2)",
        params![id.0, fmt_ts(now)],
    )?;
    Ok(())
}

pub fn group_status(conn: &Connection, id: GroupId) -> Result<Option<GroupStatus>> {
    let status = conn
        .query_row(
            "SELECT is_blocked, deleted_at IS NOT NULL FROM groups WHERE id=?1",
            params![id.0],
            |r| {
                Ok(GroupStatus {
                    id,
                    is_blocked: r.get(0)?,
                    is_deleted: r.get(1)?,
                })
            },
        )
        .optional()?;
    Ok(status)
}

pub fn require_group(conn: &Connection, id: GroupId) -> Result<GroupStatus> {
    group_status(conn, id)?.ok_or(LedgerError::UnknownGroup(id))
}

pub fn set_group_blocked(conn: &Connection, id: GroupId, blocked: bool) -> Result<()> {
    let n = conn.execute(
        "UPDATE groups SET is_blocked=?2 WHERE id=?1",
        params![id.0, blocked],
    )?;
    if n == 0 {
        return Err(LedgerError::UnknownGroup(id));
    }
    Ok(())
}

pub fn mark_group_deleted(conn: &Connection, id: GroupId, now: DateTime<Utc>) -> Result<()> {
    let n = conn.execute(
        "UPDATE groups SET deleted_at=COALESCE(deleted_at, ?2) WHERE id=?1",
        params![id.0, fmt_ts(now)],
    )?;
    if n == 0 {
        return Err(LedgerError::UnknownGroup(id));
    }
    Ok(())
}

/// One page of groups due a daily refill, ordered by id and starting after `after`.
///
/// With `refilled_since` set, groups that already have a `DailyRefill` at or after that
/// instant are excluded; `None` selects every eligible group.
pub fn eligible_daily_groups(
    conn: &Connection,
    refilled_since: Option<DateTime<Utc>>,
    after: Option<GroupId>,
    limit: usize,
) -> Result<Vec<GroupId>> {
    let mut stmt = conn.prepare_cached(
        "SELECT g.id FROM groups g
         WHERE g.is_blocked = 0 AND g.deleted_at IS NULL
           AND g.id > ?1
           AND (?2 IS NULL OR NOT EXISTS (
                SELECT 1 FROM ledger_transactions t
                WHERE t.group_id = g.id
                  AND t.transaction_type = 'DailyRefill'
                  AND t.created_time >= ?2))
         ORDER BY g.id
         LIMIT ?3",
    )?;
    let rows = stmt.query_map(
        params![
            after.map(|g| g.0).unwrap_or(i64::MIN),
            refilled_since.map(fmt_ts),
            limit as i64
        ],
        |r| r.get::<_, i64>(0).map(GroupId),
    )?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

// Ledger rows

pub fn append(conn: &Connection, rows: &[Transaction]) -> Result<()> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO ledger_transactions(id, group_id, transaction_group, transaction_type,
             amount, amount_before_discount, created_time)
         VALUES (?1,?2,?3,?4,?5,?6,?7)",
    )?;
    for t in rows {
        stmt.execute(params![
            t.id.to_string(),
            t.group_id.0,
            t.transaction_group.to_string(),
            t.transaction_type.as_str(),
            t.amount,
            t.amount_before_discount,
            fmt_ts(t.created_time),
        ])?;
    }
    Ok(())
}

fn transaction_from_row(r: &Row<'_>) -> rusqlite::Result<Transaction> {
    let id: String = r.get(0)?;
    let tg: String = r.get(2)?;
    let ty: String = r.get(3)?;
    let amount: i64 = r.get(4)?;
    let created: String = r.get(6)?;
    let transaction_type = TransactionType::from_stored(&ty, amount).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("unknown transaction type '{}'", ty).into(),
        )
    })?;
    Ok(Transaction {
        id: parse_uuid_col(&id, 0)?,
        group_id: GroupId(r.get(1)?),
        transaction_group: TransactionGroup(parse_uuid_col(&tg, 2)?),
        transaction_type,
        amount,
        amount_before_discount: r.get(5)?,
        created_time: parse_ts(&created)?,
    })
}

const TRANSACTION_COLUMNS: &str = "id, group_id, transaction_group, transaction_type, amount, amount_before_discount, created_time";

pub fn group_transactions(conn: &Connection, group_id: GroupId) -> Result<Vec<Transaction>> {
    let sql = format!(
        "SELECT {} FROM ledger_transactions WHERE group_id=?1 ORDER BY seq",
        TRANSACTION_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![group_id.0], transaction_from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub fn correlated_transactions(
    conn: &Connection,
    transaction_group: TransactionGroup,
) -> Result<Vec<Transaction>> {
    let sql = format!(
        "SELECT {} FROM ledger_transactions WHERE transaction_group=?1 ORDER BY seq",
        TRANSACTION_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![transaction_group.to_string()], transaction_from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub fn last_transaction_time(
    conn: &Connection,
    group_id: GroupId,
    transaction_type: TransactionType,
) -> Result<Option<DateTime<Utc>>> {
    let v: Option<String> = conn.query_row(
        "SELECT MAX(created_time) FROM ledger_transactions
         WHERE group_id=?1 AND transaction_type=?2",
        params![group_id.0, transaction_type.as_str()],
        |r| r.get(0),
    )?;
    Ok(v.map(|s| parse_ts(&s)).transpose()?)
}

pub fn count_transactions(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM ledger_transactions", [], |r| r.get(0))?)
}

// Purchase orders

pub fn insert_purchase_order(
    conn: &Connection,
    order_id: Uuid,
    group_id: GroupId,
    product_id: &ProductId,
    now: DateTime<Utc>,
) -> Result<()> {
    require_group(conn, group_id)?;
    let n = conn.execute(
        "INSERT OR IGNORE INTO purchase_orders(id, group_id, product_id, created_at)
         VALUES (?1,?2,?3,?4)",
        params![order_id.to_string(), group_id.0, product_id.0, fmt_ts(now)],
    )?;
    if n == 0 {
        return Err(LedgerError::Conflict(format!(
            "purchase order {} already recorded",
            order_id
        )));
    }
    Ok(())
}

pub fn purchase_order(conn: &Connection, order_id: Uuid) -> Result<Option<PurchaseOrder>> {
    let order = conn
        .query_row(
            "SELECT group_id, product_id, refunded, created_at FROM purchase_orders WHERE id=?1",
            params![order_id.to_string()],
            |r| {
                let created: String = r.get(3)?;
                Ok(PurchaseOrder {
                    id: order_id,
                    group_id: GroupId(r.get(0)?),
                    product_id: ProductId(r.get(1)?),
                    refunded: r.get(2)?,
                    created_at: parse_ts(&created)?,
                })
            },
        )
        .optional()?;
    Ok(order)
}

pub fn mark_order_refunded(conn: &Connection, order_id: Uuid) -> Result<()> {
    let n = conn.execute(
        "UPDATE purchase_orders SET refunded=1 WHERE id=?1",
        params![order_id.to_string()],
    )?;
    if n == 0 {
        return Err(LedgerError::UnknownOrder(order_id));
    }
    Ok(())
}

// Subscriptions

const SUBSCRIPTION_COLUMNS: &str =
    "id, group_id, order_id, product_id, activated_at, current_period_end, cancelled_at";

fn subscription_from_row(r: &Row<'_>) -> rusqlite::Result<SubscriptionRecord> {
    let order: String = r.get(2)?;
    let activated: String = r.get(4)?;
    let period_end: String = r.get(5)?;
    let cancelled: Option<String> = r.get(6)?;
    Ok(SubscriptionRecord {
        id: r.get(0)?,
        group_id: GroupId(r.get(1)?),
        order_id: parse_uuid_col(&order, 2)?,
        product_id: ProductId(r.get(3)?),
        activated_at: parse_ts(&activated)?,
        current_period_end: parse_ts(&period_end)?,
        cancelled_at: cancelled.map(|s| parse_ts(&s)).transpose()?,
    })
}

pub fn subscription(conn: &Connection, id: i64) -> Result<Option<SubscriptionRecord>> {
    let sql = format!("SELECT {} FROM subscriptions WHERE id=?1", SUBSCRIPTION_COLUMNS);
    Ok(conn
        .query_row(&sql, params![id], subscription_from_row)
        .optional()?)
}

pub fn subscription_by_order(
    conn: &Connection,
    order_id: Uuid,
) -> Result<Option<SubscriptionRecord>> {
    let sql = format!(
        "SELECT {} FROM subscriptions WHERE order_id=?1",
        SUBSCRIPTION_COLUMNS
    );
    Ok(conn
        .query_row(&sql, params![order_id.to_string()], subscription_from_row)
        .optional()?)
}

/// Every subscription the group ever had, newest first.
pub fn group_subscriptions(
    conn: &Connection,
    group_id: GroupId,
) -> Result<Vec<SubscriptionRecord>> {
    let sql = format!(
        "SELECT {} FROM subscriptions WHERE group_id=?1 ORDER BY id DESC",
        SUBSCRIPTION_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![group_id.0], subscription_from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// Non-cancelled subscriptions for the given groups, newest first within a group.
pub fn active_subscriptions(
    conn: &Connection,
    group_ids: &[GroupId],
) -> Result<Vec<SubscriptionRecord>> {
    let mut out = Vec::new();
    for slice in group_ids.chunks(MAX_IDS_PER_QUERY) {
        let sql = format!(
            "SELECT {} FROM subscriptions
             WHERE cancelled_at IS NULL AND group_id IN ({})
             ORDER BY group_id, id DESC",
            SUBSCRIPTION_COLUMNS,
            placeholders(slice.len())
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt.query_map(
            params_from_iter(slice.iter().map(|g| g.0)),
            subscription_from_row,
        )?;
        for row in rows {
            out.push(row?);
        }
    }
    Ok(out)
}

pub fn insert_subscription(
    conn: &Connection,
    group_id: GroupId,
    order_id: Uuid,
    product_id: &ProductId,
    activated_at: DateTime<Utc>,
    current_period_end: DateTime<Utc>,
) -> Result<SubscriptionRecord> {
    conn.execute(
        "INSERT INTO subscriptions(group_id, order_id, product_id, activated_at, current_period_end)
         VALUES (?1,?2,?3,?4,?5)",
        params![
            group_id.0,
            order_id.to_string(),
            product_id.0,
            fmt_ts(activated_at),
            fmt_ts(current_period_end)
        ],
    )?;
    Ok(SubscriptionRecord {
        id: conn.last_insert_rowid(),
        group_id,
        order_id,
        product_id: product_id.clone(),
        activated_at,
        current_period_end,
        cancelled_at: None,
    })
}

pub fn extend_subscription(
    conn: &Connection,
    id: i64,
    current_period_end: DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        "UPDATE subscriptions SET current_period_end=?2 WHERE id=?1",
        params![id, fmt_ts(current_period_end)],
    )?;
    Ok(())
}

/// Sets `cancelled_at` on every active subscription of the group; returns how many changed.
pub fn cancel_group_subscriptions(
    conn: &Connection,
    group_id: GroupId,
    now: DateTime<Utc>,
) -> Result<usize> {
    Ok(conn.execute(
        "UPDATE subscriptions SET cancelled_at=?2 WHERE group_id=?1 AND cancelled_at IS NULL",
        params![group_id.0, fmt_ts(now)],
    )?)
}

/// One page of active subscriptions whose period has elapsed at `now`.
pub fn renewable_subscriptions(
    conn: &Connection,
    now: DateTime<Utc>,
    after: Option<i64>,
    limit: usize,
) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare_cached(
        "SELECT s.id FROM subscriptions s
         JOIN groups g ON g.id = s.group_id
         WHERE s.cancelled_at IS NULL
           AND s.current_period_end <= ?1
           AND g.is_blocked = 0 AND g.deleted_at IS NULL
           AND s.id > ?2
         ORDER BY s.id
         LIMIT ?3",
    )?;
    let rows = stmt.query_map(
        params![fmt_ts(now), after.unwrap_or(i64::MIN), limit as i64],
        |r| r.get::<_, i64>(0),
    )?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// Groups whose subscriptions are all cancelled, whose last period has ended and that still
/// hold subscription tokens from it.
pub fn expired_subscription_groups(
    conn: &Connection,
    now: DateTime<Utc>,
    after: Option<GroupId>,
    limit: usize,
) -> Result<Vec<GroupId>> {
    let mut stmt = conn.prepare_cached(
        "SELECT s.group_id FROM subscriptions s
         WHERE s.group_id > ?2
         GROUP BY s.group_id
         HAVING SUM(s.cancelled_at IS NULL) = 0
            AND MAX(s.current_period_end) <= ?1
            AND COALESCE((
                SELECT SUM(t.amount) FROM ledger_transactions t
                WHERE t.group_id = s.group_id
                  AND t.transaction_type IN ('MonthlySubscriptionRefill', 'MonthlySubscriptionBurn')
                  AND t.seq >= (
                      SELECT MAX(r.seq) FROM ledger_transactions r
                      WHERE r.group_id = s.group_id
                        AND r.transaction_type = 'MonthlySubscriptionRefill')
            ), 0) > 0
         ORDER BY s.group_id
         LIMIT ?3",
    )?;
    let rows = stmt.query_map(
        params![fmt_ts(now), after.map(|g| g.0).unwrap_or(i64::MIN), limit as i64],
        |r| r.get::<_, i64>(0).map(GroupId),
    )?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::generator;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 2, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn ledger_rows_cannot_be_updated_or_deleted() {
        let conn = db::open_in_memory().unwrap();
        insert_group(&conn, GroupId(1), now()).unwrap();
        let t = generator::build_at(
            GroupId(1),
            TransactionType::PurchaseGrant,
            10,
            TransactionGroup::new(),
            now(),
        )
        .unwrap();
        append(&conn, &[t]).unwrap();

        assert!(
            conn.execute("UPDATE ledger_transactions SET amount=1000", [])
                .is_err()
        );
        assert!(conn.execute("DELETE FROM ledger_transactions", []).is_err());
        assert_eq!(count_transactions(&conn).unwrap(), 1);
    }

    #[test]
    fn stored_rows_read_back_with_their_types() {
        let conn = db::open_in_memory().unwrap();
        insert_group(&conn, GroupId(4), now()).unwrap();
        let tg = TransactionGroup::new();
        let rows = vec![
            generator::build_at(GroupId(4), TransactionType::DailyBurn, 5, tg, now()).unwrap(),
            generator::build_at(
                GroupId(4),
                TransactionType::AdminGrant(crate::models::Sign::Debit),
                3,
                tg,
                now(),
            )
            .unwrap(),
        ];
        append(&conn, &rows).unwrap();
        let back = group_transactions(&conn, GroupId(4)).unwrap();
        assert_eq!(back, rows);
        assert_eq!(correlated_transactions(&conn, tg).unwrap().len(), 2);
    }

    #[test]
    fn duplicate_group_is_a_conflict() {
        let conn = db::open_in_memory().unwrap();
        insert_group(&conn, GroupId(1), now()).unwrap();
        let err = insert_group(&conn, GroupId(1), now()).unwrap_err();
        assert!(matches!(err, LedgerError::Conflict(_)));
    }

    #[test]
    fn eligible_groups_page_by_id_and_skip_blocked() {
        let conn = db::open_in_memory().unwrap();
        for id in 1..=5 {
            insert_group(&conn, GroupId(id), now()).unwrap();
        }
        set_group_blocked(&conn, GroupId(2), true).unwrap();
        mark_group_deleted(&conn, GroupId(4), now()).unwrap();

        let first = eligible_daily_groups(&conn, None, None, 2).unwrap();
        assert_eq!(first, vec![GroupId(1), GroupId(3)]);
        let second = eligible_daily_groups(&conn, None, Some(GroupId(3)), 2).unwrap();
        assert_eq!(second, vec![GroupId(5)]);
    }
}
