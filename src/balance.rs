// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Balance derivation from the ledger.
//!
//! Balances are never stored. Each bucket is a sum over the group's rows up to `now`:
//!
//! * permanent: every row that is not a daily or subscription refill/burn;
//! * daily: `DailyRefill`/`DailyBurn` rows from the latest `DailyRefill` onwards;
//! * subscription: the same, scoped to the monthly subscription types.
//!
//! Requested groups are resolved with one grouped query per slice of ids.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params_from_iter, types::Value};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

use crate::error::Result;
use crate::ledger::{MAX_IDS_PER_QUERY, placeholders};
use crate::models::GroupId;
use crate::utils::{fmt_ts, parse_ts};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenBuckets {
    pub daily: i64,
    pub subscription: i64,
    pub permanent: i64,
    pub last_daily_refill_at: Option<DateTime<Utc>>,
}

impl TokenBuckets {
    pub fn total(&self) -> i64 {
        self.daily + self.subscription + self.permanent
    }
}

const AGGREGATE_SQL: &str = r#"
WITH scoped AS (
    SELECT group_id, seq, transaction_type, amount, created_time,
           MAX(CASE WHEN transaction_type = 'DailyRefill' THEN seq END)
               OVER (PARTITION BY group_id) AS daily_start,
           MAX(CASE WHEN transaction_type = 'MonthlySubscriptionRefill' THEN seq END)
               OVER (PARTITION BY group_id) AS subscription_start
    FROM ledger_transactions
    WHERE created_time <= ?1 AND group_id IN ({ids})
)
SELECT group_id,
       COALESCE(SUM(CASE WHEN transaction_type IN ('DailyRefill', 'DailyBurn')
                          AND seq >= daily_start THEN amount END), 0),
       COALESCE(SUM(CASE WHEN transaction_type IN ('MonthlySubscriptionRefill', 'MonthlySubscriptionBurn')
                          AND seq >= subscription_start THEN amount END), 0),
       COALESCE(SUM(CASE WHEN transaction_type NOT IN ('DailyRefill', 'DailyBurn',
                              'MonthlySubscriptionRefill', 'MonthlySubscriptionBurn')
                         THEN amount END), 0),
       MAX(CASE WHEN transaction_type = 'DailyRefill' THEN created_time END)
FROM scoped
GROUP BY group_id
"#;

/// Buckets for every requested group; groups without rows come back as zero.
pub fn aggregate_balances(
    conn: &Connection,
    group_ids: &BTreeSet<GroupId>,
    now: DateTime<Utc>,
) -> Result<HashMap<GroupId, TokenBuckets>> {
    let mut out: HashMap<GroupId, TokenBuckets> = group_ids
        .iter()
        .map(|g| (*g, TokenBuckets::default()))
        .collect();
    if group_ids.is_empty() {
        return Ok(out);
    }

    let ids: Vec<GroupId> = group_ids.iter().copied().collect();
    for slice in ids.chunks(MAX_IDS_PER_QUERY) {
        let sql = AGGREGATE_SQL.replace("{ids}", &placeholders(slice.len()));
        let mut args: Vec<Value> = Vec::with_capacity(slice.len() + 1);
        args.push(Value::Text(fmt_ts(now)));
        args.extend(slice.iter().map(|g| Value::Integer(g.0)));

        let mut stmt = conn.prepare_cached(&sql)?;
        let mut rows = stmt.query(params_from_iter(args))?;
        while let Some(r) = rows.next()? {
            let group_id = GroupId(r.get(0)?);
            let last_refill: Option<String> = r.get(4)?;
            out.insert(
                group_id,
                TokenBuckets {
                    daily: r.get(1)?,
                    subscription: r.get(2)?,
                    permanent: r.get(3)?,
                    last_daily_refill_at: last_refill.map(|s| parse_ts(&s)).transpose()?,
                },
            );
        }
    }
    Ok(out)
}

pub fn group_buckets(
    conn: &Connection,
    group_id: GroupId,
    now: DateTime<Utc>,
) -> Result<TokenBuckets> {
    let ids = BTreeSet::from([group_id]);
    Ok(aggregate_balances(conn, &ids, now)?
        .remove(&group_id)
        .unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Sign, TransactionGroup, TransactionType};
    use crate::{db, generator, ledger};
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap()
    }

    fn write(conn: &Connection, g: i64, ty: TransactionType, amount: i64, at: DateTime<Utc>) {
        let t = generator::build_at(GroupId(g), ty, amount, TransactionGroup::new(), at).unwrap();
        ledger::append(conn, &[t]).unwrap();
    }

    fn setup(groups: &[i64]) -> Connection {
        let conn = db::open_in_memory().unwrap();
        for g in groups {
            ledger::insert_group(&conn, GroupId(*g), t0()).unwrap();
        }
        conn
    }

    #[test]
    fn daily_bucket_restarts_at_latest_refill() {
        let conn = setup(&[1]);
        write(&conn, 1, TransactionType::InitialGrant, 100, t0());
        write(&conn, 1, TransactionType::DailyRefill, 20, t0() + Duration::minutes(1));
        write(&conn, 1, TransactionType::DailyBurn, 20, t0() + Duration::minutes(2));
        write(&conn, 1, TransactionType::DailyRefill, 20, t0() + Duration::minutes(3));

        let b = group_buckets(&conn, GroupId(1), t0() + Duration::hours(1)).unwrap();
        assert_eq!(b.permanent, 100);
        assert_eq!(b.daily, 20);
        assert_eq!(b.subscription, 0);
        assert_eq!(b.last_daily_refill_at, Some(t0() + Duration::minutes(3)));
    }

    #[test]
    fn burns_after_refill_reduce_daily_bucket() {
        let conn = setup(&[1]);
        write(&conn, 1, TransactionType::DailyRefill, 30, t0());
        write(&conn, 1, TransactionType::DailyBurn, 12, t0() + Duration::minutes(1));
        let b = group_buckets(&conn, GroupId(1), t0() + Duration::hours(1)).unwrap();
        assert_eq!(b.daily, 18);
    }

    #[test]
    fn subscription_bucket_is_scoped_like_daily() {
        let conn = setup(&[1]);
        write(&conn, 1, TransactionType::MonthlySubscriptionRefill, 500, t0());
        write(&conn, 1, TransactionType::MonthlySubscriptionBurn, 100, t0() + Duration::minutes(1));
        write(&conn, 1, TransactionType::MonthlySubscriptionBurn, 400, t0() + Duration::minutes(2));
        write(&conn, 1, TransactionType::MonthlySubscriptionRefill, 300, t0() + Duration::minutes(3));
        write(&conn, 1, TransactionType::MonthlySubscriptionBurn, 50, t0() + Duration::minutes(4));
        let b = group_buckets(&conn, GroupId(1), t0() + Duration::hours(1)).unwrap();
        assert_eq!(b.subscription, 250);
        assert_eq!(b.permanent, 0);
    }

    #[test]
    fn permanent_sums_everything_but_refill_and_burn_types() {
        let conn = setup(&[1]);
        write(&conn, 1, TransactionType::PurchaseGrant, 500, t0());
        write(&conn, 1, TransactionType::AdminGrant(Sign::Credit), 40, t0());
        write(&conn, 1, TransactionType::AdminGrant(Sign::Debit), 15, t0());
        write(&conn, 1, TransactionType::UsageConsumption, 25, t0());
        write(&conn, 1, TransactionType::DailyRefill, 30, t0());
        write(&conn, 1, TransactionType::MonthlySubscriptionRefill, 300, t0());
        let b = group_buckets(&conn, GroupId(1), t0()).unwrap();
        assert_eq!(b.permanent, 500);
        assert_eq!(b.total(), 830);
    }

    #[test]
    fn rows_after_now_are_ignored() {
        let conn = setup(&[1]);
        write(&conn, 1, TransactionType::PurchaseGrant, 10, t0());
        write(&conn, 1, TransactionType::PurchaseGrant, 10, t0() + Duration::days(1));
        let b = group_buckets(&conn, GroupId(1), t0()).unwrap();
        assert_eq!(b.permanent, 10);
    }

    #[test]
    fn batch_covers_groups_without_rows() {
        let conn = setup(&[1, 2, 3]);
        write(&conn, 2, TransactionType::PurchaseGrant, 7, t0());
        let ids = BTreeSet::from([GroupId(1), GroupId(2), GroupId(3), GroupId(99)]);
        let all = aggregate_balances(&conn, &ids, t0()).unwrap();
        assert_eq!(all.len(), 4);
        assert_eq!(all[&GroupId(1)], TokenBuckets::default());
        assert_eq!(all[&GroupId(2)].permanent, 7);
        assert_eq!(all[&GroupId(99)].total(), 0);
    }
}
