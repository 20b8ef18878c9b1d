// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::{Arc, Mutex};
use std::thread;
use tempfile::tempdir;
use tokenledger::daily::{self, RefillOutcome, SkipReason};
use tokenledger::models::{BatchSummary, GroupId, ProductId, TransactionType};
use tokenledger::{EconomyConfig, TokenEconomy, db, ledger};
use uuid::Uuid;

type Clock = Arc<Mutex<DateTime<Utc>>>;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap()
}

fn config() -> EconomyConfig {
    let mut cfg = EconomyConfig::with_daily_allotment(20).with_product("pro", 50, 300);
    cfg.balance_cache_ttl_secs = 0;
    cfg
}

fn economy(cfg: EconomyConfig, groups: &[i64]) -> (TokenEconomy, Clock) {
    let clock = Arc::new(Mutex::new(t0()));
    let c = clock.clone();
    let mut eco = TokenEconomy::new(db::open_in_memory().unwrap(), cfg)
        .with_clock(move || *c.lock().unwrap());
    for g in groups {
        eco.register_group(GroupId(*g)).unwrap();
    }
    (eco, clock)
}

fn advance(clock: &Clock, by: Duration) {
    let mut now = clock.lock().unwrap();
    *now += by;
}

fn count_of(eco: &TokenEconomy, group: i64, ty: TransactionType) -> usize {
    eco.transactions(GroupId(group))
        .unwrap()
        .iter()
        .filter(|t| t.transaction_type == ty)
        .count()
}

#[test]
fn second_run_within_cutoff_period_writes_nothing() {
    let (mut eco, clock) = economy(config(), &[1, 2, 3]);

    let first = eco.batch_refill_daily_tokens(false).unwrap();
    assert_eq!(first.written, 3);
    assert!(first.is_clean());
    let rows_after_first = ledger::count_transactions(eco.connection()).unwrap();
    assert_eq!(rows_after_first, 3);

    advance(&clock, Duration::hours(10));
    let second = eco.batch_refill_daily_tokens(false).unwrap();
    assert_eq!(second.written, 0);
    assert_eq!(
        ledger::count_transactions(eco.connection()).unwrap(),
        rows_after_first
    );
}

#[test]
fn next_day_burns_leftover_and_regrants() {
    let (mut eco, clock) = economy(config(), &[1]);
    eco.batch_refill_daily_tokens(false).unwrap();
    eco.consume_tokens(GroupId(1), 5).unwrap();
    assert_eq!(eco.get_balance(GroupId(1)).unwrap().daily_tokens, 15);

    advance(&clock, Duration::hours(17)); // 02:00 next day, past the 01:00 cutoff
    let summary = eco.batch_refill_daily_tokens(false).unwrap();
    assert_eq!(summary.written, 1);

    let rows = eco.transactions(GroupId(1)).unwrap();
    let last_two = &rows[rows.len() - 2..];
    assert_eq!(last_two[0].transaction_type, TransactionType::DailyBurn);
    assert_eq!(last_two[0].amount, -15);
    assert_eq!(last_two[1].transaction_type, TransactionType::DailyRefill);
    assert_eq!(last_two[1].amount, 20);
    assert_eq!(last_two[0].transaction_group, last_two[1].transaction_group);
    assert_eq!(eco.get_balance(GroupId(1)).unwrap().daily_tokens, 20);
}

#[test]
fn cutoff_boundary_decides_eligibility() {
    let (mut eco, clock) = economy(config(), &[1]);
    // 00:30 on the 11th still belongs to the period that started at 01:00 on the 10th.
    eco.batch_refill_daily_tokens(false).unwrap();
    advance(&clock, Duration::minutes(15 * 60 + 30));
    assert_eq!(eco.batch_refill_daily_tokens(false).unwrap().written, 0);
    advance(&clock, Duration::minutes(30));
    assert_eq!(eco.batch_refill_daily_tokens(false).unwrap().written, 1);
}

#[test]
fn zero_eligible_groups_is_a_clean_empty_run() {
    let (mut eco, _) = economy(config(), &[]);
    let summary = eco.batch_refill_daily_tokens(false).unwrap();
    assert_eq!(summary, BatchSummary::default());
    assert_eq!(ledger::count_transactions(eco.connection()).unwrap(), 0);

    let (mut eco, _) = economy(config(), &[7, 8]);
    eco.block_group(GroupId(7), true).unwrap();
    eco.delete_group(GroupId(8)).unwrap();
    let summary = eco.batch_refill_daily_tokens(true).unwrap();
    assert_eq!(summary.processed, 0);
    assert_eq!(ledger::count_transactions(eco.connection()).unwrap(), 0);
}

#[test]
fn blocked_and_deleted_groups_are_skipped() {
    let (mut eco, _) = economy(config(), &[1, 2, 3]);
    eco.block_group(GroupId(1), true).unwrap();
    eco.delete_group(GroupId(2)).unwrap();

    let summary = eco.batch_refill_daily_tokens(false).unwrap();
    assert_eq!(summary.written, 1);
    assert_eq!(count_of(&eco, 1, TransactionType::DailyRefill), 0);
    assert_eq!(count_of(&eco, 2, TransactionType::DailyRefill), 0);
    assert_eq!(count_of(&eco, 3, TransactionType::DailyRefill), 1);

    assert_eq!(
        eco.refill_daily_tokens(GroupId(1)).unwrap(),
        RefillOutcome::Skipped(SkipReason::Ineligible)
    );
}

#[test]
fn on_demand_refill_leaves_daily_at_allotment() {
    let (mut eco, _) = economy(config(), &[1, 2]);

    // never refilled
    let outcome = eco.refill_daily_tokens(GroupId(1)).unwrap();
    assert!(matches!(outcome, RefillOutcome::Refilled { granted: 20, burned: 0, .. }));
    assert_eq!(eco.get_balance(GroupId(1)).unwrap().daily_tokens, 20);

    // partially spent, same day
    eco.consume_tokens(GroupId(1), 7).unwrap();
    let outcome = eco.refill_daily_tokens(GroupId(1)).unwrap();
    assert!(matches!(outcome, RefillOutcome::Refilled { granted: 20, burned: 13, .. }));
    assert_eq!(eco.get_balance(GroupId(1)).unwrap().daily_tokens, 20);

    // already full
    assert_eq!(
        eco.refill_daily_tokens(GroupId(1)).unwrap(),
        RefillOutcome::Skipped(SkipReason::AlreadyAtAllotment)
    );
    assert_eq!(eco.get_balance(GroupId(1)).unwrap().daily_tokens, 20);
}

#[test]
fn unknown_group_refill_is_a_validation_error() {
    let (mut eco, _) = economy(config(), &[]);
    let err = eco.refill_daily_tokens(GroupId(404)).unwrap_err();
    assert_eq!(err.kind(), tokenledger::ErrorKind::Validation);
}

#[test]
fn force_refill_ignores_the_cutoff() {
    let (mut eco, _) = economy(config(), &[1, 2]);
    eco.batch_refill_daily_tokens(false).unwrap();

    let forced = eco.batch_refill_daily_tokens(true).unwrap();
    assert_eq!(forced.written, 2);
    for g in [1, 2] {
        assert_eq!(count_of(&eco, g, TransactionType::DailyRefill), 2);
        assert_eq!(count_of(&eco, g, TransactionType::DailyBurn), 1);
        assert_eq!(eco.get_balance(GroupId(g)).unwrap().daily_tokens, 20);
    }
}

#[test]
fn subscribers_get_their_product_allotment() {
    let (mut eco, clock) = economy(config(), &[1, 2]);
    let order = Uuid::new_v4();
    eco.record_purchase_order(order, GroupId(1), &ProductId("pro".into()))
        .unwrap();
    eco.activate_subscription(order, &ProductId("pro".into()))
        .unwrap();

    advance(&clock, Duration::days(1));
    eco.batch_refill_daily_tokens(false).unwrap();
    let b1 = eco.get_balance(GroupId(1)).unwrap();
    let b2 = eco.get_balance(GroupId(2)).unwrap();
    assert_eq!((b1.daily_tokens, b1.max_daily_tokens), (50, 50));
    assert_eq!((b2.daily_tokens, b2.max_daily_tokens), (20, 20));
}

#[test]
fn concurrent_batches_refill_each_group_once() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ledger.sqlite");
    let cfg = config();
    {
        let conn = db::open_at(&path, cfg.busy_timeout()).unwrap();
        for g in 1..=40 {
            ledger::insert_group(&conn, GroupId(g), t0()).unwrap();
        }
    }

    let mut cfg = cfg;
    cfg.batch_size = 7;
    let handles: Vec<_> = (0..2)
        .map(|_| {
            let path = path.clone();
            let cfg = cfg.clone();
            thread::spawn(move || {
                let mut conn = db::open_at(&path, cfg.busy_timeout()).unwrap();
                daily::batch_refill_daily_tokens(&mut conn, &cfg, false, t0()).unwrap()
            })
        })
        .collect();
    let written: usize = handles
        .into_iter()
        .map(|h| h.join().unwrap().written)
        .sum();
    assert_eq!(written, 40);

    let conn = db::open_at(&path, cfg.busy_timeout()).unwrap();
    let refills: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM ledger_transactions WHERE transaction_type='DailyRefill'",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(refills, 40);
}

#[test]
fn unreadable_row_fails_only_its_group() {
    let (mut eco, _) = economy(config(), &[1, 2, 3]);
    eco.connection()
        .execute(
            "INSERT INTO ledger_transactions(id, group_id, transaction_group, transaction_type,
                 amount, amount_before_discount, created_time)
             VALUES (?1, 2, ?2, 'DailyRefill', 20, 20, '2025-03-10 08:00:00')",
            rusqlite::params![Uuid::new_v4().to_string(), Uuid::new_v4().to_string()],
        )
        .unwrap();

    let summary = eco.batch_refill_daily_tokens(true).unwrap();
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.written, 2);
    assert!(!summary.is_clean());
    assert_eq!(count_of(&eco, 1, TransactionType::DailyRefill), 1);
    assert_eq!(count_of(&eco, 3, TransactionType::DailyRefill), 1);
}
