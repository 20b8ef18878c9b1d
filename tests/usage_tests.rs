// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use tokenledger::models::{GroupId, ProductId, Sign, TransactionType};
use tokenledger::{EconomyConfig, ErrorKind, LedgerError, TokenEconomy, db, ledger};
use uuid::Uuid;

fn setup() -> TokenEconomy {
    let mut cfg = EconomyConfig::with_daily_allotment(20).with_product("pro", 50, 300);
    cfg.initial_grant = Some(100);
    cfg.balance_cache_ttl_secs = 0;
    let mut eco = TokenEconomy::new(db::open_in_memory().unwrap(), cfg);
    eco.register_group(GroupId(1)).unwrap();
    eco
}

#[test]
fn consumption_drains_daily_then_subscription_then_permanent() {
    let mut eco = setup();
    let order = Uuid::new_v4();
    let pro = ProductId("pro".into());
    eco.record_purchase_order(order, GroupId(1), &pro).unwrap();
    eco.activate_subscription(order, &pro).unwrap();

    let rows = eco.consume_tokens(GroupId(1), 350).unwrap();
    let parts: Vec<(TransactionType, i64)> =
        rows.iter().map(|t| (t.transaction_type, t.amount)).collect();
    assert_eq!(
        parts,
        vec![
            (TransactionType::DailyBurn, -20),
            (TransactionType::MonthlySubscriptionBurn, -300),
            (TransactionType::UsageConsumption, -30),
        ]
    );
    assert!(rows.windows(2).all(|w| w[0].transaction_group == w[1].transaction_group));

    let b = eco.get_balance(GroupId(1)).unwrap();
    assert_eq!((b.daily_tokens, b.subscription_tokens, b.permanent_tokens), (0, 0, 70));
}

#[test]
fn insufficient_balance_writes_nothing() {
    let mut eco = setup();
    let before = ledger::count_transactions(eco.connection()).unwrap();
    let err = eco.consume_tokens(GroupId(1), 121).unwrap_err();
    assert!(matches!(
        err,
        LedgerError::InsufficientBalance {
            available: 120,
            requested: 121,
            ..
        }
    ));
    assert_eq!(ledger::count_transactions(eco.connection()).unwrap(), before);
}

#[test]
fn non_positive_consumption_is_rejected() {
    let mut eco = setup();
    for amount in [0, -5] {
        let err = eco.consume_tokens(GroupId(1), amount).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount { .. }));
    }
}

#[test]
fn admin_grants_carry_their_sign() {
    let eco = setup();
    eco.admin_grant(GroupId(1), -10).unwrap();
    eco.admin_grant(GroupId(1), 4).unwrap();

    let admin: Vec<_> = eco
        .transactions(GroupId(1))
        .unwrap()
        .into_iter()
        .filter(|t| matches!(t.transaction_type, TransactionType::AdminGrant(_)))
        .collect();
    assert_eq!(admin[0].transaction_type, TransactionType::AdminGrant(Sign::Debit));
    assert_eq!(admin[0].amount, -10);
    assert_eq!(admin[1].transaction_type, TransactionType::AdminGrant(Sign::Credit));
    assert_eq!(eco.get_balance(GroupId(1)).unwrap().permanent_tokens, 94);
}

#[test]
fn purchase_grant_keeps_the_list_price() {
    let eco = setup();
    eco.grant_purchase(GroupId(1), 400, 500).unwrap();
    let rows = eco.transactions(GroupId(1)).unwrap();
    let purchase = rows.last().unwrap();
    assert_eq!(purchase.transaction_type, TransactionType::PurchaseGrant);
    assert_eq!(purchase.amount, 400);
    assert_eq!(purchase.amount_before_discount, 500);
}

#[test]
fn operations_on_unknown_groups_fail_validation() {
    let mut eco = setup();
    let ghost = GroupId(42);
    assert_eq!(eco.grant_purchase(ghost, 1, 1).unwrap_err().kind(), ErrorKind::Validation);
    assert_eq!(eco.admin_grant(ghost, 1).unwrap_err().kind(), ErrorKind::Validation);
    assert_eq!(eco.consume_tokens(ghost, 1).unwrap_err().kind(), ErrorKind::Validation);
    assert_eq!(eco.cancel_all_subscriptions(ghost).unwrap_err().kind(), ErrorKind::Validation);
    assert!(
        eco.record_purchase_order(Uuid::new_v4(), ghost, &ProductId("pro".into()))
            .is_err()
    );
}

#[test]
fn admin_debit_of_i64_min_is_rejected() {
    let eco = setup();
    let before = ledger::count_transactions(eco.connection()).unwrap();
    let err = eco.admin_grant(GroupId(1), i64::MIN).unwrap_err();
    assert!(matches!(
        err,
        LedgerError::InvalidAmount {
            transaction_type: TransactionType::AdminGrant(Sign::Debit),
            amount: i64::MIN,
        }
    ));
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(ledger::count_transactions(eco.connection()).unwrap(), before);
}
