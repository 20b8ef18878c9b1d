// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Construction of ledger rows.
//!
//! Every row the engine writes is built here. Callers always pass an unsigned amount and the
//! transaction type decides the stored sign, so a burn can never be recorded as a credit.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{LedgerError, Result};
use crate::models::{GroupId, Transaction, TransactionGroup, TransactionType};

pub fn build(
    group_id: GroupId,
    transaction_type: TransactionType,
    amount: i64,
    transaction_group: TransactionGroup,
) -> Result<Transaction> {
    build_at(group_id, transaction_type, amount, transaction_group, Utc::now())
}

pub fn build_at(
    group_id: GroupId,
    transaction_type: TransactionType,
    amount: i64,
    transaction_group: TransactionGroup,
    created_time: DateTime<Utc>,
) -> Result<Transaction> {
    let signed = signed_amount(transaction_type, amount)?;
    Ok(Transaction {
        id: Uuid::new_v4(),
        group_id,
        transaction_group,
        transaction_type,
        amount: signed,
        amount_before_discount: signed,
        created_time,
    })
}

/// Purchase grant carrying the list price next to the charged amount, for reporting.
pub fn purchase_at(
    group_id: GroupId,
    amount: i64,
    amount_before_discount: i64,
    transaction_group: TransactionGroup,
    created_time: DateTime<Utc>,
) -> Result<Transaction> {
    let mut tx = build_at(
        group_id,
        TransactionType::PurchaseGrant,
        amount,
        transaction_group,
        created_time,
    )?;
    tx.amount_before_discount = signed_amount(TransactionType::PurchaseGrant, amount_before_discount)?;
    Ok(tx)
}

fn signed_amount(transaction_type: TransactionType, amount: i64) -> Result<i64> {
    if amount < 0 {
        return Err(LedgerError::InvalidAmount {
            transaction_type,
            amount,
        });
    }
    Ok(transaction_type.sign().apply(amount))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Sign;

    #[test]
    fn burns_and_consumption_are_stored_negative() {
        let tg = TransactionGroup::new();
        for t in [
            TransactionType::DailyBurn,
            TransactionType::MonthlySubscriptionBurn,
            TransactionType::UsageConsumption,
            TransactionType::AdminGrant(Sign::Debit),
        ] {
            let tx = build(GroupId(1), t, 25, tg).unwrap();
            assert_eq!(tx.amount, -25, "{t}");
            assert_eq!(tx.amount_before_discount, -25);
        }
    }

    #[test]
    fn grants_are_stored_positive() {
        let tg = TransactionGroup::new();
        for t in [
            TransactionType::InitialGrant,
            TransactionType::DailyRefill,
            TransactionType::MonthlySubscriptionRefill,
            TransactionType::PurchaseGrant,
            TransactionType::AdminGrant(Sign::Credit),
        ] {
            let tx = build(GroupId(1), t, 25, tg).unwrap();
            assert_eq!(tx.amount, 25, "{t}");
        }
    }

    #[test]
    fn negative_input_is_rejected_instead_of_double_negated() {
        let err = build(
            GroupId(1),
            TransactionType::DailyBurn,
            -20,
            TransactionGroup::new(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InvalidAmount {
                transaction_type: TransactionType::DailyBurn,
                amount: -20
            }
        ));
    }

    #[test]
    fn zero_is_a_valid_amount() {
        let tx = build(
            GroupId(3),
            TransactionType::DailyRefill,
            0,
            TransactionGroup::new(),
        )
        .unwrap();
        assert_eq!(tx.amount, 0);
    }

    #[test]
    fn purchase_keeps_list_price() {
        let tg = TransactionGroup::new();
        let tx = purchase_at(GroupId(2), 80, 100, tg, Utc::now()).unwrap();
        assert_eq!(tx.amount, 80);
        assert_eq!(tx.amount_before_discount, 100);
        assert_eq!(tx.transaction_group, tg);
        assert!(purchase_at(GroupId(2), 80, -1, tg, Utc::now()).is_err());
    }
}
