// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Group lifecycle and the purchase-order hand-off from receipt validation.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, TransactionBehavior};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::EconomyConfig;
use crate::error::{LedgerError, Result};
use crate::generator::build_at;
use crate::ledger;
use crate::models::{GroupId, ProductId, TransactionGroup, TransactionType};

/// Register a group. With `initial_grant` configured, the welcome grant and the first daily
/// refill are written under one correlation id.
pub fn register_group(
    conn: &mut Connection,
    cfg: &EconomyConfig,
    group_id: GroupId,
    now: DateTime<Utc>,
) -> Result<()> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    ledger::insert_group(&tx, group_id, now)?;

    if let Some(grant) = cfg.initial_grant {
        let transaction_group = TransactionGroup::new();
        let rows = [
            build_at(
                group_id,
                TransactionType::InitialGrant,
                grant,
                transaction_group,
                now,
            )?,
            build_at(
                group_id,
                TransactionType::DailyRefill,
                cfg.daily_allotment,
                transaction_group,
                now,
            )?,
        ];
        ledger::append(&tx, &rows)?;
    }
    tx.commit()?;
    info!(group_id = %group_id, initial_grant = ?cfg.initial_grant, "group registered");
    Ok(())
}

pub fn block_group(conn: &Connection, group_id: GroupId, blocked: bool) -> Result<()> {
    ledger::set_group_blocked(conn, group_id, blocked)?;
    info!(group_id = %group_id, blocked, "group block flag changed");
    Ok(())
}

pub fn delete_group(conn: &Connection, group_id: GroupId, now: DateTime<Utc>) -> Result<()> {
    ledger::mark_group_deleted(conn, group_id, now)?;
    info!(group_id = %group_id, "group deleted");
    Ok(())
}

/// Record a receipt-validated order. Re-recording the same order for the same group and
/// product is a no-op.
pub fn record_purchase_order(
    conn: &Connection,
    order_id: Uuid,
    group_id: GroupId,
    product_id: &ProductId,
    now: DateTime<Utc>,
) -> Result<()> {
    match ledger::insert_purchase_order(conn, order_id, group_id, product_id, now) {
        Ok(()) => {
            info!(order_id = %order_id, group_id = %group_id, product_id = %product_id, "purchase order recorded");
            Ok(())
        }
        Err(LedgerError::Conflict(msg)) => {
            let existing = ledger::purchase_order(conn, order_id)?
                .ok_or(LedgerError::UnknownOrder(order_id))?;
            if existing.group_id == group_id && &existing.product_id == product_id {
                debug!(order_id = %order_id, "purchase order already recorded");
                Ok(())
            } else {
                Err(LedgerError::Conflict(msg))
            }
        }
        Err(e) => Err(e),
    }
}

pub fn mark_order_refunded(conn: &Connection, order_id: Uuid) -> Result<()> {
    ledger::mark_order_refunded(conn, order_id)?;
    info!(order_id = %order_id, "purchase order refunded");
    Ok(())
}
