// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Daily token refill.
//!
//! A refill burns whatever is left in the daily bucket and grants the group's allotment, both
//! rows sharing one correlation id. Eligibility is re-read inside the write transaction, so
//! two runs racing on the same group cannot both refill it.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, TransactionBehavior};
use tracing::{debug, info};

use crate::balance::group_buckets;
use crate::batch::{ItemOutcome, run_in_chunks};
use crate::config::EconomyConfig;
use crate::error::Result;
use crate::generator::build_at;
use crate::ledger;
use crate::models::{BatchSummary, GroupId, TransactionGroup, TransactionType};
use crate::query::{active_subscription, daily_allotment};
use crate::utils::current_cutoff;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefillMode {
    /// Scheduled run: only groups without a refill since the current cutoff.
    Scheduled,
    /// Remediation run: ignores the cutoff entirely.
    Forced,
    /// Single-group correction: ignores the cutoff, no-op when already at the allotment.
    OnDemand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Ineligible,
    AlreadyRefilled,
    AlreadyAtAllotment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefillOutcome {
    Refilled {
        burned: i64,
        granted: i64,
        transaction_group: TransactionGroup,
    },
    Skipped(SkipReason),
}

/// Refill one group inside the caller's transaction.
pub fn refill_group(
    conn: &Connection,
    cfg: &EconomyConfig,
    group_id: GroupId,
    mode: RefillMode,
    now: DateTime<Utc>,
) -> Result<RefillOutcome> {
    let status = ledger::require_group(conn, group_id)?;
    if !status.is_eligible() {
        return Ok(RefillOutcome::Skipped(SkipReason::Ineligible));
    }

    if mode == RefillMode::Scheduled {
        let cutoff = current_cutoff(now, cfg.daily_cutoff);
        let last = ledger::last_transaction_time(conn, group_id, TransactionType::DailyRefill)?;
        if last.is_some_and(|t| t >= cutoff) {
            debug!(group_id = %group_id, "already refilled since cutoff");
            return Ok(RefillOutcome::Skipped(SkipReason::AlreadyRefilled));
        }
    }

    let active = active_subscription(conn, group_id)?;
    let allotment = daily_allotment(cfg, active.as_ref())?;
    let buckets = group_buckets(conn, group_id, now)?;

    if mode == RefillMode::OnDemand
        && buckets.daily == allotment
        && buckets.last_daily_refill_at.is_some()
    {
        return Ok(RefillOutcome::Skipped(SkipReason::AlreadyAtAllotment));
    }

    let transaction_group = TransactionGroup::new();
    let burned = buckets.daily.max(0);
    let mut rows = Vec::with_capacity(2);
    if burned > 0 {
        rows.push(build_at(
            group_id,
            TransactionType::DailyBurn,
            burned,
            transaction_group,
            now,
        )?);
    }
    rows.push(build_at(
        group_id,
        TransactionType::DailyRefill,
        allotment,
        transaction_group,
        now,
    )?);
    ledger::append(conn, &rows)?;

    info!(
        group_id = %group_id,
        transaction_group = %transaction_group,
        from = buckets.daily,
        to = allotment,
        "daily tokens refilled"
    );
    Ok(RefillOutcome::Refilled {
        burned,
        granted: allotment,
        transaction_group,
    })
}

/// On-demand refill of a single group. Leaves the daily bucket at the group's allotment.
pub fn refill_daily_tokens(
    conn: &mut Connection,
    cfg: &EconomyConfig,
    group_id: GroupId,
    now: DateTime<Utc>,
) -> Result<RefillOutcome> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let outcome = refill_group(&tx, cfg, group_id, RefillMode::OnDemand, now)?;
    tx.commit()?;
    Ok(outcome)
}

/// Scheduled (or forced) refill of every eligible group, chunk by chunk.
pub fn batch_refill_daily_tokens(
    conn: &mut Connection,
    cfg: &EconomyConfig,
    force_refill: bool,
    now: DateTime<Utc>,
) -> Result<BatchSummary> {
    let (mode, refilled_since) = if force_refill {
        (RefillMode::Forced, None)
    } else {
        (
            RefillMode::Scheduled,
            Some(current_cutoff(now, cfg.daily_cutoff)),
        )
    };
    info!(force_refill, "daily refill batch started");

    run_in_chunks(
        conn,
        "daily_refill",
        cfg.batch_size,
        cfg.chunk_retry_attempts,
        |c, after, limit| ledger::eligible_daily_groups(c, refilled_since, after, limit),
        |c, group_id| match refill_group(c, cfg, group_id, mode, now)? {
            RefillOutcome::Refilled { .. } => Ok(ItemOutcome::Written),
            RefillOutcome::Skipped(_) => Ok(ItemOutcome::Skipped),
        },
    )
}
