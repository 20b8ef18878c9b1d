// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Error taxonomy for the ledger engine.

use rusqlite::ErrorCode;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{GroupId, TransactionType};

/// Coarse classification used by callers (scheduler, CLI) to decide what to do with a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected immediately, never retried.
    Validation,
    /// Already applied by someone else; callers treat it as success.
    Conflict,
    /// Ledger unavailable; retry the whole chunk with backoff.
    TransientStorage,
    /// Storage rejected this item's data (bad stored value, constraint); retrying will not help.
    PermanentStorage,
    /// Missing allotment or product tier; aborts the affected operation only.
    FatalConfiguration,
}

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("invalid amount {amount} for {transaction_type}: amounts are passed unsigned")]
    InvalidAmount {
        transaction_type: TransactionType,
        amount: i64,
    },

    #[error("unknown group {0}")]
    UnknownGroup(GroupId),

    #[error("purchase order {0} not found")]
    UnknownOrder(Uuid),

    #[error("purchase order {order_id} cannot be activated: {reason}")]
    InvalidOrder { order_id: Uuid, reason: String },

    #[error("group {group_id} has {available} tokens, {requested} requested")]
    InsufficientBalance {
        group_id: GroupId,
        available: i64,
        requested: i64,
    },

    #[error("{0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("ledger storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::InvalidAmount { .. }
            | LedgerError::UnknownGroup(_)
            | LedgerError::UnknownOrder(_)
            | LedgerError::InvalidOrder { .. }
            | LedgerError::InsufficientBalance { .. }
            | LedgerError::Validation(_) => ErrorKind::Validation,
            LedgerError::Conflict(_) => ErrorKind::Conflict,
            LedgerError::Storage(e) if is_unavailable(e) => ErrorKind::TransientStorage,
            LedgerError::Storage(_) => ErrorKind::PermanentStorage,
            LedgerError::Configuration(_) => ErrorKind::FatalConfiguration,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::TransientStorage
    }
}

/// Busy, locked or I/O-level failures; everything else is deterministic for the same input.
fn is_unavailable(e: &rusqlite::Error) -> bool {
    match e {
        rusqlite::Error::SqliteFailure(f, _) => matches!(
            f.code,
            ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::SystemIoFailure
                | ErrorCode::DiskFull
                | ErrorCode::CannotOpen
        ),
        _ => false,
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
