// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Chunked execution shared by the refill jobs.
//!
//! Keys are paged in ascending order. Each page is applied inside one `BEGIN IMMEDIATE`
//! transaction, and each key inside its own savepoint: a failing key is rolled back, logged
//! and counted while the rest of the chunk commits. Busy or unavailable storage aborts the
//! chunk, which is retried as a whole; committed chunks are never revisited.

use rusqlite::{Connection, TransactionBehavior};
use std::fmt::Display;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::models::BatchSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    Written,
    Skipped,
}

pub(crate) fn run_in_chunks<K, P, A>(
    conn: &mut Connection,
    job: &str,
    batch_size: usize,
    attempts: u32,
    mut next_page: P,
    mut apply: A,
) -> Result<BatchSummary>
where
    K: Copy + Display,
    P: FnMut(&Connection, Option<K>, usize) -> Result<Vec<K>>,
    A: FnMut(&Connection, K) -> Result<ItemOutcome>,
{
    let started = Instant::now();
    let mut summary = BatchSummary::default();
    let mut cursor: Option<K> = None;

    loop {
        let page = next_page(conn, cursor, batch_size)?;
        let Some(last) = page.last().copied() else {
            break;
        };
        let chunk = run_chunk(conn, job, &page, attempts, &mut apply)?;
        summary.chunks += 1;
        summary.processed += page.len();
        summary.written += chunk.written;
        summary.skipped += chunk.skipped;
        summary.failed += chunk.failed;
        cursor = Some(last);
    }

    info!(
        job,
        chunks = summary.chunks,
        processed = summary.processed,
        written = summary.written,
        skipped = summary.skipped,
        failed = summary.failed,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "batch finished"
    );
    Ok(summary)
}

fn run_chunk<K, A>(
    conn: &mut Connection,
    job: &str,
    page: &[K],
    attempts: u32,
    apply: &mut A,
) -> Result<BatchSummary>
where
    K: Copy + Display,
    A: FnMut(&Connection, K) -> Result<ItemOutcome>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match try_chunk(conn, job, page, apply) {
            Ok(s) => return Ok(s),
            Err(e) if e.is_retryable() && attempt < attempts => {
                warn!(job, attempt, error = %e, "chunk failed, retrying");
                thread::sleep(Duration::from_millis(100 * u64::from(attempt)));
            }
            Err(e) => {
                error!(job, attempt, error = %e, "chunk failed, giving up");
                return Err(e);
            }
        }
    }
}

fn try_chunk<K, A>(
    conn: &mut Connection,
    job: &str,
    page: &[K],
    apply: &mut A,
) -> Result<BatchSummary>
where
    K: Copy + Display,
    A: FnMut(&Connection, K) -> Result<ItemOutcome>,
{
    let mut tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let mut s = BatchSummary::default();
    for key in page.iter().copied() {
        let sp = tx.savepoint()?;
        match apply(&sp, key) {
            Ok(ItemOutcome::Written) => {
                sp.commit()?;
                s.written += 1;
            }
            Ok(ItemOutcome::Skipped) => s.skipped += 1,
            Err(e) if e.is_retryable() => return Err(e),
            Err(e) => {
                error!(job, key = %key, error = %e, "item failed");
                s.failed += 1;
            }
        }
    }
    tx.commit()?;
    debug!(job, size = page.len(), written = s.written, "chunk committed");
    Ok(s)
}
