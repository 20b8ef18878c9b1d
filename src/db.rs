// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use once_cell::sync::Lazy;
use rusqlite::Connection;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub static APP: Lazy<(&str, &str, &str)> =
    Lazy::new(|| ("com.alphavelocity", "Tokenledger", "tokenledger"));

pub const DB_ENV: &str = "TOKENLEDGER_DB";

pub fn db_path() -> Result<PathBuf> {
    if let Ok(p) = std::env::var(DB_ENV) {
        return Ok(PathBuf::from(p));
    }
    let proj = ProjectDirs::from(APP.0, APP.1, APP.2)
        .context("Could not determine platform-specific data dir")?;
    let data_dir = proj.data_dir();
    fs::create_dir_all(data_dir).context("Failed to create data dir")?;
    Ok(data_dir.join("tokenledger.sqlite"))
}

pub fn open_or_init(busy_timeout: Duration) -> Result<Connection> {
    let path = db_path()?;
    open_at(&path, busy_timeout).with_context(|| format!("Open DB at {}", path.display()))
}

pub fn open_at(path: &Path, busy_timeout: Duration) -> rusqlite::Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(busy_timeout)?;
    conn.query_row("PRAGMA journal_mode=WAL", [], |_| Ok(()))?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn open_in_memory() -> rusqlite::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS groups(
        id INTEGER PRIMARY KEY,
        created_at TEXT NOT NULL,
        is_blocked INTEGER NOT NULL DEFAULT 0,
        deleted_at TEXT
    );

    -- Append-only: the triggers below reject every UPDATE and DELETE.
    CREATE TABLE IF NOT EXISTS ledger_transactions(
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL UNIQUE,
        group_id INTEGER NOT NULL,
        transaction_group TEXT NOT NULL,
        transaction_type TEXT NOT NULL,
        amount INTEGER NOT NULL,
        amount_before_discount INTEGER NOT NULL,
        created_time TEXT NOT NULL,
        FOREIGN KEY(group_id) REFERENCES groups(id)
    );
    CREATE INDEX IF NOT EXISTS idx_ledger_group_type
        ON ledger_transactions(group_id, transaction_type, seq);
    CREATE INDEX IF NOT EXISTS idx_ledger_transaction_group
        ON ledger_transactions(transaction_group);

    CREATE TRIGGER IF NOT EXISTS ledger_transactions_no_update
    BEFORE UPDATE ON ledger_transactions
    BEGIN
        SELECT RAISE(ABORT, 'ledger rows are immutable');
    END;

    CREATE TRIGGER IF NOT EXISTS ledger_transactions_no_delete
    BEFORE DELETE ON ledger_transactions
    BEGIN
        SELECT RAISE(ABORT, 'ledger rows are immutable');
    END;

    CREATE TABLE IF NOT EXISTS purchase_orders(
        id TEXT PRIMARY KEY,
        group_id INTEGER NOT NULL,
        product_id TEXT NOT NULL,
        refunded INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        FOREIGN KEY(group_id) REFERENCES groups(id)
    );

    CREATE TABLE IF NOT EXISTS subscriptions(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        group_id INTEGER NOT NULL,
        order_id TEXT NOT NULL UNIQUE,
        product_id TEXT NOT NULL,
        activated_at TEXT NOT NULL,
        current_period_end TEXT NOT NULL,
        cancelled_at TEXT,
        FOREIGN KEY(group_id) REFERENCES groups(id),
        FOREIGN KEY(order_id) REFERENCES purchase_orders(id)
    );
    CREATE INDEX IF NOT EXISTS idx_subscriptions_group ON subscriptions(group_id);
    "#,
    )
}
