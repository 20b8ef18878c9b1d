// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Public entry points of the token economy.
//!
//! [`TokenEconomy`] owns one connection and the validated configuration, and keeps a short-TTL
//! balance cache in front of the aggregate queries. Every write through the facade invalidates
//! the affected group; batch jobs clear the whole cache.

use chrono::{DateTime, Utc};
use moka::sync::Cache;
use rusqlite::Connection;
use std::collections::{BTreeSet, HashMap};
use tracing::debug;
use uuid::Uuid;

use crate::config::EconomyConfig;
use crate::daily::{self, RefillOutcome};
use crate::error::Result;
use crate::models::{
    BalanceInfo, BatchSummary, GroupId, ProductId, SubscriptionRecord, Transaction,
    TransactionGroup,
};
use crate::{grants, groups, ledger, query, subscriptions};

const CACHE_CAPACITY: u64 = 10_000;

type Clock = Box<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub struct TokenEconomy {
    conn: Connection,
    cfg: EconomyConfig,
    cache: Option<Cache<GroupId, BalanceInfo>>,
    clock: Clock,
}

impl TokenEconomy {
    pub fn new(conn: Connection, cfg: EconomyConfig) -> Self {
        let cache = cfg.balance_cache_ttl().map(|ttl| {
            Cache::builder()
                .max_capacity(CACHE_CAPACITY)
                .time_to_live(ttl)
                .build()
        });
        Self {
            conn,
            cfg,
            cache,
            clock: Box::new(Utc::now),
        }
    }

    /// Replace the wall clock, e.g. to drive cutoffs and renewals from tests.
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.clock = Box::new(clock);
        self
    }

    pub fn config(&self) -> &EconomyConfig {
        &self.cfg
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    fn invalidate(&self, group_id: GroupId) {
        if let Some(cache) = &self.cache {
            cache.invalidate(&group_id);
        }
    }

    fn invalidate_all(&self) {
        if let Some(cache) = &self.cache {
            cache.invalidate_all();
        }
    }

    // Groups and orders

    pub fn register_group(&mut self, group_id: GroupId) -> Result<()> {
        let now = self.now();
        groups::register_group(&mut self.conn, &self.cfg, group_id, now)?;
        self.invalidate(group_id);
        Ok(())
    }

    pub fn block_group(&self, group_id: GroupId, blocked: bool) -> Result<()> {
        groups::block_group(&self.conn, group_id, blocked)
    }

    pub fn delete_group(&self, group_id: GroupId) -> Result<()> {
        groups::delete_group(&self.conn, group_id, self.now())?;
        self.invalidate(group_id);
        Ok(())
    }

    pub fn record_purchase_order(
        &self,
        order_id: Uuid,
        group_id: GroupId,
        product_id: &ProductId,
    ) -> Result<()> {
        groups::record_purchase_order(&self.conn, order_id, group_id, product_id, self.now())
    }

    pub fn mark_order_refunded(&self, order_id: Uuid) -> Result<()> {
        groups::mark_order_refunded(&self.conn, order_id)
    }

    // Balances

    pub fn get_balance(&self, group_id: GroupId) -> Result<BalanceInfo> {
        if let Some(hit) = self.cache.as_ref().and_then(|c| c.get(&group_id)) {
            debug!(group_id = %group_id, "balance cache hit");
            return Ok(hit);
        }
        let info = query::get_balance(&self.conn, &self.cfg, group_id, self.now())?;
        if let Some(cache) = &self.cache {
            cache.insert(group_id, info.clone());
        }
        Ok(info)
    }

    pub fn get_balances(&self, group_ids: &BTreeSet<GroupId>) -> Result<HashMap<GroupId, BalanceInfo>> {
        let mut out = HashMap::with_capacity(group_ids.len());
        let mut misses = BTreeSet::new();
        for &id in group_ids {
            match self.cache.as_ref().and_then(|c| c.get(&id)) {
                Some(hit) => {
                    out.insert(id, hit);
                }
                None => {
                    misses.insert(id);
                }
            }
        }
        if misses.is_empty() {
            return Ok(out);
        }
        for (id, info) in query::get_balances(&self.conn, &self.cfg, &misses, self.now())? {
            if let Some(cache) = &self.cache {
                cache.insert(id, info.clone());
            }
            out.insert(id, info);
        }
        Ok(out)
    }

    pub fn transactions(&self, group_id: GroupId) -> Result<Vec<Transaction>> {
        ledger::require_group(&self.conn, group_id)?;
        ledger::group_transactions(&self.conn, group_id)
    }

    pub fn subscriptions(&self, group_id: GroupId) -> Result<Vec<SubscriptionRecord>> {
        ledger::require_group(&self.conn, group_id)?;
        ledger::group_subscriptions(&self.conn, group_id)
    }

    // Daily refill

    pub fn refill_daily_tokens(&mut self, group_id: GroupId) -> Result<RefillOutcome> {
        let now = self.now();
        let outcome = daily::refill_daily_tokens(&mut self.conn, &self.cfg, group_id, now)?;
        self.invalidate(group_id);
        Ok(outcome)
    }

    pub fn batch_refill_daily_tokens(&mut self, force_refill: bool) -> Result<BatchSummary> {
        let now = self.now();
        let summary = daily::batch_refill_daily_tokens(&mut self.conn, &self.cfg, force_refill, now);
        self.invalidate_all();
        summary
    }

    // Subscriptions

    pub fn activate_subscription(
        &mut self,
        order_id: Uuid,
        product_id: &ProductId,
    ) -> Result<BalanceInfo> {
        let now = self.now();
        let info =
            subscriptions::activate_subscription(&mut self.conn, &self.cfg, order_id, product_id, now)?;
        self.invalidate(info.group_id);
        Ok(info)
    }

    pub fn renew_subscription_tokens(&mut self) -> Result<BatchSummary> {
        let now = self.now();
        let summary = subscriptions::renew_subscription_tokens(&mut self.conn, &self.cfg, now);
        self.invalidate_all();
        summary
    }

    pub fn renew_group_subscription(&mut self, group_id: GroupId) -> Result<BalanceInfo> {
        let now = self.now();
        let info =
            subscriptions::renew_group_subscription(&mut self.conn, &self.cfg, group_id, now)?;
        self.invalidate(group_id);
        Ok(info)
    }

    pub fn cancel_all_subscriptions(&mut self, group_id: GroupId) -> Result<usize> {
        let now = self.now();
        let cancelled = subscriptions::cancel_all_subscriptions(&mut self.conn, group_id, now)?;
        self.invalidate(group_id);
        Ok(cancelled)
    }

    // Grants and usage

    pub fn grant_purchase(
        &self,
        group_id: GroupId,
        amount: i64,
        amount_before_discount: i64,
    ) -> Result<TransactionGroup> {
        let tg = grants::grant_purchase(
            &self.conn,
            group_id,
            amount,
            amount_before_discount,
            self.now(),
        )?;
        self.invalidate(group_id);
        Ok(tg)
    }

    pub fn admin_grant(&self, group_id: GroupId, signed_amount: i64) -> Result<TransactionGroup> {
        let tg = grants::admin_grant(&self.conn, group_id, signed_amount, self.now())?;
        self.invalidate(group_id);
        Ok(tg)
    }

    pub fn consume_tokens(&mut self, group_id: GroupId, amount: i64) -> Result<Vec<Transaction>> {
        let now = self.now();
        let rows = grants::consume_tokens(&mut self.conn, group_id, amount, now)?;
        self.invalidate(group_id);
        Ok(rows)
    }
}
