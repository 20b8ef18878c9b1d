// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub i64);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub String);

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Correlation id shared by every row one logical operation produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionGroup(pub Uuid);

impl TransactionGroup {
    pub fn new() -> Self {
        TransactionGroup(Uuid::new_v4())
    }
}

impl Default for TransactionGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for TransactionGroup {
    fn from(id: Uuid) -> Self {
        TransactionGroup(id)
    }
}

impl fmt::Display for TransactionGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sign {
    Credit,
    Debit,
}

impl Sign {
    pub fn apply(self, amount: i64) -> i64 {
        match self {
            Sign::Credit => amount,
            Sign::Debit => -amount,
        }
    }
}

/// Every kind of ledger movement. The sign of the stored amount follows from the variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionType {
    InitialGrant,
    DailyRefill,
    DailyBurn,
    MonthlySubscriptionRefill,
    MonthlySubscriptionBurn,
    PurchaseGrant,
    AdminGrant(Sign),
    UsageConsumption,
}

impl TransactionType {
    pub fn sign(self) -> Sign {
        match self {
            TransactionType::InitialGrant
            | TransactionType::DailyRefill
            | TransactionType::MonthlySubscriptionRefill
            | TransactionType::PurchaseGrant => Sign::Credit,
            TransactionType::DailyBurn
            | TransactionType::MonthlySubscriptionBurn
            | TransactionType::UsageConsumption => Sign::Debit,
            TransactionType::AdminGrant(sign) => sign,
        }
    }

    /// Name stored in the `transaction_type` column.
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionType::InitialGrant => "InitialGrant",
            TransactionType::DailyRefill => "DailyRefill",
            TransactionType::DailyBurn => "DailyBurn",
            TransactionType::MonthlySubscriptionRefill => "MonthlySubscriptionRefill",
            TransactionType::MonthlySubscriptionBurn => "MonthlySubscriptionBurn",
            TransactionType::PurchaseGrant => "PurchaseGrant",
            TransactionType::AdminGrant(_) => "AdminGrant",
            TransactionType::UsageConsumption => "UsageConsumption",
        }
    }

    /// Rebuild a type from its stored name; admin grants recover their sign from the amount.
    pub fn from_stored(name: &str, amount: i64) -> Option<Self> {
        let t = match name {
            "InitialGrant" => TransactionType::InitialGrant,
            "DailyRefill" => TransactionType::DailyRefill,
            "DailyBurn" => TransactionType::DailyBurn,
            "MonthlySubscriptionRefill" => TransactionType::MonthlySubscriptionRefill,
            "MonthlySubscriptionBurn" => TransactionType::MonthlySubscriptionBurn,
            "PurchaseGrant" => TransactionType::PurchaseGrant,
            "AdminGrant" if amount < 0 => TransactionType::AdminGrant(Sign::Debit),
            "AdminGrant" => TransactionType::AdminGrant(Sign::Credit),
            "UsageConsumption" => TransactionType::UsageConsumption,
            _ => return None,
        };
        Some(t)
    }

    pub fn is_daily(self) -> bool {
        matches!(self, TransactionType::DailyRefill | TransactionType::DailyBurn)
    }

    pub fn is_subscription(self) -> bool {
        matches!(
            self,
            TransactionType::MonthlySubscriptionRefill | TransactionType::MonthlySubscriptionBurn
        )
    }

    pub fn is_permanent(self) -> bool {
        !self.is_daily() && !self.is_subscription()
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable ledger row. Construct through [`crate::generator`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub group_id: GroupId,
    pub transaction_group: TransactionGroup,
    pub transaction_type: TransactionType,
    pub amount: i64,
    pub amount_before_discount: i64,
    pub created_time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceInfo {
    pub group_id: GroupId,
    pub daily_tokens: i64,
    pub max_daily_tokens: i64,
    pub subscription_tokens: i64,
    pub max_subscription_tokens: Option<i64>,
    pub permanent_tokens: i64,
    pub next_daily_token_refresh: DateTime<Utc>,
    pub next_subscription_token_refresh: Option<DateTime<Utc>>,
    pub active_subscription_id: Option<i64>,
}

impl BalanceInfo {
    pub fn total_tokens(&self) -> i64 {
        self.daily_tokens + self.subscription_tokens + self.permanent_tokens
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    pub id: i64,
    pub group_id: GroupId,
    pub order_id: Uuid,
    pub product_id: ProductId,
    pub activated_at: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl SubscriptionRecord {
    pub fn is_active(&self) -> bool {
        self.cancelled_at.is_none()
    }
}

/// A receipt-validated order handed over by the purchase flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrder {
    pub id: Uuid,
    pub group_id: GroupId,
    pub product_id: ProductId,
    pub refunded: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupStatus {
    pub id: GroupId,
    pub is_blocked: bool,
    pub is_deleted: bool,
}

impl GroupStatus {
    pub fn is_eligible(&self) -> bool {
        !self.is_blocked && !self.is_deleted
    }
}

/// Outcome counters reported by a batch job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub chunks: usize,
    pub processed: usize,
    pub written: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}
