// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Economy configuration, loaded and validated once at process start.

use chrono::NaiveTime;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::db::APP;
use crate::error::{LedgerError, Result};
use crate::models::ProductId;

pub const CONFIG_ENV: &str = "TOKENLEDGER_CONFIG";

/// Allotments granted by one subscription product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductTier {
    pub daily_tokens: i64,
    pub monthly_tokens: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EconomyConfig {
    /// Daily tokens for groups without an active subscription. Required.
    pub daily_allotment: i64,
    /// UTC time of day after which the next daily refill becomes due.
    #[serde(default = "default_cutoff")]
    pub daily_cutoff: NaiveTime,
    #[serde(default = "default_period_days")]
    pub subscription_period_days: u32,
    /// Permanent tokens granted when a group is registered.
    #[serde(default)]
    pub initial_grant: Option<i64>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_retry_attempts")]
    pub chunk_retry_attempts: u32,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    #[serde(default = "default_cache_ttl_secs")]
    pub balance_cache_ttl_secs: u64,
    #[serde(default)]
    pub products: BTreeMap<ProductId, ProductTier>,
}

fn default_cutoff() -> NaiveTime {
    NaiveTime::from_hms_opt(1, 0, 0).unwrap_or(NaiveTime::MIN)
}

fn default_period_days() -> u32 {
    30
}

fn default_batch_size() -> usize {
    200
}

fn default_retry_attempts() -> u32 {
    4
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_cache_ttl_secs() -> u64 {
    5
}

impl EconomyConfig {
    /// Minimal valid configuration; every other field takes its default.
    pub fn with_daily_allotment(daily_allotment: i64) -> Self {
        Self {
            daily_allotment,
            daily_cutoff: default_cutoff(),
            subscription_period_days: default_period_days(),
            initial_grant: None,
            batch_size: default_batch_size(),
            chunk_retry_attempts: default_retry_attempts(),
            busy_timeout_ms: default_busy_timeout_ms(),
            balance_cache_ttl_secs: default_cache_ttl_secs(),
            products: BTreeMap::new(),
        }
    }

    pub fn with_product(mut self, id: &str, daily_tokens: i64, monthly_tokens: i64) -> Self {
        self.products.insert(
            ProductId(id.to_string()),
            ProductTier {
                daily_tokens,
                monthly_tokens,
            },
        );
        self
    }

    pub fn from_json(s: &str) -> Result<Self> {
        let cfg: EconomyConfig = serde_json::from_str(s)
            .map_err(|e| LedgerError::Configuration(format!("invalid config: {}", e)))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| {
            LedgerError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&raw)
    }

    /// `TOKENLEDGER_CONFIG` if set, else `tokenledger.json` in the platform config dir.
    pub fn default_path() -> Result<PathBuf> {
        if let Ok(p) = std::env::var(CONFIG_ENV) {
            return Ok(PathBuf::from(p));
        }
        let proj = ProjectDirs::from(APP.0, APP.1, APP.2).ok_or_else(|| {
            LedgerError::Configuration("could not determine platform config dir".into())
        })?;
        Ok(proj.config_dir().join("tokenledger.json"))
    }

    pub fn validate(&self) -> Result<()> {
        if self.daily_allotment < 0 {
            return Err(LedgerError::Configuration(format!(
                "daily_allotment must be non-negative, got {}",
                self.daily_allotment
            )));
        }
        if self.subscription_period_days == 0 {
            return Err(LedgerError::Configuration(
                "subscription_period_days must be positive".into(),
            ));
        }
        if !(1..=1000).contains(&self.batch_size) {
            return Err(LedgerError::Configuration(format!(
                "batch_size must be within 1..=1000, got {}",
                self.batch_size
            )));
        }
        if self.chunk_retry_attempts == 0 {
            return Err(LedgerError::Configuration(
                "chunk_retry_attempts must be at least 1".into(),
            ));
        }
        if let Some(grant) = self.initial_grant {
            if grant < 0 {
                return Err(LedgerError::Configuration(format!(
                    "initial_grant must be non-negative, got {}",
                    grant
                )));
            }
        }
        for (id, tier) in &self.products {
            if tier.daily_tokens < 0 || tier.monthly_tokens < 0 {
                return Err(LedgerError::Configuration(format!(
                    "product '{}' has a negative allotment",
                    id
                )));
            }
        }
        Ok(())
    }

    pub fn product(&self, id: &ProductId) -> Result<ProductTier> {
        self.products.get(id).copied().ok_or_else(|| {
            LedgerError::Configuration(format!("no tier configured for product '{}'", id))
        })
    }

    pub fn subscription_period(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.subscription_period_days))
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn balance_cache_ttl(&self) -> Option<Duration> {
        (self.balance_cache_ttl_secs > 0).then(|| Duration::from_secs(self.balance_cache_ttl_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config_with_defaults() {
        let cfg = EconomyConfig::from_json(r#"{"daily_allotment": 30}"#).unwrap();
        assert_eq!(cfg.daily_allotment, 30);
        assert_eq!(cfg.daily_cutoff, NaiveTime::from_hms_opt(1, 0, 0).unwrap());
        assert_eq!(cfg.subscription_period_days, 30);
        assert_eq!(cfg.batch_size, 200);
        assert!(cfg.products.is_empty());
    }

    #[test]
    fn missing_allotment_is_a_configuration_error() {
        let err = EconomyConfig::from_json(r#"{"batch_size": 100}"#).unwrap_err();
        assert!(matches!(err, LedgerError::Configuration(_)));
    }

    #[test]
    fn parses_products_and_cutoff() {
        let cfg = EconomyConfig::from_json(
            r#"{
                "daily_allotment": 30,
                "daily_cutoff": "00:30:00",
                "products": {"premium": {"daily_tokens": 50, "monthly_tokens": 1000}}
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.daily_cutoff, NaiveTime::from_hms_opt(0, 30, 0).unwrap());
        let tier = cfg.product(&ProductId("premium".into())).unwrap();
        assert_eq!(tier.monthly_tokens, 1000);
        assert!(cfg.product(&ProductId("gold".into())).is_err());
    }

    #[test]
    fn rejects_out_of_range_values() {
        for raw in [
            r#"{"daily_allotment": -1}"#,
            r#"{"daily_allotment": 5, "batch_size": 0}"#,
            r#"{"daily_allotment": 5, "subscription_period_days": 0}"#,
            r#"{"daily_allotment": 5, "products": {"p": {"daily_tokens": -2, "monthly_tokens": 1}}}"#,
        ] {
            assert!(EconomyConfig::from_json(raw).is_err(), "{raw}");
        }
    }
}
