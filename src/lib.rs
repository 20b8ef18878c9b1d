// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

pub mod balance;
pub mod batch;
pub mod cli;
pub mod commands;
pub mod config;
pub mod daily;
pub mod db;
pub mod error;
pub mod generator;
pub mod grants;
pub mod groups;
pub mod ledger;
pub mod models;
pub mod query;
pub mod service;
pub mod subscriptions;
pub mod utils;

pub use config::EconomyConfig;
pub use error::{ErrorKind, LedgerError};
pub use service::TokenEconomy;
