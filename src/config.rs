//! Configuration
//!
//! Settings come from an optional TOML file and are then overridden by
//! `GUINCOIN_*` environment variables. Every field has a default, so an
//! empty file (or no file) is a valid configuration.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::core::DEFAULT_LOCK_TIMEOUT;
use crate::flows::award::DEFAULT_MONTHLY_ALLOTMENT;
use crate::flows::purchase::DEFAULT_GUINCOIN_PER_USD;
use crate::flows::transfer::DEFAULT_MONTHLY_LIMIT;
use crate::types::{LedgerError, DEFAULT_HISTORY_LIMIT};

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ledger: LedgerConfig,
    pub awards: AwardConfig,
    pub transfers: TransferConfig,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
}

/// Ledger configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Row lock wait before a unit of work fails (ms)
    pub lock_timeout_ms: u64,

    /// History page size when a query sets none
    pub default_page_size: usize,
}

/// Manager award configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AwardConfig {
    /// Award budget per manager per calendar month
    #[serde(with = "rust_decimal::serde::float")]
    pub monthly_allotment: Decimal,
}

/// Peer transfer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Allowance per sender per calendar month
    #[serde(with = "rust_decimal::serde::float")]
    pub monthly_limit: Decimal,
}

/// Store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Conversion rate for dollar-priced products
    #[serde(with = "rust_decimal::serde::float")]
    pub guincoin_per_usd: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(LedgerError::config(format!("unknown log format '{}'", other))),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `guincoin_ledger=debug`
    pub level: String,
    pub format: LogFormat,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT.as_millis() as u64,
            default_page_size: DEFAULT_HISTORY_LIMIT,
        }
    }
}

impl Default for AwardConfig {
    fn default() -> Self {
        Self {
            monthly_allotment: DEFAULT_MONTHLY_ALLOTMENT,
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            monthly_limit: DEFAULT_MONTHLY_LIMIT,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            guincoin_per_usd: DEFAULT_GUINCOIN_PER_USD,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

impl LedgerConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, LedgerError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by environment variables
    pub fn from_env() -> Result<Self, LedgerError> {
        let mut config = Config::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// File (if any) then environment
    pub fn load(path: Option<&Path>) -> Result<Self, LedgerError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Config::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Override fields from `GUINCOIN_*` variables provided by `lookup`
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), LedgerError> {
        if let Some(value) = lookup("GUINCOIN_LOCK_TIMEOUT_MS") {
            self.ledger.lock_timeout_ms = parse_var("GUINCOIN_LOCK_TIMEOUT_MS", &value)?;
        }

        if let Some(value) = lookup("GUINCOIN_HISTORY_PAGE_SIZE") {
            self.ledger.default_page_size = parse_var("GUINCOIN_HISTORY_PAGE_SIZE", &value)?;
        }

        if let Some(value) = lookup("GUINCOIN_AWARD_MONTHLY_ALLOTMENT") {
            self.awards.monthly_allotment = parse_var("GUINCOIN_AWARD_MONTHLY_ALLOTMENT", &value)?;
        }

        if let Some(value) = lookup("GUINCOIN_TRANSFER_MONTHLY_LIMIT") {
            self.transfers.monthly_limit = parse_var("GUINCOIN_TRANSFER_MONTHLY_LIMIT", &value)?;
        }

        if let Some(value) = lookup("GUINCOIN_PER_USD") {
            self.store.guincoin_per_usd = parse_var("GUINCOIN_PER_USD", &value)?;
        }

        if let Some(value) = lookup("GUINCOIN_LOG_LEVEL") {
            self.logging.level = value;
        }

        if let Some(value) = lookup("GUINCOIN_LOG_FORMAT") {
            self.logging.format = value.parse()?;
        }

        self.validate()
    }

    fn validate(&self) -> Result<(), LedgerError> {
        if self.ledger.default_page_size == 0 {
            return Err(LedgerError::config("ledger.default_page_size must be positive"));
        }
        if self.awards.monthly_allotment < Decimal::ZERO {
            return Err(LedgerError::config("awards.monthly_allotment must not be negative"));
        }
        if self.transfers.monthly_limit < Decimal::ZERO {
            return Err(LedgerError::config("transfers.monthly_limit must not be negative"));
        }
        if self.store.guincoin_per_usd <= Decimal::ZERO {
            return Err(LedgerError::config("store.guincoin_per_usd must be positive"));
        }
        Ok(())
    }
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> Result<T, LedgerError> {
    value
        .trim()
        .parse()
        .map_err(|_| LedgerError::config(format!("{} has an invalid value '{}'", key, value)))
}
