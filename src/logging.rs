//! Tracing setup for the replay binary
//!
//! Events go to stderr so the CSV report on stdout stays clean. `RUST_LOG`
//! takes precedence over the configured level.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, LoggingConfig};
use crate::types::LedgerError;

/// Install the global subscriber
///
/// Fails if the level is not a valid filter directive or a subscriber is
/// already installed.
pub fn init(config: &LoggingConfig) -> Result<(), LedgerError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level).map_err(|e| {
            LedgerError::config(format!("invalid log level '{}': {}", config.level, e))
        })?,
    };

    let registry = tracing_subscriber::registry().with(filter);
    let installed = match config.format {
        LogFormat::Text => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
    };

    installed.map_err(|e| LedgerError::config(format!("failed to install logger: {}", e)))
}
