//! Processing strategy module for ledger replay
//!
//! This module defines the Strategy pattern for complete replay pipelines,
//! encompassing both CSV parsing and command application. This allows
//! different scheduling implementations (sequential, partitioned batches) to
//! be selected at runtime while sharing one [`ReplaySession`].

use crate::cli::StrategyType;
use crate::types::LedgerError;
use std::path::Path;
use std::sync::Arc;

pub mod r#async;
pub mod session;
pub mod sync;

pub use self::r#async::{AsyncProcessingStrategy, BatchConfig};
pub use session::{Reference, ReplaySession};
pub use sync::SyncProcessingStrategy;

/// Processing strategy trait for replay pipelines
pub trait ProcessingStrategy: Send + Sync {
    /// Apply every command in `input_path` to the session
    ///
    /// Malformed rows and failed commands are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns an error only for fatal problems: the input cannot be opened,
    /// or the runtime cannot be started.
    fn process(&self, input_path: &Path, session: &Arc<ReplaySession>) -> Result<(), LedgerError>;
}

/// Create a processing strategy based on the specified type
///
/// `config` is only used by the async strategy; `None` means defaults.
pub fn create_strategy(
    strategy_type: StrategyType,
    config: Option<BatchConfig>,
) -> Box<dyn ProcessingStrategy> {
    match strategy_type {
        StrategyType::Sync => Box::new(SyncProcessingStrategy),
        StrategyType::Async => {
            let config = config.unwrap_or_default();
            Box::new(AsyncProcessingStrategy::new(config))
        }
    }
}
