//! Synchronous processing strategy
//!
//! Reads the input with [`SyncReader`] and applies each command in file order
//! on the calling thread.

use crate::io::sync_reader::SyncReader;
use crate::strategy::{ProcessingStrategy, ReplaySession};
use crate::types::LedgerError;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
pub struct SyncProcessingStrategy;

impl ProcessingStrategy for SyncProcessingStrategy {
    fn process(&self, input_path: &Path, session: &Arc<ReplaySession>) -> Result<(), LedgerError> {
        let reader = SyncReader::new(input_path)?;

        for result in reader {
            match result {
                Ok(command) => {
                    if let Err(error) = session.apply(command) {
                        tracing::warn!(%error, "command failed");
                    }
                }
                Err(error) => tracing::warn!(%error, "skipping invalid row"),
            }
        }

        Ok(())
    }
}
