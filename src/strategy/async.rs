//! Asynchronous processing strategy
//!
//! Reads the input in batches with [`AsyncReader`] and applies each batch on a
//! multi-threaded tokio runtime.
//!
//! # Scheduling
//!
//! Batches are processed one after another. Inside a batch:
//!
//! 1. Provisions run first, in file order, so every partition can resolve the
//!    employees it names.
//! 2. The remaining commands are partitioned by owning employee and each
//!    partition runs as its own task, in file order.
//!
//! Per-employee order is preserved across the whole file. Order between
//! different employees inside one batch is not.
//!
//! Units of work are never held across an await point: each command runs to
//! completion synchronously inside its task.

use crate::io::async_reader::AsyncReader;
use crate::io::csv_format::LedgerCommand;
use crate::strategy::{ProcessingStrategy, ReplaySession};
use crate::types::LedgerError;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct BatchConfig {
    /// Number of commands read per batch
    pub batch_size: usize,

    /// Runtime worker threads
    pub max_concurrent_batches: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            max_concurrent_batches: num_cpus::get(),
        }
    }
}

impl BatchConfig {
    /// Create a config, replacing zero values with the defaults
    pub fn new(batch_size: usize, max_concurrent_batches: usize) -> Self {
        let default = Self::default();

        let batch_size = if batch_size == 0 {
            tracing::warn!(
                default = default.batch_size,
                "invalid batch_size 0, using default"
            );
            default.batch_size
        } else {
            batch_size
        };

        let max_concurrent_batches = if max_concurrent_batches == 0 {
            tracing::warn!(
                default = default.max_concurrent_batches,
                "invalid max_concurrent 0, using default"
            );
            default.max_concurrent_batches
        } else {
            max_concurrent_batches
        };

        Self {
            batch_size,
            max_concurrent_batches,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AsyncProcessingStrategy {
    config: BatchConfig,
}

impl AsyncProcessingStrategy {
    pub fn new(config: BatchConfig) -> Self {
        Self { config }
    }
}

impl ProcessingStrategy for AsyncProcessingStrategy {
    fn process(&self, input_path: &Path, session: &Arc<ReplaySession>) -> Result<(), LedgerError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.config.max_concurrent_batches)
            .build()
            .map_err(|e| LedgerError::Io {
                message: format!("Failed to create tokio runtime: {}", e),
            })?;

        runtime.block_on(async {
            let file = tokio::fs::File::open(input_path)
                .await
                .map_err(|e| LedgerError::Io {
                    message: format!("Failed to open file '{}': {}", input_path.display(), e),
                })?;

            // csv-async reads futures::io, tokio files implement tokio::io
            let compat_file = tokio_util::compat::TokioAsyncReadCompatExt::compat(file);
            let mut reader = AsyncReader::new(compat_file);

            loop {
                let batch = reader.read_batch(self.config.batch_size).await;
                if batch.is_empty() {
                    break;
                }
                process_batch(session, batch).await;
            }

            Ok(())
        })
    }
}

/// Apply one batch: provisions first, then one task per owner
pub async fn process_batch(session: &Arc<ReplaySession>, batch: Vec<LedgerCommand>) {
    let (provisions, partitions) = partition_by_owner(session, batch);

    for command in provisions {
        apply_logged(session, command);
    }

    let mut tasks = Vec::with_capacity(partitions.len());
    for (_owner, commands) in partitions {
        let session = Arc::clone(session);
        tasks.push(tokio::spawn(async move {
            for command in commands {
                apply_logged(&session, command);
            }
        }));
    }

    for task in tasks {
        if let Err(error) = task.await {
            tracing::error!(%error, "partition task failed");
        }
    }
}

/// Split a batch into provisions and per-owner command lists
///
/// References created in this batch are attributed to their creator before any
/// command runs, so a later `post` or `complete` lands in the same partition.
fn partition_by_owner(
    session: &ReplaySession,
    batch: Vec<LedgerCommand>,
) -> (Vec<LedgerCommand>, HashMap<String, Vec<LedgerCommand>>) {
    let mut provisions = Vec::new();
    let mut partitions: HashMap<String, Vec<LedgerCommand>> = HashMap::new();

    for command in batch {
        if command.is_provision() {
            provisions.push(command);
            continue;
        }
        session.note_owner(&command);
        partitions
            .entry(session.owner_of(&command))
            .or_default()
            .push(command);
    }

    (provisions, partitions)
}

fn apply_logged(session: &ReplaySession, command: LedgerCommand) {
    if let Err(error) = session.apply(command) {
        tracing::warn!(%error, "command failed");
    }
}
