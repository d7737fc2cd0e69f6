//! Asynchronous CSV reader with batch interface
//!
//! The AsyncReader uses csv-async for streaming CSV parsing and hands out
//! commands in batches for the async replay strategy.
//!
//! ```text
//! CSV Reader → AsyncReader → Batches of LedgerCommands
//!                  ↓
//!           csv_format module
//!           (CsvRecord, convert_csv_record)
//! ```

use crate::io::csv_format::{convert_csv_record, CsvRecord, LedgerCommand};
use csv_async::AsyncReaderBuilder;
use futures::io::AsyncRead;
use futures::stream::StreamExt;

/// Asynchronous CSV reader
pub struct AsyncReader<R: AsyncRead + Unpin> {
    csv_reader: csv_async::AsyncDeserializer<R>,
    line_num: u64,
}

impl<R: AsyncRead + Unpin + Send + 'static> AsyncReader<R> {
    pub fn new(reader: R) -> Self {
        let csv_reader = AsyncReaderBuilder::new()
            .flexible(true)
            .trim(csv_async::Trim::All)
            .create_deserializer(reader);

        Self {
            csv_reader,
            line_num: 0,
        }
    }

    /// Read up to `batch_size` commands
    ///
    /// Invalid rows are logged and skipped. Returns an empty vector once the
    /// input is exhausted.
    pub async fn read_batch(&mut self, batch_size: usize) -> Vec<LedgerCommand> {
        let mut batch = Vec::with_capacity(batch_size);
        let mut records = self.csv_reader.deserialize::<CsvRecord>();

        while batch.len() < batch_size {
            let Some(result) = records.next().await else {
                break;
            };
            self.line_num += 1;
            let line = self.line_num + 1;

            match result.map_err(|e| e.to_string()).and_then(|record| {
                convert_csv_record(record).map_err(|e| e.to_string())
            }) {
                Ok(command) => batch.push(command),
                Err(error) => tracing::warn!(line, %error, "skipping invalid row"),
            }
        }

        batch
    }
}
