//! I/O module
//!
//! Handles replay CSV parsing and report output.
//!
//! # Components
//!
//! - `csv_format` - CSV format handling (command conversion, report serialization)
//! - `sync_reader` - Synchronous CSV reader with iterator interface
//! - `async_reader` - Asynchronous CSV reader with batch reading interface

pub mod async_reader;
pub mod csv_format;
pub mod sync_reader;

pub use async_reader::AsyncReader;
pub use csv_format::{
    convert_csv_record, write_balances_csv, write_statement_csv, BalanceRow, CsvRecord,
    LedgerCommand, StatementRow,
};
pub use sync_reader::SyncReader;
