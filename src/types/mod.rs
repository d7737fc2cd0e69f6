//! Types module
//!
//! Contains core data structures used throughout the application.
//! This module organizes types into logical submodules:
//! - `account`: Account record and identifiers
//! - `transaction`: Ledger transaction types, status and rows
//! - `balance`: Query shapes (balance, history pages, joined views)
//! - `employee`: Employee identity and summary projection
//! - `error`: Error types for the ledger

pub mod account;
pub mod balance;
pub mod employee;
pub mod error;
pub mod transaction;

pub use account::{Account, AccountId, EmployeeId};
pub use balance::{
    AccountBalance, HistoryQuery, SubmissionSummary, TransactionPage, TransactionView,
    DEFAULT_HISTORY_LIMIT,
};
pub use employee::{Employee, EmployeeSummary, NewEmployee};
pub use error::{ErrorKind, LedgerError};
pub use transaction::{
    LedgerTransaction, NewTransaction, SubmissionId, TransactionId, TransactionStatus,
    TransactionType,
};
