//! Error types for the Guincoin ledger
//!
//! This module defines every error the ledger, its storage layer and the
//! initiating flows can surface. Errors carry the identifiers involved so the
//! calling tier can translate them into user-facing messages.
//!
//! # Error Categories
//!
//! - **Not found**: a referenced account, transaction, employee or record does not exist
//! - **Invalid state**: a terminal transaction or reviewed record was asked to transition again
//! - **Validation**: bad input rejected before anything is persisted
//! - **Storage**: lock timeouts, arithmetic overflow and other failures inside a unit of work
//! - **Infrastructure**: configuration, file I/O and CSV parsing (CLI only)

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use super::transaction::TransactionStatus;

/// Coarse classification of a [`LedgerError`]
///
/// The HTTP tier maps `NotFound`, `InvalidState` and `Validation` to 4xx
/// responses and `Storage` / `Infrastructure` to 5xx.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidState,
    Validation,
    Storage,
    Infrastructure,
}

/// Main error type for the ledger
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    /// The referenced account does not exist
    #[error("Account {account} not found")]
    AccountNotFound { account: Uuid },

    /// The referenced ledger transaction does not exist
    #[error("Transaction {transaction} not found")]
    TransactionNotFound { transaction: Uuid },

    /// No employee matches the given id or email
    #[error("Employee {employee} not found")]
    EmployeeNotFound { employee: String },

    /// A flow-level record (submission, task, transfer, product, order) does not exist
    #[error("{entity} {id} not found")]
    RecordNotFound { entity: &'static str, id: Uuid },

    /// A transaction was asked to transition but is no longer pending
    ///
    /// Raised by both posting and rejection. The transaction already reached
    /// its terminal state and must not move again.
    #[error("Transaction {transaction} is not pending (status: {status})")]
    InvalidState {
        transaction: Uuid,
        status: TransactionStatus,
    },

    /// A flow-level record was already reviewed, fulfilled or resolved
    #[error("{entity} {id} is not pending ({status})")]
    RecordNotPending {
        entity: &'static str,
        id: Uuid,
        status: String,
    },

    /// Amount must be strictly positive
    #[error("Invalid amount {amount}: amounts must be greater than zero")]
    InvalidAmount { amount: Decimal },

    /// Generic input validation failure
    #[error("Validation failed: {message}")]
    Validation { message: String },

    /// The account cannot cover a debit
    #[error(
        "Insufficient funds in account {account}: available {available}, requested {requested}"
    )]
    InsufficientFunds {
        account: Uuid,
        available: Decimal,
        requested: Decimal,
    },

    /// A peer transfer would exceed the sender's allowance for the period
    #[error(
        "Transfer limit exceeded for employee {employee}: limit {limit}, used {used}, requested {requested}"
    )]
    TransferLimitExceeded {
        employee: Uuid,
        limit: Decimal,
        used: Decimal,
        requested: Decimal,
    },

    /// A manager award would exceed the manager's allotment for the period
    #[error(
        "Award allotment exceeded for manager {manager}: allotment {allotment}, used {used}, requested {requested}"
    )]
    AllotmentExceeded {
        manager: Uuid,
        allotment: Decimal,
        used: Decimal,
        requested: Decimal,
    },

    /// A wellness task already rewarded its maximum number of employees
    #[error("Wellness task {task} has reached its reward limit of {limit}")]
    RewardLimitReached { task: Uuid, limit: u32 },

    /// A transaction id was inserted twice
    #[error("Duplicate transaction id {transaction}")]
    DuplicateTransaction { transaction: Uuid },

    /// A row lock could not be acquired before the configured timeout
    ///
    /// The unit of work has been rolled back; the whole operation may be retried.
    #[error("Timed out waiting for lock on {resource}")]
    LockTimeout { resource: String },

    /// Applying a balance change would overflow the decimal range
    #[error("Arithmetic overflow applying balance change to account {account}")]
    ArithmeticOverflow { account: Uuid },

    /// Any other storage-layer failure
    #[error("Storage error: {message}")]
    Storage { message: String },

    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// I/O error occurred while reading or writing files
    #[error("I/O error: {message}")]
    Io { message: String },

    /// CSV parsing error occurred
    #[error("CSV parse error{}: {message}", line.map(|l| format!(" at line {}", l)).unwrap_or_default())]
    Parse { line: Option<u64>, message: String },
}

impl From<std::io::Error> for LedgerError {
    fn from(error: std::io::Error) -> Self {
        LedgerError::Io {
            message: error.to_string(),
        }
    }
}

impl From<csv::Error> for LedgerError {
    fn from(error: csv::Error) -> Self {
        let line = error.position().map(|pos| pos.line());

        LedgerError::Parse {
            line,
            message: error.to_string(),
        }
    }
}

impl From<toml::de::Error> for LedgerError {
    fn from(error: toml::de::Error) -> Self {
        LedgerError::Config {
            message: error.to_string(),
        }
    }
}

// Helper functions for creating common errors

impl LedgerError {
    /// Create an AccountNotFound error
    pub fn account_not_found(account: Uuid) -> Self {
        LedgerError::AccountNotFound { account }
    }

    /// Create a TransactionNotFound error
    pub fn transaction_not_found(transaction: Uuid) -> Self {
        LedgerError::TransactionNotFound { transaction }
    }

    /// Create an EmployeeNotFound error from an id or an email
    pub fn employee_not_found(employee: impl ToString) -> Self {
        LedgerError::EmployeeNotFound {
            employee: employee.to_string(),
        }
    }

    /// Create a RecordNotFound error
    pub fn record_not_found(entity: &'static str, id: Uuid) -> Self {
        LedgerError::RecordNotFound { entity, id }
    }

    /// Create an InvalidState error
    pub fn invalid_state(transaction: Uuid, status: TransactionStatus) -> Self {
        LedgerError::InvalidState {
            transaction,
            status,
        }
    }

    /// Create a RecordNotPending error
    pub fn record_not_pending(entity: &'static str, id: Uuid, status: impl ToString) -> Self {
        LedgerError::RecordNotPending {
            entity,
            id,
            status: status.to_string(),
        }
    }

    /// Create an InvalidAmount error
    pub fn invalid_amount(amount: Decimal) -> Self {
        LedgerError::InvalidAmount { amount }
    }

    /// Create a Validation error
    pub fn validation(message: impl Into<String>) -> Self {
        LedgerError::Validation {
            message: message.into(),
        }
    }

    /// Create an InsufficientFunds error
    pub fn insufficient_funds(account: Uuid, available: Decimal, requested: Decimal) -> Self {
        LedgerError::InsufficientFunds {
            account,
            available,
            requested,
        }
    }

    /// Create a TransferLimitExceeded error
    pub fn transfer_limit_exceeded(
        employee: Uuid,
        limit: Decimal,
        used: Decimal,
        requested: Decimal,
    ) -> Self {
        LedgerError::TransferLimitExceeded {
            employee,
            limit,
            used,
            requested,
        }
    }

    /// Create an AllotmentExceeded error
    pub fn allotment_exceeded(
        manager: Uuid,
        allotment: Decimal,
        used: Decimal,
        requested: Decimal,
    ) -> Self {
        LedgerError::AllotmentExceeded {
            manager,
            allotment,
            used,
            requested,
        }
    }

    /// Create a RewardLimitReached error
    pub fn reward_limit_reached(task: Uuid, limit: u32) -> Self {
        LedgerError::RewardLimitReached { task, limit }
    }

    /// Create a DuplicateTransaction error
    pub fn duplicate_transaction(transaction: Uuid) -> Self {
        LedgerError::DuplicateTransaction { transaction }
    }

    /// Create a LockTimeout error
    pub fn lock_timeout(resource: impl ToString) -> Self {
        LedgerError::LockTimeout {
            resource: resource.to_string(),
        }
    }

    /// Create an ArithmeticOverflow error
    pub fn arithmetic_overflow(account: Uuid) -> Self {
        LedgerError::ArithmeticOverflow { account }
    }

    /// Create a Storage error
    pub fn storage(message: impl Into<String>) -> Self {
        LedgerError::Storage {
            message: message.into(),
        }
    }

    /// Create a Config error
    pub fn config(message: impl Into<String>) -> Self {
        LedgerError::Config {
            message: message.into(),
        }
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::AccountNotFound { .. }
            | LedgerError::TransactionNotFound { .. }
            | LedgerError::EmployeeNotFound { .. }
            | LedgerError::RecordNotFound { .. } => ErrorKind::NotFound,
            LedgerError::InvalidState { .. } | LedgerError::RecordNotPending { .. } => {
                ErrorKind::InvalidState
            }
            LedgerError::InvalidAmount { .. }
            | LedgerError::Validation { .. }
            | LedgerError::InsufficientFunds { .. }
            | LedgerError::TransferLimitExceeded { .. }
            | LedgerError::AllotmentExceeded { .. }
            | LedgerError::RewardLimitReached { .. }
            | LedgerError::DuplicateTransaction { .. } => ErrorKind::Validation,
            LedgerError::LockTimeout { .. }
            | LedgerError::ArithmeticOverflow { .. }
            | LedgerError::Storage { .. } => ErrorKind::Storage,
            LedgerError::Config { .. } | LedgerError::Io { .. } | LedgerError::Parse { .. } => {
                ErrorKind::Infrastructure
            }
        }
    }

    /// Whether the failed operation can be retried as a whole
    ///
    /// Only lock timeouts qualify: the unit of work rolled back and a retry
    /// re-validates pending status before mutating anything.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::LockTimeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn id(n: u128) -> Uuid {
        Uuid::from_u128(n)
    }

    #[rstest]
    #[case::account_not_found(
        LedgerError::account_not_found(id(1)),
        "Account 00000000-0000-0000-0000-000000000001 not found"
    )]
    #[case::invalid_state(
        LedgerError::invalid_state(id(2), TransactionStatus::Posted),
        "Transaction 00000000-0000-0000-0000-000000000002 is not pending (status: posted)"
    )]
    #[case::record_not_pending(
        LedgerError::record_not_pending("Wellness submission", id(3), "approved"),
        "Wellness submission 00000000-0000-0000-0000-000000000003 is not pending (approved)"
    )]
    #[case::invalid_amount(
        LedgerError::invalid_amount(Decimal::new(-5, 0)),
        "Invalid amount -5: amounts must be greater than zero"
    )]
    #[case::insufficient_funds(
        LedgerError::insufficient_funds(id(4), Decimal::new(1000, 2), Decimal::new(2500, 2)),
        "Insufficient funds in account 00000000-0000-0000-0000-000000000004: available 10.00, requested 25.00"
    )]
    #[case::parse_with_line(
        LedgerError::Parse { line: Some(7), message: "bad field".to_string() },
        "CSV parse error at line 7: bad field"
    )]
    #[case::parse_without_line(
        LedgerError::Parse { line: None, message: "bad field".to_string() },
        "CSV parse error: bad field"
    )]
    fn test_error_display(#[case] error: LedgerError, #[case] expected: &str) {
        assert_eq!(error.to_string(), expected);
    }

    #[rstest]
    #[case::not_found(LedgerError::transaction_not_found(id(1)), ErrorKind::NotFound)]
    #[case::employee(LedgerError::employee_not_found("a@b.c"), ErrorKind::NotFound)]
    #[case::invalid_state(
        LedgerError::invalid_state(id(1), TransactionStatus::Rejected),
        ErrorKind::InvalidState
    )]
    #[case::validation(LedgerError::validation("nope"), ErrorKind::Validation)]
    #[case::limit(LedgerError::reward_limit_reached(id(1), 3), ErrorKind::Validation)]
    #[case::allotment(
        LedgerError::allotment_exceeded(id(1), Decimal::TEN, Decimal::TEN, Decimal::ONE),
        ErrorKind::Validation
    )]
    #[case::lock_timeout(LedgerError::lock_timeout("row"), ErrorKind::Storage)]
    #[case::config(LedgerError::config("bad"), ErrorKind::Infrastructure)]
    fn test_error_kind(#[case] error: LedgerError, #[case] expected: ErrorKind) {
        assert_eq!(error.kind(), expected);
    }

    #[test]
    fn test_only_lock_timeout_is_retryable() {
        assert!(LedgerError::lock_timeout("transaction").is_retryable());
        assert!(!LedgerError::storage("disk").is_retryable());
        assert!(!LedgerError::invalid_state(id(1), TransactionStatus::Posted).is_retryable());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "Permission denied");
        let error: LedgerError = io_error.into();
        assert!(matches!(error, LedgerError::Io { .. }));
        assert_eq!(error.to_string(), "I/O error: Permission denied");
    }
}
