//! Query shapes returned by the transaction service
//!
//! These are the read-only views behind the balance, history and pending
//! endpoints. Amounts serialize as plain JSON numbers.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::employee::EmployeeSummary;
use super::transaction::{LedgerTransaction, SubmissionId, TransactionStatus, TransactionType};

/// Page size used when a history query does not specify one
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Effective balance of an account
///
/// `total` always equals `posted + pending`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccountBalance {
    /// Persisted balance, reflecting posted transactions only
    #[serde(with = "rust_decimal::serde::float")]
    pub posted: Decimal,

    /// Signed sum of pending transactions, or zero when not requested
    #[serde(with = "rust_decimal::serde::float")]
    pub pending: Decimal,

    #[serde(with = "rust_decimal::serde::float")]
    pub total: Decimal,
}

impl AccountBalance {
    pub fn new(posted: Decimal, pending: Decimal) -> Self {
        Self {
            posted,
            pending,
            total: posted + pending,
        }
    }
}

/// Filters and paging for a transaction history query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryQuery {
    /// Page size; `None` or `Some(0)` means the service default
    pub limit: Option<usize>,

    /// Number of matching rows to skip
    pub offset: usize,

    pub status: Option<TransactionStatus>,

    pub transaction_type: Option<TransactionType>,
}

impl HistoryQuery {
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_status(mut self, status: TransactionStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_type(mut self, transaction_type: TransactionType) -> Self {
        self.transaction_type = Some(transaction_type);
        self
    }

    /// Whether a row passes the status and type filters
    pub fn matches(&self, transaction: &LedgerTransaction) -> bool {
        self.status.map_or(true, |status| transaction.status == status)
            && self
                .transaction_type
                .map_or(true, |ty| transaction.transaction_type == ty)
    }
}

/// Wellness submission fields shown next to a pending reward
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionSummary {
    pub id: SubmissionId,
    pub status: String,
    pub task_name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub coin_value: Decimal,
}

/// A ledger row joined with display context
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionView {
    #[serde(flatten)]
    pub transaction: LedgerTransaction,

    pub source_employee: Option<EmployeeSummary>,

    pub wellness_submission: Option<SubmissionSummary>,
}

/// One page of transaction history
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionPage {
    pub transactions: Vec<TransactionView>,

    /// Number of rows matching the filters, before paging
    pub total: usize,

    pub limit: usize,
    pub offset: usize,
}
