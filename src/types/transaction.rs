//! Ledger transaction types
//!
//! This module defines the transaction categories, the lifecycle status, and
//! the stored ledger row used throughout the system.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::account::{AccountId, EmployeeId};
use super::error::LedgerError;

/// Ledger transaction identifier
pub type TransactionId = Uuid;

/// Wellness submission identifier (back-reference only, never owned by the ledger)
pub type SubmissionId = Uuid;

/// Category of a ledger transaction
///
/// The category, not the sign of the amount, decides the direction of the
/// balance change when the transaction is posted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// Coins awarded by a manager (credit)
    ManagerAward,

    /// Sender side of a peer transfer (debit)
    PeerTransferSent,

    /// Recipient side of a peer transfer (credit)
    PeerTransferReceived,

    /// Reward for an approved wellness submission (credit)
    WellnessReward,

    /// Store purchase (debit)
    StorePurchase,

    /// Administrative correction (credit)
    Adjustment,
}

impl TransactionType {
    /// Every transaction type, in declaration order
    pub const ALL: [TransactionType; 6] = [
        TransactionType::ManagerAward,
        TransactionType::PeerTransferSent,
        TransactionType::PeerTransferReceived,
        TransactionType::WellnessReward,
        TransactionType::StorePurchase,
        TransactionType::Adjustment,
    ];

    /// Wire name of the type
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::ManagerAward => "manager_award",
            TransactionType::PeerTransferSent => "peer_transfer_sent",
            TransactionType::PeerTransferReceived => "peer_transfer_received",
            TransactionType::WellnessReward => "wellness_reward",
            TransactionType::StorePurchase => "store_purchase",
            TransactionType::Adjustment => "adjustment",
        }
    }

    /// Whether posting this type increases the balance
    pub fn is_credit(&self) -> bool {
        matches!(
            self,
            TransactionType::ManagerAward
                | TransactionType::PeerTransferReceived
                | TransactionType::WellnessReward
                | TransactionType::Adjustment
        )
    }

    /// Whether posting this type decreases the balance
    pub fn is_debit(&self) -> bool {
        !self.is_credit()
    }

    /// Apply the sign convention to a non-negative amount
    ///
    /// Returns `amount` for credit types and `-amount` for debit types.
    pub fn signed(&self, amount: Decimal) -> Decimal {
        if self.is_credit() {
            amount
        } else {
            -amount
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        TransactionType::ALL
            .into_iter()
            .find(|ty| ty.as_str() == normalized)
            .ok_or_else(|| LedgerError::validation(format!("unknown transaction type '{}'", s)))
    }
}

/// Lifecycle status of a ledger transaction
///
/// `Pending` is the only initial state. `Posted` and `Rejected` are terminal:
/// a transaction reaches exactly one of them, at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Posted,
    Rejected,
}

impl TransactionStatus {
    /// Wire name of the status
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Posted => "posted",
            TransactionStatus::Rejected => "rejected",
        }
    }

    /// Whether no further transition is allowed
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(TransactionStatus::Pending),
            "posted" => Ok(TransactionStatus::Posted),
            "rejected" => Ok(TransactionStatus::Rejected),
            _ => Err(LedgerError::validation(format!(
                "unknown transaction status '{}'",
                s
            ))),
        }
    }
}

/// Input for creating a pending transaction
///
/// Built with [`NewTransaction::new`] and the `with_*` setters.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    /// Owning account
    pub account_id: AccountId,

    /// Category deciding the sign of the balance change
    pub transaction_type: TransactionType,

    /// Non-negative amount; must be strictly positive to be accepted
    pub amount: Decimal,

    pub description: Option<String>,

    /// Employee the coins come from (manager or transfer sender)
    pub source_employee_id: Option<EmployeeId>,

    /// Employee the coins go to
    pub target_employee_id: Option<EmployeeId>,

    /// Originating wellness submission
    pub wellness_submission_id: Option<SubmissionId>,
}

impl NewTransaction {
    pub fn new(account_id: AccountId, transaction_type: TransactionType, amount: Decimal) -> Self {
        Self {
            account_id,
            transaction_type,
            amount,
            description: None,
            source_employee_id: None,
            target_employee_id: None,
            wellness_submission_id: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_optional_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    pub fn with_source_employee(mut self, employee: EmployeeId) -> Self {
        self.source_employee_id = Some(employee);
        self
    }

    pub fn with_target_employee(mut self, employee: EmployeeId) -> Self {
        self.target_employee_id = Some(employee);
        self
    }

    pub fn with_submission(mut self, submission: SubmissionId) -> Self {
        self.wellness_submission_id = Some(submission);
        self
    }
}

/// A row of the append-only ledger
///
/// Everything except `status`, `posted_at`, `reviewed_at` and
/// `rejection_reason` is immutable once the row is created.
///
/// Amounts serialize as plain JSON numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerTransaction {
    pub id: TransactionId,
    pub account_id: AccountId,
    pub transaction_type: TransactionType,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub status: TransactionStatus,
    pub description: Option<String>,
    pub source_employee_id: Option<EmployeeId>,
    pub target_employee_id: Option<EmployeeId>,
    pub wellness_submission_id: Option<SubmissionId>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub posted_at: Option<DateTime<Utc>>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl LedgerTransaction {
    /// Build a fresh pending row from creation input
    pub fn pending(new: NewTransaction) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id: new.account_id,
            transaction_type: new.transaction_type,
            amount: new.amount,
            status: TransactionStatus::Pending,
            description: new.description,
            source_employee_id: new.source_employee_id,
            target_employee_id: new.target_employee_id,
            wellness_submission_id: new.wellness_submission_id,
            rejection_reason: None,
            created_at: Utc::now(),
            posted_at: None,
            reviewed_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == TransactionStatus::Pending
    }

    /// Amount with the type's sign applied
    pub fn signed_amount(&self) -> Decimal {
        self.transaction_type.signed(self.amount)
    }
}
