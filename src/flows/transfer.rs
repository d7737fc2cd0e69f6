//! Peer-to-peer transfers
//!
//! A transfer is a pair of ledger rows: a `peer_transfer_sent` debit on the
//! sender and a `peer_transfer_received` credit on the recipient. The pair is
//! always created, posted or rejected together in one unit of work, and the
//! sent row is always locked first.
//!
//! # Limits
//!
//! Every transfer must fit in the sender's spendable balance and in the
//! remaining monthly allowance. The allowance covers the current UTC
//! calendar month and counts every sent transfer that was not rejected.
//! Checks run under the sender's spend lock, which is held until the
//! pending rows are committed.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use super::directory::EmployeeDirectory;
use super::locks::KeyedLocks;
use super::notify::{Notification, Notifier};
use crate::core::{LedgerStore, TransactionRepository, TransactionService, UnitOfWork};
use crate::types::{
    AccountId, Employee, EmployeeId, LedgerError, NewTransaction, TransactionStatus,
    TransactionType,
};

pub type TransferId = Uuid;

/// Default monthly allowance per sender
pub const DEFAULT_MONTHLY_LIMIT: Decimal = Decimal::from_parts(500, 0, 0, false, 0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Pending,
    Completed,
    Cancelled,
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransferStatus::Pending => "pending",
            TransferStatus::Completed => "completed",
            TransferStatus::Cancelled => "cancelled",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerTransfer {
    pub id: TransferId,
    pub sender_id: EmployeeId,
    pub recipient_id: EmployeeId,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub message: Option<String>,
    pub status: TransferStatus,
    pub sent_transaction_id: Uuid,
    pub received_transaction_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Monthly allowance of a sender
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferLimits {
    #[serde(with = "rust_decimal::serde::float")]
    pub max_amount: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub used_amount: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub remaining: Decimal,
    pub period_start: DateTime<Utc>,

    /// Exclusive
    pub period_end: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferPolicy {
    pub monthly_limit: Decimal,
}

impl Default for TransferPolicy {
    fn default() -> Self {
        Self {
            monthly_limit: DEFAULT_MONTHLY_LIMIT,
        }
    }
}

/// First instant of the UTC month containing `now`, and of the month after
pub fn month_bounds(now: DateTime<Utc>) -> Result<(DateTime<Utc>, DateTime<Utc>), LedgerError> {
    let (next_year, next_month) = if now.month() == 12 {
        (now.year() + 1, 1)
    } else {
        (now.year(), now.month() + 1)
    };

    let start = NaiveDate::from_ymd_opt(now.year(), now.month(), 1);
    let end = NaiveDate::from_ymd_opt(next_year, next_month, 1);
    match (
        start.and_then(|d| d.and_hms_opt(0, 0, 0)),
        end.and_then(|d| d.and_hms_opt(0, 0, 0)),
    ) {
        (Some(start), Some(end)) => Ok((start.and_utc(), end.and_utc())),
        _ => Err(LedgerError::validation(format!(
            "no calendar month for {}",
            now
        ))),
    }
}

pub struct TransferFlow<S: LedgerStore> {
    ledger: TransactionService<S>,
    directory: Arc<EmployeeDirectory>,
    notifier: Arc<dyn Notifier>,
    spend_locks: Arc<KeyedLocks<AccountId>>,
    policy: TransferPolicy,
    transfers: Arc<DashMap<TransferId, PeerTransfer>>,
}

impl<S: LedgerStore> TransferFlow<S> {
    pub fn new(
        ledger: TransactionService<S>,
        directory: Arc<EmployeeDirectory>,
        notifier: Arc<dyn Notifier>,
        spend_locks: Arc<KeyedLocks<AccountId>>,
        policy: TransferPolicy,
    ) -> Self {
        Self {
            ledger,
            directory,
            notifier,
            spend_locks,
            policy,
            transfers: Arc::new(DashMap::new()),
        }
    }

    pub fn policy(&self) -> TransferPolicy {
        self.policy
    }

    /// Create a pending transfer
    ///
    /// # Errors
    ///
    /// * `EmployeeNotFound` - Unknown sender or recipient
    /// * `InvalidAmount` - Non-positive amount
    /// * `Validation` - Sender and recipient are the same employee
    /// * `InsufficientFunds` - Amount exceeds the sender's spendable balance
    /// * `TransferLimitExceeded` - Amount exceeds the remaining monthly allowance
    pub fn initiate(
        &self,
        sender_id: EmployeeId,
        recipient_email: &str,
        amount: Decimal,
        message: Option<String>,
    ) -> Result<PeerTransfer, LedgerError> {
        let (sender, recipient) = self.parties(sender_id, recipient_email, amount)?;
        let _spend = self.spend_locks.acquire(sender.account_id)?;
        self.check_funds(&sender, amount)?;

        let mut unit = self.ledger.begin();
        let transfer = self.stage_pending(&mut unit, &sender, &recipient, amount, message)?;
        self.stage_record(&mut unit, transfer.clone());
        unit.commit()?;

        tracing::info!(
            transfer = %transfer.id,
            sender = %sender.id,
            recipient = %recipient.id,
            amount = %amount,
            "transfer initiated"
        );
        Ok(transfer)
    }

    /// Create and complete a transfer in one unit of work
    pub fn send(
        &self,
        sender_id: EmployeeId,
        recipient_email: &str,
        amount: Decimal,
        message: Option<String>,
    ) -> Result<PeerTransfer, LedgerError> {
        let (sender, recipient) = self.parties(sender_id, recipient_email, amount)?;
        let _spend = self.spend_locks.acquire(sender.account_id)?;
        self.check_funds(&sender, amount)?;

        let mut unit = self.ledger.begin();
        let mut transfer = self.stage_pending(&mut unit, &sender, &recipient, amount, message)?;
        self.ledger
            .post_transaction_in(&mut unit, transfer.sent_transaction_id)?;
        self.ledger
            .post_transaction_in(&mut unit, transfer.received_transaction_id)?;
        transfer.status = TransferStatus::Completed;
        transfer.completed_at = Some(Utc::now());
        self.stage_record(&mut unit, transfer.clone());
        unit.commit()?;

        tracing::info!(
            transfer = %transfer.id,
            sender = %sender.id,
            recipient = %recipient.id,
            amount = %amount,
            "transfer sent"
        );
        self.notify_received(&transfer);
        Ok(transfer)
    }

    /// Post both rows of a pending transfer
    pub fn complete(&self, transfer_id: TransferId) -> Result<PeerTransfer, LedgerError> {
        let mut transfer = self.pending_transfer(transfer_id)?;

        let mut unit = self.ledger.begin();
        self.ledger
            .post_transaction_in(&mut unit, transfer.sent_transaction_id)?;
        self.ledger
            .post_transaction_in(&mut unit, transfer.received_transaction_id)?;
        transfer.status = TransferStatus::Completed;
        transfer.completed_at = Some(Utc::now());
        self.stage_record(&mut unit, transfer.clone());
        unit.commit()?;

        tracing::info!(transfer = %transfer.id, "transfer completed");
        self.notify_received(&transfer);
        Ok(transfer)
    }

    /// Reject both rows of a pending transfer; only the sender may cancel
    pub fn cancel(
        &self,
        transfer_id: TransferId,
        by_employee: EmployeeId,
    ) -> Result<PeerTransfer, LedgerError> {
        let mut transfer = self.pending_transfer(transfer_id)?;
        if transfer.sender_id != by_employee {
            return Err(LedgerError::validation(
                "only the sender can cancel a transfer",
            ));
        }

        let reason = Some("Cancelled by sender");
        let mut unit = self.ledger.begin();
        self.ledger
            .reject_transaction_in(&mut unit, transfer.sent_transaction_id, reason)?;
        self.ledger
            .reject_transaction_in(&mut unit, transfer.received_transaction_id, reason)?;
        transfer.status = TransferStatus::Cancelled;
        transfer.completed_at = Some(Utc::now());
        self.stage_record(&mut unit, transfer.clone());
        unit.commit()?;

        tracing::info!(transfer = %transfer.id, "transfer cancelled");
        Ok(transfer)
    }

    /// Allowance of the sender for the current UTC month
    pub fn limits(&self, sender_id: EmployeeId) -> Result<TransferLimits, LedgerError> {
        self.limits_at(sender_id, Utc::now())
    }

    /// Allowance of the sender for the UTC month containing `now`
    pub fn limits_at(
        &self,
        sender_id: EmployeeId,
        now: DateTime<Utc>,
    ) -> Result<TransferLimits, LedgerError> {
        let sender = self.directory.require(sender_id)?;
        let (period_start, period_end) = month_bounds(now)?;

        let used_amount: Decimal = self
            .ledger
            .store()
            .transactions_for(sender.account_id)
            .iter()
            .filter(|tx| {
                tx.transaction_type == TransactionType::PeerTransferSent
                    && tx.status != TransactionStatus::Rejected
                    && tx.created_at >= period_start
                    && tx.created_at < period_end
            })
            .map(|tx| tx.amount)
            .sum();

        let max_amount = self.policy.monthly_limit;
        Ok(TransferLimits {
            max_amount,
            used_amount,
            remaining: (max_amount - used_amount).max(Decimal::ZERO),
            period_start,
            period_end,
        })
    }

    pub fn get(&self, transfer_id: TransferId) -> Option<PeerTransfer> {
        self.transfers
            .get(&transfer_id)
            .map(|entry| entry.value().clone())
    }

    /// Pending transfers the employee sends or receives, newest first
    pub fn pending_for(&self, employee_id: EmployeeId) -> Vec<PeerTransfer> {
        self.involving(employee_id, |transfer| {
            transfer.status == TransferStatus::Pending
        })
    }

    /// Every transfer the employee sent or received, newest first
    pub fn history_for(&self, employee_id: EmployeeId) -> Vec<PeerTransfer> {
        self.involving(employee_id, |_| true)
    }

    // Helper functions

    fn involving(
        &self,
        employee_id: EmployeeId,
        keep: impl Fn(&PeerTransfer) -> bool,
    ) -> Vec<PeerTransfer> {
        let mut transfers: Vec<PeerTransfer> = self
            .transfers
            .iter()
            .map(|entry| entry.value().clone())
            .filter(|transfer| {
                (transfer.sender_id == employee_id || transfer.recipient_id == employee_id)
                    && keep(transfer)
            })
            .collect();
        transfers.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        transfers
    }

    fn parties(
        &self,
        sender_id: EmployeeId,
        recipient_email: &str,
        amount: Decimal,
    ) -> Result<(Employee, Employee), LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::invalid_amount(amount));
        }
        let sender = self.directory.require(sender_id)?;
        let recipient = self.directory.require_email(recipient_email)?;
        if sender.id == recipient.id {
            return Err(LedgerError::validation("cannot transfer coins to yourself"));
        }
        Ok((sender, recipient))
    }

    fn check_funds(&self, sender: &Employee, amount: Decimal) -> Result<(), LedgerError> {
        let available = self.ledger.spendable_balance(sender.account_id)?;
        if amount > available {
            return Err(LedgerError::insufficient_funds(
                sender.account_id,
                available,
                amount,
            ));
        }

        let limits = self.limits(sender.id)?;
        if amount > limits.remaining {
            return Err(LedgerError::transfer_limit_exceeded(
                sender.id,
                limits.max_amount,
                limits.used_amount,
                amount,
            ));
        }
        Ok(())
    }

    fn stage_pending(
        &self,
        unit: &mut S::Unit,
        sender: &Employee,
        recipient: &Employee,
        amount: Decimal,
        message: Option<String>,
    ) -> Result<PeerTransfer, LedgerError> {
        let sent = self.ledger.create_pending_transaction_in(
            unit,
            NewTransaction::new(sender.account_id, TransactionType::PeerTransferSent, amount)
                .with_description(
                    message
                        .clone()
                        .unwrap_or_else(|| format!("Transfer to {}", recipient.name)),
                )
                .with_source_employee(sender.id)
                .with_target_employee(recipient.id),
        )?;
        let received = self.ledger.create_pending_transaction_in(
            unit,
            NewTransaction::new(
                recipient.account_id,
                TransactionType::PeerTransferReceived,
                amount,
            )
            .with_description(
                message
                    .clone()
                    .unwrap_or_else(|| format!("Transfer from {}", sender.name)),
            )
            .with_source_employee(sender.id)
            .with_target_employee(recipient.id),
        )?;

        Ok(PeerTransfer {
            id: Uuid::new_v4(),
            sender_id: sender.id,
            recipient_id: recipient.id,
            amount,
            message,
            status: TransferStatus::Pending,
            sent_transaction_id: sent.id,
            received_transaction_id: received.id,
            created_at: sent.created_at,
            completed_at: None,
        })
    }

    fn stage_record(&self, unit: &mut S::Unit, transfer: PeerTransfer) {
        let transfers = Arc::clone(&self.transfers);
        unit.defer(Box::new(move || {
            transfers.insert(transfer.id, transfer);
        }));
    }

    fn pending_transfer(&self, transfer_id: TransferId) -> Result<PeerTransfer, LedgerError> {
        let transfer = self
            .get(transfer_id)
            .ok_or_else(|| LedgerError::record_not_found("transfer", transfer_id))?;
        if transfer.status != TransferStatus::Pending {
            return Err(LedgerError::record_not_pending(
                "transfer",
                transfer_id,
                transfer.status,
            ));
        }
        Ok(transfer)
    }

    fn notify_received(&self, transfer: &PeerTransfer) {
        self.notifier.notify(&Notification::TransferReceived {
            recipient: transfer.recipient_id,
            sender: transfer.sender_id,
            amount: transfer.amount,
            transfer: transfer.id,
        });
    }
}
