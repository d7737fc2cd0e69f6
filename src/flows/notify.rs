//! Notification boundary
//!
//! Flows report completed coin movements through a [`Notifier`]. They call
//! it only after their unit of work has committed, so a notification always
//! describes something that happened. Delivery (email, chat) lives outside
//! this crate; the default [`LogNotifier`] writes a `tracing` event.

use parking_lot::Mutex;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::types::{EmployeeId, TransactionId};

/// A committed event worth telling an employee about
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    AwardReceived {
        recipient: EmployeeId,
        manager: EmployeeId,
        amount: Decimal,
        transaction: TransactionId,
    },
    TransferReceived {
        recipient: EmployeeId,
        sender: EmployeeId,
        amount: Decimal,
        transfer: Uuid,
    },
    WellnessApproved {
        employee: EmployeeId,
        submission: Uuid,
        amount: Decimal,
    },
    WellnessRejected {
        employee: EmployeeId,
        submission: Uuid,
        reason: Option<String>,
    },
    PurchaseFulfilled {
        employee: EmployeeId,
        order: Uuid,
        product: String,
        tracking_number: Option<String>,
    },
}

impl Notification {
    /// The employee the notification is addressed to
    pub fn recipient(&self) -> EmployeeId {
        match self {
            Notification::AwardReceived { recipient, .. }
            | Notification::TransferReceived { recipient, .. } => *recipient,
            Notification::WellnessApproved { employee, .. }
            | Notification::WellnessRejected { employee, .. }
            | Notification::PurchaseFulfilled { employee, .. } => *employee,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Notification::AwardReceived { .. } => "award_received",
            Notification::TransferReceived { .. } => "transfer_received",
            Notification::WellnessApproved { .. } => "wellness_approved",
            Notification::WellnessRejected { .. } => "wellness_rejected",
            Notification::PurchaseFulfilled { .. } => "purchase_fulfilled",
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification);
}

/// Emits every notification as an `info` event
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: &Notification) {
        tracing::info!(
            kind = notification.kind(),
            recipient = %notification.recipient(),
            detail = ?notification,
            "notification"
        );
    }
}

/// Keeps notifications in memory, in delivery order
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().clone()
    }
}

impl Notifier for MemoryNotifier {
    fn notify(&self, notification: &Notification) {
        self.sent.lock().push(notification.clone());
    }
}
