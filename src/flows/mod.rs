//! Business flows built on the transaction service
//!
//! - `directory` - Employee provisioning and lookup
//! - `award` - Manager awards with monthly allotments (create and post in one unit)
//! - `transfer` - Paired peer transfers with monthly limits
//! - `wellness` - Task submissions, approvals with reward caps, rejections
//! - `purchase` - Store catalog, purchases and fulfilment
//! - `notify` - Notifications emitted after commit
//! - `locks` - Keyed mutexes serializing spend checks, awards and task reviews

pub mod award;
pub mod directory;
pub mod locks;
pub mod notify;
pub mod purchase;
pub mod transfer;
pub mod wellness;

pub use award::{AwardFlow, AwardHistory, AwardPolicy, ManagerAllotment};
pub use directory::EmployeeDirectory;
pub use locks::{KeyedGuard, KeyedLocks};
pub use notify::{LogNotifier, MemoryNotifier, Notification, Notifier};
pub use purchase::{
    usd_to_guincoin, OrderId, ProductId, ProductSource, PurchaseFlow, PurchaseOrder, PurchaseStatus,
    StoreProduct,
};
pub use transfer::{
    PeerTransfer, TransferFlow, TransferId, TransferLimits, TransferPolicy, TransferStatus,
};
pub use wellness::{
    SubmissionStatus, SubmissionStore, TaskId, WellnessFlow, WellnessSubmission, WellnessTask,
    REWARD_CAP_REASON,
};
