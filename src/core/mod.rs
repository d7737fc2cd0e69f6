//! Core ledger module
//!
//! This module contains the ledger and its storage:
//! - `traits` - Repository, unit-of-work and directory abstractions
//! - `service` - The transaction service (create, post, reject, queries)
//! - `account_store` - Concurrent account balances with atomic increments
//! - `transaction_store` - Concurrent ledger rows and row locks
//! - `unit_of_work` - Staged, all-or-nothing writes over the stores
//! - `memory` - The in-memory `LedgerStore`

pub mod account_store;
pub mod memory;
pub mod service;
pub mod traits;
pub mod transaction_store;
pub mod unit_of_work;

pub use account_store::AccountStore;
pub use memory::{MemoryLedgerStore, DEFAULT_LOCK_TIMEOUT};
pub use service::TransactionService;
pub use traits::{
    AccountRepository, LedgerStore, NoDirectory, RecordDirectory, TransactionRepository,
    UnitOfWork,
};
pub use transaction_store::TransactionStore;
pub use unit_of_work::MemoryUnitOfWork;
