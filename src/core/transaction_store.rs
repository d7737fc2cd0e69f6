//! Thread-safe storage of ledger transaction rows
//!
//! This module provides the `TransactionStore` struct, which keeps every
//! committed ledger row, a per-account index for history queries, and a
//! table of row locks used by units of work.
//!
//! # Design
//!
//! Rows live in a `DashMap` keyed by transaction id. The per-account index
//! records ids in commit order so history can be served without scanning
//! the whole ledger.
//!
//! # Row Locks
//!
//! Each row has an associated `parking_lot::Mutex<()>` created on first use.
//! The mutex guards nothing by itself; a unit of work holds it for as long as
//! it may transition the row, which serializes posting and rejection of the
//! same transaction across threads.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::types::{AccountId, LedgerTransaction, TransactionId};

/// Shared handle to the lock of one transaction row
pub type RowLock = Arc<Mutex<()>>;

/// Thread-safe store of committed ledger rows
#[derive(Debug, Default)]
pub struct TransactionStore {
    rows: DashMap<TransactionId, LedgerTransaction>,

    /// Transaction ids per account, in commit order
    by_account: DashMap<AccountId, Vec<TransactionId>>,

    locks: DashMap<TransactionId, RowLock>,
}

impl TransactionStore {
    /// Create a new empty TransactionStore
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a row image, inserting it or replacing the previous one
    ///
    /// The account index is only extended the first time an id is written.
    pub fn put(&self, transaction: LedgerTransaction) {
        let id = transaction.id;
        let account_id = transaction.account_id;

        if self.rows.insert(id, transaction).is_none() {
            self.by_account.entry(account_id).or_default().push(id);
        }
    }

    /// Get a snapshot of a row
    pub fn get(&self, transaction_id: TransactionId) -> Option<LedgerTransaction> {
        self.rows
            .get(&transaction_id)
            .map(|entry| entry.value().clone())
    }

    pub fn contains(&self, transaction_id: TransactionId) -> bool {
        self.rows.contains_key(&transaction_id)
    }

    /// All rows of an account, newest first
    ///
    /// Rows with equal creation time are returned in reverse commit order.
    pub fn for_account(&self, account_id: AccountId) -> Vec<LedgerTransaction> {
        let ids: Vec<TransactionId> = match self.by_account.get(&account_id) {
            Some(entry) => entry.value().iter().rev().copied().collect(),
            None => return Vec::new(),
        };

        let mut rows: Vec<LedgerTransaction> =
            ids.into_iter().filter_map(|id| self.get(id)).collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows
    }

    /// The lock handle of a row, created on first use
    pub fn row_lock(&self, transaction_id: TransactionId) -> RowLock {
        Arc::clone(self.locks.entry(transaction_id).or_default().value())
    }

    /// Number of stored rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
