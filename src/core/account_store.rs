//! Thread-safe account storage
//!
//! This module provides the `AccountStore` struct, which holds every account
//! balance using concurrent data structures to enable safe multi-threaded
//! access.
//!
//! # Design
//!
//! The `AccountStore` uses `DashMap` (a concurrent HashMap) with fine-grained
//! locking. Accounts of different employees can be read and updated
//! concurrently; updates to the same account are serialized by the map's
//! shard lock.
//!
//! # Balance Mutation
//!
//! Balances change only through [`AccountStore::increment`], an atomic
//! "add N" performed while holding the entry lock. There is no
//! read-modify-write at the caller, so concurrent increments are never lost.
//!
//! # Commit Gates
//!
//! Each account has a `RwLock<()>` gate. A committing unit holds the gates
//! of every account it touches for writing while it applies increments and
//! row images; a balance reader holds one for reading while it reads the
//! account and its rows. Readers never observe half of a commit.

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard};
use parking_lot::{RawRwLock, RwLock};
use rust_decimal::Decimal;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::types::{Account, AccountId, EmployeeId, LedgerError};

/// Shared hold on an account's commit gate
pub type GateReadGuard = ArcRwLockReadGuard<RawRwLock, ()>;

/// Exclusive hold on an account's commit gate
pub type GateWriteGuard = ArcRwLockWriteGuard<RawRwLock, ()>;

/// Thread-safe account state store
#[derive(Debug, Default)]
pub struct AccountStore {
    /// Accounts by id
    accounts: DashMap<AccountId, Account>,

    /// One account per employee
    by_employee: DashMap<EmployeeId, AccountId>,

    /// Commit gates by account, created on first use
    gates: DashMap<AccountId, Arc<RwLock<()>>>,
}

impl AccountStore {
    /// Create a new empty AccountStore
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the employee's account, creating it if it doesn't exist
    ///
    /// If multiple threads provision the same employee simultaneously, only
    /// one account is created and all of them receive it.
    pub fn get_or_create(&self, employee_id: EmployeeId) -> Account {
        let account_id = *self
            .by_employee
            .entry(employee_id)
            .or_insert_with(|| {
                let account = Account::new(employee_id);
                let id = account.id;
                self.accounts.insert(id, account);
                id
            })
            .value();

        self.get(account_id)
            .unwrap_or_else(|| Account::new(employee_id))
    }

    /// Get a snapshot of an account
    pub fn get(&self, account_id: AccountId) -> Option<Account> {
        self.accounts
            .get(&account_id)
            .map(|entry| entry.value().clone())
    }

    /// Get the account owned by an employee
    pub fn for_employee(&self, employee_id: EmployeeId) -> Option<Account> {
        let account_id = *self.by_employee.get(&employee_id)?.value();
        self.get(account_id)
    }

    /// Whether an account exists
    pub fn contains(&self, account_id: AccountId) -> bool {
        self.accounts.contains_key(&account_id)
    }

    /// Atomically add `delta` to an account balance
    ///
    /// # Returns
    ///
    /// * `Ok(Decimal)` - The balance after the increment
    /// * `Err(LedgerError::AccountNotFound)` - If the account doesn't exist
    /// * `Err(LedgerError::ArithmeticOverflow)` - If the result leaves the decimal range
    pub fn increment(&self, account_id: AccountId, delta: Decimal) -> Result<Decimal, LedgerError> {
        let mut entry = self
            .accounts
            .get_mut(&account_id)
            .ok_or_else(|| LedgerError::account_not_found(account_id))?;

        let account = entry.value_mut();
        account.balance = account
            .balance
            .checked_add(delta)
            .ok_or_else(|| LedgerError::arithmetic_overflow(account_id))?;
        account.updated_at = Utc::now();

        Ok(account.balance)
    }

    fn gate(&self, account_id: AccountId) -> Arc<RwLock<()>> {
        Arc::clone(self.gates.entry(account_id).or_default().value())
    }

    /// Hold an account's gate for reading
    ///
    /// Blocks while a unit touching the account is committing.
    pub fn read_gate(&self, account_id: AccountId) -> GateReadGuard {
        self.gate(account_id).read_arc()
    }

    /// Hold the gates of `account_ids` for writing, in ascending id order
    ///
    /// Every committer acquires in the same order, so two commits over
    /// overlapping accounts cannot deadlock.
    pub fn write_gates(&self, account_ids: &BTreeSet<AccountId>) -> Vec<GateWriteGuard> {
        account_ids
            .iter()
            .map(|account_id| self.gate(*account_id).write_arc())
            .collect()
    }

    /// Snapshot of all accounts, in arbitrary order
    pub fn all(&self) -> Vec<Account> {
        self.accounts
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Number of accounts
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use uuid::Uuid;

    #[test]
    fn test_get_or_create_creates_zero_balance_account() {
        let store = AccountStore::new();
        let employee = Uuid::new_v4();

        let account = store.get_or_create(employee);

        assert_eq!(account.employee_id, employee);
        assert_eq!(account.balance, Decimal::ZERO);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_get_or_create_returns_existing_account() {
        let store = AccountStore::new();
        let employee = Uuid::new_v4();

        let first = store.get_or_create(employee);
        store.increment(first.id, Decimal::new(25, 0)).unwrap();
        let second = store.get_or_create(employee);

        assert_eq!(first.id, second.id);
        assert_eq!(second.balance, Decimal::new(25, 0));
        assert_eq!(store.for_employee(employee).unwrap().id, first.id);
    }

    #[test]
    fn test_increment_unknown_account() {
        let store = AccountStore::new();
        let missing = Uuid::new_v4();

        let result = store.increment(missing, Decimal::ONE);

        assert_eq!(result, Err(LedgerError::account_not_found(missing)));
    }

    #[test]
    fn test_increment_rejects_overflow_and_keeps_balance() {
        let store = AccountStore::new();
        let account = store.get_or_create(Uuid::new_v4());
        store.increment(account.id, Decimal::MAX).unwrap();

        let result = store.increment(account.id, Decimal::MAX);

        assert_eq!(result, Err(LedgerError::arithmetic_overflow(account.id)));
        assert_eq!(store.get(account.id).unwrap().balance, Decimal::MAX);
    }

    #[test]
    fn test_increment_accepts_negative_delta() {
        let store = AccountStore::new();
        let account = store.get_or_create(Uuid::new_v4());

        store.increment(account.id, Decimal::new(100, 0)).unwrap();
        let balance = store.increment(account.id, Decimal::new(-30, 0)).unwrap();

        assert_eq!(balance, Decimal::new(70, 0));
    }

    #[test]
    fn test_concurrent_get_or_create_same_employee() {
        let store = Arc::new(AccountStore::new());
        let employee = Uuid::new_v4();
        let mut handles = vec![];

        for _ in 0..10 {
            let store_clone = Arc::clone(&store);
            handles.push(thread::spawn(move || store_clone.get_or_create(employee).id));
        }

        let ids: Vec<AccountId> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(store.len(), 1);
        assert!(ids.iter().all(|id| *id == ids[0]));
    }

    #[test]
    fn test_concurrent_increments_same_account() {
        let store = Arc::new(AccountStore::new());
        let account = store.get_or_create(Uuid::new_v4());
        let mut handles = vec![];

        // 100 threads, each adding 1.00
        for _ in 0..100 {
            let store_clone = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                store_clone.increment(account.id, Decimal::new(100, 2)).unwrap();
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.get(account.id).unwrap().balance, Decimal::new(100, 0));
    }

    #[test]
    fn test_reader_waits_for_held_write_gate() {
        let store = Arc::new(AccountStore::new());
        let account = store.get_or_create(Uuid::new_v4());
        let gates = store.write_gates(&BTreeSet::from([account.id]));

        let store_clone = Arc::clone(&store);
        let reader = thread::spawn(move || {
            let _gate = store_clone.read_gate(account.id);
            store_clone.get(account.id).unwrap().balance
        });

        thread::sleep(std::time::Duration::from_millis(20));
        store.increment(account.id, Decimal::new(5, 0)).unwrap();
        assert!(!reader.is_finished());
        drop(gates);

        assert_eq!(reader.join().unwrap(), Decimal::new(5, 0));
    }

    #[test]
    fn test_write_gates_over_shared_accounts_do_not_deadlock() {
        let store = Arc::new(AccountStore::new());
        let first = store.get_or_create(Uuid::new_v4()).id;
        let second = store.get_or_create(Uuid::new_v4()).id;
        let mut handles = vec![];

        for _ in 0..8 {
            let store_clone = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    let _gates = store_clone.write_gates(&BTreeSet::from([second, first]));
                    store_clone.increment(first, Decimal::ONE).unwrap();
                    store_clone.increment(second, Decimal::ONE).unwrap();
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.get(first).unwrap().balance, Decimal::new(800, 0));
        assert_eq!(store.get(second).unwrap().balance, Decimal::new(800, 0));
    }
}
