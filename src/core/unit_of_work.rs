//! In-memory unit of work
//!
//! `MemoryUnitOfWork` stages ledger writes against the in-memory stores and
//! applies them together on commit.
//!
//! # Locking
//!
//! [`UnitOfWork::lock_transaction`] acquires the row lock of a transaction
//! and keeps the guard until the unit is committed or dropped. Acquisition
//! waits at most `lock_timeout`; a unit that cannot get the lock fails with
//! `LockTimeout` instead of blocking forever.
//!
//! # Commit Order
//!
//! 1. The commit gates of every touched account, held for writing.
//! 2. Balance increments, each atomic. If one fails, the increments already
//!    applied are reverted and nothing else is written.
//! 3. Inserted rows.
//! 4. Updated rows. The gates are released here.
//! 5. Deferred caller writes.
//!
//! Steps 3-5 cannot fail. Row locks are released after step 5. Balance
//! readers take the same gates, so they see an account either before
//! step 2 or after step 4.

use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::RawMutex;
use rust_decimal::Decimal;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::account_store::AccountStore;
use super::traits::UnitOfWork;
use super::transaction_store::TransactionStore;
use crate::types::{Account, AccountId, LedgerError, LedgerTransaction, TransactionId};

type RowGuard = ArcMutexGuard<RawMutex, ()>;

/// Unit of work over [`AccountStore`] and [`TransactionStore`]
///
/// Row guards are not `Send`, so a unit stays on the thread that opened it.
pub struct MemoryUnitOfWork {
    accounts: Arc<AccountStore>,
    transactions: Arc<TransactionStore>,
    lock_timeout: Duration,

    /// Row locks held by this unit
    held: HashMap<TransactionId, RowGuard>,

    /// New rows, in insertion order
    inserts: Vec<LedgerTransaction>,

    /// New images of existing rows
    updates: HashMap<TransactionId, LedgerTransaction>,

    increments: Vec<(AccountId, Decimal)>,

    deferred: Vec<Box<dyn FnOnce() + Send>>,
}

impl MemoryUnitOfWork {
    pub(crate) fn new(
        accounts: Arc<AccountStore>,
        transactions: Arc<TransactionStore>,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            accounts,
            transactions,
            lock_timeout,
            held: HashMap::new(),
            inserts: Vec::new(),
            updates: HashMap::new(),
            increments: Vec::new(),
            deferred: Vec::new(),
        }
    }

    /// Whether anything has been staged
    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty()
            && self.updates.is_empty()
            && self.increments.is_empty()
            && self.deferred.is_empty()
    }

    fn staged(&self, transaction_id: TransactionId) -> Option<&LedgerTransaction> {
        self.updates.get(&transaction_id).or_else(|| {
            self.inserts
                .iter()
                .find(|transaction| transaction.id == transaction_id)
        })
    }

    /// Every account whose balance or rows this unit writes
    fn touched_accounts(&self) -> BTreeSet<AccountId> {
        self.increments
            .iter()
            .map(|(account_id, _)| *account_id)
            .chain(self.inserts.iter().map(|transaction| transaction.account_id))
            .chain(self.updates.values().map(|transaction| transaction.account_id))
            .collect()
    }

    fn apply_increments(&self) -> Result<(), LedgerError> {
        for (applied, (account_id, delta)) in self.increments.iter().enumerate() {
            if let Err(err) = self.accounts.increment(*account_id, *delta) {
                tracing::warn!(
                    account = %account_id,
                    %err,
                    reverted = applied,
                    "balance increment failed, reverting unit"
                );
                self.revert_increments(applied)?;
                return Err(err);
            }
        }
        Ok(())
    }

    /// Undo the first `applied` increments, newest first
    ///
    /// A revert that fails leaves a balance no posted row explains; the
    /// affected accounts are logged and reported as a storage error.
    fn revert_increments(&self, applied: usize) -> Result<(), LedgerError> {
        let mut unrecoverable = Vec::new();
        for (account_id, delta) in self.increments[..applied].iter().rev() {
            if let Err(err) = self.accounts.increment(*account_id, -*delta) {
                tracing::error!(
                    account = %account_id,
                    %delta,
                    %err,
                    "failed to revert balance increment"
                );
                unrecoverable.push(account_id.to_string());
            }
        }

        if unrecoverable.is_empty() {
            Ok(())
        } else {
            Err(LedgerError::storage(format!(
                "could not revert balance increments on accounts {}",
                unrecoverable.join(", ")
            )))
        }
    }
}

impl UnitOfWork for MemoryUnitOfWork {
    fn account(&self, account_id: AccountId) -> Option<Account> {
        let mut account = self.accounts.get(account_id)?;
        for (_, delta) in self.increments.iter().filter(|(id, _)| *id == account_id) {
            account.balance += *delta;
        }
        Some(account)
    }

    fn lock_transaction(
        &mut self,
        transaction_id: TransactionId,
    ) -> Result<LedgerTransaction, LedgerError> {
        if let Some(staged) = self.staged(transaction_id) {
            return Ok(staged.clone());
        }

        if !self.held.contains_key(&transaction_id) {
            if !self.transactions.contains(transaction_id) {
                return Err(LedgerError::transaction_not_found(transaction_id));
            }

            let lock = self.transactions.row_lock(transaction_id);
            let guard = lock.try_lock_arc_for(self.lock_timeout).ok_or_else(|| {
                tracing::debug!(
                    transaction = %transaction_id,
                    timeout_ms = self.lock_timeout.as_millis() as u64,
                    "row lock timed out"
                );
                LedgerError::lock_timeout(format!("transaction {}", transaction_id))
            })?;
            self.held.insert(transaction_id, guard);
        }

        // Re-read under the lock
        self.transactions
            .get(transaction_id)
            .ok_or_else(|| LedgerError::transaction_not_found(transaction_id))
    }

    fn insert_transaction(&mut self, transaction: LedgerTransaction) -> Result<(), LedgerError> {
        if !self.accounts.contains(transaction.account_id) {
            return Err(LedgerError::account_not_found(transaction.account_id));
        }
        if self.transactions.contains(transaction.id) || self.staged(transaction.id).is_some() {
            return Err(LedgerError::duplicate_transaction(transaction.id));
        }

        self.inserts.push(transaction);
        Ok(())
    }

    fn update_transaction(&mut self, transaction: LedgerTransaction) -> Result<(), LedgerError> {
        if let Some(inserted) = self
            .inserts
            .iter_mut()
            .find(|staged| staged.id == transaction.id)
        {
            *inserted = transaction;
            return Ok(());
        }

        if !self.held.contains_key(&transaction.id) {
            return Err(LedgerError::storage(format!(
                "transaction {} updated without holding its row lock",
                transaction.id
            )));
        }

        self.updates.insert(transaction.id, transaction);
        Ok(())
    }

    fn increment_balance(
        &mut self,
        account_id: AccountId,
        delta: Decimal,
    ) -> Result<(), LedgerError> {
        if !self.accounts.contains(account_id) {
            return Err(LedgerError::account_not_found(account_id));
        }

        self.increments.push((account_id, delta));
        Ok(())
    }

    fn defer(&mut self, write: Box<dyn FnOnce() + Send>) {
        self.deferred.push(write);
    }

    fn commit(mut self) -> Result<(), LedgerError> {
        {
            let _gates = self.accounts.write_gates(&self.touched_accounts());
            self.apply_increments()?;

            for transaction in self.inserts.drain(..) {
                self.transactions.put(transaction);
            }
            for (_, transaction) in self.updates.drain() {
                self.transactions.put(transaction);
            }
        }

        for write in self.deferred.drain(..) {
            write();
        }

        self.held.clear();
        Ok(())
    }
}

impl fmt::Debug for MemoryUnitOfWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryUnitOfWork")
            .field("held", &self.held.len())
            .field("inserts", &self.inserts.len())
            .field("updates", &self.updates.len())
            .field("increments", &self.increments.len())
            .field("deferred", &self.deferred.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NewTransaction, TransactionStatus, TransactionType};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use uuid::Uuid;

    struct Fixture {
        accounts: Arc<AccountStore>,
        transactions: Arc<TransactionStore>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                accounts: Arc::new(AccountStore::new()),
                transactions: Arc::new(TransactionStore::new()),
            }
        }

        fn unit(&self) -> MemoryUnitOfWork {
            self.unit_with_timeout(Duration::from_millis(500))
        }

        fn unit_with_timeout(&self, timeout: Duration) -> MemoryUnitOfWork {
            MemoryUnitOfWork::new(
                Arc::clone(&self.accounts),
                Arc::clone(&self.transactions),
                timeout,
            )
        }

        fn account(&self) -> Account {
            self.accounts.get_or_create(Uuid::new_v4())
        }
    }

    fn award(account: AccountId, amount: i64) -> LedgerTransaction {
        LedgerTransaction::pending(NewTransaction::new(
            account,
            TransactionType::ManagerAward,
            Decimal::new(amount, 0),
        ))
    }

    #[test]
    fn test_commit_applies_all_writes() {
        let fx = Fixture::new();
        let account = fx.account();
        let tx = award(account.id, 40);
        let id = tx.id;
        let flag = Arc::new(AtomicBool::new(false));
        let flag_clone = Arc::clone(&flag);

        let mut unit = fx.unit();
        unit.insert_transaction(tx).unwrap();
        unit.increment_balance(account.id, Decimal::new(40, 0)).unwrap();
        unit.defer(Box::new(move || flag_clone.store(true, Ordering::SeqCst)));
        unit.commit().unwrap();

        assert!(fx.transactions.contains(id));
        assert_eq!(fx.accounts.get(account.id).unwrap().balance, Decimal::new(40, 0));
        assert!(flag.load(Ordering::SeqCst));
    }

    #[test]
    fn test_drop_without_commit_writes_nothing() {
        let fx = Fixture::new();
        let account = fx.account();
        let tx = award(account.id, 40);
        let id = tx.id;

        {
            let mut unit = fx.unit();
            unit.insert_transaction(tx).unwrap();
            unit.increment_balance(account.id, Decimal::new(40, 0)).unwrap();
        }

        assert!(!fx.transactions.contains(id));
        assert_eq!(fx.accounts.get(account.id).unwrap().balance, Decimal::ZERO);
    }

    #[test]
    fn test_failed_increment_reverts_earlier_increments() {
        let fx = Fixture::new();
        let first = fx.account();
        let second = fx.account();
        fx.accounts.increment(second.id, Decimal::MAX).unwrap();
        let tx = award(first.id, 5);
        let id = tx.id;

        let mut unit = fx.unit();
        unit.insert_transaction(tx).unwrap();
        unit.increment_balance(first.id, Decimal::new(5, 0)).unwrap();
        unit.increment_balance(second.id, Decimal::MAX).unwrap();

        assert_eq!(
            unit.commit(),
            Err(LedgerError::arithmetic_overflow(second.id))
        );
        assert!(!fx.transactions.contains(id));
        assert_eq!(fx.accounts.get(first.id).unwrap().balance, Decimal::ZERO);
        assert_eq!(fx.accounts.get(second.id).unwrap().balance, Decimal::MAX);
    }

    #[test]
    fn test_failed_revert_is_reported_as_storage_error() {
        let fx = Fixture::new();
        let account = fx.account();
        fx.accounts.increment(account.id, Decimal::MIN).unwrap();

        let mut unit = fx.unit();
        unit.increment_balance(account.id, Decimal::new(5, 0)).unwrap();
        let result = unit.revert_increments(1);

        match result {
            Err(LedgerError::Storage { message }) => {
                assert!(message.contains(&account.id.to_string()));
            }
            other => panic!("expected a storage error, got {:?}", other),
        }
        assert_eq!(fx.accounts.get(account.id).unwrap().balance, Decimal::MIN);
    }

    #[test]
    fn test_commit_releases_account_gates() {
        let fx = Fixture::new();
        let account = fx.account();

        let mut unit = fx.unit();
        unit.insert_transaction(award(account.id, 5)).unwrap();
        unit.increment_balance(account.id, Decimal::new(5, 0)).unwrap();
        unit.commit().unwrap();

        let _gates = fx.accounts.write_gates(&BTreeSet::from([account.id]));
        assert_eq!(fx.accounts.get(account.id).unwrap().balance, Decimal::new(5, 0));
    }

    #[test]
    fn test_lock_returns_staged_rows() {
        let fx = Fixture::new();
        let account = fx.account();
        let tx = award(account.id, 10);
        let id = tx.id;

        let mut unit = fx.unit();
        unit.insert_transaction(tx).unwrap();
        let mut staged = unit.lock_transaction(id).unwrap();
        staged.status = TransactionStatus::Posted;
        unit.update_transaction(staged).unwrap();

        assert_eq!(
            unit.lock_transaction(id).unwrap().status,
            TransactionStatus::Posted
        );
        unit.commit().unwrap();
        assert_eq!(fx.transactions.get(id).unwrap().status, TransactionStatus::Posted);
    }

    #[test]
    fn test_account_read_includes_staged_increments() {
        let fx = Fixture::new();
        let account = fx.account();

        let mut unit = fx.unit();
        unit.increment_balance(account.id, Decimal::new(15, 0)).unwrap();

        assert_eq!(unit.account(account.id).unwrap().balance, Decimal::new(15, 0));
        assert_eq!(fx.accounts.get(account.id).unwrap().balance, Decimal::ZERO);
    }

    #[test]
    fn test_lock_unknown_transaction() {
        let fx = Fixture::new();
        let missing = Uuid::new_v4();

        let result = fx.unit().lock_transaction(missing);

        assert_eq!(result, Err(LedgerError::transaction_not_found(missing)));
    }

    #[test]
    fn test_insert_rejects_unknown_account_and_duplicates() {
        let fx = Fixture::new();
        let account = fx.account();
        let tx = award(account.id, 10);
        fx.transactions.put(tx.clone());

        let mut unit = fx.unit();
        assert_eq!(
            unit.insert_transaction(tx.clone()),
            Err(LedgerError::duplicate_transaction(tx.id))
        );

        let orphan = award(Uuid::new_v4(), 10);
        assert_eq!(
            unit.insert_transaction(orphan.clone()),
            Err(LedgerError::account_not_found(orphan.account_id))
        );
    }

    #[test]
    fn test_update_requires_row_lock() {
        let fx = Fixture::new();
        let account = fx.account();
        let tx = award(account.id, 10);
        fx.transactions.put(tx.clone());

        let mut unit = fx.unit();
        let result = unit.update_transaction(tx);

        assert!(matches!(result, Err(LedgerError::Storage { .. })));
    }

    #[test]
    fn test_second_unit_times_out_on_held_row() {
        let fx = Fixture::new();
        let account = fx.account();
        let tx = award(account.id, 10);
        fx.transactions.put(tx.clone());

        let mut holder = fx.unit();
        holder.lock_transaction(tx.id).unwrap();

        let mut waiter = fx.unit_with_timeout(Duration::from_millis(20));
        let result = waiter.lock_transaction(tx.id);

        assert!(matches!(result, Err(LedgerError::LockTimeout { .. })));
        assert!(result.unwrap_err().is_retryable());

        drop(holder);
        assert!(waiter.lock_transaction(tx.id).is_ok());
    }

    #[test]
    fn test_lock_released_after_commit() {
        let fx = Fixture::new();
        let account = fx.account();
        let tx = award(account.id, 10);
        fx.transactions.put(tx.clone());

        let mut first = fx.unit();
        first.lock_transaction(tx.id).unwrap();
        first.commit().unwrap();

        let mut second = fx.unit_with_timeout(Duration::from_millis(20));
        assert!(second.lock_transaction(tx.id).is_ok());
    }

    #[test]
    fn test_waiting_unit_sees_committed_image() {
        let fx = Arc::new(Fixture::new());
        let account = fx.account();
        let tx = award(account.id, 10);
        let id = tx.id;
        fx.transactions.put(tx);

        let mut holder = fx.unit();
        let mut row = holder.lock_transaction(id).unwrap();

        let fx_clone = Arc::clone(&fx);
        let waiter = thread::spawn(move || {
            let mut unit = fx_clone.unit_with_timeout(Duration::from_secs(5));
            unit.lock_transaction(id).unwrap().status
        });

        thread::sleep(Duration::from_millis(20));
        row.status = TransactionStatus::Rejected;
        holder.update_transaction(row).unwrap();
        holder.commit().unwrap();

        assert_eq!(waiter.join().unwrap(), TransactionStatus::Rejected);
    }
}
