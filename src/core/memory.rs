//! In-memory ledger store
//!
//! `MemoryLedgerStore` combines the account and transaction stores behind
//! the repository traits and opens [`MemoryUnitOfWork`]s over them. It is
//! `Send + Sync` and meant to be shared through an `Arc`.

use std::sync::Arc;
use std::time::Duration;

use super::account_store::AccountStore;
use super::traits::{AccountRepository, LedgerStore, TransactionRepository};
use super::transaction_store::TransactionStore;
use super::unit_of_work::MemoryUnitOfWork;
use crate::types::{Account, AccountId, EmployeeId, LedgerTransaction, TransactionId};

/// How long a unit waits for a row lock unless configured otherwise
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(5000);

#[derive(Debug)]
pub struct MemoryLedgerStore {
    accounts: Arc<AccountStore>,
    transactions: Arc<TransactionStore>,
    lock_timeout: Duration,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            accounts: Arc::new(AccountStore::new()),
            transactions: Arc::new(TransactionStore::new()),
            lock_timeout,
        }
    }

    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    /// Number of committed ledger rows
    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }
}

impl Default for MemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AccountRepository for MemoryLedgerStore {
    fn get_or_create(&self, employee_id: EmployeeId) -> Account {
        self.accounts.get_or_create(employee_id)
    }

    fn account(&self, account_id: AccountId) -> Option<Account> {
        self.accounts.get(account_id)
    }

    fn account_for_employee(&self, employee_id: EmployeeId) -> Option<Account> {
        self.accounts.for_employee(employee_id)
    }

    fn all_accounts(&self) -> Vec<Account> {
        self.accounts.all()
    }
}

impl TransactionRepository for MemoryLedgerStore {
    fn transaction(&self, transaction_id: TransactionId) -> Option<LedgerTransaction> {
        self.transactions.get(transaction_id)
    }

    fn transactions_for(&self, account_id: AccountId) -> Vec<LedgerTransaction> {
        self.transactions.for_account(account_id)
    }
}

impl LedgerStore for MemoryLedgerStore {
    type Unit = MemoryUnitOfWork;

    fn begin(&self) -> MemoryUnitOfWork {
        MemoryUnitOfWork::new(
            Arc::clone(&self.accounts),
            Arc::clone(&self.transactions),
            self.lock_timeout,
        )
    }

    fn account_snapshot(
        &self,
        account_id: AccountId,
    ) -> Option<(Account, Vec<LedgerTransaction>)> {
        let _gate = self.accounts.read_gate(account_id);
        let account = self.accounts.get(account_id)?;
        Some((account, self.transactions.for_account(account_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::traits::UnitOfWork;
    use crate::types::{NewTransaction, TransactionType};
    use rust_decimal::Decimal;
    use uuid::Uuid;

    #[test]
    fn test_default_lock_timeout() {
        assert_eq!(MemoryLedgerStore::new().lock_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_units_write_through_to_repositories() {
        let store = MemoryLedgerStore::new();
        let employee = Uuid::new_v4();
        let account = store.get_or_create(employee);
        let tx = LedgerTransaction::pending(NewTransaction::new(
            account.id,
            TransactionType::Adjustment,
            Decimal::new(12, 0),
        ));
        let id = tx.id;

        let mut unit = store.begin();
        unit.insert_transaction(tx).unwrap();
        unit.commit().unwrap();

        assert_eq!(store.transaction(id).unwrap().account_id, account.id);
        assert_eq!(store.transactions_for(account.id).len(), 1);
        assert_eq!(store.account_for_employee(employee).unwrap().id, account.id);
        assert_eq!(store.all_accounts().len(), 1);
        assert_eq!(store.transaction_count(), 1);
    }

    #[test]
    fn test_snapshot_of_unknown_account() {
        let store = MemoryLedgerStore::new();

        assert!(store.account_snapshot(Uuid::new_v4()).is_none());
    }

    #[test]
    fn test_snapshot_never_sees_half_a_post() {
        let store = Arc::new(MemoryLedgerStore::new());
        let account = store.get_or_create(Uuid::new_v4()).id;
        let mut ids = Vec::new();
        for _ in 0..2_000 {
            let tx = LedgerTransaction::pending(NewTransaction::new(
                account,
                TransactionType::ManagerAward,
                Decimal::TEN,
            ));
            ids.push(tx.id);
            let mut unit = store.begin();
            unit.insert_transaction(tx).unwrap();
            unit.commit().unwrap();
        }

        let poster = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for id in ids {
                    let mut unit = store.begin();
                    let mut tx = unit.lock_transaction(id).unwrap();
                    unit.increment_balance(account, tx.signed_amount()).unwrap();
                    tx.status = crate::types::TransactionStatus::Posted;
                    unit.update_transaction(tx).unwrap();
                    unit.commit().unwrap();
                }
            })
        };

        while !poster.is_finished() {
            let (snapshot, rows) = store.account_snapshot(account).unwrap();
            let posted: Decimal = rows
                .iter()
                .filter(|row| !row.is_pending())
                .map(LedgerTransaction::signed_amount)
                .sum();
            assert_eq!(snapshot.balance, posted);
        }
        poster.join().unwrap();
    }
}
