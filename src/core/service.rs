//! Transaction service
//!
//! The `TransactionService` is the single entry point for creating and
//! finalizing balance-affecting records. Every other part of the system that
//! moves coins goes through it.
//!
//! # Lifecycle
//!
//! - `create_pending_transaction` inserts a `pending` row, no balance change
//! - `post_transaction` applies the signed amount to the balance and marks
//!   the row `posted`
//! - `reject_transaction` marks the row `rejected`, no balance change
//!
//! Posting and rejection both lock the row and re-check that it is still
//! pending inside the unit of work, so a transaction reaches exactly one
//! terminal state even when callers race.
//!
//! # Composition
//!
//! The `*_in` forms accept a caller's unit of work and leave committing to
//! the caller. This is how the flows combine a ledger write with a write of
//! their own (a submission status change, a purchase order) atomically.

use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;

use super::traits::{
    AccountRepository, LedgerStore, NoDirectory, RecordDirectory, TransactionRepository, UnitOfWork,
};
use crate::types::{
    Account, AccountBalance, AccountId, HistoryQuery, LedgerError, LedgerTransaction, NewTransaction,
    TransactionId, TransactionPage, TransactionStatus, TransactionView, DEFAULT_HISTORY_LIMIT,
};

/// Ledger operations over a [`LedgerStore`]
pub struct TransactionService<S: LedgerStore> {
    store: Arc<S>,
    directory: Arc<dyn RecordDirectory>,
    default_page_size: usize,
}

impl<S: LedgerStore> TransactionService<S> {
    /// Create a service with no display context and the default page size
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            directory: Arc::new(NoDirectory),
            default_page_size: DEFAULT_HISTORY_LIMIT,
        }
    }

    /// Use `directory` to join employee and submission summaries onto rows
    pub fn with_directory(mut self, directory: Arc<dyn RecordDirectory>) -> Self {
        self.directory = directory;
        self
    }

    /// Page size used when a history query asks for none; zero is ignored
    pub fn with_default_page_size(mut self, page_size: usize) -> Self {
        if page_size > 0 {
            self.default_page_size = page_size;
        }
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Open a unit of work on the underlying store
    pub fn begin(&self) -> S::Unit {
        self.store.begin()
    }

    /// Create a pending transaction in its own unit of work
    ///
    /// # Returns
    ///
    /// * `Ok(LedgerTransaction)` - The stored pending row
    /// * `Err(LedgerError::InvalidAmount)` - If `amount` is not positive
    /// * `Err(LedgerError::AccountNotFound)` - If the account doesn't exist
    pub fn create_pending_transaction(
        &self,
        new: NewTransaction,
    ) -> Result<LedgerTransaction, LedgerError> {
        let mut unit = self.begin();
        let transaction = self.create_pending_transaction_in(&mut unit, new)?;
        unit.commit()?;
        Ok(transaction)
    }

    /// Stage a pending transaction in a caller's unit of work
    pub fn create_pending_transaction_in(
        &self,
        unit: &mut S::Unit,
        new: NewTransaction,
    ) -> Result<LedgerTransaction, LedgerError> {
        if new.amount <= Decimal::ZERO {
            return Err(LedgerError::invalid_amount(new.amount));
        }
        if unit.account(new.account_id).is_none() {
            return Err(LedgerError::account_not_found(new.account_id));
        }

        let transaction = LedgerTransaction::pending(new);
        unit.insert_transaction(transaction.clone())?;
        Ok(transaction)
    }

    /// Post a pending transaction
    ///
    /// With `Some(unit)` the posting joins the caller's unit of work and is
    /// applied when the caller commits. With `None` the service opens and
    /// commits its own.
    ///
    /// # Returns
    ///
    /// * `Ok(LedgerTransaction)` - The row as posted
    /// * `Err(LedgerError::TransactionNotFound)` - If the id is unknown
    /// * `Err(LedgerError::InvalidState)` - If the row is not pending
    pub fn post_transaction(
        &self,
        transaction_id: TransactionId,
        unit: Option<&mut S::Unit>,
    ) -> Result<LedgerTransaction, LedgerError> {
        match unit {
            Some(unit) => self.post_transaction_in(unit, transaction_id),
            None => {
                let mut unit = self.begin();
                let transaction = self.post_transaction_in(&mut unit, transaction_id)?;
                unit.commit()?;
                Ok(transaction)
            }
        }
    }

    /// Stage the posting of a pending transaction in a caller's unit of work
    pub fn post_transaction_in(
        &self,
        unit: &mut S::Unit,
        transaction_id: TransactionId,
    ) -> Result<LedgerTransaction, LedgerError> {
        let mut transaction = unit.lock_transaction(transaction_id)?;
        if !transaction.is_pending() {
            return Err(LedgerError::invalid_state(transaction_id, transaction.status));
        }

        unit.increment_balance(transaction.account_id, transaction.signed_amount())?;

        transaction.status = TransactionStatus::Posted;
        transaction.posted_at = Some(Utc::now());
        unit.update_transaction(transaction.clone())?;
        Ok(transaction)
    }

    /// Reject a pending transaction in its own unit of work
    ///
    /// The balance is never touched. `reason` is stored as the rejection
    /// reason.
    pub fn reject_transaction(
        &self,
        transaction_id: TransactionId,
        reason: Option<&str>,
    ) -> Result<LedgerTransaction, LedgerError> {
        let mut unit = self.begin();
        let transaction = self.reject_transaction_in(&mut unit, transaction_id, reason)?;
        unit.commit()?;
        Ok(transaction)
    }

    /// Stage the rejection of a pending transaction in a caller's unit of work
    pub fn reject_transaction_in(
        &self,
        unit: &mut S::Unit,
        transaction_id: TransactionId,
        reason: Option<&str>,
    ) -> Result<LedgerTransaction, LedgerError> {
        let mut transaction = unit.lock_transaction(transaction_id)?;
        if !transaction.is_pending() {
            return Err(LedgerError::invalid_state(transaction_id, transaction.status));
        }

        transaction.status = TransactionStatus::Rejected;
        transaction.reviewed_at = Some(Utc::now());
        transaction.rejection_reason = reason.map(str::to_string);
        unit.update_transaction(transaction.clone())?;
        Ok(transaction)
    }

    /// Posted balance, optionally with the signed sum of pending rows
    ///
    /// The balance and the pending rows come from one store snapshot, so a
    /// concurrent post never counts a row twice or not at all.
    pub fn get_account_balance(
        &self,
        account_id: AccountId,
        include_pending: bool,
    ) -> Result<AccountBalance, LedgerError> {
        let (account, transactions) = self.snapshot(account_id)?;

        let pending: Decimal = if include_pending {
            transactions
                .iter()
                .filter(|transaction| transaction.is_pending())
                .map(LedgerTransaction::signed_amount)
                .sum()
        } else {
            Decimal::ZERO
        };

        Ok(AccountBalance::new(account.balance, pending))
    }

    /// Posted balance minus pending debits
    pub fn spendable_balance(&self, account_id: AccountId) -> Result<Decimal, LedgerError> {
        let (account, transactions) = self.snapshot(account_id)?;

        let pending_debits: Decimal = transactions
            .iter()
            .filter(|transaction| transaction.is_pending() && transaction.transaction_type.is_debit())
            .map(|transaction| transaction.amount)
            .sum();

        Ok(account.balance - pending_debits)
    }

    fn snapshot(
        &self,
        account_id: AccountId,
    ) -> Result<(Account, Vec<LedgerTransaction>), LedgerError> {
        self.store
            .account_snapshot(account_id)
            .ok_or_else(|| LedgerError::account_not_found(account_id))
    }

    /// One page of an account's history, newest first
    ///
    /// `total` counts every row matching the filters, before paging.
    pub fn get_transaction_history(
        &self,
        account_id: AccountId,
        query: &HistoryQuery,
    ) -> Result<TransactionPage, LedgerError> {
        if self.store.account(account_id).is_none() {
            return Err(LedgerError::account_not_found(account_id));
        }

        let limit = match query.limit {
            Some(limit) if limit > 0 => limit,
            _ => self.default_page_size,
        };

        let matching: Vec<LedgerTransaction> = self
            .store
            .transactions_for(account_id)
            .into_iter()
            .filter(|transaction| query.matches(transaction))
            .collect();
        let total = matching.len();

        let transactions = matching
            .into_iter()
            .skip(query.offset)
            .take(limit)
            .map(|transaction| TransactionView {
                source_employee: transaction
                    .source_employee_id
                    .and_then(|id| self.directory.employee(id)),
                wellness_submission: None,
                transaction,
            })
            .collect();

        Ok(TransactionPage {
            transactions,
            total,
            limit,
            offset: query.offset,
        })
    }

    /// Every pending row of an account, newest first, with display context
    pub fn get_pending_transactions(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<TransactionView>, LedgerError> {
        if self.store.account(account_id).is_none() {
            return Err(LedgerError::account_not_found(account_id));
        }

        Ok(self
            .store
            .transactions_for(account_id)
            .into_iter()
            .filter(LedgerTransaction::is_pending)
            .map(|transaction| TransactionView {
                source_employee: transaction
                    .source_employee_id
                    .and_then(|id| self.directory.employee(id)),
                wellness_submission: transaction
                    .wellness_submission_id
                    .and_then(|id| self.directory.submission(id)),
                transaction,
            })
            .collect())
    }
}

impl<S: LedgerStore> Clone for TransactionService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            directory: Arc::clone(&self.directory),
            default_page_size: self.default_page_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::memory::MemoryLedgerStore;
    use crate::core::traits::AccountRepository;
    use crate::types::{EmployeeId, EmployeeSummary, SubmissionId, SubmissionSummary, TransactionType};
    use rstest::rstest;
    use uuid::Uuid;

    fn service() -> TransactionService<MemoryLedgerStore> {
        TransactionService::new(Arc::new(MemoryLedgerStore::new()))
    }

    fn open_account(service: &TransactionService<MemoryLedgerStore>) -> AccountId {
        service.store().get_or_create(Uuid::new_v4()).id
    }

    fn dec(value: i64) -> Decimal {
        Decimal::new(value, 0)
    }

    fn pending(
        service: &TransactionService<MemoryLedgerStore>,
        account: AccountId,
        ty: TransactionType,
        amount: i64,
    ) -> LedgerTransaction {
        service
            .create_pending_transaction(NewTransaction::new(account, ty, dec(amount)))
            .unwrap()
    }

    struct FixedDirectory {
        employee: EmployeeSummary,
        submission: SubmissionSummary,
    }

    impl RecordDirectory for FixedDirectory {
        fn employee(&self, id: EmployeeId) -> Option<EmployeeSummary> {
            (id == self.employee.id).then(|| self.employee.clone())
        }

        fn submission(&self, id: SubmissionId) -> Option<SubmissionSummary> {
            (id == self.submission.id).then(|| self.submission.clone())
        }
    }

    #[rstest]
    #[case::zero(0)]
    #[case::negative(-5)]
    fn test_create_rejects_non_positive_amount(#[case] amount: i64) {
        let service = service();
        let account = open_account(&service);

        let result = service.create_pending_transaction(NewTransaction::new(
            account,
            TransactionType::ManagerAward,
            dec(amount),
        ));

        assert_eq!(result, Err(LedgerError::invalid_amount(dec(amount))));
    }

    #[test]
    fn test_create_on_unknown_account() {
        let service = service();
        let missing = Uuid::new_v4();

        let result = service.create_pending_transaction(NewTransaction::new(
            missing,
            TransactionType::ManagerAward,
            dec(5),
        ));

        assert_eq!(result, Err(LedgerError::account_not_found(missing)));
    }

    #[test]
    fn test_create_does_not_touch_balance() {
        let service = service();
        let account = open_account(&service);

        let tx = pending(&service, account, TransactionType::ManagerAward, 50);

        assert_eq!(tx.status, TransactionStatus::Pending);
        assert_eq!(service.store().account(account).unwrap().balance, Decimal::ZERO);
    }

    #[rstest]
    #[case::manager_award(TransactionType::ManagerAward, 40)]
    #[case::peer_transfer_received(TransactionType::PeerTransferReceived, 40)]
    #[case::wellness_reward(TransactionType::WellnessReward, 40)]
    #[case::adjustment(TransactionType::Adjustment, 40)]
    #[case::peer_transfer_sent(TransactionType::PeerTransferSent, -40)]
    #[case::store_purchase(TransactionType::StorePurchase, -40)]
    fn test_post_applies_sign_convention(#[case] ty: TransactionType, #[case] expected: i64) {
        let service = service();
        let account = open_account(&service);
        let tx = pending(&service, account, ty, 40);

        let posted = service.post_transaction(tx.id, None).unwrap();

        assert_eq!(posted.status, TransactionStatus::Posted);
        assert!(posted.posted_at.is_some());
        assert_eq!(service.store().account(account).unwrap().balance, dec(expected));
    }

    #[test]
    fn test_manager_award_scenario() {
        let service = service();
        let account = open_account(&service);

        let tx = pending(&service, account, TransactionType::ManagerAward, 50);
        let balance = service.get_account_balance(account, true).unwrap();
        assert_eq!(balance, AccountBalance::new(Decimal::ZERO, dec(50)));

        service.post_transaction(tx.id, None).unwrap();

        let balance = service.get_account_balance(account, true).unwrap();
        assert_eq!(balance, AccountBalance::new(dec(50), Decimal::ZERO));
        assert_eq!(
            service.store().transaction(tx.id).unwrap().status,
            TransactionStatus::Posted
        );
    }

    #[test]
    fn test_second_post_fails_and_keeps_balance() {
        let service = service();
        let account = open_account(&service);
        let tx = pending(&service, account, TransactionType::ManagerAward, 10);
        service.post_transaction(tx.id, None).unwrap();

        let result = service.post_transaction(tx.id, None);

        assert_eq!(
            result,
            Err(LedgerError::invalid_state(tx.id, TransactionStatus::Posted))
        );
        assert_eq!(service.store().account(account).unwrap().balance, dec(10));
    }

    #[test]
    fn test_post_unknown_transaction() {
        let service = service();
        let missing = Uuid::new_v4();

        assert_eq!(
            service.post_transaction(missing, None),
            Err(LedgerError::transaction_not_found(missing))
        );
    }

    #[test]
    fn test_wellness_rejection_scenario() {
        let service = service();
        let account = open_account(&service);
        let tx = pending(&service, account, TransactionType::WellnessReward, 20);

        let rejected = service.reject_transaction(tx.id, Some("incomplete")).unwrap();

        assert_eq!(rejected.status, TransactionStatus::Rejected);
        assert_eq!(rejected.rejection_reason.as_deref(), Some("incomplete"));
        assert!(rejected.reviewed_at.is_some());
        assert_eq!(
            service.get_account_balance(account, true).unwrap(),
            AccountBalance::new(Decimal::ZERO, Decimal::ZERO)
        );
    }

    #[rstest]
    #[case::after_post(true)]
    #[case::after_reject(false)]
    fn test_reject_requires_pending(#[case] post_first: bool) {
        let service = service();
        let account = open_account(&service);
        let tx = pending(&service, account, TransactionType::ManagerAward, 10);

        let status = if post_first {
            service.post_transaction(tx.id, None).unwrap().status
        } else {
            service.reject_transaction(tx.id, None).unwrap().status
        };

        assert_eq!(
            service.reject_transaction(tx.id, Some("late")),
            Err(LedgerError::invalid_state(tx.id, status))
        );
    }

    #[test]
    fn test_post_joins_caller_unit() {
        let service = service();
        let account = open_account(&service);
        let tx = pending(&service, account, TransactionType::ManagerAward, 10);

        let mut unit = service.begin();
        service.post_transaction(tx.id, Some(&mut unit)).unwrap();
        assert_eq!(service.store().account(account).unwrap().balance, Decimal::ZERO);

        unit.commit().unwrap();
        assert_eq!(service.store().account(account).unwrap().balance, dec(10));
    }

    #[test]
    fn test_create_and_post_in_one_unit() {
        let service = service();
        let account = open_account(&service);

        let mut unit = service.begin();
        let tx = service
            .create_pending_transaction_in(
                &mut unit,
                NewTransaction::new(account, TransactionType::ManagerAward, dec(25)),
            )
            .unwrap();
        service.post_transaction_in(&mut unit, tx.id).unwrap();
        assert!(service.store().transaction(tx.id).is_none());

        unit.commit().unwrap();
        assert_eq!(
            service.store().transaction(tx.id).unwrap().status,
            TransactionStatus::Posted
        );
        assert_eq!(service.store().account(account).unwrap().balance, dec(25));
    }

    #[test]
    fn test_dropped_unit_changes_nothing() {
        let service = service();
        let account = open_account(&service);
        let tx = pending(&service, account, TransactionType::ManagerAward, 10);

        {
            let mut unit = service.begin();
            service.post_transaction(tx.id, Some(&mut unit)).unwrap();
        }

        assert!(service.store().transaction(tx.id).unwrap().is_pending());
        assert_eq!(service.store().account(account).unwrap().balance, Decimal::ZERO);
    }

    #[test]
    fn test_balance_unknown_account() {
        let service = service();
        let missing = Uuid::new_v4();

        assert_eq!(
            service.get_account_balance(missing, false),
            Err(LedgerError::account_not_found(missing))
        );
    }

    #[test]
    fn test_balance_without_pending_reports_zero_pending() {
        let service = service();
        let account = open_account(&service);
        pending(&service, account, TransactionType::ManagerAward, 10);

        assert_eq!(
            service.get_account_balance(account, false).unwrap(),
            AccountBalance::new(Decimal::ZERO, Decimal::ZERO)
        );
    }

    #[test]
    fn test_spendable_subtracts_pending_debits_only() {
        let service = service();
        let account = open_account(&service);
        let credit = pending(&service, account, TransactionType::ManagerAward, 100);
        service.post_transaction(credit.id, None).unwrap();
        pending(&service, account, TransactionType::PeerTransferSent, 30);
        pending(&service, account, TransactionType::WellnessReward, 15);

        assert_eq!(service.spendable_balance(account).unwrap(), dec(70));
        assert_eq!(
            service.get_account_balance(account, true).unwrap(),
            AccountBalance::new(dec(100), dec(-15))
        );
    }

    #[rstest]
    #[case::default_limit(HistoryQuery::default(), 5, 0)]
    #[case::zero_means_default(HistoryQuery::default().with_limit(0), 5, 0)]
    #[case::first_page(HistoryQuery::default().with_limit(2), 2, 0)]
    #[case::last_page(HistoryQuery::default().with_limit(2).with_offset(4), 1, 4)]
    #[case::past_end(HistoryQuery::default().with_offset(9), 0, 9)]
    fn test_history_paging(
        #[case] query: HistoryQuery,
        #[case] expected_len: usize,
        #[case] expected_offset: usize,
    ) {
        let service = service();
        let account = open_account(&service);
        for amount in 1..=5 {
            pending(&service, account, TransactionType::ManagerAward, amount);
        }

        let page = service.get_transaction_history(account, &query).unwrap();

        assert_eq!(page.transactions.len(), expected_len);
        assert_eq!(page.total, 5);
        assert_eq!(page.offset, expected_offset);
    }

    #[test]
    fn test_history_uses_configured_default_page_size() {
        let service = service().with_default_page_size(3);
        let account = open_account(&service);
        for amount in 1..=5 {
            pending(&service, account, TransactionType::ManagerAward, amount);
        }

        let page = service
            .get_transaction_history(account, &HistoryQuery::default())
            .unwrap();

        assert_eq!(page.limit, 3);
        assert_eq!(page.transactions.len(), 3);
    }

    #[test]
    fn test_history_filters_count_before_paging() {
        let service = service();
        let account = open_account(&service);
        let posted = pending(&service, account, TransactionType::ManagerAward, 1);
        service.post_transaction(posted.id, None).unwrap();
        pending(&service, account, TransactionType::ManagerAward, 2);
        pending(&service, account, TransactionType::WellnessReward, 3);

        let query = HistoryQuery::default()
            .with_status(TransactionStatus::Pending)
            .with_limit(1);
        let page = service.get_transaction_history(account, &query).unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.transactions.len(), 1);

        let query = HistoryQuery::default().with_type(TransactionType::ManagerAward);
        let page = service.get_transaction_history(account, &query).unwrap();
        assert_eq!(page.total, 2);
    }

    #[test]
    fn test_pending_list_joins_directory_context() {
        let store = Arc::new(MemoryLedgerStore::new());
        let manager = EmployeeSummary {
            id: Uuid::new_v4(),
            name: "Pat Manager".to_string(),
            email: "pat@example.com".to_string(),
        };
        let submission = SubmissionSummary {
            id: Uuid::new_v4(),
            status: "pending".to_string(),
            task_name: "Step challenge".to_string(),
            coin_value: dec(20),
        };
        let service = TransactionService::new(Arc::clone(&store)).with_directory(Arc::new(
            FixedDirectory {
                employee: manager.clone(),
                submission: submission.clone(),
            },
        ));
        let account = store.get_or_create(Uuid::new_v4()).id;

        service
            .create_pending_transaction(
                NewTransaction::new(account, TransactionType::ManagerAward, dec(5))
                    .with_source_employee(manager.id),
            )
            .unwrap();
        service
            .create_pending_transaction(
                NewTransaction::new(account, TransactionType::WellnessReward, dec(20))
                    .with_submission(submission.id),
            )
            .unwrap();
        let done = pending(&service, account, TransactionType::Adjustment, 1);
        service.post_transaction(done.id, None).unwrap();

        let views = service.get_pending_transactions(account).unwrap();

        assert_eq!(views.len(), 2);
        assert!(views
            .iter()
            .any(|view| view.source_employee.as_ref() == Some(&manager)));
        assert!(views
            .iter()
            .any(|view| view.wellness_submission.as_ref() == Some(&submission)));
    }
}
