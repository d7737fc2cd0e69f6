//! Core traits for ledger storage, units of work and display context
//!
//! This module defines the seams between the transaction service and the
//! storage engine underneath it. Each persisted entity gets its own typed
//! repository trait; [`LedgerStore`] ties them together and opens units of
//! work.

use rust_decimal::Decimal;

use crate::types::{
    Account, AccountId, EmployeeId, EmployeeSummary, LedgerError, LedgerTransaction,
    SubmissionId, SubmissionSummary, TransactionId,
};

/// Read and provisioning access to accounts
///
/// Balances are never mutated through this trait; the only path that
/// changes a balance is [`UnitOfWork::increment_balance`] during posting.
pub trait AccountRepository: Send + Sync {
    /// Get the employee's account, creating it with a zero balance if missing
    fn get_or_create(&self, employee_id: EmployeeId) -> Account;

    /// Get an account by id
    fn account(&self, account_id: AccountId) -> Option<Account>;

    /// Get the account owned by an employee
    fn account_for_employee(&self, employee_id: EmployeeId) -> Option<Account>;

    /// Snapshot of every account
    fn all_accounts(&self) -> Vec<Account>;
}

/// Read access to committed ledger rows
pub trait TransactionRepository: Send + Sync {
    /// Get a committed transaction by id
    fn transaction(&self, transaction_id: TransactionId) -> Option<LedgerTransaction>;

    /// All committed transactions of an account, newest first
    fn transactions_for(&self, account_id: AccountId) -> Vec<LedgerTransaction>;
}

/// An object capable of performing multiple writes atomically
///
/// A unit of work stages writes and applies all of them on [`commit`], or
/// none of them. Dropping a unit without committing rolls it back.
///
/// Transaction rows read through [`lock_transaction`] stay locked until the
/// unit commits or is dropped, so two units can never both observe the same
/// row as pending and both transition it.
///
/// [`commit`]: UnitOfWork::commit
/// [`lock_transaction`]: UnitOfWork::lock_transaction
pub trait UnitOfWork {
    /// Read an account through the unit
    fn account(&self, account_id: AccountId) -> Option<Account>;

    /// Lock a transaction row and return its current image
    ///
    /// Rows inserted or updated earlier in the same unit are returned as
    /// staged. Fails with `TransactionNotFound` for unknown ids and with
    /// `LockTimeout` when another unit holds the row for too long.
    fn lock_transaction(
        &mut self,
        transaction_id: TransactionId,
    ) -> Result<LedgerTransaction, LedgerError>;

    /// Stage a new transaction row
    fn insert_transaction(&mut self, transaction: LedgerTransaction) -> Result<(), LedgerError>;

    /// Stage a new image of a row previously locked or inserted by this unit
    fn update_transaction(&mut self, transaction: LedgerTransaction) -> Result<(), LedgerError>;

    /// Stage an atomic "add `delta`" on an account balance
    fn increment_balance(&mut self, account_id: AccountId, delta: Decimal)
        -> Result<(), LedgerError>;

    /// Stage a caller-owned write, applied after the ledger writes on commit
    ///
    /// Lets a caller update its own entities (a wellness submission, a
    /// purchase order) in the same atomic scope without the ledger knowing
    /// about them. The write must not fail: validate before staging it.
    fn defer(&mut self, write: Box<dyn FnOnce() + Send>);

    /// Apply every staged write, or none
    fn commit(self) -> Result<(), LedgerError>
    where
        Self: Sized;
}

/// Storage engine backing the transaction service
pub trait LedgerStore: AccountRepository + TransactionRepository {
    /// Unit of work type produced by this store
    type Unit: UnitOfWork;

    /// Open a new unit of work
    fn begin(&self) -> Self::Unit;

    /// An account and its committed rows, newest first, read as one view
    ///
    /// No commit touching the account is partly visible: the balance and
    /// the row statuses always agree.
    fn account_snapshot(&self, account_id: AccountId)
        -> Option<(Account, Vec<LedgerTransaction>)>;
}

/// Lookup of display context joined onto ledger rows
///
/// Supplied by the application so the ledger can show who sent coins and
/// which wellness submission a reward belongs to, without depending on the
/// directory or wellness types.
pub trait RecordDirectory: Send + Sync {
    /// Summary of an employee, if known
    fn employee(&self, employee_id: EmployeeId) -> Option<EmployeeSummary>;

    /// Summary of a wellness submission, if known
    fn submission(&self, submission_id: SubmissionId) -> Option<SubmissionSummary>;
}

/// Directory that knows nothing; joined fields stay empty
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDirectory;

impl RecordDirectory for NoDirectory {
    fn employee(&self, _employee_id: EmployeeId) -> Option<EmployeeSummary> {
        None
    }

    fn submission(&self, _submission_id: SubmissionId) -> Option<SubmissionSummary> {
        None
    }
}
