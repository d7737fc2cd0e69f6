//! Application wiring
//!
//! `Guincoin` builds the in-memory ledger store and every flow from a
//! [`Config`], sharing one employee directory, one set of spend locks and one
//! notifier between them.

use std::sync::Arc;

use crate::config::Config;
use crate::core::{MemoryLedgerStore, RecordDirectory, TransactionService};
use crate::flows::{
    AwardFlow, AwardPolicy, EmployeeDirectory, KeyedLocks, LogNotifier, Notifier, PurchaseFlow,
    SubmissionStore, TransferFlow, TransferPolicy, WellnessFlow,
};
use crate::types::{
    Employee, EmployeeId, EmployeeSummary, LedgerError, NewEmployee, SubmissionId,
    SubmissionSummary,
};

/// Joins employee and submission summaries onto ledger rows
struct AppDirectory {
    employees: Arc<EmployeeDirectory>,
    submissions: Arc<SubmissionStore>,
}

impl RecordDirectory for AppDirectory {
    fn employee(&self, employee_id: EmployeeId) -> Option<EmployeeSummary> {
        self.employees.summary(employee_id)
    }

    fn submission(&self, submission_id: SubmissionId) -> Option<SubmissionSummary> {
        self.submissions.summary(submission_id)
    }
}

pub struct Guincoin {
    config: Config,
    store: Arc<MemoryLedgerStore>,
    ledger: TransactionService<MemoryLedgerStore>,
    directory: Arc<EmployeeDirectory>,
    awards: AwardFlow<MemoryLedgerStore>,
    transfers: TransferFlow<MemoryLedgerStore>,
    wellness: WellnessFlow<MemoryLedgerStore>,
    purchases: PurchaseFlow<MemoryLedgerStore>,
}

impl Guincoin {
    /// Build the application, logging notifications
    pub fn new(config: Config) -> Self {
        Self::with_notifier(config, Arc::new(LogNotifier))
    }

    pub fn with_notifier(config: Config, notifier: Arc<dyn Notifier>) -> Self {
        let lock_timeout = config.ledger.lock_timeout();
        let store = Arc::new(MemoryLedgerStore::with_lock_timeout(lock_timeout));
        let directory = Arc::new(EmployeeDirectory::new());
        let submissions = Arc::new(SubmissionStore::new());
        let spend_locks = Arc::new(KeyedLocks::new(lock_timeout));

        let ledger = TransactionService::new(Arc::clone(&store))
            .with_directory(Arc::new(AppDirectory {
                employees: Arc::clone(&directory),
                submissions: Arc::clone(&submissions),
            }))
            .with_default_page_size(config.ledger.default_page_size);

        let awards = AwardFlow::new(
            ledger.clone(),
            Arc::clone(&directory),
            Arc::clone(&notifier),
            KeyedLocks::new(lock_timeout),
            AwardPolicy {
                monthly_allotment: config.awards.monthly_allotment,
            },
        );
        let transfers = TransferFlow::new(
            ledger.clone(),
            Arc::clone(&directory),
            Arc::clone(&notifier),
            Arc::clone(&spend_locks),
            TransferPolicy {
                monthly_limit: config.transfers.monthly_limit,
            },
        );
        let wellness = WellnessFlow::new(
            ledger.clone(),
            Arc::clone(&directory),
            Arc::clone(&notifier),
            submissions,
            KeyedLocks::new(lock_timeout),
        );
        let purchases = PurchaseFlow::new(
            ledger.clone(),
            Arc::clone(&directory),
            notifier,
            spend_locks,
            config.store.guincoin_per_usd,
        );

        Self {
            config,
            store,
            ledger,
            directory,
            awards,
            transfers,
            wellness,
            purchases,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<MemoryLedgerStore> {
        &self.store
    }

    pub fn ledger(&self) -> &TransactionService<MemoryLedgerStore> {
        &self.ledger
    }

    pub fn directory(&self) -> &EmployeeDirectory {
        &self.directory
    }

    pub fn awards(&self) -> &AwardFlow<MemoryLedgerStore> {
        &self.awards
    }

    pub fn transfers(&self) -> &TransferFlow<MemoryLedgerStore> {
        &self.transfers
    }

    pub fn wellness(&self) -> &WellnessFlow<MemoryLedgerStore> {
        &self.wellness
    }

    pub fn purchases(&self) -> &PurchaseFlow<MemoryLedgerStore> {
        &self.purchases
    }

    /// Provision an employee and their account
    pub fn provision(&self, new: NewEmployee) -> Result<Employee, LedgerError> {
        self.directory.provision(self.store.as_ref(), new)
    }
}

impl Default for Guincoin {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flows::MemoryNotifier;
    use crate::types::{HistoryQuery, NewTransaction, TransactionType};
    use rust_decimal::Decimal;

    #[test]
    fn test_history_joins_source_employee() {
        let app = Guincoin::default();
        let manager = app
            .provision(NewEmployee::new("lead@example.com", "Lead").manager())
            .unwrap();
        let member = app
            .provision(NewEmployee::new("member@example.com", "Member"))
            .unwrap();
        app.awards()
            .award(manager.id, "member@example.com", Decimal::new(10, 0), None)
            .unwrap();

        let page = app
            .ledger()
            .get_transaction_history(member.account_id, &HistoryQuery::default())
            .unwrap();

        assert_eq!(page.total, 1);
        assert_eq!(
            page.transactions[0].source_employee,
            Some(EmployeeSummary::from(&manager))
        );
    }

    #[test]
    fn test_pending_rewards_show_submission() {
        let app = Guincoin::with_notifier(Config::default(), Arc::new(MemoryNotifier::new()));
        let member = app
            .provision(NewEmployee::new("member@example.com", "Member"))
            .unwrap();
        let task = app
            .wellness()
            .create_task("Hydrate", Decimal::new(8, 0), None)
            .unwrap();
        let submission = app.wellness().submit(member.id, task.id).unwrap();

        let pending = app.ledger().get_pending_transactions(member.account_id).unwrap();

        assert_eq!(pending.len(), 1);
        let summary = pending[0].wellness_submission.as_ref().unwrap();
        assert_eq!(summary.id, submission.id);
        assert_eq!(summary.task_name, "Hydrate");
        assert_eq!(summary.status, "pending");
    }

    #[test]
    fn test_config_flows_into_components() {
        let mut config = Config::default();
        config.ledger.default_page_size = 2;
        config.transfers.monthly_limit = Decimal::new(42, 0);
        let app = Guincoin::new(config);
        let member = app
            .provision(NewEmployee::new("member@example.com", "Member"))
            .unwrap();
        for _ in 0..3 {
            app.ledger()
                .create_pending_transaction(NewTransaction::new(
                    member.account_id,
                    TransactionType::Adjustment,
                    Decimal::ONE,
                ))
                .unwrap();
        }

        let page = app
            .ledger()
            .get_transaction_history(member.account_id, &HistoryQuery::default())
            .unwrap();

        assert_eq!(page.limit, 2);
        assert_eq!(app.transfers().policy().monthly_limit, Decimal::new(42, 0));
    }
}
