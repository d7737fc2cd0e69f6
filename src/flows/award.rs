//! Manager awards
//!
//! A manager grants coins to another employee. The award is created pending
//! and posted in the same unit of work, so it is never observable as
//! pending.
//!
//! # Allotment
//!
//! Each manager may award at most the configured allotment per UTC calendar
//! month. The check and the award run under the manager's award lock, which
//! is held until the award is committed and recorded in the manager's
//! history.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;

use super::directory::EmployeeDirectory;
use super::locks::KeyedLocks;
use super::notify::{Notification, Notifier};
use super::transfer::month_bounds;
use crate::core::{LedgerStore, TransactionService, UnitOfWork};
use crate::types::{
    Employee, EmployeeId, LedgerError, LedgerTransaction, NewTransaction, TransactionType,
    DEFAULT_HISTORY_LIMIT,
};

/// Default monthly award budget per manager
pub const DEFAULT_MONTHLY_ALLOTMENT: Decimal = Decimal::from_parts(10_000, 0, 0, false, 0);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AwardPolicy {
    pub monthly_allotment: Decimal,
}

impl Default for AwardPolicy {
    fn default() -> Self {
        Self {
            monthly_allotment: DEFAULT_MONTHLY_ALLOTMENT,
        }
    }
}

/// Award budget of a manager for one period
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagerAllotment {
    #[serde(with = "rust_decimal::serde::float")]
    pub max_amount: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub used_amount: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub remaining: Decimal,
    pub period_start: DateTime<Utc>,

    /// Exclusive
    pub period_end: DateTime<Utc>,
}

/// One page of the awards a manager granted, newest first
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AwardHistory {
    pub awards: Vec<LedgerTransaction>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

pub struct AwardFlow<S: LedgerStore> {
    ledger: TransactionService<S>,
    directory: Arc<EmployeeDirectory>,
    notifier: Arc<dyn Notifier>,
    award_locks: KeyedLocks<EmployeeId>,
    policy: AwardPolicy,

    /// Posted awards by manager, oldest first
    issued: Arc<DashMap<EmployeeId, Vec<LedgerTransaction>>>,
}

impl<S: LedgerStore> AwardFlow<S> {
    pub fn new(
        ledger: TransactionService<S>,
        directory: Arc<EmployeeDirectory>,
        notifier: Arc<dyn Notifier>,
        award_locks: KeyedLocks<EmployeeId>,
        policy: AwardPolicy,
    ) -> Self {
        Self {
            ledger,
            directory,
            notifier,
            award_locks,
            policy,
            issued: Arc::new(DashMap::new()),
        }
    }

    /// Award `amount` coins from a manager to the employee with `recipient_email`
    ///
    /// # Returns
    ///
    /// * `Ok(LedgerTransaction)` - The posted `manager_award` row
    /// * `Err(LedgerError::EmployeeNotFound)` - If either party is unknown
    /// * `Err(LedgerError::Validation)` - If the sender is not a manager, or awards themselves
    /// * `Err(LedgerError::InvalidAmount)` - If `amount` is not positive
    /// * `Err(LedgerError::AllotmentExceeded)` - If `amount` exceeds the remaining allotment
    pub fn award(
        &self,
        manager_id: EmployeeId,
        recipient_email: &str,
        amount: Decimal,
        description: Option<String>,
    ) -> Result<LedgerTransaction, LedgerError> {
        let manager = self.require_manager(manager_id)?;
        let recipient = self.directory.require_email(recipient_email)?;
        if recipient.id == manager.id {
            return Err(LedgerError::validation("managers cannot award themselves"));
        }
        if amount <= Decimal::ZERO {
            return Err(LedgerError::invalid_amount(amount));
        }

        let _guard = self.award_locks.acquire(manager.id)?;
        let allotment = self.allotment_of(&manager, Utc::now())?;
        if amount > allotment.remaining {
            return Err(LedgerError::allotment_exceeded(
                manager.id,
                allotment.max_amount,
                allotment.used_amount,
                amount,
            ));
        }

        let new = NewTransaction::new(recipient.account_id, TransactionType::ManagerAward, amount)
            .with_optional_description(description)
            .with_source_employee(manager.id)
            .with_target_employee(recipient.id);

        let mut unit = self.ledger.begin();
        let pending = self.ledger.create_pending_transaction_in(&mut unit, new)?;
        let posted = self.ledger.post_transaction_in(&mut unit, pending.id)?;
        self.stage_issued(&mut unit, manager.id, posted.clone());
        unit.commit()?;

        tracing::info!(
            transaction = %posted.id,
            manager = %manager.id,
            recipient = %recipient.id,
            amount = %posted.amount,
            "manager award posted"
        );
        self.notifier.notify(&Notification::AwardReceived {
            recipient: recipient.id,
            manager: manager.id,
            amount: posted.amount,
            transaction: posted.id,
        });

        Ok(posted)
    }

    /// Budget of the manager for the current UTC month
    pub fn allotment(&self, manager_id: EmployeeId) -> Result<ManagerAllotment, LedgerError> {
        self.allotment_at(manager_id, Utc::now())
    }

    /// Budget of the manager for the UTC month containing `now`
    pub fn allotment_at(
        &self,
        manager_id: EmployeeId,
        now: DateTime<Utc>,
    ) -> Result<ManagerAllotment, LedgerError> {
        let manager = self.require_manager(manager_id)?;
        self.allotment_of(&manager, now)
    }

    /// Awards the manager granted, newest first
    ///
    /// A `limit` of none or zero uses the default page size.
    pub fn history_for(
        &self,
        manager_id: EmployeeId,
        limit: Option<usize>,
        offset: usize,
    ) -> Result<AwardHistory, LedgerError> {
        let manager = self.require_manager(manager_id)?;
        let limit = match limit {
            Some(limit) if limit > 0 => limit,
            _ => DEFAULT_HISTORY_LIMIT,
        };

        let issued = self
            .issued
            .get(&manager.id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();
        let total = issued.len();
        let awards = issued.into_iter().rev().skip(offset).take(limit).collect();

        Ok(AwardHistory {
            awards,
            total,
            limit,
            offset,
        })
    }

    // Helper functions

    fn require_manager(&self, employee_id: EmployeeId) -> Result<Employee, LedgerError> {
        let employee = self.directory.require(employee_id)?;
        if !employee.is_manager {
            return Err(LedgerError::validation(format!(
                "employee {} is not a manager",
                employee.email
            )));
        }
        Ok(employee)
    }

    fn allotment_of(
        &self,
        manager: &Employee,
        now: DateTime<Utc>,
    ) -> Result<ManagerAllotment, LedgerError> {
        let (period_start, period_end) = month_bounds(now)?;

        let used_amount: Decimal = self
            .issued
            .get(&manager.id)
            .map(|entry| {
                entry
                    .value()
                    .iter()
                    .filter(|tx| tx.created_at >= period_start && tx.created_at < period_end)
                    .map(|tx| tx.amount)
                    .sum()
            })
            .unwrap_or_default();

        let max_amount = self.policy.monthly_allotment;
        Ok(ManagerAllotment {
            max_amount,
            used_amount,
            remaining: (max_amount - used_amount).max(Decimal::ZERO),
            period_start,
            period_end,
        })
    }

    fn stage_issued(&self, unit: &mut S::Unit, manager_id: EmployeeId, award: LedgerTransaction) {
        let issued = Arc::clone(&self.issued);
        unit.defer(Box::new(move || {
            issued.entry(manager_id).or_default().push(award);
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{AccountRepository, MemoryLedgerStore, TransactionRepository};
    use crate::flows::notify::MemoryNotifier;
    use crate::types::{NewEmployee, TransactionStatus};
    use std::thread;
    use std::time::Duration;

    fn dec(n: i64) -> Decimal {
        Decimal::new(n, 0)
    }

    struct Fixture {
        store: Arc<MemoryLedgerStore>,
        notifier: Arc<MemoryNotifier>,
        flow: AwardFlow<MemoryLedgerStore>,
        manager: Employee,
        worker: Employee,
    }

    fn fixture() -> Fixture {
        fixture_with_allotment(DEFAULT_MONTHLY_ALLOTMENT)
    }

    fn fixture_with_allotment(monthly_allotment: Decimal) -> Fixture {
        let store = Arc::new(MemoryLedgerStore::new());
        let directory = Arc::new(EmployeeDirectory::new());
        let notifier = Arc::new(MemoryNotifier::new());
        let manager = directory
            .provision(store.as_ref(), NewEmployee::new("mgr@example.com", "Morgan").manager())
            .unwrap();
        let worker = directory
            .provision(store.as_ref(), NewEmployee::new("wes@example.com", "Wes"))
            .unwrap();
        let flow = AwardFlow::new(
            TransactionService::new(Arc::clone(&store)),
            directory,
            notifier.clone(),
            KeyedLocks::new(Duration::from_secs(5)),
            AwardPolicy { monthly_allotment },
        );
        Fixture {
            store,
            notifier,
            flow,
            manager,
            worker,
        }
    }

    #[test]
    fn test_award_posts_and_notifies() {
        let fx = fixture();

        let tx = fx
            .flow
            .award(fx.manager.id, "WES@example.com", Decimal::new(50, 0), Some("Great demo".into()))
            .unwrap();

        assert_eq!(tx.status, TransactionStatus::Posted);
        assert_eq!(tx.source_employee_id, Some(fx.manager.id));
        assert_eq!(tx.target_employee_id, Some(fx.worker.id));
        assert_eq!(tx.description.as_deref(), Some("Great demo"));
        assert_eq!(
            fx.store.account(fx.worker.account_id).unwrap().balance,
            Decimal::new(50, 0)
        );
        assert_eq!(fx.store.transaction(tx.id).unwrap(), tx);
        assert_eq!(
            fx.notifier.sent(),
            vec![Notification::AwardReceived {
                recipient: fx.worker.id,
                manager: fx.manager.id,
                amount: Decimal::new(50, 0),
                transaction: tx.id,
            }]
        );
    }

    #[test]
    fn test_non_manager_cannot_award() {
        let fx = fixture();

        let result = fx
            .flow
            .award(fx.worker.id, "mgr@example.com", Decimal::new(5, 0), None);

        assert!(matches!(result, Err(LedgerError::Validation { .. })));
        assert!(fx.notifier.sent().is_empty());
    }

    #[test]
    fn test_manager_cannot_award_self() {
        let fx = fixture();

        let result = fx
            .flow
            .award(fx.manager.id, "mgr@example.com", Decimal::new(5, 0), None);

        assert!(matches!(result, Err(LedgerError::Validation { .. })));
    }

    #[test]
    fn test_unknown_recipient() {
        let fx = fixture();

        let result = fx
            .flow
            .award(fx.manager.id, "ghost@example.com", Decimal::new(5, 0), None);

        assert_eq!(
            result,
            Err(LedgerError::employee_not_found("ghost@example.com"))
        );
    }

    #[test]
    fn test_invalid_amount_leaves_no_row() {
        let fx = fixture();

        let result = fx
            .flow
            .award(fx.manager.id, "wes@example.com", Decimal::ZERO, None);

        assert_eq!(result, Err(LedgerError::invalid_amount(Decimal::ZERO)));
        assert!(fx.store.transactions_for(fx.worker.account_id).is_empty());
    }

    #[test]
    fn test_allotment_caps_awards_per_month() {
        let fx = fixture_with_allotment(dec(100));

        fx.flow.award(fx.manager.id, "wes@example.com", dec(60), None).unwrap();
        let over = fx.flow.award(fx.manager.id, "wes@example.com", dec(50), None);
        fx.flow.award(fx.manager.id, "wes@example.com", dec(40), None).unwrap();

        assert_eq!(
            over,
            Err(LedgerError::allotment_exceeded(fx.manager.id, dec(100), dec(60), dec(50)))
        );
        let allotment = fx.flow.allotment(fx.manager.id).unwrap();
        assert_eq!(allotment.max_amount, dec(100));
        assert_eq!(allotment.used_amount, dec(100));
        assert_eq!(allotment.remaining, Decimal::ZERO);
        assert!(allotment.period_start <= Utc::now() && Utc::now() < allotment.period_end);
        assert_eq!(
            fx.store.account(fx.worker.account_id).unwrap().balance,
            dec(100)
        );
    }

    #[test]
    fn test_allotment_resets_next_month() {
        let fx = fixture_with_allotment(dec(100));
        fx.flow.award(fx.manager.id, "wes@example.com", dec(70), None).unwrap();

        let next_year = Utc::now() + chrono::Duration::days(400);
        let allotment = fx.flow.allotment_at(fx.manager.id, next_year).unwrap();

        assert_eq!(allotment.used_amount, Decimal::ZERO);
        assert_eq!(allotment.remaining, dec(100));
    }

    #[test]
    fn test_allotment_requires_manager() {
        let fx = fixture();

        let result = fx.flow.allotment(fx.worker.id);

        assert!(matches!(result, Err(LedgerError::Validation { .. })));
    }

    #[test]
    fn test_concurrent_awards_stay_within_allotment() {
        let fx = fixture_with_allotment(dec(100));

        let granted = thread::scope(|scope| {
            let handles: Vec<_> = (0..10)
                .map(|_| {
                    scope.spawn(|| fx.flow.award(fx.manager.id, "wes@example.com", dec(20), None))
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap())
                .filter(Result::is_ok)
                .count()
        });

        assert_eq!(granted, 5);
        assert_eq!(
            fx.store.account(fx.worker.account_id).unwrap().balance,
            dec(100)
        );
    }

    #[test]
    fn test_history_is_newest_first_and_paged() {
        let fx = fixture();
        let awards: Vec<_> = (1..=3)
            .map(|n| {
                fx.flow
                    .award(fx.manager.id, "wes@example.com", dec(n), None)
                    .unwrap()
                    .id
            })
            .collect();

        let all = fx.flow.history_for(fx.manager.id, None, 0).unwrap();
        let page = fx.flow.history_for(fx.manager.id, Some(1), 1).unwrap();

        assert_eq!(all.total, 3);
        assert_eq!(all.limit, DEFAULT_HISTORY_LIMIT);
        let ids: Vec<_> = all.awards.iter().map(|tx| tx.id).collect();
        assert_eq!(ids, vec![awards[2], awards[1], awards[0]]);
        assert_eq!(page.total, 3);
        assert_eq!(page.awards.len(), 1);
        assert_eq!(page.awards[0].id, awards[1]);
    }

    #[test]
    fn test_failed_award_is_not_in_history() {
        let fx = fixture_with_allotment(dec(10));

        let _ = fx.flow.award(fx.manager.id, "wes@example.com", dec(20), None);

        assert_eq!(fx.flow.history_for(fx.manager.id, None, 0).unwrap().total, 0);
    }
}
