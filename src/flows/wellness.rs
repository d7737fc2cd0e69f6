//! Wellness tasks, submissions and their rewards
//!
//! An employee submits a task and receives a pending `wellness_reward` for
//! the task's coin value. An admin then approves the submission, which posts
//! the reward, or rejects it, which rejects the reward. The submission
//! status change always commits in the same unit of work as the ledger
//! change.
//!
//! # Reward Cap
//!
//! A task may limit how many submissions are rewarded. Reviews of the same
//! task are serialized by a task lock, so the approved count read before
//! approving cannot go stale. A submission reviewed after the cap is reached
//! is rejected instead.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use super::directory::EmployeeDirectory;
use super::locks::{KeyedGuard, KeyedLocks};
use super::notify::{Notification, Notifier};
use crate::core::{LedgerStore, TransactionService, UnitOfWork};
use crate::types::{
    Employee, EmployeeId, LedgerError, NewTransaction, SubmissionId, SubmissionSummary,
    TransactionId, TransactionType,
};

pub type TaskId = Uuid;

/// Rejection reason stored once a task has rewarded its maximum
pub const REWARD_CAP_REASON: &str = "Maximum rewards reached for this task";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WellnessTask {
    pub id: TaskId,
    pub name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub coin_value: Decimal,

    /// How many submissions may be approved; `None` is unlimited
    pub max_rewarded_users: Option<u32>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    Pending,
    Approved,
    Rejected,
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SubmissionStatus::Pending => "pending",
            SubmissionStatus::Approved => "approved",
            SubmissionStatus::Rejected => "rejected",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WellnessSubmission {
    pub id: SubmissionId,
    pub employee_id: EmployeeId,
    pub task_id: TaskId,
    pub status: SubmissionStatus,

    /// The pending reward created with the submission
    pub transaction_id: TransactionId,
    pub rejection_reason: Option<String>,
    pub reviewed_by: Option<EmployeeId>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Tasks and submissions
#[derive(Debug, Default)]
pub struct SubmissionStore {
    tasks: DashMap<TaskId, WellnessTask>,
    submissions: DashMap<SubmissionId, WellnessSubmission>,
}

impl SubmissionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn task(&self, task_id: TaskId) -> Option<WellnessTask> {
        self.tasks.get(&task_id).map(|entry| entry.value().clone())
    }

    pub fn submission(&self, submission_id: SubmissionId) -> Option<WellnessSubmission> {
        self.submissions
            .get(&submission_id)
            .map(|entry| entry.value().clone())
    }

    /// Display summary of a submission, joined with its task
    pub fn summary(&self, submission_id: SubmissionId) -> Option<SubmissionSummary> {
        let submission = self.submission(submission_id)?;
        let task = self.task(submission.task_id)?;
        Some(SubmissionSummary {
            id: submission.id,
            status: submission.status.to_string(),
            task_name: task.name,
            coin_value: task.coin_value,
        })
    }

    /// Number of approved submissions of a task
    pub fn approved_count(&self, task_id: TaskId) -> usize {
        self.submissions
            .iter()
            .filter(|entry| {
                entry.task_id == task_id && entry.status == SubmissionStatus::Approved
            })
            .count()
    }

    /// Submissions matching `keep`, oldest first
    pub fn submissions_where(
        &self,
        keep: impl Fn(&WellnessSubmission) -> bool,
    ) -> Vec<WellnessSubmission> {
        let mut submissions: Vec<WellnessSubmission> = self
            .submissions
            .iter()
            .filter(|entry| keep(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        submissions.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        submissions
    }

    fn put_task(&self, task: WellnessTask) {
        self.tasks.insert(task.id, task);
    }

    fn put_submission(&self, submission: WellnessSubmission) {
        self.submissions.insert(submission.id, submission);
    }
}

pub struct WellnessFlow<S: LedgerStore> {
    ledger: TransactionService<S>,
    directory: Arc<EmployeeDirectory>,
    notifier: Arc<dyn Notifier>,
    records: Arc<SubmissionStore>,
    task_locks: KeyedLocks<TaskId>,
}

impl<S: LedgerStore> WellnessFlow<S> {
    pub fn new(
        ledger: TransactionService<S>,
        directory: Arc<EmployeeDirectory>,
        notifier: Arc<dyn Notifier>,
        records: Arc<SubmissionStore>,
        task_locks: KeyedLocks<TaskId>,
    ) -> Self {
        Self {
            ledger,
            directory,
            notifier,
            records,
            task_locks,
        }
    }

    pub fn records(&self) -> &Arc<SubmissionStore> {
        &self.records
    }

    pub fn create_task(
        &self,
        name: &str,
        coin_value: Decimal,
        max_rewarded_users: Option<u32>,
    ) -> Result<WellnessTask, LedgerError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LedgerError::validation("task name is required"));
        }
        if coin_value <= Decimal::ZERO {
            return Err(LedgerError::invalid_amount(coin_value));
        }
        if max_rewarded_users == Some(0) {
            return Err(LedgerError::validation(
                "maximum rewarded users must be at least 1",
            ));
        }

        let task = WellnessTask {
            id: Uuid::new_v4(),
            name: name.to_string(),
            coin_value,
            max_rewarded_users,
            is_active: true,
            created_at: Utc::now(),
        };
        self.records.put_task(task.clone());
        tracing::info!(task = %task.id, name = %task.name, "wellness task created");
        Ok(task)
    }

    /// Stop accepting submissions for a task; pending ones can still be reviewed
    pub fn deactivate_task(&self, task_id: TaskId) -> Result<WellnessTask, LedgerError> {
        let mut task = self.require_task(task_id)?;
        task.is_active = false;
        self.records.put_task(task.clone());
        Ok(task)
    }

    /// Submit a task, creating its pending reward
    pub fn submit(
        &self,
        employee_id: EmployeeId,
        task_id: TaskId,
    ) -> Result<WellnessSubmission, LedgerError> {
        let employee = self.directory.require(employee_id)?;
        let task = self.require_task(task_id)?;
        if !task.is_active {
            return Err(LedgerError::validation(format!(
                "wellness task {} is not active",
                task.id
            )));
        }

        let submission_id = Uuid::new_v4();
        let mut unit = self.ledger.begin();
        let reward = self.ledger.create_pending_transaction_in(
            &mut unit,
            NewTransaction::new(
                employee.account_id,
                TransactionType::WellnessReward,
                task.coin_value,
            )
            .with_description(format!("Wellness reward: {}", task.name))
            .with_target_employee(employee.id)
            .with_submission(submission_id),
        )?;

        let submission = WellnessSubmission {
            id: submission_id,
            employee_id: employee.id,
            task_id: task.id,
            status: SubmissionStatus::Pending,
            transaction_id: reward.id,
            rejection_reason: None,
            reviewed_by: None,
            reviewed_at: None,
            created_at: reward.created_at,
        };
        self.stage_submission(&mut unit, submission.clone());
        unit.commit()?;

        tracing::info!(
            submission = %submission.id,
            task = %task.id,
            employee = %employee.id,
            "wellness submission received"
        );
        Ok(submission)
    }

    /// Approve a pending submission and post its reward
    ///
    /// # Errors
    ///
    /// * `RecordNotFound` - Unknown submission
    /// * `RecordNotPending` - The submission was already reviewed
    /// * `RewardLimitReached` - The task is at its cap; the submission has
    ///   been rejected and that rejection committed
    pub fn approve(
        &self,
        submission_id: SubmissionId,
        reviewer_id: EmployeeId,
    ) -> Result<WellnessSubmission, LedgerError> {
        let reviewer = self.require_reviewer(reviewer_id)?;
        let (task, _task_lock, mut submission) = self.lock_for_review(submission_id)?;

        if let Some(limit) = task.max_rewarded_users {
            if self.records.approved_count(task.id) >= limit as usize {
                let rejected = self.reject_locked(submission, &reviewer, Some(REWARD_CAP_REASON))?;
                tracing::warn!(
                    submission = %rejected.id,
                    task = %task.id,
                    limit,
                    "reward cap reached, submission rejected"
                );
                return Err(LedgerError::reward_limit_reached(task.id, limit));
            }
        }

        let mut unit = self.ledger.begin();
        let reward = self
            .ledger
            .post_transaction_in(&mut unit, submission.transaction_id)?;
        submission.status = SubmissionStatus::Approved;
        submission.reviewed_by = Some(reviewer.id);
        submission.reviewed_at = reward.posted_at;
        self.stage_submission(&mut unit, submission.clone());
        unit.commit()?;

        tracing::info!(
            submission = %submission.id,
            reviewer = %reviewer.id,
            amount = %reward.amount,
            "wellness submission approved"
        );
        self.notifier.notify(&Notification::WellnessApproved {
            employee: submission.employee_id,
            submission: submission.id,
            amount: reward.amount,
        });
        Ok(submission)
    }

    /// Reject a pending submission and its reward
    pub fn reject(
        &self,
        submission_id: SubmissionId,
        reviewer_id: EmployeeId,
        reason: Option<&str>,
    ) -> Result<WellnessSubmission, LedgerError> {
        let reviewer = self.require_reviewer(reviewer_id)?;
        let (_task, _task_lock, submission) = self.lock_for_review(submission_id)?;
        let rejected = self.reject_locked(submission, &reviewer, reason)?;

        tracing::info!(
            submission = %rejected.id,
            reviewer = %reviewer.id,
            "wellness submission rejected"
        );
        Ok(rejected)
    }

    /// An employee's submissions, oldest first
    pub fn submissions_for(&self, employee_id: EmployeeId) -> Vec<WellnessSubmission> {
        self.records
            .submissions_where(|submission| submission.employee_id == employee_id)
    }

    /// Submissions awaiting review, oldest first
    pub fn pending_submissions(&self) -> Vec<WellnessSubmission> {
        self.records
            .submissions_where(|submission| submission.status == SubmissionStatus::Pending)
    }

    // Helper functions

    fn require_task(&self, task_id: TaskId) -> Result<WellnessTask, LedgerError> {
        self.records
            .task(task_id)
            .ok_or_else(|| LedgerError::record_not_found("wellness task", task_id))
    }

    fn require_reviewer(&self, reviewer_id: EmployeeId) -> Result<Employee, LedgerError> {
        let reviewer = self.directory.require(reviewer_id)?;
        if !reviewer.is_admin {
            return Err(LedgerError::validation(format!(
                "employee {} cannot review wellness submissions",
                reviewer.email
            )));
        }
        Ok(reviewer)
    }

    /// Take the task lock and re-read the submission under it
    fn lock_for_review(
        &self,
        submission_id: SubmissionId,
    ) -> Result<(WellnessTask, KeyedGuard, WellnessSubmission), LedgerError> {
        let submission = self
            .records
            .submission(submission_id)
            .ok_or_else(|| LedgerError::record_not_found("wellness submission", submission_id))?;
        let task = self.require_task(submission.task_id)?;
        let guard = self.task_locks.acquire(task.id)?;

        let submission = self
            .records
            .submission(submission_id)
            .ok_or_else(|| LedgerError::record_not_found("wellness submission", submission_id))?;
        if submission.status != SubmissionStatus::Pending {
            return Err(LedgerError::record_not_pending(
                "wellness submission",
                submission.id,
                submission.status,
            ));
        }
        Ok((task, guard, submission))
    }

    fn reject_locked(
        &self,
        mut submission: WellnessSubmission,
        reviewer: &Employee,
        reason: Option<&str>,
    ) -> Result<WellnessSubmission, LedgerError> {
        let mut unit = self.ledger.begin();
        let reward = self
            .ledger
            .reject_transaction_in(&mut unit, submission.transaction_id, reason)?;
        submission.status = SubmissionStatus::Rejected;
        submission.rejection_reason = reason.map(str::to_string);
        submission.reviewed_by = Some(reviewer.id);
        submission.reviewed_at = reward.reviewed_at;
        self.stage_submission(&mut unit, submission.clone());
        unit.commit()?;

        self.notifier.notify(&Notification::WellnessRejected {
            employee: submission.employee_id,
            submission: submission.id,
            reason: submission.rejection_reason.clone(),
        });
        Ok(submission)
    }

    fn stage_submission(&self, unit: &mut S::Unit, submission: WellnessSubmission) {
        let records = Arc::clone(&self.records);
        unit.defer(Box::new(move || records.put_submission(submission)));
    }
}
