//! Account-related types for the Guincoin ledger
//!
//! This module defines the per-employee Account record holding the posted
//! balance.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Account identifier
pub type AccountId = Uuid;

/// Employee identifier
pub type EmployeeId = Uuid;

/// Per-employee balance record
///
/// There is exactly one Account per employee. The balance reflects only
/// transactions that have already been posted and is mutated exclusively by
/// posting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: AccountId,

    /// The employee owning this account (1:1)
    pub employee_id: EmployeeId,

    /// Posted balance
    ///
    /// Expected to stay non-negative under correct operation. The ledger does
    /// not enforce it; the debiting flows check spendable funds first.
    #[serde(with = "rust_decimal::serde::float")]
    pub balance: Decimal,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a new account with a zero balance
    pub fn new(employee_id: EmployeeId) -> Self {
        let now = Utc::now();
        Account {
            id: Uuid::new_v4(),
            employee_id,
            balance: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_account_starts_at_zero() {
        let employee = Uuid::new_v4();
        let account = Account::new(employee);

        assert_eq!(account.employee_id, employee);
        assert_eq!(account.balance, Decimal::ZERO);
        assert_eq!(account.created_at, account.updated_at);
    }
}
