//! Employee identity types
//!
//! Employees are provisioned by the directory in [`crate::flows::directory`];
//! the ledger only ever sees their summary projection.

use serde::{Deserialize, Serialize};

use super::account::{AccountId, EmployeeId};

/// A provisioned employee
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Employee {
    pub id: EmployeeId,

    /// Unique, stored lowercase
    pub email: String,

    pub name: String,

    /// Managers may award coins
    pub is_manager: bool,

    /// Admins review wellness submissions and fulfil store orders
    pub is_admin: bool,

    /// The employee's one account
    pub account_id: AccountId,
}

/// Input for provisioning an employee
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEmployee {
    pub email: String,
    pub name: String,
    pub is_manager: bool,
    pub is_admin: bool,
}

impl NewEmployee {
    pub fn new(email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: name.into(),
            is_manager: false,
            is_admin: false,
        }
    }

    pub fn manager(mut self) -> Self {
        self.is_manager = true;
        self
    }

    pub fn admin(mut self) -> Self {
        self.is_admin = true;
        self
    }
}

/// Identity fields shown next to a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeSummary {
    pub id: EmployeeId,
    pub name: String,
    pub email: String,
}

impl From<&Employee> for EmployeeSummary {
    fn from(employee: &Employee) -> Self {
        EmployeeSummary {
            id: employee.id,
            name: employee.name.clone(),
            email: employee.email.clone(),
        }
    }
}
