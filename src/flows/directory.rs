//! Employee directory
//!
//! Provisions employees and their accounts. Emails are unique and compared
//! case-insensitively; provisioning the same email twice returns the first
//! employee unchanged.

use dashmap::DashMap;
use uuid::Uuid;

use crate::core::AccountRepository;
use crate::types::{Employee, EmployeeId, EmployeeSummary, LedgerError, NewEmployee};

#[derive(Debug, Default)]
pub struct EmployeeDirectory {
    employees: DashMap<EmployeeId, Employee>,

    /// Lowercased email to employee id
    by_email: DashMap<String, EmployeeId>,
}

/// Lowercase and trim an email for lookups
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl EmployeeDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provision an employee, creating their zero-balance account
    ///
    /// # Returns
    ///
    /// * `Ok(Employee)` - The new employee, or the existing one for this email
    /// * `Err(LedgerError::Validation)` - If the email or name is unusable
    pub fn provision(
        &self,
        accounts: &dyn AccountRepository,
        new: NewEmployee,
    ) -> Result<Employee, LedgerError> {
        let email = normalize_email(&new.email);
        if email.is_empty() || !email.contains('@') {
            return Err(LedgerError::validation(format!(
                "invalid email '{}'",
                new.email
            )));
        }
        let name = new.name.trim();
        if name.is_empty() {
            return Err(LedgerError::validation("employee name is required"));
        }

        let mut created = None;
        let employee_id = *self
            .by_email
            .entry(email.clone())
            .or_insert_with(|| {
                let employee_id = Uuid::new_v4();
                let account = accounts.get_or_create(employee_id);
                let employee = Employee {
                    id: employee_id,
                    email: email.clone(),
                    name: name.to_string(),
                    is_manager: new.is_manager,
                    is_admin: new.is_admin,
                    account_id: account.id,
                };
                self.employees.insert(employee_id, employee.clone());
                created = Some(employee);
                employee_id
            })
            .value();

        if let Some(employee) = created {
            tracing::info!(
                employee = %employee.id,
                email = %employee.email,
                manager = employee.is_manager,
                "employee provisioned"
            );
            return Ok(employee);
        }

        self.get(employee_id)
            .ok_or_else(|| LedgerError::employee_not_found(employee_id))
    }

    pub fn get(&self, employee_id: EmployeeId) -> Option<Employee> {
        self.employees
            .get(&employee_id)
            .map(|entry| entry.value().clone())
    }

    /// Look an employee up by email, ignoring case
    pub fn find_by_email(&self, email: &str) -> Option<Employee> {
        let employee_id = *self.by_email.get(&normalize_email(email))?.value();
        self.get(employee_id)
    }

    pub fn summary(&self, employee_id: EmployeeId) -> Option<EmployeeSummary> {
        self.employees
            .get(&employee_id)
            .map(|entry| EmployeeSummary::from(entry.value()))
    }

    /// Get an employee or fail with `EmployeeNotFound`
    pub fn require(&self, employee_id: EmployeeId) -> Result<Employee, LedgerError> {
        self.get(employee_id)
            .ok_or_else(|| LedgerError::employee_not_found(employee_id))
    }

    /// Find an employee by email or fail with `EmployeeNotFound`
    pub fn require_email(&self, email: &str) -> Result<Employee, LedgerError> {
        self.find_by_email(email)
            .ok_or_else(|| LedgerError::employee_not_found(normalize_email(email)))
    }

    /// Every employee, sorted by email
    pub fn all(&self) -> Vec<Employee> {
        let mut employees: Vec<Employee> = self
            .employees
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        employees.sort_by(|a, b| a.email.cmp(&b.email));
        employees
    }

    pub fn len(&self) -> usize {
        self.employees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.employees.is_empty()
    }
}
