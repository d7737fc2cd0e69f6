//! CSV format handling for replay commands and reports
//!
//! This module centralizes all CSV format concerns, providing:
//! - CsvRecord structure for deserialization
//! - Conversion from CSV records to [`LedgerCommand`]s
//! - Balance and statement report serialization
//!
//! All functions are pure (no I/O beyond the given writer) for easy testing.

use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Write;
use std::str::FromStr;

use crate::types::{LedgerError, TransactionStatus, TransactionType};

/// CSV record structure for deserialization
///
/// Matches the input columns `op,ref,employee,counterparty,type,amount,note`.
/// Everything but `op` is optional; which fields an op needs is checked in
/// [`convert_csv_record`].
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct CsvRecord {
    pub op: String,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub employee: Option<String>,
    #[serde(default)]
    pub counterparty: Option<String>,
    #[serde(rename = "type", default)]
    pub tx_type: Option<String>,
    #[serde(default)]
    pub amount: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

/// One replayable operation
///
/// Employees are identified by email; transactions and transfers by the
/// reference given in the input.
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerCommand {
    Provision {
        email: String,
        name: String,
        manager: bool,
    },
    Pending {
        reference: String,
        employee: String,
        source: Option<String>,
        transaction_type: TransactionType,
        amount: Decimal,
        description: Option<String>,
    },
    Post {
        reference: String,
    },
    Reject {
        reference: String,
        reason: Option<String>,
    },
    Award {
        manager: String,
        recipient: String,
        amount: Decimal,
        description: Option<String>,
    },
    Transfer {
        reference: Option<String>,
        sender: String,
        recipient: String,
        amount: Decimal,
        message: Option<String>,
        complete: bool,
    },
    Complete {
        reference: String,
    },
    Cancel {
        reference: String,
        by: Option<String>,
    },
}

impl LedgerCommand {
    /// The employee whose account this command is ordered against
    ///
    /// `None` for commands addressed by reference only; their owner is the
    /// owner of the command that created the reference.
    pub fn owner(&self) -> Option<&str> {
        match self {
            LedgerCommand::Provision { email, .. } => Some(email),
            LedgerCommand::Pending { employee, .. } => Some(employee),
            LedgerCommand::Award { recipient, .. } => Some(recipient),
            LedgerCommand::Transfer { sender, .. } => Some(sender),
            LedgerCommand::Post { .. }
            | LedgerCommand::Reject { .. }
            | LedgerCommand::Complete { .. }
            | LedgerCommand::Cancel { .. } => None,
        }
    }

    /// The reference this command creates, if any
    pub fn creates(&self) -> Option<&str> {
        match self {
            LedgerCommand::Pending { reference, .. } => Some(reference),
            LedgerCommand::Transfer { reference, .. } => reference.as_deref(),
            _ => None,
        }
    }

    /// The reference this command acts on, if any
    pub fn refers_to(&self) -> Option<&str> {
        match self {
            LedgerCommand::Post { reference }
            | LedgerCommand::Reject { reference, .. }
            | LedgerCommand::Complete { reference }
            | LedgerCommand::Cancel { reference, .. } => Some(reference),
            _ => None,
        }
    }

    pub fn is_provision(&self) -> bool {
        matches!(self, LedgerCommand::Provision { .. })
    }
}

/// Convert a CsvRecord to a LedgerCommand
///
/// # Returns
///
/// * `Ok(LedgerCommand)` - Successfully converted record
/// * `Err(LedgerError::Validation)` - Unknown op, or a field the op needs is missing or malformed
pub fn convert_csv_record(csv_record: CsvRecord) -> Result<LedgerCommand, LedgerError> {
    let op = csv_record.op.trim().to_lowercase();
    let record = &csv_record;

    match op.as_str() {
        "provision" => {
            let email = required(record, "employee", &record.employee)?;
            let name = present(&record.note).unwrap_or_else(|| email.clone());
            let manager = present(&record.tx_type)
                .map(|ty| ty.eq_ignore_ascii_case("manager"))
                .unwrap_or(false);
            Ok(LedgerCommand::Provision {
                email,
                name,
                manager,
            })
        }
        "pending" => {
            let ty = required(record, "type", &record.tx_type)?;
            Ok(LedgerCommand::Pending {
                reference: required(record, "ref", &record.reference)?,
                employee: required(record, "employee", &record.employee)?,
                source: present(&record.counterparty),
                transaction_type: TransactionType::from_str(&ty)?,
                amount: amount(record)?,
                description: present(&record.note),
            })
        }
        "post" => Ok(LedgerCommand::Post {
            reference: required(record, "ref", &record.reference)?,
        }),
        "reject" => Ok(LedgerCommand::Reject {
            reference: required(record, "ref", &record.reference)?,
            reason: present(&record.note),
        }),
        "award" => Ok(LedgerCommand::Award {
            manager: required(record, "counterparty", &record.counterparty)?,
            recipient: required(record, "employee", &record.employee)?,
            amount: amount(record)?,
            description: present(&record.note),
        }),
        "transfer" | "send" => {
            let complete = op == "send";
            let reference = present(&record.reference);
            if !complete && reference.is_none() {
                return Err(LedgerError::validation("transfer requires a ref"));
            }
            Ok(LedgerCommand::Transfer {
                reference,
                sender: required(record, "employee", &record.employee)?,
                recipient: required(record, "counterparty", &record.counterparty)?,
                amount: amount(record)?,
                message: present(&record.note),
                complete,
            })
        }
        "complete" => Ok(LedgerCommand::Complete {
            reference: required(record, "ref", &record.reference)?,
        }),
        "cancel" => Ok(LedgerCommand::Cancel {
            reference: required(record, "ref", &record.reference)?,
            by: present(&record.employee),
        }),
        _ => Err(LedgerError::validation(format!(
            "Invalid op: '{}'",
            csv_record.op
        ))),
    }
}

// Helper functions

fn present(field: &Option<String>) -> Option<String> {
    field
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn required(
    record: &CsvRecord,
    column: &str,
    field: &Option<String>,
) -> Result<String, LedgerError> {
    present(field).ok_or_else(|| {
        LedgerError::validation(format!("{} requires a value for '{}'", record.op, column))
    })
}

fn amount(record: &CsvRecord) -> Result<Decimal, LedgerError> {
    let raw = required(record, "amount", &record.amount)?;
    Decimal::from_str(&raw)
        .map_err(|_| LedgerError::validation(format!("Invalid amount '{}'", raw)))
}

/// One line of the balances report
#[derive(Debug, Clone, PartialEq)]
pub struct BalanceRow {
    pub email: String,
    pub posted: Decimal,
    pub pending: Decimal,
    pub total: Decimal,
}

/// One line of the statement report
#[derive(Debug, Clone, PartialEq)]
pub struct StatementRow {
    pub email: String,
    pub transaction_type: TransactionType,
    pub amount: Decimal,
    pub status: TransactionStatus,
    pub description: Option<String>,
}

/// Write balances as `employee,posted,pending,total`, sorted by email
pub fn write_balances_csv(rows: &[BalanceRow], output: &mut dyn Write) -> Result<(), LedgerError> {
    let mut writer = csv::Writer::from_writer(output);
    writer.write_record(["employee", "posted", "pending", "total"])?;

    let mut sorted = rows.to_vec();
    sorted.sort_by(|a, b| a.email.cmp(&b.email));

    for row in sorted {
        writer.write_record(&[
            row.email,
            format_amount(row.posted),
            format_amount(row.pending),
            format_amount(row.total),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

/// Write a statement as `employee,type,amount,status,description`
///
/// Rows are grouped by email; within an employee the given order is kept.
pub fn write_statement_csv(
    rows: &[StatementRow],
    output: &mut dyn Write,
) -> Result<(), LedgerError> {
    let mut writer = csv::Writer::from_writer(output);
    writer.write_record(["employee", "type", "amount", "status", "description"])?;

    let mut sorted = rows.to_vec();
    sorted.sort_by(|a, b| a.email.cmp(&b.email));

    for row in sorted {
        writer.write_record(&[
            row.email,
            row.transaction_type.to_string(),
            format_amount(row.amount),
            row.status.to_string(),
            row.description.unwrap_or_default(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

fn format_amount(amount: Decimal) -> String {
    format!("{:.2}", amount)
}
