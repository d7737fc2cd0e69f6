//! Replay session
//!
//! Applies [`LedgerCommand`]s to a [`Guincoin`] application and remembers the
//! references the input gives to transactions and transfers. Both processing
//! strategies drive the same session; they differ only in how commands are
//! scheduled.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::io::Write;

use crate::app::Guincoin;
use crate::cli::ReportKind;
use crate::core::TransactionRepository;
use crate::flows::directory::normalize_email;
use crate::flows::TransferId;
use crate::io::csv_format::{
    write_balances_csv, write_statement_csv, BalanceRow, LedgerCommand, StatementRow,
};
use crate::types::{LedgerError, NewEmployee, NewTransaction, TransactionId};

/// What an input reference points at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reference {
    Transaction(TransactionId),
    Transfer(TransferId),
}

pub struct ReplaySession {
    app: Guincoin,
    refs: DashMap<String, Reference>,
    owners: DashMap<String, String>,
}

impl ReplaySession {
    pub fn new(app: Guincoin) -> Self {
        Self {
            app,
            refs: DashMap::new(),
            owners: DashMap::new(),
        }
    }

    pub fn app(&self) -> &Guincoin {
        &self.app
    }

    pub fn reference(&self, name: &str) -> Option<Reference> {
        self.refs.get(name).map(|entry| *entry)
    }

    /// Employee whose partition a command belongs to
    ///
    /// Commands addressed by reference inherit the owner recorded by
    /// [`ReplaySession::note_owner`]; an unknown reference yields an empty
    /// owner.
    pub fn owner_of(&self, command: &LedgerCommand) -> String {
        if let Some(owner) = command.owner() {
            return normalize_email(owner);
        }
        command
            .refers_to()
            .and_then(|reference| self.owners.get(reference).map(|owner| owner.clone()))
            .unwrap_or_default()
    }

    /// Record the owner of the reference a command creates
    pub fn note_owner(&self, command: &LedgerCommand) {
        if let (Some(reference), Some(owner)) = (command.creates(), command.owner()) {
            self.owners
                .entry(reference.to_string())
                .or_insert_with(|| normalize_email(owner));
        }
    }

    /// Apply one command
    pub fn apply(&self, command: LedgerCommand) -> Result<(), LedgerError> {
        match command {
            LedgerCommand::Provision {
                email,
                name,
                manager,
            } => {
                let mut new = NewEmployee::new(email, name);
                if manager {
                    new = new.manager();
                }
                self.app.provision(new)?;
            }
            LedgerCommand::Pending {
                reference,
                employee,
                source,
                transaction_type,
                amount,
                description,
            } => {
                self.check_unused(&reference)?;
                let employee = self.app.directory().require_email(&employee)?;
                let mut new = NewTransaction::new(employee.account_id, transaction_type, amount)
                    .with_optional_description(description);
                if let Some(source) = source {
                    new = new.with_source_employee(self.app.directory().require_email(&source)?.id);
                }
                let transaction = self.app.ledger().create_pending_transaction(new)?;
                self.remember(reference, Reference::Transaction(transaction.id))?;
            }
            LedgerCommand::Post { reference } => {
                let id = self.transaction(&reference)?;
                self.app.ledger().post_transaction(id, None)?;
            }
            LedgerCommand::Reject { reference, reason } => {
                let id = self.transaction(&reference)?;
                self.app.ledger().reject_transaction(id, reason.as_deref())?;
            }
            LedgerCommand::Award {
                manager,
                recipient,
                amount,
                description,
            } => {
                let manager = self.app.directory().require_email(&manager)?;
                self.app
                    .awards()
                    .award(manager.id, &recipient, amount, description)?;
            }
            LedgerCommand::Transfer {
                reference,
                sender,
                recipient,
                amount,
                message,
                complete,
            } => {
                if let Some(reference) = &reference {
                    self.check_unused(reference)?;
                }
                let sender = self.app.directory().require_email(&sender)?;
                let transfers = self.app.transfers();
                let transfer = if complete {
                    transfers.send(sender.id, &recipient, amount, message)?
                } else {
                    transfers.initiate(sender.id, &recipient, amount, message)?
                };
                if let Some(reference) = reference {
                    self.remember(reference, Reference::Transfer(transfer.id))?;
                }
            }
            LedgerCommand::Complete { reference } => {
                let id = self.transfer(&reference)?;
                self.app.transfers().complete(id)?;
            }
            LedgerCommand::Cancel { reference, by } => {
                let id = self.transfer(&reference)?;
                let by = match by {
                    Some(email) => self.app.directory().require_email(&email)?.id,
                    None => {
                        self.app
                            .transfers()
                            .get(id)
                            .ok_or_else(|| LedgerError::record_not_found("transfer", id))?
                            .sender_id
                    }
                };
                self.app.transfers().cancel(id, by)?;
            }
        }
        Ok(())
    }

    /// Posted, pending and total balance for every employee
    pub fn balances(&self) -> Result<Vec<BalanceRow>, LedgerError> {
        self.app
            .directory()
            .all()
            .into_iter()
            .map(|employee| {
                let balance = self
                    .app
                    .ledger()
                    .get_account_balance(employee.account_id, true)?;
                Ok(BalanceRow {
                    email: employee.email,
                    posted: balance.posted,
                    pending: balance.pending,
                    total: balance.total,
                })
            })
            .collect()
    }

    /// Every transaction per employee, oldest first
    pub fn statement(&self) -> Vec<StatementRow> {
        let store = self.app.store();
        self.app
            .directory()
            .all()
            .into_iter()
            .flat_map(|employee| {
                let mut transactions = store.transactions_for(employee.account_id);
                transactions.reverse();
                transactions.into_iter().map(move |transaction| StatementRow {
                    email: employee.email.clone(),
                    transaction_type: transaction.transaction_type,
                    amount: transaction.amount,
                    status: transaction.status,
                    description: transaction.description,
                })
            })
            .collect()
    }

    pub fn write_report(&self, kind: ReportKind, output: &mut dyn Write) -> Result<(), LedgerError> {
        match kind {
            ReportKind::Balances => write_balances_csv(&self.balances()?, output),
            ReportKind::Statement => write_statement_csv(&self.statement(), output),
        }
    }

    fn check_unused(&self, reference: &str) -> Result<(), LedgerError> {
        if self.refs.contains_key(reference) {
            return Err(LedgerError::validation(format!(
                "ref '{}' is already in use",
                reference
            )));
        }
        Ok(())
    }

    fn remember(&self, reference: String, target: Reference) -> Result<(), LedgerError> {
        match self.refs.entry(reference) {
            Entry::Occupied(entry) => Err(LedgerError::validation(format!(
                "ref '{}' is already in use",
                entry.key()
            ))),
            Entry::Vacant(entry) => {
                entry.insert(target);
                Ok(())
            }
        }
    }

    fn transaction(&self, reference: &str) -> Result<TransactionId, LedgerError> {
        match self.reference(reference) {
            Some(Reference::Transaction(id)) => Ok(id),
            Some(Reference::Transfer(_)) => Err(LedgerError::validation(format!(
                "ref '{}' names a transfer, not a transaction",
                reference
            ))),
            None => Err(unknown_ref(reference)),
        }
    }

    fn transfer(&self, reference: &str) -> Result<TransferId, LedgerError> {
        match self.reference(reference) {
            Some(Reference::Transfer(id)) => Ok(id),
            Some(Reference::Transaction(_)) => Err(LedgerError::validation(format!(
                "ref '{}' names a transaction, not a transfer",
                reference
            ))),
            None => Err(unknown_ref(reference)),
        }
    }
}

fn unknown_ref(reference: &str) -> LedgerError {
    LedgerError::validation(format!("unknown ref '{}'", reference))
}
