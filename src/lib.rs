//! Guincoin Rewards Ledger Library
//!
//! # Overview
//!
//! This library implements the ledger behind the Guincoin employee rewards
//! program: per-employee accounts, an append-only transaction log with a
//! pending → posted | rejected lifecycle, and the flows that feed it (manager
//! awards, peer transfers, wellness rewards, store purchases).
//!
//! # Architecture
//!
//! - [`types`] - Core data types (Account, LedgerTransaction, errors, queries)
//! - [`core`] - The transaction service and its storage layer:
//!   - [`core::service`] - Create, post and reject transactions; balances and history
//!   - [`core::traits`] - Repository and unit-of-work seams
//!   - [`core::memory`] - In-memory store with row locks and atomic commits
//! - [`flows`] - Business flows composed from service calls in one unit of work
//! - [`app`] - Wiring of the store, service and flows from [`config::Config`]
//! - [`io`] and [`strategy`] - CSV replay with sync and async scheduling
//! - [`cli`] and [`logging`] - The replay binary's surface
//!
//! # Balance rules
//!
//! A balance changes only when a transaction is posted. Credit types
//! (`manager_award`, `peer_transfer_received`, `wellness_reward`,
//! `adjustment`) add their amount; debit types (`peer_transfer_sent`,
//! `store_purchase`) subtract it. A transaction is posted or rejected at most
//! once.

// Module declarations
pub mod app;
pub mod cli;
pub mod config;
pub mod core;
pub mod flows;
pub mod io;
pub mod logging;
pub mod strategy;
pub mod types;

pub use app::Guincoin;
pub use core::{LedgerStore, MemoryLedgerStore, TransactionService, UnitOfWork};
pub use types::{
    Account, AccountBalance, LedgerError, LedgerTransaction, NewTransaction, TransactionStatus,
    TransactionType,
};
