//! Named mutexes keyed by entity id
//!
//! Flows use these to serialize work that spans more than one ledger row:
//! debits of the same account (so two purchases cannot both pass the
//! spendable-balance check) and approvals of the same wellness task (so the
//! reward cap cannot be exceeded).

use dashmap::DashMap;
use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};
use std::fmt::Display;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use crate::types::LedgerError;

/// Guard returned by [`KeyedLocks::acquire`]; the lock is released on drop
pub type KeyedGuard = ArcMutexGuard<RawMutex, ()>;

#[derive(Debug)]
pub struct KeyedLocks<K: Eq + Hash> {
    locks: DashMap<K, Arc<Mutex<()>>>,
    timeout: Duration,
}

impl<K: Eq + Hash + Copy + Display> KeyedLocks<K> {
    pub fn new(timeout: Duration) -> Self {
        Self {
            locks: DashMap::new(),
            timeout,
        }
    }

    /// Acquire the lock of `key`, waiting at most the configured timeout
    pub fn acquire(&self, key: K) -> Result<KeyedGuard, LedgerError> {
        let lock = Arc::clone(self.locks.entry(key).or_default().value());
        lock.try_lock_arc_for(self.timeout).ok_or_else(|| {
            tracing::debug!(key = %key, "keyed lock timed out");
            LedgerError::lock_timeout(key)
        })
    }
}
