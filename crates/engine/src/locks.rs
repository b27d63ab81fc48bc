//! Per-connection mutual exclusion.
//!
//! A sync and a token refresh for the same connection must not interleave:
//! a refresh rotates the tokens a running sync is using. Both take the
//! connection's lock from [`ConnectionLocks`] before touching the provider.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OwnedMutexGuard;

use ledgerlink_core::types::DbId;

/// Async mutexes keyed by connection id, created on demand.
#[derive(Debug, Default)]
pub struct ConnectionLocks {
    locks: Mutex<HashMap<DbId, Arc<tokio::sync::Mutex<()>>>>,
}

impl ConnectionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `connection_id`.
    pub async fn acquire(&self, connection_id: DbId) -> OwnedMutexGuard<()> {
        self.entry(connection_id).lock_owned().await
    }

    /// Take the lock only if nobody holds it.
    pub fn try_acquire(&self, connection_id: DbId) -> Option<OwnedMutexGuard<()>> {
        self.entry(connection_id).try_lock_owned().ok()
    }

    /// Number of connections with a live lock entry.
    pub fn len(&self) -> usize {
        self.map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entry(&self, connection_id: DbId) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = self.map();
        // Entries only the map references are idle.
        map.retain(|_, lock| Arc::strong_count(lock) > 1);
        map.entry(connection_id).or_default().clone()
    }

    fn map(&self) -> std::sync::MutexGuard<'_, HashMap<DbId, Arc<tokio::sync::Mutex<()>>>> {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
