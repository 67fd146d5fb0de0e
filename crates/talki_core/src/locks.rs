//! crates/talki_core/src/locks.rs
//!
//! In-process serialization keyed by entity id. Only covers a single instance;
//! a horizontally scaled deployment needs a lock shared across processes.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// Hands out one async mutex per entity id.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until no one else holds the lock for `key`. The lock is released
    /// when the returned guard is dropped.
    pub async fn lock(&self, key: Uuid) -> OwnedMutexGuard<()> {
        let entry = {
            let mut locks = self.locks.lock().await;
            // Entries only the map still references are idle.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(key).or_default().clone()
        };
        entry.lock_owned().await
    }

    /// Number of ids currently tracked.
    pub async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
