//! Per-key locks for read-modify-write sequences.
//!
//! The KV backend offers no optimistic concurrency token, so any
//! read-modify-write on a single resource key (association updates,
//! status refresh write-backs, provisioning transitions) must hold that
//! key's lock. In a multi-process deployment this role falls to the KV
//! collaborator's session locks; the embedded deployment uses this
//! in-process registry.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Registry of per-key async mutexes.
#[derive(Default)]
pub struct LockRegistry {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

/// Guard holding one key's lock until dropped.
pub struct KeyGuard {
    _guard: OwnedMutexGuard<()>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for `key`, waiting if another task holds it.
    pub async fn acquire(&self, key: &str) -> KeyGuard {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        KeyGuard {
            _guard: lock.lock_owned().await,
        }
    }
}
