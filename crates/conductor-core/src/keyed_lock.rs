//! Per-key serialization.
//!
//! Work for the same key (a saga id, an aggregate stream) runs strictly one
//! at a time in arrival order, while different keys proceed concurrently.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// A set of async mutexes created on demand, one per key.
///
/// Entries are removed when the last holder or waiter releases them,
/// including waiters whose `lock` future is dropped before it resolves.
#[derive(Debug)]
pub struct KeyedLock<K> {
    slots: Mutex<HashMap<K, Slot>>,
}

#[derive(Debug, Default)]
struct Slot {
    mutex: Arc<AsyncMutex<()>>,
    users: usize,
}

impl<K> Default for KeyedLock<K> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Clone> KeyedLock<K> {
    /// Creates an empty lock set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until `key` is free and holds it until the guard is dropped.
    ///
    /// Waiters are served in FIFO order.
    pub async fn lock(&self, key: K) -> KeyedGuard<'_, K> {
        let mutex = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            let slot = slots.entry(key.clone()).or_default();
            slot.users += 1;
            Arc::clone(&slot.mutex)
        };
        // Registered before the await so a cancelled waiter still checks out.
        let lease = Lease { owner: self, key };
        let guard = mutex.lock_owned().await;
        KeyedGuard {
            _guard: guard,
            _lease: lease,
        }
    }

    /// Number of keys currently held or awaited.
    #[must_use]
    pub fn active_keys(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// One holder's or waiter's claim on a slot.
#[derive(Debug)]
struct Lease<'a, K: Eq + Hash> {
    owner: &'a KeyedLock<K>,
    key: K,
}

impl<K: Eq + Hash> Drop for Lease<'_, K> {
    fn drop(&mut self) {
        let mut slots = self
            .owner
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = slots.get_mut(&self.key) {
            slot.users -= 1;
            if slot.users == 0 {
                slots.remove(&self.key);
            }
        }
    }
}

/// Exclusive hold on one key of a `KeyedLock`.
#[derive(Debug)]
pub struct KeyedGuard<'a, K: Eq + Hash + Clone> {
    // Field order matters: the mutex is released before the lease checks out.
    _guard: OwnedMutexGuard<()>,
    _lease: Lease<'a, K>,
}
