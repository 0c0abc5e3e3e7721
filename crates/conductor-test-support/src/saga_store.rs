//! Test saga stores.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use conductor_core::error::DomainError;
use conductor_core::saga_store::{SagaSnapshot, SagaStore};

/// An in-memory saga store that checks revisions and records every
/// successful save. Can inject revision conflicts on the first saves.
#[derive(Debug, Default)]
pub struct RecordingSagaStore {
    instances: Mutex<HashMap<(String, String), SagaSnapshot>>,
    saves: Mutex<Vec<SagaSnapshot>>,
    conflicts_remaining: AtomicU32,
}

impl RecordingSagaStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that rejects the first `conflicts` saves with a
    /// `ConcurrencyConflict`.
    #[must_use]
    pub fn with_conflicts(conflicts: u32) -> Self {
        Self {
            conflicts_remaining: AtomicU32::new(conflicts),
            ..Self::default()
        }
    }

    /// Seeds a snapshot as if it had been saved earlier.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn insert(&self, snapshot: SagaSnapshot) {
        self.instances.lock().unwrap().insert(
            (snapshot.saga_type.clone(), snapshot.saga_id.clone()),
            snapshot,
        );
    }

    /// Returns the current snapshot of an instance.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn snapshot(&self, saga_type: &str, saga_id: &str) -> Option<SagaSnapshot> {
        self.instances
            .lock()
            .unwrap()
            .get(&(saga_type.to_owned(), saga_id.to_owned()))
            .cloned()
    }

    /// Returns every successful save, in order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn saves(&self) -> Vec<SagaSnapshot> {
        self.saves.lock().unwrap().clone()
    }
}

#[async_trait]
impl SagaStore for RecordingSagaStore {
    async fn load(
        &self,
        saga_type: &str,
        saga_id: &str,
    ) -> Result<Option<SagaSnapshot>, DomainError> {
        Ok(self.snapshot(saga_type, saga_id))
    }

    async fn save(
        &self,
        snapshot: &SagaSnapshot,
        expected_revision: i64,
    ) -> Result<i64, DomainError> {
        let key = (snapshot.saga_type.clone(), snapshot.saga_id.clone());
        let mut instances = self.instances.lock().unwrap();
        let actual = instances.get(&key).map_or(0, |current| current.revision);

        let injected = self
            .conflicts_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected || actual != expected_revision {
            return Err(DomainError::ConcurrencyConflict {
                key: format!("{}/{}", key.0, key.1),
                expected: expected_revision,
                actual: if injected { actual + 1 } else { actual },
            });
        }

        let mut saved = snapshot.clone();
        saved.revision = expected_revision + 1;
        instances.insert(key, saved.clone());
        self.saves.lock().unwrap().push(saved);
        Ok(expected_revision + 1)
    }

    async fn queued(&self, saga_type: &str) -> Result<Vec<String>, DomainError> {
        let mut saga_ids: Vec<_> = self
            .instances
            .lock()
            .unwrap()
            .values()
            .filter(|snapshot| {
                snapshot.saga_type == saga_type && !snapshot.uncommitted_commands.is_empty()
            })
            .map(|snapshot| snapshot.saga_id.clone())
            .collect();
        saga_ids.sort();
        Ok(saga_ids)
    }
}

/// A saga store that always returns an infrastructure error.
#[derive(Debug)]
pub struct FailingSagaStore;

#[async_trait]
impl SagaStore for FailingSagaStore {
    async fn load(
        &self,
        _saga_type: &str,
        _saga_id: &str,
    ) -> Result<Option<SagaSnapshot>, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }

    async fn save(
        &self,
        _snapshot: &SagaSnapshot,
        _expected_revision: i64,
    ) -> Result<i64, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }

    async fn queued(&self, _saga_type: &str) -> Result<Vec<String>, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }
}

/// A saga store whose calls never complete. Useful for testing timeouts.
#[derive(Debug, Default)]
pub struct StalledSagaStore {
    calls: AtomicU32,
}

impl StalledSagaStore {
    /// Returns how many calls were attempted.
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SagaStore for StalledSagaStore {
    async fn load(
        &self,
        _saga_type: &str,
        _saga_id: &str,
    ) -> Result<Option<SagaSnapshot>, DomainError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::future::pending().await
    }

    async fn save(
        &self,
        _snapshot: &SagaSnapshot,
        _expected_revision: i64,
    ) -> Result<i64, DomainError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::future::pending().await
    }

    async fn queued(&self, _saga_type: &str) -> Result<Vec<String>, DomainError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::future::pending().await
    }
}
