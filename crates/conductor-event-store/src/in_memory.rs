//! In-memory stores for local runs and tests.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use conductor_core::error::DomainError;
use conductor_core::repository::{EventRepository, StoredEvent, StreamId};
use conductor_core::saga_store::{SagaSnapshot, SagaStore};

/// Event repository keeping every stream in a process-local map.
#[derive(Debug, Default)]
pub struct InMemoryEventRepository {
    streams: Mutex<HashMap<StreamId, Vec<StoredEvent>>>,
}

impl InMemoryEventRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the addresses of all non-empty streams, sorted.
    pub fn stream_ids(&self) -> Vec<StreamId> {
        let mut ids: Vec<_> = self
            .streams
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl EventRepository for InMemoryEventRepository {
    async fn load_events(&self, stream: &StreamId) -> Result<Vec<StoredEvent>, DomainError> {
        Ok(self
            .streams
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(stream)
            .cloned()
            .unwrap_or_default())
    }

    async fn append_events(
        &self,
        stream: &StreamId,
        expected_version: i64,
        events: &[StoredEvent],
    ) -> Result<(), DomainError> {
        let mut streams = self.streams.lock().unwrap_or_else(PoisonError::into_inner);
        let current = streams
            .get(stream)
            .and_then(|existing| existing.last())
            .map_or(0, |last| last.sequence_number);
        if current != expected_version {
            return Err(DomainError::ConcurrencyConflict {
                key: stream.to_string(),
                expected: expected_version,
                actual: current,
            });
        }
        if events.is_empty() {
            return Ok(());
        }
        streams
            .entry(stream.clone())
            .or_default()
            .extend_from_slice(events);
        Ok(())
    }
}

/// Saga store keeping every instance in a process-local map.
#[derive(Debug, Default)]
pub struct InMemorySagaStore {
    instances: Mutex<HashMap<(String, String), SagaSnapshot>>,
}

impl InMemorySagaStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every stored snapshot of `saga_type`, ordered by saga id.
    pub fn snapshots(&self, saga_type: &str) -> Vec<SagaSnapshot> {
        let mut snapshots: Vec<_> = self
            .instances
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|snapshot| snapshot.saga_type == saga_type)
            .cloned()
            .collect();
        snapshots.sort_by(|a, b| a.saga_id.cmp(&b.saga_id));
        snapshots
    }
}

#[async_trait]
impl SagaStore for InMemorySagaStore {
    async fn load(
        &self,
        saga_type: &str,
        saga_id: &str,
    ) -> Result<Option<SagaSnapshot>, DomainError> {
        Ok(self
            .instances
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(saga_type.to_owned(), saga_id.to_owned()))
            .cloned())
    }

    async fn save(
        &self,
        snapshot: &SagaSnapshot,
        expected_revision: i64,
    ) -> Result<i64, DomainError> {
        let key = (snapshot.saga_type.clone(), snapshot.saga_id.clone());
        let mut instances = self.instances.lock().unwrap_or_else(PoisonError::into_inner);
        let current = instances.get(&key).map_or(0, |stored| stored.revision);
        if current != expected_revision {
            return Err(DomainError::ConcurrencyConflict {
                key: format!("{}/{}", key.0, key.1),
                expected: expected_revision,
                actual: current,
            });
        }
        let revision = expected_revision + 1;
        let mut stored = snapshot.clone();
        stored.revision = revision;
        instances.insert(key, stored);
        Ok(revision)
    }

    async fn queued(&self, saga_type: &str) -> Result<Vec<String>, DomainError> {
        Ok(self
            .snapshots(saga_type)
            .into_iter()
            .filter(|snapshot| !snapshot.uncommitted_commands.is_empty())
            .map(|snapshot| snapshot.saga_id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use conductor_core::command::CommandEnvelope;
    use conductor_core::saga_store::SagaStatus;
    use conductor_test_support::stored_event;

    use super::*;

    fn event(seq: i64) -> StoredEvent {
        stored_event("order", "O1", seq, "order.placed", serde_json::json!({}))
    }

    fn snapshot(saga_id: &str) -> SagaSnapshot {
        SagaSnapshot {
            saga_type: "OrderFulfillmentSaga".into(),
            saga_id: saga_id.into(),
            revision: 0,
            version: 1,
            status: SagaStatus::Active,
            stream_positions: BTreeMap::from([("order/O1".to_owned(), 1)]),
            state: serde_json::json!({ "stage": "reserving" }),
            uncommitted_commands: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_load_events_returns_empty_vec_for_unknown_stream() {
        let repo = InMemoryEventRepository::new();

        let events = repo.load_events(&StreamId::new("order", "O1")).await.unwrap();

        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_append_and_load_preserves_order() {
        let repo = InMemoryEventRepository::new();
        let stream = StreamId::new("order", "O1");

        repo.append_events(&stream, 0, &[event(1), event(2)]).await.unwrap();
        repo.append_events(&stream, 2, &[event(3)]).await.unwrap();

        let loaded = repo.load_events(&stream).await.unwrap();
        let versions: Vec<_> = loaded.iter().map(|e| e.sequence_number).collect();
        assert_eq!(versions, vec![1, 2, 3]);
        assert_eq!(repo.stream_ids(), vec![stream]);
    }

    #[tokio::test]
    async fn test_append_with_stale_version_conflicts() {
        let repo = InMemoryEventRepository::new();
        let stream = StreamId::new("order", "O1");
        repo.append_events(&stream, 0, &[event(1)]).await.unwrap();

        let result = repo.append_events(&stream, 0, &[event(1)]).await;

        assert!(matches!(
            result,
            Err(DomainError::ConcurrencyConflict {
                expected: 0,
                actual: 1,
                ..
            })
        ));
        assert_eq!(repo.load_events(&stream).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_streams_with_same_id_and_different_types_are_separate() {
        let repo = InMemoryEventRepository::new();
        repo.append_events(&StreamId::new("order", "O1"), 0, &[event(1)])
            .await
            .unwrap();

        let payment = repo.load_events(&StreamId::new("payment", "O1")).await.unwrap();

        assert!(payment.is_empty());
    }

    #[tokio::test]
    async fn test_saga_save_increments_revision() {
        let store = InMemorySagaStore::new();

        let first = store.save(&snapshot("O1"), 0).await.unwrap();
        let mut loaded = store.load("OrderFulfillmentSaga", "O1").await.unwrap().unwrap();
        loaded.version = 2;
        let second = store.save(&loaded, first).await.unwrap();

        assert_eq!((first, second), (1, 2));
        let stored = store.load("OrderFulfillmentSaga", "O1").await.unwrap().unwrap();
        assert_eq!(stored.revision, 2);
        assert_eq!(stored.version, 2);
    }

    #[tokio::test]
    async fn test_saga_save_with_stale_revision_conflicts() {
        let store = InMemorySagaStore::new();
        store.save(&snapshot("O1"), 0).await.unwrap();

        let result = store.save(&snapshot("O1"), 0).await;

        assert!(matches!(
            result,
            Err(DomainError::ConcurrencyConflict { actual: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_queued_lists_only_instances_with_commands() {
        let store = InMemorySagaStore::new();
        store.save(&snapshot("O1"), 0).await.unwrap();
        let mut waiting = snapshot("O2");
        waiting.uncommitted_commands.push(CommandEnvelope {
            command_type: "inventory.reserve".into(),
            aggregate_id: "O2".into(),
            timestamp: 1,
            correlation_id: uuid::Uuid::nil(),
            causation_id: None,
            payload: serde_json::json!({ "order_id": "O2" }),
        });
        store.save(&waiting, 0).await.unwrap();

        let queued = store.queued("OrderFulfillmentSaga").await.unwrap();

        assert_eq!(queued, vec!["O2".to_owned()]);
        assert!(store.queued("RefundSaga").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_saga_load_unknown_instance_is_none() {
        let store = InMemorySagaStore::new();

        assert!(store.load("OrderFulfillmentSaga", "O9").await.unwrap().is_none());
        assert!(store.snapshots("OrderFulfillmentSaga").is_empty());
    }
}
