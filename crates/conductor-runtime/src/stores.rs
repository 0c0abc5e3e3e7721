//! Store selection: binds each store to its local or remote implementation.

use std::sync::Arc;

use conductor_core::repository::EventRepository;
use conductor_core::saga_store::SagaStore;
use conductor_event_store::in_memory::{InMemoryEventRepository, InMemorySagaStore};
use conductor_event_store::pg_event_repository::PgEventRepository;
use conductor_event_store::pg_saga_store::PgSagaStore;
use conductor_event_store::schema;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use crate::config::{ConfigError, RuntimeConfig, StoreSelection};
use crate::error::RuntimeError;

/// The stores a conductor runs against.
#[derive(Clone)]
pub struct Stores {
    /// Aggregate event streams.
    pub events: Arc<dyn EventRepository>,
    /// Saga instances.
    pub sagas: Arc<dyn SagaStore>,
}

impl Stores {
    /// Fresh in-memory stores.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            events: Arc::new(InMemoryEventRepository::new()),
            sagas: Arc::new(InMemorySagaStore::new()),
        }
    }

    /// Opens the stores `config` selects. A database pool is created only if
    /// at least one store is remote; the schema is applied when
    /// `database.apply_schema` is set.
    ///
    /// # Errors
    ///
    /// - `RuntimeError::Config` if a remote store has no database url,
    /// - `RuntimeError::Database` if the pool cannot connect,
    /// - `RuntimeError::Store` if the schema cannot be applied.
    pub async fn connect(config: &RuntimeConfig) -> Result<Self, RuntimeError> {
        let pool = if config.stores.needs_database() {
            Some(open_pool(config).await?)
        } else {
            None
        };

        let events: Arc<dyn EventRepository> = match (config.stores.event_store, &pool) {
            (StoreSelection::Remote, Some(pool)) => Arc::new(PgEventRepository::new(pool.clone())),
            _ => Arc::new(InMemoryEventRepository::new()),
        };
        let sagas: Arc<dyn SagaStore> = match (config.stores.saga_store, &pool) {
            (StoreSelection::Remote, Some(pool)) => Arc::new(PgSagaStore::new(pool.clone())),
            _ => Arc::new(InMemorySagaStore::new()),
        };

        info!(
            event_store = ?config.stores.event_store,
            saga_store = ?config.stores.saga_store,
            "stores connected"
        );
        Ok(Self { events, sagas })
    }
}

impl std::fmt::Debug for Stores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stores").finish_non_exhaustive()
    }
}

async fn open_pool(config: &RuntimeConfig) -> Result<PgPool, RuntimeError> {
    let url = config
        .database
        .url
        .as_deref()
        .ok_or(ConfigError::MissingDatabaseUrl)?;
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(url)
        .await?;
    if config.database.apply_schema {
        schema::apply(&pool).await?;
        info!("event store schema applied");
    }
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_selection_needs_no_database() {
        let config = RuntimeConfig::default();

        let stores = Stores::connect(&config).await.unwrap();

        assert!(stores.sagas.load("OrderFulfillmentSaga", "O1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remote_selection_without_url_fails() {
        let mut config = RuntimeConfig::default();
        config.stores.saga_store = StoreSelection::Remote;

        let result = Stores::connect(&config).await;

        match result {
            Err(RuntimeError::Config(ConfigError::MissingDatabaseUrl)) => {}
            other => panic!("expected MissingDatabaseUrl, got {other:?}"),
        }
    }
}
