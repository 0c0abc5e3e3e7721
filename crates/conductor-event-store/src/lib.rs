//! Conductor Event Store — event and saga persistence.
//!
//! In-memory stores back local runs and tests; PostgreSQL stores back
//! deployments that share state between processes.

pub mod in_memory;
pub mod pg_event_repository;
pub mod pg_saga_store;
pub mod schema;

pub use in_memory::{InMemoryEventRepository, InMemorySagaStore};
pub use pg_event_repository::PgEventRepository;
pub use pg_saga_store::PgSagaStore;
