//! Saga persistence abstraction.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::command::CommandEnvelope;
use crate::error::DomainError;

/// Lifecycle of a saga instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SagaStatus {
    /// The business process is still running.
    Active,
    /// The business process finished; further events are ignored.
    Completed,
}

impl SagaStatus {
    /// Stable lowercase name, used as the stored column value.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
        }
    }
}

impl std::str::FromStr for SagaStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            other => Err(DomainError::Serialization(format!(
                "unknown saga status {other}"
            ))),
        }
    }
}

/// Persisted form of a saga instance.
///
/// The uncommitted command queue is saved together with the state so a
/// command is never dispatched for a saga state that was not persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SagaSnapshot {
    /// Saga type name.
    pub saga_type: String,
    /// Correlation id of the instance.
    pub saga_id: String,
    /// Store revision, incremented on every save.
    pub revision: i64,
    /// Number of events applied.
    pub version: i64,
    /// Lifecycle status.
    pub status: SagaStatus,
    /// Highest event version consumed per source stream (`type/id` keys).
    pub stream_positions: BTreeMap<String, i64>,
    /// Serialized saga state.
    pub state: serde_json::Value,
    /// Commands staged but not yet dispatched, in enqueue order.
    pub uncommitted_commands: Vec<CommandEnvelope>,
}

/// Repository trait for saga instances.
#[async_trait]
pub trait SagaStore: Send + Sync {
    /// Loads a saga instance, or `None` if it has never been saved.
    async fn load(&self, saga_type: &str, saga_id: &str)
    -> Result<Option<SagaSnapshot>, DomainError>;

    /// Saves a saga instance with optimistic concurrency.
    ///
    /// `expected_revision` is the revision the caller loaded (0 for a new
    /// instance). Returns the new revision.
    async fn save(&self, snapshot: &SagaSnapshot, expected_revision: i64)
    -> Result<i64, DomainError>;

    /// Ids of the `saga_type` instances whose command queue is not empty,
    /// ordered by id. Completed instances are included: the commands they
    /// staged on completion still have to go out.
    async fn queued(&self, saga_type: &str) -> Result<Vec<String>, DomainError>;
}
