//! Event repository abstraction.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;
use crate::event::{EventPayload, decode_payload};

/// Address of one aggregate's event stream.
///
/// Aggregates of different types may share an id, so the type is part of the
/// address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamId {
    /// Aggregate type name, e.g. `"payment"`.
    pub aggregate_type: String,
    /// Aggregate identifier within its type.
    pub aggregate_id: String,
}

impl StreamId {
    /// Creates a stream address.
    #[must_use]
    pub fn new(aggregate_type: impl Into<String>, aggregate_id: impl Into<String>) -> Self {
        Self {
            aggregate_type: aggregate_type.into(),
            aggregate_id: aggregate_id.into(),
        }
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.aggregate_type, self.aggregate_id)
    }
}

/// Stored representation of a domain event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// Type of the aggregate that produced the event.
    pub aggregate_type: String,
    /// Aggregate this event belongs to.
    pub aggregate_id: String,
    /// Event type name for deserialization routing.
    pub event_type: String,
    /// Serialized event payload.
    pub payload: serde_json::Value,
    /// Version within the aggregate stream, starting at 1.
    pub sequence_number: i64,
    /// Logical timestamp inherited from the command that produced the event.
    pub timestamp: i64,
    /// Correlation ID for tracing.
    pub correlation_id: Uuid,
    /// Causation ID linking to the causing event/command.
    pub causation_id: Option<Uuid>,
    /// Fingerprint of the command that produced this event.
    #[serde(default)]
    pub command_fingerprint: Option<String>,
    /// Wall-clock time of event creation. Diagnostic only.
    pub occurred_at: DateTime<Utc>,
}

impl StoredEvent {
    /// Returns the address of the stream this event belongs to.
    #[must_use]
    pub fn stream_id(&self) -> StreamId {
        StreamId::new(&self.aggregate_type, &self.aggregate_id)
    }

    /// Decodes the payload into a typed event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Serialization` if the event type does not match
    /// `P::EVENT_TYPE` or the payload does not decode.
    pub fn decode<P: EventPayload>(&self) -> Result<P, DomainError> {
        if self.event_type != P::EVENT_TYPE {
            return Err(DomainError::Serialization(format!(
                "expected event type {}, found {}",
                P::EVENT_TYPE,
                self.event_type
            )));
        }
        decode_payload(&self.payload)
    }
}

/// Repository trait for loading and appending domain events.
#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Load all events for a given stream, ordered by sequence number.
    async fn load_events(&self, stream: &StreamId) -> Result<Vec<StoredEvent>, DomainError>;

    /// Append new events to a stream with optimistic concurrency.
    /// `expected_version` is the last known sequence number.
    async fn append_events(
        &self,
        stream: &StreamId,
        expected_version: i64,
        events: &[StoredEvent],
    ) -> Result<(), DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct OrderPlaced {
        order_id: String,
    }

    impl EventPayload for OrderPlaced {
        const EVENT_TYPE: &'static str = "order.placed";
    }

    fn stored(event_type: &str, payload: serde_json::Value) -> StoredEvent {
        StoredEvent {
            event_id: Uuid::new_v4(),
            aggregate_type: "order".into(),
            aggregate_id: "O1".into(),
            event_type: event_type.into(),
            payload,
            sequence_number: 1,
            timestamp: 10,
            correlation_id: Uuid::new_v4(),
            causation_id: None,
            command_fingerprint: None,
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn test_decode_returns_typed_payload() {
        let event = stored("order.placed", serde_json::json!({"order_id": "O1"}));

        let decoded: OrderPlaced = event.decode().unwrap();

        assert_eq!(
            decoded,
            OrderPlaced {
                order_id: "O1".into()
            }
        );
        assert_eq!(event.stream_id(), StreamId::new("order", "O1"));
    }

    #[test]
    fn test_decode_rejects_mismatched_event_type() {
        let event = stored("order.cancelled", serde_json::json!({"order_id": "O1"}));

        let result = event.decode::<OrderPlaced>();

        assert!(matches!(result, Err(DomainError::Serialization(_))));
    }

    #[test]
    fn test_stream_id_displays_type_and_id() {
        assert_eq!(StreamId::new("payment", "O1").to_string(), "payment/O1");
    }
}
