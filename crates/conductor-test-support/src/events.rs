//! Builders for stored events.

use conductor_core::repository::StoredEvent;
use uuid::Uuid;

use crate::clock::fixed_now;

/// Builds a `StoredEvent` with deterministic ids derived from the stream
/// and version, so two calls with the same arguments build equal events.
#[must_use]
pub fn stored_event(
    aggregate_type: &str,
    aggregate_id: &str,
    sequence_number: i64,
    event_type: &str,
    payload: serde_json::Value,
) -> StoredEvent {
    let name = format!("{aggregate_type}/{aggregate_id}/{sequence_number}");
    StoredEvent {
        event_id: Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()),
        aggregate_type: aggregate_type.to_owned(),
        aggregate_id: aggregate_id.to_owned(),
        event_type: event_type.to_owned(),
        payload,
        sequence_number,
        timestamp: sequence_number,
        correlation_id: Uuid::new_v5(&Uuid::NAMESPACE_OID, aggregate_id.as_bytes()),
        causation_id: None,
        command_fingerprint: None,
        occurred_at: fixed_now(),
    }
}
