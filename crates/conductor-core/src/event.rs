//! Domain event abstractions.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::DomainError;

/// A single event payload type, addressable by a stable name.
///
/// Sagas correlate and react to events through this trait.
pub trait EventPayload: Serialize + DeserializeOwned + Send + Sync + std::fmt::Debug + 'static {
    /// The event type name (used for serialization routing).
    const EVENT_TYPE: &'static str;
}

/// Trait implemented by the event enum of each aggregate.
pub trait DomainEvent: Send + Sync + std::fmt::Debug + Sized {
    /// Returns the event type name of this variant.
    fn event_type(&self) -> &'static str;

    /// Serializes the variant payload to JSON.
    fn to_payload(&self) -> serde_json::Value;

    /// Rebuilds the event from a stored type name and payload.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Serialization` for unknown event types or
    /// payloads that do not decode.
    fn from_payload(event_type: &str, payload: &serde_json::Value) -> Result<Self, DomainError>;
}

/// Serializes a payload to JSON.
pub fn encode_payload<P: Serialize>(payload: &P) -> serde_json::Value {
    // Serialization of derived Serialize types to Value is infallible.
    serde_json::to_value(payload).expect("event payload serialization is infallible")
}

/// Deserializes a typed payload.
///
/// # Errors
///
/// Returns `DomainError::Serialization` if the payload does not decode.
pub fn decode_payload<P: EventPayload>(payload: &serde_json::Value) -> Result<P, DomainError> {
    serde_json::from_value(payload.clone()).map_err(|e| {
        DomainError::Serialization(format!(
            "event {} payload deserialization failed: {e}",
            P::EVENT_TYPE
        ))
    })
}
