//! Aggregate root abstraction.

use crate::error::DomainError;
use crate::event::DomainEvent;
use crate::repository::{StoredEvent, StreamId};

/// Trait for aggregate roots that reconstitute from event history.
pub trait AggregateRoot: Send + Sync + Sized {
    /// The event type this aggregate produces and consumes.
    type Event: DomainEvent;

    /// Stable aggregate type name, the first half of its `StreamId`.
    const AGGREGATE_TYPE: &'static str;

    /// Creates an empty aggregate with no history.
    fn new(id: &str) -> Self;

    /// Returns the aggregate identifier.
    fn aggregate_id(&self) -> &str;

    /// Returns the current version (number of events applied).
    fn version(&self) -> i64;

    /// Apply an event to mutate internal state (used during reconstitution).
    fn apply(&mut self, event: &Self::Event);

    /// Returns uncommitted events produced by command handling.
    fn uncommitted_events(&self) -> &[Self::Event];

    /// Clears uncommitted events after persistence.
    fn clear_uncommitted_events(&mut self);

    /// Returns the stream address of this aggregate.
    fn stream_id(&self) -> StreamId {
        StreamId::new(Self::AGGREGATE_TYPE, self.aggregate_id())
    }

    /// Reconstitutes an aggregate by folding its stored events in order.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Serialization` if an event does not decode.
    fn reconstitute(id: &str, history: &[StoredEvent]) -> Result<Self, DomainError> {
        let mut aggregate = Self::new(id);
        for stored in history {
            let event = Self::Event::from_payload(&stored.event_type, &stored.payload)?;
            aggregate.apply(&event);
        }
        Ok(aggregate)
    }
}
