//! Saga error types.

use conductor_core::error::{CommandError, DomainError};
use thiserror::Error;

/// Errors raised while correlating, applying or persisting sagas.
#[derive(Debug, Error)]
pub enum SagaError {
    /// The saga type has no correlation extractor for the event type.
    #[error("saga {saga_type} is not registered for event type {event_type}")]
    NotRegistered {
        /// The saga type.
        saga_type: &'static str,
        /// The event type.
        event_type: String,
    },

    /// The saga type declares no reaction for the event type.
    #[error("saga {saga_type} has no reaction for event type {event_type}")]
    UnhandledEventType {
        /// The saga type.
        saga_type: &'static str,
        /// The event type.
        event_type: String,
    },

    /// An extractor produced an empty correlation id.
    #[error("saga {saga_type} extracted an empty correlation id from {event_type}")]
    EmptyCorrelationId {
        /// The saga type.
        saga_type: &'static str,
        /// The event type.
        event_type: String,
    },

    /// The event payload does not decode into the registered event type.
    #[error("saga {saga_type} could not decode {event_type}: {source}")]
    MalformedEvent {
        /// The saga type.
        saga_type: &'static str,
        /// The event type.
        event_type: String,
        /// The decoding failure.
        #[source]
        source: DomainError,
    },

    /// A reaction rejected the event. The saga is left as it was.
    #[error("saga {saga_type} {saga_id} failed to react to {event_type}: {source}")]
    ReactionFailed {
        /// The saga type.
        saga_type: &'static str,
        /// The saga instance.
        saga_id: String,
        /// The event type.
        event_type: String,
        /// The failure raised by the reaction.
        #[source]
        source: DomainError,
    },

    /// A stored snapshot belongs to another saga type.
    #[error("snapshot of saga type {found} cannot be loaded as {expected}")]
    SagaTypeMismatch {
        /// The saga type requested.
        expected: &'static str,
        /// The saga type stored.
        found: String,
    },

    /// Loading or saving the saga failed.
    #[error("saga store error: {0}")]
    Store(#[from] DomainError),

    /// Dispatching a staged command failed. Undispatched commands stay queued.
    #[error("saga {saga_id} could not dispatch {command_type}: {source}")]
    Dispatch {
        /// The saga instance.
        saga_id: String,
        /// The command type that failed.
        command_type: String,
        /// The dispatch failure.
        #[source]
        source: CommandError,
    },
}

impl SagaError {
    /// Returns `true` for errors meaning "this event is not for this saga",
    /// which callers log and skip.
    #[must_use]
    pub fn is_correlation_error(&self) -> bool {
        matches!(
            self,
            Self::NotRegistered { .. } | Self::UnhandledEventType { .. }
        )
    }

    /// Returns `true` if retrying the same event later may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Store(source) => {
                source.is_transient() || matches!(source, DomainError::ConcurrencyConflict { .. })
            }
            Self::Dispatch { source, .. } => source.is_retryable(),
            _ => false,
        }
    }
}
