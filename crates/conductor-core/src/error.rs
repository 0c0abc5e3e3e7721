//! Error taxonomy shared by every layer of the runtime.

use thiserror::Error;

use crate::repository::StreamId;

/// Errors raised by aggregates and the stores they are persisted in.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An aggregate stream has no events.
    #[error("aggregate not found: {0}")]
    AggregateNotFound(StreamId),

    /// Optimistic concurrency conflict.
    #[error("concurrency conflict on {key}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        /// The stream or saga key that had the conflict.
        key: String,
        /// The expected version.
        expected: i64,
        /// The actual version found.
        actual: i64,
    },

    /// A validation error in domain logic.
    #[error("validation error: {0}")]
    Validation(String),

    /// A payload could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// An infrastructure/persistence error.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

impl DomainError {
    /// Returns `true` for failures caused by an unavailable or slow store.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Infrastructure(_))
    }
}

/// Wiring mistakes detected while registries are built. Always fatal at startup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// Two handlers were registered for the same command type.
    #[error("duplicate handler registered for command type {0}")]
    DuplicateHandler(&'static str),

    /// A saga registered two correlation extractors for one event type.
    #[error("saga {saga_type} registers more than one correlation extractor for {event_type}")]
    DuplicateCorrelation {
        /// The saga type.
        saga_type: &'static str,
        /// The event type registered twice.
        event_type: &'static str,
    },

    /// A saga declared two reactions for one event type.
    #[error("saga {saga_type} declares more than one reaction for {event_type}")]
    DuplicateReaction {
        /// The saga type.
        saga_type: &'static str,
        /// The event type declared twice.
        event_type: &'static str,
    },

    /// A correlated event has neither a reaction nor an explicit ignore.
    #[error("saga {saga_type} correlates {event_type} but declares no reaction for it")]
    MissingReaction {
        /// The saga type.
        saga_type: &'static str,
        /// The event type lacking a reaction.
        event_type: &'static str,
    },

    /// A reaction was declared for an event the saga cannot correlate.
    #[error("saga {saga_type} reacts to {event_type} but has no correlation extractor for it")]
    MissingCorrelation {
        /// The saga type.
        saga_type: &'static str,
        /// The event type lacking an extractor.
        event_type: &'static str,
    },

    /// The same saga type was subscribed to the orchestrator twice.
    #[error("saga type {0} is subscribed more than once")]
    DuplicateSaga(&'static str),
}

/// Failure outcomes of dispatching a command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// No handler is registered for the command type.
    #[error("no handler registered for command type {0}")]
    NoHandlerRegistered(String),

    /// The command targets a stream that does not exist.
    #[error("aggregate not found: {0}")]
    AggregateNotFound(StreamId),

    /// The aggregate rejected the command.
    #[error("command {command_type} failed on aggregate {aggregate_id}: {source}")]
    HandlerFailed {
        /// The command type.
        command_type: String,
        /// The target aggregate.
        aggregate_id: String,
        /// The aggregate-level failure.
        #[source]
        source: DomainError,
    },

    /// Optimistic concurrency conflicts persisted past the retry limit.
    #[error("command {command_type} on {stream} gave up after {attempts} concurrency conflicts")]
    ConcurrencyExhausted {
        /// The command type.
        command_type: String,
        /// The contended stream.
        stream: StreamId,
        /// Number of attempts made.
        attempts: u32,
    },

    /// The store stayed unreachable past the retry limit.
    #[error("store unavailable after {attempts} attempts: {source}")]
    StoreUnavailable {
        /// Number of attempts made.
        attempts: u32,
        /// The last store failure.
        #[source]
        source: DomainError,
    },

    /// The command payload does not decode into its declared type.
    #[error("malformed command {command_type}: {message}")]
    Malformed {
        /// The command type.
        command_type: String,
        /// Decoder message.
        message: String,
    },
}

impl CommandError {
    /// Returns `true` if the orchestration loop may retry the command later.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConcurrencyExhausted { .. } | Self::StoreUnavailable { .. }
        )
    }
}
