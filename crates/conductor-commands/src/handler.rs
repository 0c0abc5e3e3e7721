//! Typed command handlers behind an object-safe seam.

use std::marker::PhantomData;

use conductor_core::aggregate::AggregateRoot;
use conductor_core::clock::Clock;
use conductor_core::command::{Command, CommandEnvelope};
use conductor_core::error::{CommandError, DomainError};
use conductor_core::event::DomainEvent;
use conductor_core::repository::{StoredEvent, StreamId};
use uuid::Uuid;

/// Policy attached to a command type when its handler is registered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandOptions {
    /// A repeated delivery of the same command returns the first outcome
    /// instead of executing again.
    pub idempotent: bool,
    /// The command fails with `AggregateNotFound` on an empty stream.
    pub requires_existing: bool,
}

impl CommandOptions {
    /// Marks the command type idempotent.
    #[must_use]
    pub fn idempotent(mut self) -> Self {
        self.idempotent = true;
        self
    }

    /// Requires the target aggregate to exist.
    #[must_use]
    pub fn requires_existing(mut self) -> Self {
        self.requires_existing = true;
        self
    }
}

/// Events produced by one execution, ready to append.
#[derive(Debug)]
pub(crate) struct Execution {
    pub(crate) expected_version: i64,
    pub(crate) events: Vec<StoredEvent>,
}

/// Type-erased handler, so commands of every type share one registry.
pub(crate) trait ErasedHandler: Send + Sync {
    fn aggregate_type(&self) -> &'static str;

    fn options(&self) -> CommandOptions;

    /// Rebuilds the aggregate from `history`, runs the command against it
    /// and stamps the resulting events. Synchronous and free of I/O.
    fn execute(
        &self,
        envelope: &CommandEnvelope,
        history: &[StoredEvent],
        clock: &dyn Clock,
    ) -> Result<Execution, CommandError>;
}

pub(crate) struct TypedHandler<C, A, F> {
    options: CommandOptions,
    handler: F,
    _marker: PhantomData<fn() -> (C, A)>,
}

impl<C, A, F> TypedHandler<C, A, F> {
    pub(crate) fn new(options: CommandOptions, handler: F) -> Self {
        Self {
            options,
            handler,
            _marker: PhantomData,
        }
    }
}

impl<C, A, F> ErasedHandler for TypedHandler<C, A, F>
where
    C: Command,
    A: AggregateRoot,
    F: Fn(&mut A, &C, &dyn Clock) -> Result<(), DomainError> + Send + Sync,
{
    fn aggregate_type(&self) -> &'static str {
        A::AGGREGATE_TYPE
    }

    fn options(&self) -> CommandOptions {
        self.options
    }

    fn execute(
        &self,
        envelope: &CommandEnvelope,
        history: &[StoredEvent],
        clock: &dyn Clock,
    ) -> Result<Execution, CommandError> {
        let command = envelope.decode::<C>()?;
        let failed = |source: DomainError| CommandError::HandlerFailed {
            command_type: envelope.command_type.clone(),
            aggregate_id: envelope.aggregate_id.clone(),
            source,
        };

        let mut aggregate = A::reconstitute(&envelope.aggregate_id, history).map_err(failed)?;
        (self.handler)(&mut aggregate, &command, clock).map_err(failed)?;

        let expected_version = aggregate.version();
        let events = stamp(
            &aggregate.stream_id(),
            expected_version,
            aggregate.uncommitted_events(),
            envelope,
            clock,
        );
        aggregate.clear_uncommitted_events();
        Ok(Execution {
            expected_version,
            events,
        })
    }
}

/// Converts freshly decided events into stored events.
///
/// Versions continue from `version`. Every event carries the command's
/// fingerprint so a later delivery of the same command can find them.
fn stamp<E: DomainEvent>(
    stream: &StreamId,
    version: i64,
    events: &[E],
    envelope: &CommandEnvelope,
    clock: &dyn Clock,
) -> Vec<StoredEvent> {
    let fingerprint = envelope.fingerprint();
    let occurred_at = clock.now();
    (1..)
        .zip(events)
        .map(|(offset, event)| StoredEvent {
            event_id: Uuid::new_v4(),
            aggregate_type: stream.aggregate_type.clone(),
            aggregate_id: stream.aggregate_id.clone(),
            event_type: event.event_type().to_owned(),
            payload: event.to_payload(),
            sequence_number: version + offset,
            timestamp: envelope.timestamp,
            correlation_id: envelope.correlation_id,
            causation_id: envelope.causation_id,
            command_fingerprint: Some(fingerprint.clone()),
            occurred_at,
        })
        .collect()
}
