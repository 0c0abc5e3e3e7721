//! Saga event handler: routes an event to the saga's typed reaction.
//!
//! Dispatch on the event axis goes through a table keyed by event type name,
//! built once when the saga is defined. Dispatch on the saga axis goes
//! through `SagaSubscriber` in the processor module.

use std::collections::HashMap;

use conductor_core::error::{ConfigurationError, DomainError};
use conductor_core::event::EventPayload;
use conductor_core::repository::StoredEvent;
use tracing::{debug, warn};

use crate::definition::Saga;
use crate::error::SagaError;
use crate::instance::{SagaContext, SagaInstance};

type ReactionFn<S> =
    Box<dyn Fn(&mut SagaContext<'_, S>, &StoredEvent) -> Result<(), SagaError> + Send + Sync>;

/// Table entry for one event type.
enum Reaction<S> {
    /// Decode the event and run the reaction.
    Handle(ReactionFn<S>),
    /// The saga correlates the event for identity only; applying it is a
    /// no-op.
    Ignore,
}

/// What applying one event did to a saga.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleOutcome {
    /// A reaction ran and staged `commands` new commands.
    Applied {
        /// Number of commands staged by the reaction.
        commands: usize,
    },
    /// The event is declared as ignored by the saga type.
    Ignored,
    /// The event was already consumed (redelivery).
    Duplicate,
    /// The saga is completed; the event was dropped.
    IgnoredCompleted,
}

impl HandleOutcome {
    /// Returns `true` if the saga instance changed and must be saved.
    #[must_use]
    pub fn is_mutation(self) -> bool {
        matches!(self, Self::Applied { .. } | Self::Ignored)
    }
}

/// Reaction table of one saga type.
pub struct SagaEventHandler<S> {
    reactions: HashMap<&'static str, Reaction<S>>,
}

impl<S: Saga> SagaEventHandler<S> {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            reactions: HashMap::new(),
        }
    }

    /// Declares the reaction for event type `E`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::DuplicateReaction` if `E` already has an
    /// entry.
    pub fn react<E, F>(&mut self, reaction: F) -> Result<(), ConfigurationError>
    where
        E: EventPayload,
        F: Fn(&mut SagaContext<'_, S>, &E) -> Result<(), DomainError> + Send + Sync + 'static,
    {
        let erased: ReactionFn<S> = Box::new(
            move |ctx: &mut SagaContext<'_, S>, stored: &StoredEvent| {
                let event = stored.decode::<E>().map_err(|source| SagaError::MalformedEvent {
                    saga_type: S::SAGA_TYPE,
                    event_type: stored.event_type.clone(),
                    source,
                })?;
                reaction(ctx, &event).map_err(|source| SagaError::ReactionFailed {
                    saga_type: S::SAGA_TYPE,
                    saga_id: ctx.saga_id().to_owned(),
                    event_type: stored.event_type.clone(),
                    source,
                })
            },
        );
        self.insert(E::EVENT_TYPE, Reaction::Handle(erased))
    }

    /// Declares that event type `E` is correlated but needs no reaction.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::DuplicateReaction` if `E` already has an
    /// entry.
    pub fn ignore<E: EventPayload>(&mut self) -> Result<(), ConfigurationError> {
        self.insert(E::EVENT_TYPE, Reaction::Ignore)
    }

    fn insert(
        &mut self,
        event_type: &'static str,
        reaction: Reaction<S>,
    ) -> Result<(), ConfigurationError> {
        if self.reactions.contains_key(event_type) {
            return Err(ConfigurationError::DuplicateReaction {
                saga_type: S::SAGA_TYPE,
                event_type,
            });
        }
        self.reactions.insert(event_type, reaction);
        Ok(())
    }

    /// Returns `true` if the table has an entry (reaction or ignore) for
    /// `event_type`.
    #[must_use]
    pub fn declares(&self, event_type: &str) -> bool {
        self.reactions.contains_key(event_type)
    }

    /// Returns the event types with a table entry.
    pub fn event_types(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.reactions.keys().copied()
    }

    /// Applies `event` to `saga`.
    ///
    /// Completed sagas drop every further event (`IgnoredCompleted`), and
    /// an event at or below the last version consumed from its stream is a
    /// redelivery (`Duplicate`). Neither mutates the saga. If the reaction
    /// fails, state, status and queue are rolled back.
    ///
    /// # Errors
    ///
    /// - `SagaError::UnhandledEventType` if the table has no entry for the
    ///   event type.
    /// - `SagaError::MalformedEvent` / `SagaError::ReactionFailed` from the
    ///   reaction.
    pub fn handle(
        &self,
        saga: &mut SagaInstance<S>,
        event: &StoredEvent,
    ) -> Result<HandleOutcome, SagaError> {
        let reaction = self.reactions.get(event.event_type.as_str()).ok_or_else(|| {
            SagaError::UnhandledEventType {
                saga_type: S::SAGA_TYPE,
                event_type: event.event_type.clone(),
            }
        })?;

        if saga.is_completed() {
            warn!(
                saga_type = S::SAGA_TYPE,
                saga_id = saga.id(),
                event_type = %event.event_type,
                "ignoring event for completed saga"
            );
            return Ok(HandleOutcome::IgnoredCompleted);
        }

        let stream = event.stream_id().to_string();
        if saga
            .stream_position(&stream)
            .is_some_and(|seen| event.sequence_number <= seen)
        {
            debug!(
                saga_type = S::SAGA_TYPE,
                saga_id = saga.id(),
                %stream,
                sequence_number = event.sequence_number,
                "dropping redelivered event"
            );
            return Ok(HandleOutcome::Duplicate);
        }

        let outcome = match reaction {
            Reaction::Ignore => HandleOutcome::Ignored,
            Reaction::Handle(react) => {
                let checkpoint = saga.checkpoint();
                let before = saga.uncommitted_commands().len();
                let result = react(&mut SagaContext::new(saga, event), event);
                if let Err(err) = result {
                    saga.restore(checkpoint);
                    return Err(err);
                }
                HandleOutcome::Applied {
                    commands: saga.uncommitted_commands().len() - before,
                }
            }
        };
        saga.record_consumed(event);
        Ok(outcome)
    }
}

impl<S: Saga> Default for SagaEventHandler<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> std::fmt::Debug for SagaEventHandler<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut event_types: Vec<_> = self.reactions.keys().collect();
        event_types.sort();
        f.debug_struct("SagaEventHandler")
            .field("event_types", &event_types)
            .finish()
    }
}
