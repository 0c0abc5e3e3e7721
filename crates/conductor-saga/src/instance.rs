//! Saga instances: typed state plus the uncommitted command queue.

use std::collections::BTreeMap;

use conductor_core::command::{Command, CommandEnvelope};
use conductor_core::error::DomainError;
use conductor_core::repository::StoredEvent;
use conductor_core::saga_store::{SagaSnapshot, SagaStatus};

use crate::definition::Saga;
use crate::error::SagaError;

/// One running (or finished) business process.
///
/// State changes only through `SagaEventHandler::handle`, so an instance is
/// a pure function of the events it has consumed.
#[derive(Debug, Clone, PartialEq)]
pub struct SagaInstance<S> {
    id: String,
    revision: i64,
    version: i64,
    status: SagaStatus,
    stream_positions: BTreeMap<String, i64>,
    state: S,
    uncommitted_commands: Vec<CommandEnvelope>,
}

impl<S: Saga> SagaInstance<S> {
    /// Creates a fresh, active instance with default state.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            revision: 0,
            version: 0,
            status: SagaStatus::Active,
            stream_positions: BTreeMap::new(),
            state: S::default(),
            uncommitted_commands: Vec::new(),
        }
    }

    /// Returns the correlation id of this instance.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the saga store revision this instance was loaded at.
    #[must_use]
    pub fn revision(&self) -> i64 {
        self.revision
    }

    /// Returns the number of events consumed.
    #[must_use]
    pub fn version(&self) -> i64 {
        self.version
    }

    /// Returns the lifecycle status.
    #[must_use]
    pub fn status(&self) -> SagaStatus {
        self.status
    }

    /// Returns `true` once the saga has reached its terminal state.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == SagaStatus::Completed
    }

    /// Returns the typed saga state.
    #[must_use]
    pub fn state(&self) -> &S {
        &self.state
    }

    /// Returns the staged commands in enqueue order without draining them.
    #[must_use]
    pub fn uncommitted_commands(&self) -> &[CommandEnvelope] {
        &self.uncommitted_commands
    }

    /// Clears the queue once every staged command has been dispatched.
    pub fn clear_uncommitted_commands(&mut self) {
        self.uncommitted_commands.clear();
    }

    /// Drops the first `count` staged commands after a partial drain.
    pub fn acknowledge_commands(&mut self, count: usize) {
        let count = count.min(self.uncommitted_commands.len());
        self.uncommitted_commands.drain(..count);
    }

    /// Returns the highest version consumed from `stream` (`type/id`).
    #[must_use]
    pub fn stream_position(&self, stream: &str) -> Option<i64> {
        self.stream_positions.get(stream).copied()
    }

    pub(crate) fn state_mut(&mut self) -> &mut S {
        &mut self.state
    }

    /// Stages a command. Never dispatches.
    pub(crate) fn send_command(&mut self, command: CommandEnvelope) {
        self.uncommitted_commands.push(command);
    }

    pub(crate) fn complete(&mut self) {
        self.status = SagaStatus::Completed;
    }

    pub(crate) fn record_consumed(&mut self, event: &StoredEvent) {
        self.stream_positions
            .insert(event.stream_id().to_string(), event.sequence_number);
        self.version += 1;
    }

    pub(crate) fn checkpoint(&self) -> Checkpoint<S> {
        Checkpoint {
            state: self.state.clone(),
            status: self.status,
            queued: self.uncommitted_commands.len(),
        }
    }

    pub(crate) fn restore(&mut self, checkpoint: Checkpoint<S>) {
        self.state = checkpoint.state;
        self.status = checkpoint.status;
        self.uncommitted_commands.truncate(checkpoint.queued);
    }

    pub(crate) fn set_revision(&mut self, revision: i64) {
        self.revision = revision;
    }

    /// Converts the instance into its persisted form.
    ///
    /// # Errors
    ///
    /// Returns `SagaError::Store` if the state does not serialize, for
    /// example a map keyed by something other than strings.
    pub fn to_snapshot(&self) -> Result<SagaSnapshot, SagaError> {
        let state = serde_json::to_value(&self.state).map_err(|e| {
            DomainError::Serialization(format!("saga state serialization failed: {e}"))
        })?;
        Ok(SagaSnapshot {
            saga_type: S::SAGA_TYPE.to_owned(),
            saga_id: self.id.clone(),
            revision: self.revision,
            version: self.version,
            status: self.status,
            stream_positions: self.stream_positions.clone(),
            state,
            uncommitted_commands: self.uncommitted_commands.clone(),
        })
    }

    /// Rebuilds an instance from its persisted form.
    ///
    /// # Errors
    ///
    /// Returns `SagaError::SagaTypeMismatch` for snapshots of another saga
    /// type and `SagaError::Store` if the state does not decode.
    pub fn from_snapshot(snapshot: SagaSnapshot) -> Result<Self, SagaError> {
        if snapshot.saga_type != S::SAGA_TYPE {
            return Err(SagaError::SagaTypeMismatch {
                expected: S::SAGA_TYPE,
                found: snapshot.saga_type,
            });
        }
        let state = serde_json::from_value(snapshot.state).map_err(|e| {
            DomainError::Serialization(format!("saga state deserialization failed: {e}"))
        })?;
        Ok(Self {
            id: snapshot.saga_id,
            revision: snapshot.revision,
            version: snapshot.version,
            status: snapshot.status,
            stream_positions: snapshot.stream_positions,
            state,
            uncommitted_commands: snapshot.uncommitted_commands,
        })
    }
}

/// Saved copy of the mutable parts of an instance, restored when a reaction
/// fails halfway.
pub(crate) struct Checkpoint<S> {
    state: S,
    status: SagaStatus,
    queued: usize,
}

/// Handle given to reactions while one event is applied.
///
/// Everything a reaction may do goes through here: read and mutate state,
/// stage commands, complete the saga.
pub struct SagaContext<'a, S> {
    instance: &'a mut SagaInstance<S>,
    event: &'a StoredEvent,
}

impl<'a, S: Saga> SagaContext<'a, S> {
    pub(crate) fn new(instance: &'a mut SagaInstance<S>, event: &'a StoredEvent) -> Self {
        Self { instance, event }
    }

    /// Returns the saga's correlation id.
    #[must_use]
    pub fn saga_id(&self) -> &str {
        self.instance.id()
    }

    /// Returns the event being applied.
    #[must_use]
    pub fn event(&self) -> &StoredEvent {
        self.event
    }

    /// Returns the saga state.
    #[must_use]
    pub fn state(&self) -> &S {
        self.instance.state()
    }

    /// Returns the saga state for mutation.
    pub fn state_mut(&mut self) -> &mut S {
        self.instance.state_mut()
    }

    /// Stages `command` for dispatch after this pass is persisted.
    ///
    /// The envelope inherits the event's correlation id and records the
    /// event as its cause, so replaying the event stages an identical
    /// envelope.
    pub fn send_command<C: Command>(&mut self, command: &C) {
        let envelope =
            CommandEnvelope::new(command, self.event.correlation_id).caused_by(self.event.event_id);
        self.instance.send_command(envelope);
    }

    /// Moves the saga to its terminal state.
    pub fn complete(&mut self) {
        self.instance.complete();
    }
}
