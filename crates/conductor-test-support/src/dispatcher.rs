//! Test command dispatcher.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use conductor_core::command::{CommandDispatcher, CommandEnvelope, CommandOutcome};
use conductor_core::error::{CommandError, DomainError};
use conductor_core::repository::StreamId;

/// A dispatcher that records every command it is asked to dispatch.
///
/// Commands of a type configured with `fail_times` are rejected with
/// `CommandError::StoreUnavailable` that many times before succeeding.
/// Failed attempts are recorded too.
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    dispatched: Mutex<Vec<CommandEnvelope>>,
    failures: Mutex<HashMap<String, u32>>,
}

impl RecordingDispatcher {
    /// Create a dispatcher that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects the next `times` commands of `command_type`.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn fail_times(self, command_type: &str, times: u32) -> Self {
        self.failures
            .lock()
            .unwrap()
            .insert(command_type.to_owned(), times);
        self
    }

    /// Returns all dispatch attempts, in order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn dispatched(&self) -> Vec<CommandEnvelope> {
        self.dispatched.lock().unwrap().clone()
    }

    /// Returns the command types of all dispatch attempts, in order.
    pub fn dispatched_types(&self) -> Vec<String> {
        self.dispatched()
            .into_iter()
            .map(|command| command.command_type)
            .collect()
    }
}

#[async_trait]
impl CommandDispatcher for RecordingDispatcher {
    async fn dispatch(&self, command: &CommandEnvelope) -> Result<CommandOutcome, CommandError> {
        self.dispatched.lock().unwrap().push(command.clone());

        let mut failures = self.failures.lock().unwrap();
        if let Some(remaining) = failures.get_mut(&command.command_type)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(CommandError::StoreUnavailable {
                attempts: 1,
                source: DomainError::Infrastructure("injected dispatch failure".into()),
            });
        }

        Ok(CommandOutcome {
            stream: StreamId::new(command.command_type.clone(), command.aggregate_id.clone()),
            events: Vec::new(),
            replayed: false,
        })
    }
}
