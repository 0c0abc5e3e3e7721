//! Command abstractions.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::CommandError;
use crate::repository::{StoredEvent, StreamId};

/// Trait that all commands implement.
pub trait Command: Serialize + DeserializeOwned + Send + Sync + std::fmt::Debug + 'static {
    /// The type name for this command (for logging/routing).
    const COMMAND_TYPE: &'static str;

    /// The aggregate this command targets.
    fn aggregate_id(&self) -> &str;

    /// Logical timestamp assigned by the command's originator.
    fn timestamp(&self) -> i64;
}

/// Type-erased command as it travels between sagas, transports and the
/// command handler registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    /// Command type name.
    pub command_type: String,
    /// Target aggregate.
    pub aggregate_id: String,
    /// Logical timestamp.
    pub timestamp: i64,
    /// Correlation ID to trace this command through the system.
    pub correlation_id: Uuid,
    /// The event that caused this command, if any.
    pub causation_id: Option<Uuid>,
    /// Serialized command.
    pub payload: serde_json::Value,
}

impl CommandEnvelope {
    /// Wraps a typed command.
    ///
    /// # Panics
    ///
    /// Panics if the command does not serialize to JSON. Commands are plain
    /// structs with string keys, so this only happens on a broken
    /// `Serialize` impl.
    pub fn new<C: Command>(command: &C, correlation_id: Uuid) -> Self {
        Self {
            command_type: C::COMMAND_TYPE.to_owned(),
            aggregate_id: command.aggregate_id().to_owned(),
            timestamp: command.timestamp(),
            correlation_id,
            causation_id: None,
            payload: serde_json::to_value(command).expect("command serializes to JSON"),
        }
    }

    /// Records the event that caused this command.
    #[must_use]
    pub fn caused_by(mut self, causation_id: Uuid) -> Self {
        self.causation_id = Some(causation_id);
        self
    }

    /// Decodes the payload into its typed command.
    ///
    /// # Errors
    ///
    /// Returns `CommandError::Malformed` if the envelope carries another
    /// command type or the payload does not decode.
    pub fn decode<C: Command>(&self) -> Result<C, CommandError> {
        if self.command_type != C::COMMAND_TYPE {
            return Err(CommandError::Malformed {
                command_type: self.command_type.clone(),
                message: format!("expected {}", C::COMMAND_TYPE),
            });
        }
        serde_json::from_value(self.payload.clone()).map_err(|e| CommandError::Malformed {
            command_type: self.command_type.clone(),
            message: e.to_string(),
        })
    }

    /// Content fingerprint: hex SHA-256 over type, target and payload.
    ///
    /// Two deliveries of the same command share a fingerprint; tracing ids are
    /// excluded.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.command_type.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.aggregate_id.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.timestamp.to_be_bytes());
        hasher.update([0u8]);
        // Map keys serialize in sorted order, so equal payloads hash equally.
        hasher.update(self.payload.to_string().as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// Result of a successfully handled command.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutcome {
    /// The stream the command was applied to.
    pub stream: StreamId,
    /// The events produced by the command.
    pub events: Vec<StoredEvent>,
    /// `true` when the events come from an earlier application of the same
    /// idempotent command and nothing was executed this time.
    pub replayed: bool,
}

/// Delivers commands to the registry that owns their aggregates.
#[async_trait]
pub trait CommandDispatcher: Send + Sync {
    /// Dispatches one command and waits for its outcome.
    async fn dispatch(&self, command: &CommandEnvelope) -> Result<CommandOutcome, CommandError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct ChargePayment {
        aggregate_id: String,
        timestamp: i64,
        amount_cents: u64,
    }

    impl Command for ChargePayment {
        const COMMAND_TYPE: &'static str = "payment.charge";

        fn aggregate_id(&self) -> &str {
            &self.aggregate_id
        }

        fn timestamp(&self) -> i64 {
            self.timestamp
        }
    }

    fn charge(amount_cents: u64) -> ChargePayment {
        ChargePayment {
            aggregate_id: "O1".into(),
            timestamp: 3,
            amount_cents,
        }
    }

    #[test]
    fn test_envelope_round_trips_typed_command() {
        let envelope = CommandEnvelope::new(&charge(500), Uuid::nil());

        assert_eq!(envelope.command_type, "payment.charge");
        assert_eq!(envelope.aggregate_id, "O1");
        assert_eq!(envelope.timestamp, 3);
        assert_eq!(envelope.decode::<ChargePayment>().unwrap(), charge(500));
    }

    #[test]
    fn test_fingerprint_ignores_tracing_ids() {
        let first = CommandEnvelope::new(&charge(500), Uuid::new_v4());
        let second = CommandEnvelope::new(&charge(500), Uuid::new_v4()).caused_by(Uuid::new_v4());

        assert_eq!(first.fingerprint(), second.fingerprint());
        assert_eq!(first.fingerprint().len(), 64);
    }

    #[test]
    fn test_fingerprint_changes_with_payload() {
        let first = CommandEnvelope::new(&charge(500), Uuid::nil());
        let second = CommandEnvelope::new(&charge(501), Uuid::nil());

        assert_ne!(first.fingerprint(), second.fingerprint());
    }

    #[test]
    fn test_decode_rejects_other_command_type() {
        let mut envelope = CommandEnvelope::new(&charge(500), Uuid::nil());
        envelope.command_type = "payment.refund".into();

        let result = envelope.decode::<ChargePayment>();

        assert!(matches!(result, Err(CommandError::Malformed { .. })));
    }
}
