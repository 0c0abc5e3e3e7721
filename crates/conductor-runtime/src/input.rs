//! NDJSON input for the `conductor` binary.
//!
//! One JSON object per line, tagged by `kind`:
//!
//! ```text
//! {"kind":"command","command_type":"order.place","aggregate_id":"O1","timestamp":1,"payload":{...}}
//! {"kind":"event", ...a stored event...}
//! ```
//!
//! Blank lines and lines starting with `#` are skipped.

use conductor_core::command::CommandEnvelope;
use conductor_core::repository::StoredEvent;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::RuntimeError;

/// A command as written in an input file. Tracing ids are optional.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CommandRecord {
    /// Command type name.
    pub command_type: String,
    /// Target aggregate.
    pub aggregate_id: String,
    /// Logical timestamp.
    pub timestamp: i64,
    /// Correlation id; a fresh one is assigned when absent.
    #[serde(default)]
    pub correlation_id: Option<Uuid>,
    /// Serialized command.
    pub payload: serde_json::Value,
}

impl CommandRecord {
    /// Converts the record into a dispatchable envelope.
    #[must_use]
    pub fn into_envelope(self) -> CommandEnvelope {
        CommandEnvelope {
            command_type: self.command_type,
            aggregate_id: self.aggregate_id,
            timestamp: self.timestamp,
            correlation_id: self.correlation_id.unwrap_or_else(Uuid::new_v4),
            causation_id: None,
            payload: self.payload,
        }
    }
}

/// One input line.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InputRecord {
    /// Submit a command.
    Command(CommandRecord),
    /// Publish an already committed event.
    Event(Box<StoredEvent>),
}

/// Parses one input line. Returns `Ok(None)` for blank and comment lines.
///
/// # Errors
///
/// Returns `RuntimeError::Input` if the line is not a valid record.
pub fn parse_line(line_number: usize, line: &str) -> Result<Option<InputRecord>, RuntimeError> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    serde_json::from_str(trimmed)
        .map(Some)
        .map_err(|e| RuntimeError::Input {
            line: line_number,
            message: e.to_string(),
        })
}
