//! Diagnostic logger collaborator.
//!
//! Loggers never gate correctness: every method is infallible and callers
//! ignore what happens to the text.

use std::io::Write;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use crate::clock::{Clock, SystemClock};

/// Line-oriented diagnostic sink.
pub trait Logger: Send + Sync {
    /// Returns the timestamp the logger stamps lines with.
    fn now(&self) -> DateTime<Utc>;

    /// Writes a fragment without terminating the line.
    fn write(&self, message: &str);

    /// Writes a fragment and terminates the line.
    fn write_line(&self, message: &str);
}

/// Logger that forwards complete lines to `tracing` at `info` level.
///
/// Fragments passed to `write` are buffered until the next `write_line`.
pub struct TracingLogger {
    clock: Arc<dyn Clock>,
    pending: Mutex<String>,
}

impl TracingLogger {
    /// Creates a logger stamping lines with `clock`.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            pending: Mutex::new(String::new()),
        }
    }

    fn take_line(&self, message: &str) -> String {
        let mut pending = self
            .pending
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut line = std::mem::take(&mut *pending);
        line.push_str(message);
        line
    }
}

impl Default for TracingLogger {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl std::fmt::Debug for TracingLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TracingLogger").finish_non_exhaustive()
    }
}

impl Logger for TracingLogger {
    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn write(&self, message: &str) {
        self.pending
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push_str(message);
    }

    fn write_line(&self, message: &str) {
        let line = self.take_line(message);
        tracing::info!(target: "conductor::log", logged_at = %self.now(), "{line}");
    }
}

/// Logger that writes to standard output.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleLogger;

impl Logger for ConsoleLogger {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn write(&self, message: &str) {
        let mut stdout = std::io::stdout().lock();
        let _ = stdout.write_all(message.as_bytes());
        let _ = stdout.flush();
    }

    fn write_line(&self, message: &str) {
        let mut stdout = std::io::stdout().lock();
        let _ = writeln!(stdout, "{message}");
    }
}
