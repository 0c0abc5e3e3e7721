//! Test logger.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use conductor_core::logger::Logger;

use crate::clock::fixed_now;

/// A logger that collects complete lines in memory.
#[derive(Debug, Default)]
pub struct RecordingLogger {
    pending: Mutex<String>,
    lines: Mutex<Vec<String>>,
}

impl RecordingLogger {
    /// Create an empty logger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the lines written so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }
}

impl Logger for RecordingLogger {
    fn now(&self) -> DateTime<Utc> {
        fixed_now()
    }

    fn write(&self, message: &str) {
        self.pending.lock().unwrap().push_str(message);
    }

    fn write_line(&self, message: &str) {
        let mut line = std::mem::take(&mut *self.pending.lock().unwrap());
        line.push_str(message);
        self.lines.lock().unwrap().push(line);
    }
}
