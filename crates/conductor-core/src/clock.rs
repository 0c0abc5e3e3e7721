//! Wall-clock abstraction.
//!
//! Only metadata (`occurred_at`, log lines) reads the clock. Saga reactions
//! and aggregate decisions branch on logical timestamps carried by commands
//! and events, never on the clock.

use chrono::{DateTime, Utc};

/// Abstraction over system time for deterministic behavior.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock that delegates to the system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
