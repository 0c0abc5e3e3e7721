//! Dispatch tunables.

use std::time::Duration;

use backon::ExponentialBuilder;

/// Timeouts and retry limits applied by the command handler registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Upper bound on a single event store call.
    pub store_timeout: Duration,
    /// Reload-and-retry rounds after an optimistic concurrency conflict.
    pub max_conflict_retries: u32,
    /// Retries of a store call that failed or timed out.
    pub max_store_retries: u32,
    /// First backoff delay.
    pub min_backoff: Duration,
    /// Longest backoff delay.
    pub max_backoff: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_secs(5),
            max_conflict_retries: 3,
            max_store_retries: 3,
            min_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_secs(2),
        }
    }
}

impl DispatchConfig {
    /// Backoff between retries of a failed store call.
    #[must_use]
    pub fn store_backoff(&self) -> ExponentialBuilder {
        self.backoff(self.max_store_retries)
    }

    /// Backoff between reload rounds after a concurrency conflict.
    #[must_use]
    pub fn conflict_backoff(&self) -> ExponentialBuilder {
        self.backoff(self.max_conflict_retries)
    }

    fn backoff(&self, max_times: u32) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.min_backoff)
            .with_max_delay(self.max_backoff)
            .with_max_times(max_times as usize)
            .with_jitter()
    }
}

#[cfg(test)]
mod tests {
    use backon::BackoffBuilder;

    use super::*;

    #[test]
    fn test_conflict_backoff_yields_one_delay_per_retry() {
        let config = DispatchConfig {
            max_conflict_retries: 2,
            ..DispatchConfig::default()
        };

        let delays: Vec<_> = config.conflict_backoff().build().collect();

        assert_eq!(delays.len(), 2);
        assert!(delays.iter().all(|delay| *delay <= config.max_backoff * 2));
    }

    #[test]
    fn test_zero_store_retries_yields_no_delay() {
        let config = DispatchConfig {
            max_store_retries: 0,
            ..DispatchConfig::default()
        };

        assert_eq!(config.store_backoff().build().count(), 0);
    }
}
