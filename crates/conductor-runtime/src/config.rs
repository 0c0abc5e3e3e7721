//! Runtime configuration.
//!
//! Loaded from a YAML file with environment variable overrides. Priority,
//! highest first: environment, file, defaults.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use conductor_commands::DispatchConfig;
use conductor_saga::SagaProcessorConfig;
use serde::Deserialize;
use thiserror::Error;

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_VAR: &str = "CONDUCTOR_CONFIG";
/// Configuration file read when `CONDUCTOR_CONFIG` is unset.
pub const DEFAULT_CONFIG_PATH: &str = "conductor.yaml";

/// Top-level runtime configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Timeouts, retry limits and backoff delays.
    pub dispatch: DispatchSettings,
    /// Which implementation backs each store.
    pub stores: StoreSettings,
    /// PostgreSQL connection, used by remote stores.
    pub database: DatabaseSettings,
    /// Where orchestrator diagnostic lines go.
    pub diagnostics: DiagnosticsSettings,
}

/// Orchestrator diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DiagnosticsSettings {
    /// Print one line per saga delivery to standard output instead of the
    /// tracing log.
    pub console: bool,
}

/// Timeouts, retry limits and backoff delays, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DispatchSettings {
    /// Upper bound for a single store call.
    pub store_timeout_ms: u64,
    /// Optimistic concurrency retries, for both aggregates and sagas.
    pub max_conflict_retries: u32,
    /// Retries of a failing or timed-out store call.
    pub max_store_retries: u32,
    /// First backoff delay.
    pub min_backoff_ms: u64,
    /// Backoff ceiling.
    pub max_backoff_ms: u64,
    /// Redeliveries of an event whose saga processing failed retryably.
    pub max_delivery_retries: u32,
    /// Events one submission may cascade into before the run is cut short.
    pub max_cascade_events: usize,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        let defaults = DispatchConfig::default();
        Self {
            store_timeout_ms: millis(defaults.store_timeout),
            max_conflict_retries: defaults.max_conflict_retries,
            max_store_retries: defaults.max_store_retries,
            min_backoff_ms: millis(defaults.min_backoff),
            max_backoff_ms: millis(defaults.max_backoff),
            max_delivery_retries: SagaProcessorConfig::default().max_delivery_retries,
            max_cascade_events: 10_000,
        }
    }
}

impl DispatchSettings {
    /// Returns the command registry policy.
    #[must_use]
    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            store_timeout: Duration::from_millis(self.store_timeout_ms),
            max_conflict_retries: self.max_conflict_retries,
            max_store_retries: self.max_store_retries,
            min_backoff: Duration::from_millis(self.min_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }

    /// Returns the saga processor policy.
    #[must_use]
    pub fn processor_config(&self) -> SagaProcessorConfig {
        SagaProcessorConfig {
            max_conflict_retries: self.max_conflict_retries,
            store_timeout: Duration::from_millis(self.store_timeout_ms),
            max_store_retries: self.max_store_retries,
            max_delivery_retries: self.max_delivery_retries,
            min_backoff: Duration::from_millis(self.min_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Where a store lives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreSelection {
    /// In-process memory. Lost on exit.
    #[default]
    Local,
    /// PostgreSQL at `database.url`.
    Remote,
}

impl FromStr for StoreSelection {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "remote" => Ok(Self::Remote),
            other => Err(ConfigError::Invalid {
                key: "store selection",
                value: other.to_owned(),
            }),
        }
    }
}

/// Store selection per store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Backing of the aggregate event store.
    pub event_store: StoreSelection,
    /// Backing of the saga store.
    pub saga_store: StoreSelection,
}

impl StoreSettings {
    /// Returns `true` if any store needs the database.
    #[must_use]
    pub fn needs_database(&self) -> bool {
        self.event_store == StoreSelection::Remote || self.saga_store == StoreSelection::Remote
    }
}

/// PostgreSQL connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Connection URL.
    pub url: Option<String>,
    /// Pool size.
    pub max_connections: u32,
    /// Create the tables on startup if they are missing.
    pub apply_schema: bool,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
            apply_schema: true,
        }
    }
}

impl RuntimeConfig {
    /// Loads the configuration file named by `CONDUCTOR_CONFIG` (defaults
    /// apply when the file does not exist), then applies environment
    /// overrides and validates the result.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or parsed, an
    /// override does not parse, or validation fails.
    pub fn load() -> Result<Self, ConfigError> {
        let path =
            std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_owned());

        let mut config = if Path::new(&path).exists() {
            Self::from_file(&path)?
        } else {
            Self::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a YAML configuration file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::FileRead` or `ConfigError::Parse`.
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(path.to_owned(), e.to_string()))?;
        Self::from_yaml(&content)
    }

    /// Parses YAML configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` if the document does not match.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Applies overrides read through `var`.
    ///
    /// Recognized variables: `DATABASE_URL`, `CONDUCTOR_EVENT_STORE`,
    /// `CONDUCTOR_SAGA_STORE`, `CONDUCTOR_STORE_TIMEOUT_MS`,
    /// `CONDUCTOR_MAX_CONFLICT_RETRIES`, `CONDUCTOR_MAX_STORE_RETRIES`,
    /// `CONDUCTOR_MAX_DELIVERY_RETRIES`, `CONDUCTOR_CONSOLE_LOG`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if a set variable does not parse.
    pub fn apply_overrides(
        &mut self,
        var: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(url) = var("DATABASE_URL") {
            self.database.url = Some(url);
        }
        if let Some(value) = var("CONDUCTOR_EVENT_STORE") {
            self.stores.event_store = value.parse()?;
        }
        if let Some(value) = var("CONDUCTOR_SAGA_STORE") {
            self.stores.saga_store = value.parse()?;
        }
        if let Some(value) = var("CONDUCTOR_STORE_TIMEOUT_MS") {
            self.dispatch.store_timeout_ms = parse("CONDUCTOR_STORE_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = var("CONDUCTOR_MAX_CONFLICT_RETRIES") {
            self.dispatch.max_conflict_retries = parse("CONDUCTOR_MAX_CONFLICT_RETRIES", &value)?;
        }
        if let Some(value) = var("CONDUCTOR_MAX_STORE_RETRIES") {
            self.dispatch.max_store_retries = parse("CONDUCTOR_MAX_STORE_RETRIES", &value)?;
        }
        if let Some(value) = var("CONDUCTOR_MAX_DELIVERY_RETRIES") {
            self.dispatch.max_delivery_retries = parse("CONDUCTOR_MAX_DELIVERY_RETRIES", &value)?;
        }
        if let Some(value) = var("CONDUCTOR_CONSOLE_LOG") {
            self.diagnostics.console = parse("CONDUCTOR_CONSOLE_LOG", &value)?;
        }
        Ok(())
    }

    /// Checks cross-field constraints.
    ///
    /// # Errors
    ///
    /// - `ConfigError::MissingDatabaseUrl` if a remote store has no URL,
    /// - `ConfigError::Invalid` for a zero timeout, a zero cascade limit or
    ///   inverted backoff bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stores.needs_database() && self.database.url.is_none() {
            return Err(ConfigError::MissingDatabaseUrl);
        }
        if self.dispatch.store_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "dispatch.store_timeout_ms",
                value: "0".to_owned(),
            });
        }
        if self.dispatch.max_cascade_events == 0 {
            return Err(ConfigError::Invalid {
                key: "dispatch.max_cascade_events",
                value: "0".to_owned(),
            });
        }
        if self.dispatch.min_backoff_ms > self.dispatch.max_backoff_ms {
            return Err(ConfigError::Invalid {
                key: "dispatch.min_backoff_ms",
                value: format!(
                    "{} exceeds max_backoff_ms {}",
                    self.dispatch.min_backoff_ms, self.dispatch.max_backoff_ms
                ),
            });
        }
        Ok(())
    }
}

fn parse<T: FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        value: value.to_owned(),
    })
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file '{0}': {1}")]
    FileRead(String, String),

    /// The configuration file is not valid YAML for `RuntimeConfig`.
    #[error("failed to parse config: {0}")]
    Parse(String),

    /// A value is out of range or does not parse.
    #[error("invalid value for {key}: {value}")]
    Invalid {
        /// Setting or variable name.
        key: &'static str,
        /// The offending value.
        value: String,
    },

    /// A remote store was selected without `database.url`.
    #[error("a remote store is selected but no database url is configured")]
    MissingDatabaseUrl,
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config_is_local_and_valid() {
        let config = RuntimeConfig::default();

        assert_eq!(config.stores.event_store, StoreSelection::Local);
        assert_eq!(config.stores.saga_store, StoreSelection::Local);
        assert_eq!(config.dispatch.store_timeout_ms, 5_000);
        assert_eq!(config.database.max_connections, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r"
dispatch:
  store_timeout_ms: 250
  max_conflict_retries: 5
stores:
  event_store: remote
  saga_store: local
database:
  url: postgres://localhost/conductor
  max_connections: 4
";

        let config = RuntimeConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.dispatch.store_timeout_ms, 250);
        assert_eq!(config.dispatch.max_conflict_retries, 5);
        assert_eq!(config.dispatch.max_store_retries, 3);
        assert_eq!(config.stores.event_store, StoreSelection::Remote);
        assert_eq!(config.stores.saga_store, StoreSelection::Local);
        assert_eq!(
            config.database.url.as_deref(),
            Some("postgres://localhost/conductor")
        );
        assert_eq!(config.database.max_connections, 4);
        assert!(config.database.apply_schema);
    }

    #[test]
    fn test_parse_rejects_unknown_store_selection() {
        let result = RuntimeConfig::from_yaml("stores:\n  event_store: cloud\n");

        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_env_overrides_win_over_file() {
        // Arrange
        let mut config = RuntimeConfig::from_yaml("dispatch:\n  store_timeout_ms: 250\n").unwrap();

        // Act
        config
            .apply_overrides(env(&[
                ("DATABASE_URL", "postgres://db/conductor"),
                ("CONDUCTOR_SAGA_STORE", "Remote"),
                ("CONDUCTOR_STORE_TIMEOUT_MS", "900"),
                ("CONDUCTOR_CONSOLE_LOG", "true"),
            ]))
            .unwrap();

        // Assert
        assert_eq!(config.dispatch.store_timeout_ms, 900);
        assert_eq!(config.stores.saga_store, StoreSelection::Remote);
        assert_eq!(config.stores.event_store, StoreSelection::Local);
        assert!(config.diagnostics.console);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_override_that_does_not_parse_is_an_error() {
        let mut config = RuntimeConfig::default();

        let result = config.apply_overrides(env(&[("CONDUCTOR_MAX_STORE_RETRIES", "many")]));

        match result {
            Err(ConfigError::Invalid { key, value }) => {
                assert_eq!(key, "CONDUCTOR_MAX_STORE_RETRIES");
                assert_eq!(value, "many");
            }
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    #[test]
    fn test_remote_store_requires_database_url() {
        let mut config = RuntimeConfig::default();
        config.stores.event_store = StoreSelection::Remote;

        let result = config.validate();

        assert!(matches!(result, Err(ConfigError::MissingDatabaseUrl)));
    }

    #[test]
    fn test_zero_cascade_limit_is_rejected() {
        let mut config = RuntimeConfig::default();
        config.dispatch.max_cascade_events = 0;

        let result = config.validate();

        match result {
            Err(ConfigError::Invalid { key, .. }) => {
                assert_eq!(key, "dispatch.max_cascade_events");
            }
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    #[test]
    fn test_processor_config_carries_store_policy() {
        let mut config = RuntimeConfig::default();
        config
            .apply_overrides(env(&[
                ("CONDUCTOR_STORE_TIMEOUT_MS", "75"),
                ("CONDUCTOR_MAX_DELIVERY_RETRIES", "6"),
            ]))
            .unwrap();

        let processor = config.dispatch.processor_config();

        assert_eq!(processor.store_timeout, Duration::from_millis(75));
        assert_eq!(processor.max_store_retries, 3);
        assert_eq!(processor.max_delivery_retries, 6);
    }

    #[test]
    fn test_inverted_backoff_is_rejected() {
        let mut config = RuntimeConfig::default();
        config.dispatch.min_backoff_ms = 500;
        config.dispatch.max_backoff_ms = 100;

        let result = config.validate();

        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_settings_convert_to_policies() {
        let settings = DispatchSettings {
            store_timeout_ms: 40,
            max_conflict_retries: 7,
            ..DispatchSettings::default()
        };

        let dispatch = settings.dispatch_config();
        let processor = settings.processor_config();

        assert_eq!(dispatch.store_timeout, Duration::from_millis(40));
        assert_eq!(dispatch.max_conflict_retries, 7);
        assert_eq!(processor.max_conflict_retries, 7);
    }
}
