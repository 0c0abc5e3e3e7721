//! Conductor runtime — startup and run errors.

use conductor_core::error::{CommandError, ConfigurationError, DomainError};
use thiserror::Error;

use crate::config::ConfigError;

/// Startup and runtime errors for the `conductor` binary.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The configuration file or an environment override is invalid.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A handler or saga definition is inconsistent.
    #[error("wiring error: {0}")]
    Wiring(#[from] ConfigurationError),

    /// Database connection or pool error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema setup or another store failure.
    #[error("store error: {0}")]
    Store(#[from] DomainError),

    /// A submitted command failed.
    #[error("command error: {0}")]
    Command(#[from] CommandError),

    /// An input line could not be parsed.
    #[error("input line {line}: {message}")]
    Input {
        /// One-based line number.
        line: usize,
        /// What was wrong with it.
        message: String,
    },

    /// Reading input failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
