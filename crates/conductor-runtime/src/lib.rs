//! Conductor runtime — wires the saga orchestration core to its stores.
//!
//! Loads `RuntimeConfig`, binds each store to its local or remote
//! implementation, and assembles a `Conductor`: the command handler
//! registry, one saga processor per saga type, and the orchestrator that
//! feeds every committed event back to the sagas until the system is quiet.

pub mod conductor;
pub mod config;
pub mod error;
pub mod input;
pub mod stores;
pub mod telemetry;

use std::sync::Arc;

use conductor_core::error::ConfigurationError;
use conductor_core::logger::{ConsoleLogger, Logger, TracingLogger};
use conductor_fulfillment::application::command_handlers;
use conductor_fulfillment::saga::OrderFulfillmentSaga;

pub use conductor::{Conductor, ConductorBuilder, RunSummary};
pub use config::{ConfigError, RuntimeConfig, StoreSelection};
pub use error::RuntimeError;
pub use stores::Stores;

/// Builds a conductor for the order fulfillment domain. Diagnostic lines go
/// to standard output when `diagnostics.console` is set, else to tracing.
///
/// # Errors
///
/// Returns a `ConfigurationError` if a handler or saga definition is
/// inconsistent.
pub fn fulfillment_conductor(
    stores: Stores,
    config: &RuntimeConfig,
) -> Result<Conductor, ConfigurationError> {
    let logger: Arc<dyn Logger> = if config.diagnostics.console {
        Arc::new(ConsoleLogger)
    } else {
        Arc::new(TracingLogger::default())
    };
    Conductor::builder(stores, config)
        .commands(command_handlers::register)?
        .saga::<OrderFulfillmentSaga>()?
        .logger(logger)
        .build()
}
