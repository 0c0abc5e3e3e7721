//! Conductor Commands — the command handler registry.
//!
//! Routes each command to the single handler registered for its type,
//! enforces the idempotency policy chosen at registration, and owns the
//! retry, backoff and timeout policy for event store access.

pub mod config;
pub mod handler;
pub mod registry;

pub use config::DispatchConfig;
pub use handler::CommandOptions;
pub use registry::{CommandHandlerRegistry, CommandHandlerRegistryBuilder};
