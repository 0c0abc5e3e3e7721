//! Conductor Saga — the saga orchestration core.
//!
//! Correlates inbound events to saga instances, evolves saga state
//! deterministically, buffers the commands sagas emit, and drains them
//! through a `CommandDispatcher` after the new state is persisted.

pub mod definition;
pub mod error;
pub mod handler;
pub mod instance;
pub mod orchestrator;
pub mod processor;
pub mod registry;

pub use definition::{Saga, SagaDefinition, SagaRuntime};
pub use error::SagaError;
pub use handler::{HandleOutcome, SagaEventHandler};
pub use instance::{SagaContext, SagaInstance};
pub use orchestrator::{PublishReport, SagaDelivery, SagaOrchestrator};
pub use processor::{ProcessOutcome, SagaProcessor, SagaProcessorConfig, SagaSubscriber};
pub use registry::SagaRegistry;
