//! The conductor: command registry, saga processors and orchestrator wired
//! into one event loop.
//!
//! Events produced by commands (submitted ones and those sagas dispatch) are
//! queued and published to the orchestrator in commit order until no new
//! events appear. Each run has its own queue, so concurrent submissions do
//! not publish or count each other's events.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use conductor_commands::{CommandHandlerRegistry, CommandHandlerRegistryBuilder};
use conductor_core::command::{Command, CommandDispatcher, CommandEnvelope, CommandOutcome};
use conductor_core::error::{CommandError, ConfigurationError};
use conductor_core::logger::Logger;
use conductor_core::repository::StoredEvent;
use conductor_core::saga_store::SagaStore;
use conductor_saga::{
    Saga, SagaOrchestrator, SagaProcessor, SagaProcessorConfig, SagaRuntime, SagaSubscriber,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::RuntimeConfig;
use crate::stores::Stores;

tokio::task_local! {
    /// Queue of the run the current task is executing.
    static RUN_EVENTS: PendingEvents;
}

/// Events committed but not yet offered to the sagas, in commit order.
#[derive(Debug, Default)]
struct PendingEvents {
    queue: Mutex<VecDeque<StoredEvent>>,
}

impl PendingEvents {
    fn push_all(&self, events: &[StoredEvent]) {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(events.iter().cloned());
    }

    fn pop(&self) -> Option<StoredEvent> {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    fn clear(&self) -> usize {
        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        let dropped = queue.len();
        queue.clear();
        dropped
    }
}

/// Dispatcher handed to saga processors: executes through the registry and
/// queues freshly committed events on the current run. Replayed outcomes of
/// idempotent commands were queued when first committed and are not queued
/// again.
struct PublishingDispatcher {
    registry: Arc<CommandHandlerRegistry>,
}

#[async_trait]
impl CommandDispatcher for PublishingDispatcher {
    async fn dispatch(&self, command: &CommandEnvelope) -> Result<CommandOutcome, CommandError> {
        let outcome = self.registry.handle(command).await?;
        if !outcome.replayed
            && RUN_EVENTS
                .try_with(|run| run.push_all(&outcome.events))
                .is_err()
        {
            warn!(
                command_type = %command.command_type,
                aggregate_id = %command.aggregate_id,
                "command dispatched outside a conductor run, its events are not published"
            );
        }
        Ok(outcome)
    }
}

type ProcessorFactory =
    Box<dyn FnOnce(Arc<dyn CommandDispatcher>, Arc<dyn SagaStore>) -> Arc<dyn SagaSubscriber>>;

/// Builder for a `Conductor`.
pub struct ConductorBuilder {
    commands: CommandHandlerRegistryBuilder,
    stores: Stores,
    processor_config: SagaProcessorConfig,
    max_cascade_events: usize,
    sagas: Vec<ProcessorFactory>,
    logger: Option<Arc<dyn Logger>>,
}

impl ConductorBuilder {
    /// Registers command handlers through `register`.
    ///
    /// # Errors
    ///
    /// Propagates the registration error.
    pub fn commands<F>(mut self, register: F) -> Result<Self, ConfigurationError>
    where
        F: FnOnce(
            CommandHandlerRegistryBuilder,
        ) -> Result<CommandHandlerRegistryBuilder, ConfigurationError>,
    {
        self.commands = register(self.commands)?;
        Ok(self)
    }

    /// Adds saga type `S`. Its definition is validated now.
    ///
    /// # Errors
    ///
    /// Returns the definition's `ConfigurationError`.
    pub fn saga<S: Saga>(mut self) -> Result<Self, ConfigurationError> {
        let runtime = Arc::new(SagaRuntime::<S>::build()?);
        let config = self.processor_config;
        self.sagas.push(Box::new(
            move |dispatcher: Arc<dyn CommandDispatcher>,
                  store: Arc<dyn SagaStore>|
                  -> Arc<dyn SagaSubscriber> {
                Arc::new(SagaProcessor::new(runtime, store, dispatcher, config))
            },
        ));
        Ok(self)
    }

    /// Sets the orchestrator's diagnostic logger.
    #[must_use]
    pub fn logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Finishes the conductor.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::DuplicateSaga` if a saga type was added
    /// twice.
    pub fn build(self) -> Result<Conductor, ConfigurationError> {
        let registry = Arc::new(self.commands.build(self.stores.events.clone()));
        let dispatcher: Arc<dyn CommandDispatcher> = Arc::new(PublishingDispatcher {
            registry: registry.clone(),
        });

        let mut orchestrator =
            SagaOrchestrator::builder().delivery_backoff(self.processor_config.delivery_backoff());
        for factory in self.sagas {
            let subscriber = factory(dispatcher.clone(), self.stores.sagas.clone());
            orchestrator = orchestrator.subscribe(subscriber)?;
        }
        if let Some(logger) = self.logger {
            orchestrator = orchestrator.logger(logger);
        }

        Ok(Conductor {
            registry,
            orchestrator: orchestrator.build(),
            stores: self.stores,
            max_cascade_events: self.max_cascade_events,
        })
    }
}

/// Totals of one submission or publication.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Events offered to the orchestrator.
    pub events_published: usize,
    /// Commands sagas dispatched.
    pub commands_dispatched: usize,
    /// Saga deliveries that still failed after redelivery; the affected
    /// sagas keep their queued commands for `Conductor::resume`.
    pub saga_failures: usize,
    /// Queued events dropped because the cascade limit was reached.
    pub events_dropped: usize,
}

impl RunSummary {
    /// Adds `other` into `self`.
    pub fn absorb(&mut self, other: &RunSummary) {
        self.events_published += other.events_published;
        self.commands_dispatched += other.commands_dispatched;
        self.saga_failures += other.saga_failures;
        self.events_dropped += other.events_dropped;
    }
}

/// A running conductor.
pub struct Conductor {
    registry: Arc<CommandHandlerRegistry>,
    orchestrator: SagaOrchestrator,
    stores: Stores,
    max_cascade_events: usize,
}

impl Conductor {
    /// Starts building a conductor on `stores`, with policies from `config`.
    #[must_use]
    pub fn builder(stores: Stores, config: &RuntimeConfig) -> ConductorBuilder {
        ConductorBuilder {
            commands: CommandHandlerRegistry::builder().config(config.dispatch.dispatch_config()),
            stores,
            processor_config: config.dispatch.processor_config(),
            max_cascade_events: config.dispatch.max_cascade_events,
            sagas: Vec::new(),
            logger: None,
        }
    }

    /// Returns the stores the conductor runs against.
    #[must_use]
    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    /// Returns the command handler registry.
    #[must_use]
    pub fn registry(&self) -> &CommandHandlerRegistry {
        &self.registry
    }

    /// Submits a typed command under a fresh correlation id.
    ///
    /// # Errors
    ///
    /// See `submit_envelope`.
    pub async fn submit<C: Command>(&self, command: &C) -> Result<RunSummary, CommandError> {
        self.submit_envelope(&CommandEnvelope::new(command, Uuid::new_v4()))
            .await
    }

    /// Handles `envelope` and publishes the events it produced, and every
    /// event those cascade into, to the sagas.
    ///
    /// # Errors
    ///
    /// Returns the `CommandError` if the submitted command itself fails.
    /// Failures of saga-dispatched commands are counted in the summary.
    #[instrument(skip(self, envelope), fields(command_type = %envelope.command_type, aggregate_id = %envelope.aggregate_id))]
    pub async fn submit_envelope(
        &self,
        envelope: &CommandEnvelope,
    ) -> Result<RunSummary, CommandError> {
        let outcome = self.registry.handle(envelope).await?;
        if outcome.replayed {
            info!("command already applied, nothing to publish");
            return Ok(RunSummary::default());
        }
        Ok(self.run(&outcome.events).await)
    }

    /// Publishes an already committed event, and everything it cascades
    /// into, to the sagas. The event is not appended to the event store.
    pub async fn publish(&self, event: StoredEvent) -> RunSummary {
        self.run(std::slice::from_ref(&event)).await
    }

    /// Dispatches the commands that interrupted drains left queued, then
    /// publishes the events they produce. Call it on startup and once a
    /// failing store is reachable again.
    #[instrument(skip(self))]
    pub async fn resume(&self) -> RunSummary {
        RUN_EVENTS
            .scope(PendingEvents::default(), async {
                let report = self.orchestrator.resume().await;
                let mut summary = RunSummary {
                    commands_dispatched: report.dispatched(),
                    saga_failures: report.failures().count(),
                    ..RunSummary::default()
                };
                if !report.deliveries.is_empty() {
                    info!(
                        sagas = report.deliveries.len(),
                        dispatched = summary.commands_dispatched,
                        "stranded sagas resumed"
                    );
                }
                summary.absorb(&self.run_until_quiet().await);
                summary
            })
            .await
    }

    async fn run(&self, seed: &[StoredEvent]) -> RunSummary {
        let run = PendingEvents::default();
        run.push_all(seed);
        RUN_EVENTS.scope(run, self.run_until_quiet()).await
    }

    /// Publishes the current run's queue until it is empty.
    async fn run_until_quiet(&self) -> RunSummary {
        let mut summary = RunSummary::default();
        while let Some(event) = RUN_EVENTS.with(PendingEvents::pop) {
            if summary.events_published >= self.max_cascade_events {
                summary.events_dropped = RUN_EVENTS.with(PendingEvents::clear) + 1;
                warn!(
                    limit = self.max_cascade_events,
                    dropped = summary.events_dropped,
                    "cascade limit reached, dropping queued events"
                );
                break;
            }
            let report = self.orchestrator.publish(&event).await;
            summary.events_published += 1;
            summary.commands_dispatched += report.dispatched();
            summary.saga_failures += report.failures().count();
        }
        summary
    }
}

impl std::fmt::Debug for Conductor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conductor")
            .field("registry", &self.registry)
            .field("saga_types", &self.orchestrator.saga_types().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
