//! Saga processor: load, apply, persist, drain for one saga type.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use conductor_core::command::CommandDispatcher;
use conductor_core::error::DomainError;
use conductor_core::keyed_lock::KeyedLock;
use conductor_core::repository::StoredEvent;
use conductor_core::saga_store::SagaStore;
use tracing::{debug, info, instrument, warn};

use crate::definition::{Saga, SagaRuntime};
use crate::error::SagaError;
use crate::handler::HandleOutcome;
use crate::instance::SagaInstance;

/// Result of offering one event to one saga type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The saga type does not correlate this event type.
    Irrelevant,
    /// The event was routed to a saga instance.
    Handled {
        /// The saga instance the event was routed to.
        saga_id: String,
        /// What applying the event did.
        outcome: HandleOutcome,
        /// Commands dispatched during this call, including leftovers from
        /// an earlier interrupted drain.
        dispatched: usize,
    },
    /// A stranded command queue was drained without a new event.
    Resumed {
        /// The saga instance whose queue was drained.
        saga_id: String,
        /// Commands dispatched.
        dispatched: usize,
    },
}

impl ProcessOutcome {
    /// Commands dispatched while producing this outcome.
    #[must_use]
    pub fn dispatched(&self) -> usize {
        match self {
            Self::Irrelevant => 0,
            Self::Handled { dispatched, .. } | Self::Resumed { dispatched, .. } => *dispatched,
        }
    }
}

/// Object-safe view of a saga processor, so the orchestrator can hold
/// processors of different saga types side by side.
#[async_trait]
pub trait SagaSubscriber: Send + Sync {
    /// The saga type name.
    fn saga_type(&self) -> &'static str;

    /// Returns `true` if the saga type correlates `event_type`.
    fn subscribes_to(&self, event_type: &str) -> bool;

    /// Offers `event` to the saga type.
    async fn process(&self, event: &StoredEvent) -> Result<ProcessOutcome, SagaError>;

    /// Ids of instances whose command queue was left non-empty by an
    /// interrupted drain.
    async fn stranded(&self) -> Result<Vec<String>, SagaError>;

    /// Drains the queued commands of one instance.
    async fn resume(&self, saga_id: &str) -> Result<ProcessOutcome, SagaError>;
}

/// Tunables of a saga processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SagaProcessorConfig {
    /// How many times a saga-store revision conflict is retried by reloading
    /// the instance and applying the event again.
    pub max_conflict_retries: u32,
    /// Upper bound on a single saga store call.
    pub store_timeout: Duration,
    /// Retries of a saga store call that failed or timed out.
    pub max_store_retries: u32,
    /// How many times the orchestrator redelivers an event whose processing
    /// failed with a retryable error.
    pub max_delivery_retries: u32,
    /// First backoff delay.
    pub min_backoff: Duration,
    /// Longest backoff delay.
    pub max_backoff: Duration,
}

impl Default for SagaProcessorConfig {
    fn default() -> Self {
        Self {
            max_conflict_retries: 3,
            store_timeout: Duration::from_secs(5),
            max_store_retries: 3,
            max_delivery_retries: 3,
            min_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_secs(2),
        }
    }
}

impl SagaProcessorConfig {
    /// Backoff between retries of a failed saga store call.
    #[must_use]
    pub fn store_backoff(&self) -> ExponentialBuilder {
        self.backoff(self.max_store_retries)
    }

    /// Backoff between redeliveries of an event that failed retryably.
    #[must_use]
    pub fn delivery_backoff(&self) -> ExponentialBuilder {
        self.backoff(self.max_delivery_retries)
    }

    fn backoff(&self, max_times: u32) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.min_backoff)
            .with_max_delay(self.max_backoff)
            .with_max_times(max_times as usize)
            .with_jitter()
    }
}

/// Drives instances of saga type `S`.
///
/// Work for one saga id is serialized; different ids run concurrently.
pub struct SagaProcessor<S: Saga> {
    runtime: Arc<SagaRuntime<S>>,
    store: Arc<dyn SagaStore>,
    dispatcher: Arc<dyn CommandDispatcher>,
    locks: KeyedLock<String>,
    config: SagaProcessorConfig,
}

impl<S: Saga> SagaProcessor<S> {
    /// Creates a processor.
    #[must_use]
    pub fn new(
        runtime: Arc<SagaRuntime<S>>,
        store: Arc<dyn SagaStore>,
        dispatcher: Arc<dyn CommandDispatcher>,
        config: SagaProcessorConfig,
    ) -> Self {
        Self {
            runtime,
            store,
            dispatcher,
            locks: KeyedLock::new(),
            config,
        }
    }

    /// Routes `event` to its saga instance and runs one full pass:
    ///
    /// 1. resolve the saga id (irrelevant events stop here),
    /// 2. load or create the instance,
    /// 3. dispatch commands left over from an interrupted pass,
    /// 4. apply the event,
    /// 5. save state together with the staged commands,
    /// 6. dispatch the staged commands in order and save the drained queue.
    ///
    /// # Errors
    ///
    /// - correlation and reaction errors from the runtime,
    /// - `SagaError::Store` when loading or saving fails, or revision
    ///   conflicts outlast the retry limit,
    /// - `SagaError::Dispatch` when a command fails; commands not yet
    ///   dispatched stay persisted in the queue.
    #[instrument(skip(self, event), fields(saga_type = S::SAGA_TYPE, event_type = %event.event_type))]
    pub async fn handle_event(&self, event: &StoredEvent) -> Result<ProcessOutcome, SagaError> {
        let saga_id = match self.runtime.resolve(event) {
            Ok(saga_id) => saga_id,
            Err(SagaError::NotRegistered { .. }) => return Ok(ProcessOutcome::Irrelevant),
            Err(err) => return Err(err),
        };

        let _guard = self.locks.lock(saga_id.clone()).await;

        let mut attempt = 0;
        loop {
            match self.run_pass(&saga_id, event).await {
                Err(SagaError::Store(DomainError::ConcurrencyConflict { .. }))
                    if attempt < self.config.max_conflict_retries =>
                {
                    attempt += 1;
                    warn!(%saga_id, attempt, "saga revision conflict, reloading");
                }
                result => return result,
            }
        }
    }

    async fn run_pass(
        &self,
        saga_id: &str,
        event: &StoredEvent,
    ) -> Result<ProcessOutcome, SagaError> {
        let mut saga = self.load(saga_id).await?;
        let mut dispatched = self.drain(&mut saga).await?;

        let outcome = self.runtime.apply(&mut saga, event)?;
        if outcome.is_mutation() {
            self.save(&mut saga).await?;
            dispatched += self.drain(&mut saga).await?;
            if saga.is_completed() {
                info!(saga_id, version = saga.version(), "saga completed");
            }
        }

        debug!(saga_id, ?outcome, dispatched, "event processed");
        Ok(ProcessOutcome::Handled {
            saga_id: saga_id.to_owned(),
            outcome,
            dispatched,
        })
    }

    /// Drains the command queue of `saga_id` without applying an event.
    ///
    /// Used to finish drains that failed after the staged commands were
    /// persisted, once the failing dependency has recovered.
    ///
    /// # Errors
    ///
    /// Returns `SagaError::Store` if loading or saving fails and
    /// `SagaError::Dispatch` if a command fails again.
    #[instrument(skip(self), fields(saga_type = S::SAGA_TYPE))]
    pub async fn redrain(&self, saga_id: &str) -> Result<usize, SagaError> {
        let _guard = self.locks.lock(saga_id.to_owned()).await;
        let mut saga = self.load(saga_id).await?;
        let dispatched = self.drain(&mut saga).await?;
        if dispatched > 0 {
            info!(saga_id, dispatched, "stranded commands dispatched");
        }
        Ok(dispatched)
    }

    /// Ids of instances of this saga type with queued commands.
    ///
    /// # Errors
    ///
    /// Returns `SagaError::Store` if the store keeps failing.
    pub async fn stranded(&self) -> Result<Vec<String>, SagaError> {
        let ids = self
            .store_call("queued", S::SAGA_TYPE, || self.store.queued(S::SAGA_TYPE))
            .await?;
        Ok(ids)
    }

    /// Loads an instance, or creates a fresh one.
    ///
    /// # Errors
    ///
    /// Returns `SagaError::Store` if the store keeps failing or timing out,
    /// or the snapshot does not decode.
    pub async fn load(&self, saga_id: &str) -> Result<SagaInstance<S>, SagaError> {
        let snapshot = self
            .store_call("load", saga_id, || self.store.load(S::SAGA_TYPE, saga_id))
            .await?;
        match snapshot {
            Some(snapshot) => SagaInstance::from_snapshot(snapshot),
            None => Ok(SagaInstance::new(saga_id)),
        }
    }

    async fn save(&self, saga: &mut SagaInstance<S>) -> Result<(), SagaError> {
        let snapshot = saga.to_snapshot()?;
        let expected = saga.revision();
        let revision = self
            .store_call("save", &snapshot.saga_id, || self.store.save(&snapshot, expected))
            .await?;
        saga.set_revision(revision);
        Ok(())
    }

    /// Runs one saga store call under the store timeout, retrying transient
    /// failures with backoff. Revision conflicts are returned as they are.
    async fn store_call<T, F, Fut>(
        &self,
        operation: &'static str,
        key: &str,
        call: F,
    ) -> Result<T, DomainError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, DomainError>>,
    {
        (|| async {
            tokio::time::timeout(self.config.store_timeout, call())
                .await
                .map_err(|_| {
                    DomainError::Infrastructure(format!(
                        "saga store {operation} for {key} timed out after {:?}",
                        self.config.store_timeout
                    ))
                })?
        })
        .retry(self.config.store_backoff())
        .when(DomainError::is_transient)
        .notify(|err, delay| warn!(key, operation, error = %err, ?delay, "saga store call failed, retrying"))
        .await
    }

    /// Dispatches the staged commands in enqueue order.
    ///
    /// Each success is acknowledged; on the first failure the remainder is
    /// persisted and the error returned.
    async fn drain(&self, saga: &mut SagaInstance<S>) -> Result<usize, SagaError> {
        if saga.uncommitted_commands().is_empty() {
            return Ok(0);
        }

        let commands = saga.uncommitted_commands().to_vec();
        for (sent, command) in commands.iter().enumerate() {
            if let Err(source) = self.dispatcher.dispatch(command).await {
                warn!(
                    saga_id = saga.id(),
                    command_type = %command.command_type,
                    error = %source,
                    "command dispatch failed, keeping remaining commands queued"
                );
                saga.acknowledge_commands(sent);
                self.save(saga).await?;
                return Err(SagaError::Dispatch {
                    saga_id: saga.id().to_owned(),
                    command_type: command.command_type.clone(),
                    source,
                });
            }
            debug!(
                saga_id = saga.id(),
                command_type = %command.command_type,
                aggregate_id = %command.aggregate_id,
                "command dispatched"
            );
        }

        saga.clear_uncommitted_commands();
        self.save(saga).await?;
        Ok(commands.len())
    }
}

#[async_trait]
impl<S: Saga> SagaSubscriber for SagaProcessor<S> {
    fn saga_type(&self) -> &'static str {
        S::SAGA_TYPE
    }

    fn subscribes_to(&self, event_type: &str) -> bool {
        self.runtime.registry().is_registered(event_type)
    }

    async fn process(&self, event: &StoredEvent) -> Result<ProcessOutcome, SagaError> {
        self.handle_event(event).await
    }

    async fn stranded(&self) -> Result<Vec<String>, SagaError> {
        SagaProcessor::stranded(self).await
    }

    async fn resume(&self, saga_id: &str) -> Result<ProcessOutcome, SagaError> {
        let dispatched = self.redrain(saga_id).await?;
        Ok(ProcessOutcome::Resumed {
            saga_id: saga_id.to_owned(),
            dispatched,
        })
    }
}
