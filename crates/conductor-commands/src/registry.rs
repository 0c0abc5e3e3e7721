//! Command handler registry: load, decide, append, with idempotency and
//! retry policy around it.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use backon::{BackoffBuilder, Retryable};
use conductor_core::aggregate::AggregateRoot;
use conductor_core::clock::{Clock, SystemClock};
use conductor_core::command::{Command, CommandDispatcher, CommandEnvelope, CommandOutcome};
use conductor_core::error::{CommandError, ConfigurationError, DomainError};
use conductor_core::keyed_lock::KeyedLock;
use conductor_core::repository::{EventRepository, StoredEvent, StreamId};
use tracing::{debug, info, instrument, warn};

use crate::config::DispatchConfig;
use crate::handler::{CommandOptions, ErasedHandler, TypedHandler};

/// Builder for a `CommandHandlerRegistry`.
pub struct CommandHandlerRegistryBuilder {
    handlers: HashMap<&'static str, Box<dyn ErasedHandler>>,
    clock: Arc<dyn Clock>,
    config: DispatchConfig,
}

impl CommandHandlerRegistryBuilder {
    /// Registers the handler for command type `C`, executed against
    /// aggregate `A`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::DuplicateHandler` if `C` already has a
    /// handler.
    pub fn register<C, A, F>(
        mut self,
        options: CommandOptions,
        handler: F,
    ) -> Result<Self, ConfigurationError>
    where
        C: Command,
        A: AggregateRoot + 'static,
        F: Fn(&mut A, &C, &dyn Clock) -> Result<(), DomainError> + Send + Sync + 'static,
    {
        if self.handlers.contains_key(C::COMMAND_TYPE) {
            return Err(ConfigurationError::DuplicateHandler(C::COMMAND_TYPE));
        }
        self.handlers.insert(
            C::COMMAND_TYPE,
            Box::new(TypedHandler::<C, A, F>::new(options, handler)),
        );
        Ok(self)
    }

    /// Sets the clock used for event metadata.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets timeouts and retry limits.
    #[must_use]
    pub fn config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    /// Finishes the registry on top of `repository`.
    #[must_use]
    pub fn build(self, repository: Arc<dyn EventRepository>) -> CommandHandlerRegistry {
        CommandHandlerRegistry {
            handlers: self.handlers,
            repository,
            clock: self.clock,
            config: self.config,
            locks: KeyedLock::new(),
        }
    }
}

/// Maps each command type to exactly one handler and applies it to the
/// target aggregate's event stream.
///
/// Commands for the same stream run one at a time; different streams run
/// concurrently.
pub struct CommandHandlerRegistry {
    handlers: HashMap<&'static str, Box<dyn ErasedHandler>>,
    repository: Arc<dyn EventRepository>,
    clock: Arc<dyn Clock>,
    config: DispatchConfig,
    locks: KeyedLock<StreamId>,
}

impl CommandHandlerRegistry {
    /// Starts building a registry.
    #[must_use]
    pub fn builder() -> CommandHandlerRegistryBuilder {
        CommandHandlerRegistryBuilder {
            handlers: HashMap::new(),
            clock: Arc::new(SystemClock),
            config: DispatchConfig::default(),
        }
    }

    /// Returns `true` if a handler is registered for `command_type`.
    #[must_use]
    pub fn handles(&self, command_type: &str) -> bool {
        self.handlers.contains_key(command_type)
    }

    /// Handles a typed command.
    ///
    /// # Errors
    ///
    /// See `handle`.
    pub async fn execute<C: Command>(
        &self,
        command: &C,
        correlation_id: uuid::Uuid,
    ) -> Result<CommandOutcome, CommandError> {
        self.handle(&CommandEnvelope::new(command, correlation_id))
            .await
    }

    /// Handles one command end to end:
    ///
    /// 1. resolve the handler by command type,
    /// 2. load the target stream,
    /// 3. for idempotent commands, return the events a previous delivery
    ///    produced, if any,
    /// 4. rebuild the aggregate and run the handler,
    /// 5. append the new events at the loaded version.
    ///
    /// A concurrency conflict on append restarts from step 2.
    ///
    /// # Errors
    ///
    /// - `NoHandlerRegistered` if no handler owns the command type,
    /// - `Malformed` if the payload does not decode,
    /// - `AggregateNotFound` for `requires_existing` commands on an empty
    ///   stream,
    /// - `HandlerFailed` if the aggregate rejects the command,
    /// - `ConcurrencyExhausted` when conflicts outlast `max_conflict_retries`,
    /// - `StoreUnavailable` when the store keeps failing or timing out.
    #[instrument(skip(self, envelope), fields(command_type = %envelope.command_type, aggregate_id = %envelope.aggregate_id))]
    pub async fn handle(&self, envelope: &CommandEnvelope) -> Result<CommandOutcome, CommandError> {
        let handler = self
            .handlers
            .get(envelope.command_type.as_str())
            .ok_or_else(|| CommandError::NoHandlerRegistered(envelope.command_type.clone()))?;
        let options = handler.options();
        let stream = StreamId::new(handler.aggregate_type(), envelope.aggregate_id.clone());
        let fingerprint = envelope.fingerprint();

        let _guard = self.locks.lock(stream.clone()).await;

        let mut delays = self.config.conflict_backoff().build();
        let mut attempts = 0;
        loop {
            attempts += 1;
            let history = self.load(&stream).await?;

            if options.idempotent {
                let prior = prior_events(&history, &fingerprint);
                if !prior.is_empty() {
                    info!(%stream, events = prior.len(), "idempotent command already applied, returning prior outcome");
                    return Ok(CommandOutcome {
                        stream,
                        events: prior,
                        replayed: true,
                    });
                }
            }

            if options.requires_existing && history.is_empty() {
                return Err(CommandError::AggregateNotFound(stream));
            }

            let execution = handler.execute(envelope, &history, self.clock.as_ref())?;
            if execution.events.is_empty() {
                debug!(%stream, "command produced no events");
                return Ok(CommandOutcome {
                    stream,
                    events: Vec::new(),
                    replayed: false,
                });
            }

            match self
                .append(&stream, execution.expected_version, &execution.events)
                .await
            {
                Ok(()) => {
                    debug!(%stream, events = execution.events.len(), "events appended");
                    return Ok(CommandOutcome {
                        stream,
                        events: execution.events,
                        replayed: false,
                    });
                }
                Err(AppendFailure::Conflict(conflict)) => match delays.next() {
                    Some(delay) => {
                        warn!(%stream, attempts, error = %conflict, "concurrency conflict, reloading");
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        return Err(CommandError::ConcurrencyExhausted {
                            command_type: envelope.command_type.clone(),
                            stream,
                            attempts,
                        });
                    }
                },
                Err(AppendFailure::Unavailable(err)) => return Err(err),
            }
        }
    }

    async fn load(&self, stream: &StreamId) -> Result<Vec<StoredEvent>, CommandError> {
        let calls = AtomicU32::new(0);
        (|| async {
            calls.fetch_add(1, Ordering::Relaxed);
            tokio::time::timeout(self.config.store_timeout, self.repository.load_events(stream))
                .await
                .map_err(|_| timed_out("load_events", stream))?
        })
        .retry(self.config.store_backoff())
        .when(DomainError::is_transient)
        .notify(|err, delay| warn!(%stream, error = %err, ?delay, "event store load failed, retrying"))
        .await
        .map_err(|source| unavailable(&calls, source))
    }

    async fn append(
        &self,
        stream: &StreamId,
        expected_version: i64,
        events: &[StoredEvent],
    ) -> Result<(), AppendFailure> {
        let calls = AtomicU32::new(0);
        (|| async {
            calls.fetch_add(1, Ordering::Relaxed);
            tokio::time::timeout(
                self.config.store_timeout,
                self.repository.append_events(stream, expected_version, events),
            )
            .await
            .map_err(|_| timed_out("append_events", stream))?
        })
        .retry(self.config.store_backoff())
        .when(DomainError::is_transient)
        .notify(|err, delay| warn!(%stream, error = %err, ?delay, "event store append failed, retrying"))
        .await
        .map_err(|source| match source {
            DomainError::ConcurrencyConflict { .. } => AppendFailure::Conflict(source),
            source => AppendFailure::Unavailable(unavailable(&calls, source)),
        })
    }
}

#[async_trait]
impl CommandDispatcher for CommandHandlerRegistry {
    async fn dispatch(&self, command: &CommandEnvelope) -> Result<CommandOutcome, CommandError> {
        self.handle(command).await
    }
}

impl std::fmt::Debug for CommandHandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut command_types: Vec<_> = self.handlers.keys().collect();
        command_types.sort();
        f.debug_struct("CommandHandlerRegistry")
            .field("command_types", &command_types)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

enum AppendFailure {
    Conflict(DomainError),
    Unavailable(CommandError),
}

/// Events a previous delivery of the same command appended, in order.
fn prior_events(history: &[StoredEvent], fingerprint: &str) -> Vec<StoredEvent> {
    history
        .iter()
        .filter(|event| event.command_fingerprint.as_deref() == Some(fingerprint))
        .cloned()
        .collect()
}

fn timed_out(operation: &str, stream: &StreamId) -> DomainError {
    DomainError::Infrastructure(format!("{operation} on {stream} timed out"))
}

fn unavailable(calls: &AtomicU32, source: DomainError) -> CommandError {
    match source {
        DomainError::AggregateNotFound(stream) => CommandError::AggregateNotFound(stream),
        source => CommandError::StoreUnavailable {
            attempts: calls.load(Ordering::Relaxed),
            source,
        },
    }
}
