//! Saga orchestrator: fans an event out to every subscribed saga type.

use std::sync::Arc;

use backon::{ExponentialBuilder, Retryable};
use conductor_core::error::ConfigurationError;
use conductor_core::logger::Logger;
use conductor_core::repository::StoredEvent;
use tracing::{debug, error, warn};

use crate::error::SagaError;
use crate::handler::HandleOutcome;
use crate::processor::{ProcessOutcome, SagaSubscriber};

/// Outcome of delivering one event to one saga type.
#[derive(Debug)]
pub struct SagaDelivery {
    /// The saga type the event was offered to.
    pub saga_type: &'static str,
    /// What happened.
    pub result: Result<ProcessOutcome, SagaError>,
}

/// Outcome of publishing one event to every saga type.
#[derive(Debug, Default)]
pub struct PublishReport {
    /// One entry per subscribed saga type, in subscription order.
    pub deliveries: Vec<SagaDelivery>,
}

impl PublishReport {
    /// Returns the deliveries that failed with something other than a
    /// correlation error.
    pub fn failures(&self) -> impl Iterator<Item = &SagaDelivery> {
        self.deliveries.iter().filter(|delivery| {
            delivery
                .result
                .as_ref()
                .is_err_and(|err| !err.is_correlation_error())
        })
    }

    /// Returns `true` if no delivery failed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }

    /// Total number of commands dispatched across all saga types.
    #[must_use]
    pub fn dispatched(&self) -> usize {
        self.deliveries
            .iter()
            .filter_map(|delivery| delivery.result.as_ref().ok())
            .map(ProcessOutcome::dispatched)
            .sum()
    }
}

/// Builder for a `SagaOrchestrator`.
#[derive(Default)]
pub struct SagaOrchestratorBuilder {
    subscribers: Vec<Arc<dyn SagaSubscriber>>,
    logger: Option<Arc<dyn Logger>>,
    delivery_backoff: Option<ExponentialBuilder>,
}

impl SagaOrchestratorBuilder {
    /// Adds a saga type.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::DuplicateSaga` if the saga type is
    /// already subscribed.
    pub fn subscribe(
        mut self,
        subscriber: Arc<dyn SagaSubscriber>,
    ) -> Result<Self, ConfigurationError> {
        let saga_type = subscriber.saga_type();
        if self
            .subscribers
            .iter()
            .any(|existing| existing.saga_type() == saga_type)
        {
            return Err(ConfigurationError::DuplicateSaga(saga_type));
        }
        self.subscribers.push(subscriber);
        Ok(self)
    }

    /// Sets the diagnostic logger.
    #[must_use]
    pub fn logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Redelivers events whose processing failed with a retryable error,
    /// waiting between attempts as `backoff` dictates.
    #[must_use]
    pub fn delivery_backoff(mut self, backoff: ExponentialBuilder) -> Self {
        self.delivery_backoff = Some(backoff);
        self
    }

    /// Finishes the orchestrator.
    #[must_use]
    pub fn build(self) -> SagaOrchestrator {
        SagaOrchestrator {
            subscribers: self.subscribers,
            logger: self.logger,
            delivery_backoff: self.delivery_backoff,
        }
    }
}

/// Entry point of the saga side: every committed domain event is published
/// here.
pub struct SagaOrchestrator {
    subscribers: Vec<Arc<dyn SagaSubscriber>>,
    logger: Option<Arc<dyn Logger>>,
    delivery_backoff: Option<ExponentialBuilder>,
}

impl SagaOrchestrator {
    /// Starts building an orchestrator.
    #[must_use]
    pub fn builder() -> SagaOrchestratorBuilder {
        SagaOrchestratorBuilder::default()
    }

    /// Returns the subscribed saga type names.
    pub fn saga_types(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.subscribers.iter().map(|subscriber| subscriber.saga_type())
    }

    /// Offers `event` to every saga type that correlates its event type.
    ///
    /// Failures of one saga type do not stop delivery to the others.
    /// Correlation errors are logged and skipped. Retryable failures are
    /// redelivered under the delivery backoff; what still fails is returned
    /// in the report.
    pub async fn publish(&self, event: &StoredEvent) -> PublishReport {
        let mut report = PublishReport::default();
        for subscriber in &self.subscribers {
            if !subscriber.subscribes_to(&event.event_type) {
                continue;
            }
            let saga_type = subscriber.saga_type();
            let result = self.deliver(subscriber.as_ref(), event).await;
            match &result {
                Ok(ProcessOutcome::Handled {
                    saga_id,
                    outcome,
                    dispatched,
                }) => {
                    self.log_line(&format!(
                        "{saga_type} {saga_id} <- {} v{}: {}",
                        event.event_type,
                        event.sequence_number,
                        describe(*outcome, *dispatched)
                    ));
                }
                Ok(ProcessOutcome::Irrelevant | ProcessOutcome::Resumed { .. }) => {
                    debug!(saga_type, event_type = %event.event_type, "event irrelevant to saga");
                }
                Err(err) if err.is_correlation_error() => {
                    warn!(saga_type, event_type = %event.event_type, error = %err, "skipping uncorrelated event");
                }
                Err(err) => {
                    error!(
                        saga_type,
                        event_type = %event.event_type,
                        event_id = %event.event_id,
                        retryable = err.is_retryable(),
                        error = %err,
                        "saga processing failed"
                    );
                }
            }
            report.deliveries.push(SagaDelivery { saga_type, result });
        }
        report
    }

    /// Drains the command queues that interrupted drains left behind, for
    /// every saga type.
    ///
    /// Run it at startup and after a dependency recovers; a queue only
    /// drains on its own when a new event reaches the same saga.
    pub async fn resume(&self) -> PublishReport {
        let mut report = PublishReport::default();
        for subscriber in &self.subscribers {
            let saga_type = subscriber.saga_type();
            let saga_ids = match subscriber.stranded().await {
                Ok(saga_ids) => saga_ids,
                Err(err) => {
                    error!(saga_type, error = %err, "listing stranded sagas failed");
                    report.deliveries.push(SagaDelivery {
                        saga_type,
                        result: Err(err),
                    });
                    continue;
                }
            };
            for saga_id in saga_ids {
                let result = subscriber.resume(&saga_id).await;
                match &result {
                    Ok(outcome) => self.log_line(&format!(
                        "{saga_type} {saga_id} resumed: {} dispatched",
                        outcome.dispatched()
                    )),
                    Err(err) => {
                        error!(saga_type, %saga_id, error = %err, "resuming saga failed");
                    }
                }
                report.deliveries.push(SagaDelivery { saga_type, result });
            }
        }
        report
    }

    async fn deliver(
        &self,
        subscriber: &dyn SagaSubscriber,
        event: &StoredEvent,
    ) -> Result<ProcessOutcome, SagaError> {
        let Some(backoff) = self.delivery_backoff else {
            return subscriber.process(event).await;
        };
        (|| subscriber.process(event))
            .retry(backoff)
            .when(SagaError::is_retryable)
            .notify(|err, delay| {
                warn!(
                    saga_type = subscriber.saga_type(),
                    event_type = %event.event_type,
                    error = %err,
                    ?delay,
                    "saga delivery failed, redelivering"
                );
            })
            .await
    }

    fn log_line(&self, line: &str) {
        if let Some(logger) = &self.logger {
            logger.write_line(line);
        }
    }
}

fn describe(outcome: HandleOutcome, dispatched: usize) -> String {
    match outcome {
        HandleOutcome::Applied { commands } => {
            format!("applied, {commands} staged, {dispatched} dispatched")
        }
        HandleOutcome::Ignored => "ignored".to_owned(),
        HandleOutcome::Duplicate if dispatched > 0 => {
            format!("duplicate, {dispatched} queued dispatched")
        }
        HandleOutcome::Duplicate => "duplicate".to_owned(),
        HandleOutcome::IgnoredCompleted => "saga already completed".to_owned(),
    }
}
