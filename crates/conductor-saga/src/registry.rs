//! Saga registry: which saga instance does an event belong to.

use std::collections::HashMap;
use std::marker::PhantomData;

use conductor_core::error::ConfigurationError;
use conductor_core::event::EventPayload;
use conductor_core::repository::StoredEvent;

use crate::definition::Saga;
use crate::error::SagaError;

type Extractor = Box<dyn Fn(&StoredEvent) -> Result<String, SagaError> + Send + Sync>;

/// Correlation extractors of one saga type, keyed by event type.
///
/// Built once at startup and read-only afterwards, so it can be shared
/// between tasks without locking.
pub struct SagaRegistry<S> {
    extractors: HashMap<&'static str, Extractor>,
    _saga: PhantomData<fn() -> S>,
}

impl<S: Saga> SagaRegistry<S> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            extractors: HashMap::new(),
            _saga: PhantomData,
        }
    }

    /// Registers the correlation extractor for event type `E`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::DuplicateCorrelation` if `E` already has
    /// an extractor.
    pub fn register<E, F>(&mut self, extractor: F) -> Result<(), ConfigurationError>
    where
        E: EventPayload,
        F: Fn(&E) -> String + Send + Sync + 'static,
    {
        if self.extractors.contains_key(E::EVENT_TYPE) {
            return Err(ConfigurationError::DuplicateCorrelation {
                saga_type: S::SAGA_TYPE,
                event_type: E::EVENT_TYPE,
            });
        }
        let erased: Extractor = Box::new(move |stored: &StoredEvent| {
            let event = stored.decode::<E>().map_err(|source| SagaError::MalformedEvent {
                saga_type: S::SAGA_TYPE,
                event_type: stored.event_type.clone(),
                source,
            })?;
            Ok(extractor(&event))
        });
        self.extractors.insert(E::EVENT_TYPE, erased);
        Ok(())
    }

    /// Resolves the correlation id of `event`.
    ///
    /// # Errors
    ///
    /// - `SagaError::NotRegistered` if this saga type does not care about
    ///   the event type. Callers treat this as "irrelevant", not as a failure.
    /// - `SagaError::MalformedEvent` if the payload does not decode.
    /// - `SagaError::EmptyCorrelationId` if the extractor yields a blank id.
    pub fn resolve(&self, event: &StoredEvent) -> Result<String, SagaError> {
        let extractor =
            self.extractors
                .get(event.event_type.as_str())
                .ok_or_else(|| SagaError::NotRegistered {
                    saga_type: S::SAGA_TYPE,
                    event_type: event.event_type.clone(),
                })?;
        let saga_id = extractor(event)?;
        if saga_id.trim().is_empty() {
            return Err(SagaError::EmptyCorrelationId {
                saga_type: S::SAGA_TYPE,
                event_type: event.event_type.clone(),
            });
        }
        Ok(saga_id)
    }

    /// Returns `true` if `event_type` has an extractor.
    #[must_use]
    pub fn is_registered(&self, event_type: &str) -> bool {
        self.extractors.contains_key(event_type)
    }

    /// Returns the registered event types.
    pub fn event_types(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.extractors.keys().copied()
    }
}

impl<S: Saga> Default for SagaRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> std::fmt::Debug for SagaRegistry<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut event_types: Vec<_> = self.extractors.keys().collect();
        event_types.sort();
        f.debug_struct("SagaRegistry")
            .field("event_types", &event_types)
            .finish()
    }
}
