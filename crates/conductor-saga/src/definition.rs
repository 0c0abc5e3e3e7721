//! Saga definitions: one place to declare correlation and reactions, validated
//! before any event is processed.

use conductor_core::error::{ConfigurationError, DomainError};
use conductor_core::event::EventPayload;
use conductor_core::repository::StoredEvent;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::SagaError;
use crate::handler::{HandleOutcome, SagaEventHandler};
use crate::instance::{SagaContext, SagaInstance};
use crate::registry::SagaRegistry;

/// A process manager type.
///
/// The implementing type is the saga's state. It must be cheap to clone and
/// must derive everything it knows from the events applied to it.
pub trait Saga:
    Default + Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + std::fmt::Debug + 'static
{
    /// Stable saga type name, used as the saga store key prefix.
    const SAGA_TYPE: &'static str;

    /// Declares the events this saga correlates and how it reacts to them.
    fn define(definition: &mut SagaDefinition<Self>);
}

/// Builder collecting the correlation extractors and reactions of a saga.
///
/// Registration errors are collected and reported by `build`, so `define`
/// implementations can chain calls without handling results.
pub struct SagaDefinition<S> {
    registry: SagaRegistry<S>,
    handler: SagaEventHandler<S>,
    errors: Vec<ConfigurationError>,
}

impl<S: Saga> SagaDefinition<S> {
    /// Creates an empty definition.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: SagaRegistry::new(),
            handler: SagaEventHandler::new(),
            errors: Vec::new(),
        }
    }

    /// Registers how to find the saga id in events of type `E`.
    pub fn correlate<E, X>(&mut self, extractor: X) -> &mut Self
    where
        E: EventPayload,
        X: Fn(&E) -> String + Send + Sync + 'static,
    {
        if let Err(err) = self.registry.register::<E, X>(extractor) {
            self.errors.push(err);
        }
        self
    }

    /// Declares the reaction to events of type `E`.
    pub fn react<E, F>(&mut self, reaction: F) -> &mut Self
    where
        E: EventPayload,
        F: Fn(&mut SagaContext<'_, S>, &E) -> Result<(), DomainError> + Send + Sync + 'static,
    {
        if let Err(err) = self.handler.react::<E, F>(reaction) {
            self.errors.push(err);
        }
        self
    }

    /// Declares that events of type `E` need no reaction.
    pub fn ignore<E: EventPayload>(&mut self) -> &mut Self {
        if let Err(err) = self.handler.ignore::<E>() {
            self.errors.push(err);
        }
        self
    }

    /// Correlates and reacts to events of type `E`.
    pub fn on<E, X, F>(&mut self, extractor: X, reaction: F) -> &mut Self
    where
        E: EventPayload,
        X: Fn(&E) -> String + Send + Sync + 'static,
        F: Fn(&mut SagaContext<'_, S>, &E) -> Result<(), DomainError> + Send + Sync + 'static,
    {
        self.correlate::<E, X>(extractor).react::<E, F>(reaction)
    }

    /// Correlates events of type `E` for identity only.
    pub fn observe<E, X>(&mut self, extractor: X) -> &mut Self
    where
        E: EventPayload,
        X: Fn(&E) -> String + Send + Sync + 'static,
    {
        self.correlate::<E, X>(extractor).ignore::<E>()
    }

    /// Validates the definition.
    ///
    /// # Errors
    ///
    /// Returns the first registration error, or
    /// `ConfigurationError::MissingReaction` /
    /// `ConfigurationError::MissingCorrelation` when the extractor and
    /// reaction tables disagree.
    pub fn build(self) -> Result<SagaRuntime<S>, ConfigurationError> {
        if let Some(err) = self.errors.into_iter().next() {
            return Err(err);
        }

        let mut correlated: Vec<_> = self.registry.event_types().collect();
        correlated.sort_unstable();
        if let Some(event_type) = correlated
            .into_iter()
            .find(|event_type| !self.handler.declares(event_type))
        {
            return Err(ConfigurationError::MissingReaction {
                saga_type: S::SAGA_TYPE,
                event_type,
            });
        }

        let mut declared: Vec<_> = self.handler.event_types().collect();
        declared.sort_unstable();
        if let Some(event_type) = declared
            .into_iter()
            .find(|event_type| !self.registry.is_registered(event_type))
        {
            return Err(ConfigurationError::MissingCorrelation {
                saga_type: S::SAGA_TYPE,
                event_type,
            });
        }

        Ok(SagaRuntime {
            registry: self.registry,
            handler: self.handler,
        })
    }
}

impl<S: Saga> Default for SagaDefinition<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// Validated registry and reaction table of one saga type.
#[derive(Debug)]
pub struct SagaRuntime<S> {
    registry: SagaRegistry<S>,
    handler: SagaEventHandler<S>,
}

impl<S: Saga> SagaRuntime<S> {
    /// Builds the runtime from `S::define`.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigurationError` if the definition is inconsistent.
    pub fn build() -> Result<Self, ConfigurationError> {
        let mut definition = SagaDefinition::new();
        S::define(&mut definition);
        definition.build()
    }

    /// Returns the correlation registry.
    #[must_use]
    pub fn registry(&self) -> &SagaRegistry<S> {
        &self.registry
    }

    /// Returns the reaction table.
    #[must_use]
    pub fn handler(&self) -> &SagaEventHandler<S> {
        &self.handler
    }

    /// Resolves the saga id for `event`.
    ///
    /// # Errors
    ///
    /// See `SagaRegistry::resolve`.
    pub fn resolve(&self, event: &StoredEvent) -> Result<String, SagaError> {
        self.registry.resolve(event)
    }

    /// Applies `event` to `saga`.
    ///
    /// # Errors
    ///
    /// See `SagaEventHandler::handle`.
    pub fn apply(
        &self,
        saga: &mut SagaInstance<S>,
        event: &StoredEvent,
    ) -> Result<HandleOutcome, SagaError> {
        self.handler.handle(saga, event)
    }

    /// Folds `events` into a fresh instance without touching any store.
    ///
    /// Events that do not correlate to `saga_id` are skipped, as the
    /// orchestrator would route them elsewhere.
    ///
    /// # Errors
    ///
    /// Propagates the first correlation or reaction error other than
    /// `NotRegistered`.
    pub fn replay<'e>(
        &self,
        saga_id: &str,
        events: impl IntoIterator<Item = &'e StoredEvent>,
    ) -> Result<SagaInstance<S>, SagaError> {
        let mut saga = SagaInstance::new(saga_id);
        for event in events {
            match self.registry.resolve(event) {
                Ok(id) if id == saga_id => {
                    self.handler.handle(&mut saga, event)?;
                }
                Ok(_) | Err(SagaError::NotRegistered { .. }) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(saga)
    }
}
