//! Shared test mocks and utilities for the Conductor runtime.

mod clock;
mod dispatcher;
mod events;
mod logger;
mod repository;
mod saga_store;

pub use clock::{FixedClock, fixed_now};
pub use dispatcher::RecordingDispatcher;
pub use events::stored_event;
pub use logger::RecordingLogger;
pub use repository::{
    EmptyEventRepository, FailingEventRepository, FlakyEventRepository, RecordingEventRepository,
    StalledEventRepository, SwitchableEventRepository,
};
pub use saga_store::{FailingSagaStore, RecordingSagaStore, StalledSagaStore};
