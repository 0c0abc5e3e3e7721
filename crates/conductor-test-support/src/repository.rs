//! Test repositories — mock `EventRepository` implementations for tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use conductor_core::error::DomainError;
use conductor_core::repository::{EventRepository, StoredEvent, StreamId};

/// An event repository that records all `append_events` calls. Returns the
/// configured history from `load_events` for every stream and always
/// succeeds on `append_events`.
#[derive(Debug)]
pub struct RecordingEventRepository {
    load_result: Vec<StoredEvent>,
    loads: AtomicU32,
    appended: Mutex<Vec<(StreamId, i64, Vec<StoredEvent>)>>,
}

impl RecordingEventRepository {
    /// Create a new recording repository that will return `load_result` from
    /// every `load_events` call.
    #[must_use]
    pub fn new(load_result: Vec<StoredEvent>) -> Self {
        Self {
            load_result,
            loads: AtomicU32::new(0),
            appended: Mutex::new(Vec::new()),
        }
    }

    /// Returns a snapshot of all events that were appended.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn appended_events(&self) -> Vec<(StreamId, i64, Vec<StoredEvent>)> {
        self.appended.lock().unwrap().clone()
    }

    /// Returns how many times `load_events` was called.
    pub fn load_count(&self) -> u32 {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventRepository for RecordingEventRepository {
    async fn load_events(&self, _stream: &StreamId) -> Result<Vec<StoredEvent>, DomainError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(self.load_result.clone())
    }

    async fn append_events(
        &self,
        stream: &StreamId,
        expected_version: i64,
        events: &[StoredEvent],
    ) -> Result<(), DomainError> {
        self.appended
            .lock()
            .unwrap()
            .push((stream.clone(), expected_version, events.to_vec()));
        Ok(())
    }
}

/// An event repository that always returns an empty event list and silently
/// accepts appends. Useful for testing "aggregate not found" scenarios and
/// creation commands.
#[derive(Debug)]
pub struct EmptyEventRepository;

#[async_trait]
impl EventRepository for EmptyEventRepository {
    async fn load_events(&self, _stream: &StreamId) -> Result<Vec<StoredEvent>, DomainError> {
        Ok(vec![])
    }

    async fn append_events(
        &self,
        _stream: &StreamId,
        _expected_version: i64,
        _events: &[StoredEvent],
    ) -> Result<(), DomainError> {
        Ok(())
    }
}

/// An event repository that always returns an infrastructure error. Useful for
/// testing error-handling paths.
#[derive(Debug, Default)]
pub struct FailingEventRepository {
    calls: AtomicU32,
}

impl FailingEventRepository {
    /// Returns how many calls were attempted.
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventRepository for FailingEventRepository {
    async fn load_events(&self, _stream: &StreamId) -> Result<Vec<StoredEvent>, DomainError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(DomainError::Infrastructure("connection refused".into()))
    }

    async fn append_events(
        &self,
        _stream: &StreamId,
        _expected_version: i64,
        _events: &[StoredEvent],
    ) -> Result<(), DomainError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(DomainError::Infrastructure("connection refused".into()))
    }
}

/// An event repository whose `load_events` never completes. Useful for
/// testing timeouts.
#[derive(Debug)]
pub struct StalledEventRepository;

#[async_trait]
impl EventRepository for StalledEventRepository {
    async fn load_events(&self, _stream: &StreamId) -> Result<Vec<StoredEvent>, DomainError> {
        std::future::pending().await
    }

    async fn append_events(
        &self,
        _stream: &StreamId,
        _expected_version: i64,
        _events: &[StoredEvent],
    ) -> Result<(), DomainError> {
        std::future::pending().await
    }
}

/// A working in-memory repository that rejects the first `conflicts` appends
/// with a `ConcurrencyConflict`, as if another writer got there first.
#[derive(Debug)]
pub struct FlakyEventRepository {
    streams: Mutex<HashMap<StreamId, Vec<StoredEvent>>>,
    conflicts_remaining: AtomicU32,
    append_attempts: AtomicU32,
}

impl FlakyEventRepository {
    /// Create a repository that injects `conflicts` conflicts.
    #[must_use]
    pub fn new(conflicts: u32) -> Self {
        Self {
            streams: Mutex::new(HashMap::new()),
            conflicts_remaining: AtomicU32::new(conflicts),
            append_attempts: AtomicU32::new(0),
        }
    }

    /// Returns how many appends were attempted, conflicting ones included.
    pub fn append_attempts(&self) -> u32 {
        self.append_attempts.load(Ordering::SeqCst)
    }

    /// Returns the events stored for `stream`.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn events(&self, stream: &StreamId) -> Vec<StoredEvent> {
        self.streams
            .lock()
            .unwrap()
            .get(stream)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl EventRepository for FlakyEventRepository {
    async fn load_events(&self, stream: &StreamId) -> Result<Vec<StoredEvent>, DomainError> {
        Ok(self.events(stream))
    }

    async fn append_events(
        &self,
        stream: &StreamId,
        expected_version: i64,
        events: &[StoredEvent],
    ) -> Result<(), DomainError> {
        self.append_attempts.fetch_add(1, Ordering::SeqCst);
        let mut streams = self.streams.lock().unwrap();
        let existing = streams.entry(stream.clone()).or_default();
        #[allow(clippy::cast_possible_wrap)]
        let actual = existing.len() as i64;

        let injected = self
            .conflicts_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected || actual != expected_version {
            return Err(DomainError::ConcurrencyConflict {
                key: stream.to_string(),
                expected: expected_version,
                actual: if injected { actual + 1 } else { actual },
            });
        }
        existing.extend_from_slice(events);
        Ok(())
    }
}

/// A working in-memory repository that can be taken offline. While offline,
/// or for the next `fail_next` calls, every call fails with an
/// infrastructure error.
#[derive(Debug, Default)]
pub struct SwitchableEventRepository {
    streams: Mutex<HashMap<StreamId, Vec<StoredEvent>>>,
    offline: AtomicBool,
    failures_remaining: AtomicU32,
}

impl SwitchableEventRepository {
    /// Create an online, empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the repository offline or brings it back.
    pub fn set_available(&self, available: bool) {
        self.offline.store(!available, Ordering::SeqCst);
    }

    /// Fails the next `calls` calls, then recovers on its own.
    pub fn fail_next(&self, calls: u32) {
        self.failures_remaining.store(calls, Ordering::SeqCst);
    }

    /// Returns the events stored for `stream`.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn events(&self, stream: &StreamId) -> Vec<StoredEvent> {
        self.streams
            .lock()
            .unwrap()
            .get(stream)
            .cloned()
            .unwrap_or_default()
    }

    fn check_available(&self) -> Result<(), DomainError> {
        let injected = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected || self.offline.load(Ordering::SeqCst) {
            return Err(DomainError::Infrastructure("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl EventRepository for SwitchableEventRepository {
    async fn load_events(&self, stream: &StreamId) -> Result<Vec<StoredEvent>, DomainError> {
        self.check_available()?;
        Ok(self.events(stream))
    }

    async fn append_events(
        &self,
        stream: &StreamId,
        expected_version: i64,
        events: &[StoredEvent],
    ) -> Result<(), DomainError> {
        self.check_available()?;
        let mut streams = self.streams.lock().unwrap();
        let existing = streams.entry(stream.clone()).or_default();
        #[allow(clippy::cast_possible_wrap)]
        let actual = existing.len() as i64;
        if actual != expected_version {
            return Err(DomainError::ConcurrencyConflict {
                key: stream.to_string(),
                expected: expected_version,
                actual,
            });
        }
        existing.extend_from_slice(events);
        Ok(())
    }
}
