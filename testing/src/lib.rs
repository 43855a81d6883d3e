//! # Waitlist Testing
//!
//! Testing utilities for reducers and stores:
//! - [`FixedClock`] for deterministic time
//! - [`InMemoryEventStore`] for persistence without a database
//! - [`ReducerTest`] for Given-When-Then reducer tests
//!
//! ## Example
//!
//! ```ignore
//! use waitlist_testing::{InMemoryEventStore, test_clock};
//!
//! #[tokio::test]
//! async fn draw_persists_events() {
//!     let event_store = Arc::new(InMemoryEventStore::new());
//!     let env = EventEnvironment::new(Arc::new(test_clock()), event_store.clone(), ..);
//!     let store = Store::new(EventState::new(), EventReducer::new(), env);
//!
//!     store.send(EventAction::DrawEntrants { event_id, count: 2 }).await?.wait().await;
//!     assert_eq!(event_store.event_count(&StreamId::new("event-1")), 1);
//! }
//! ```

use chrono::{DateTime, Utc};
use waitlist_core::environment::Clock;


pub use reducer_test::{ReducerTest, assertions};

/// Mock implementations for testing.
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::collections::HashMap;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;
    use waitlist_core::event::SerializedEvent;
    use waitlist_core::event_store::{EventStore, EventStoreError};
    use waitlist_core::stream::{StreamId, Version};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use waitlist_testing::mocks::FixedClock;
    /// use waitlist_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    #[derive(Debug, Default)]
    struct Inner {
        streams: HashMap<StreamId, Vec<SerializedEvent>>,
        failures_remaining: usize,
    }

    /// In-memory event store with optimistic concurrency checks.
    ///
    /// `fail_next_appends` injects transient backend failures so retry and
    /// `PersistFailed` paths can be exercised.
    #[derive(Debug, Default)]
    pub struct InMemoryEventStore {
        inner: Mutex<Inner>,
    }

    impl InMemoryEventStore {
        /// Create an empty store
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Make the next `count` appends fail with a `DatabaseError`.
        pub fn fail_next_appends(&self, count: usize) {
            if let Ok(mut inner) = self.inner.lock() {
                inner.failures_remaining = count;
            }
        }

        /// Number of events stored in `stream_id`
        #[must_use]
        pub fn event_count(&self, stream_id: &StreamId) -> usize {
            self.inner
                .lock()
                .map(|inner| inner.streams.get(stream_id).map_or(0, Vec::len))
                .unwrap_or(0)
        }

        /// Event type names stored in `stream_id`, oldest first
        #[must_use]
        pub fn event_types(&self, stream_id: &StreamId) -> Vec<String> {
            self.inner
                .lock()
                .map(|inner| {
                    inner
                        .streams
                        .get(stream_id)
                        .map(|events| events.iter().map(|e| e.event_type.clone()).collect())
                        .unwrap_or_default()
                })
                .unwrap_or_default()
        }

        fn append(
            &self,
            stream_id: StreamId,
            expected_version: Option<Version>,
            events: Vec<SerializedEvent>,
        ) -> Result<Version, EventStoreError> {
            let mut inner = self
                .inner
                .lock()
                .map_err(|_| EventStoreError::DatabaseError("store lock poisoned".to_string()))?;

            if inner.failures_remaining > 0 {
                inner.failures_remaining -= 1;
                return Err(EventStoreError::DatabaseError(
                    "injected failure".to_string(),
                ));
            }

            let stream = inner.streams.entry(stream_id.clone()).or_default();
            let current = Version::new(stream.len() as u64);

            match expected_version {
                Some(expected) if expected != current => {
                    return Err(EventStoreError::ConcurrencyConflict {
                        stream_id,
                        expected,
                        actual: current,
                    });
                },
                _ => {},
            }

            stream.extend(events);
            Ok(Version::new(stream.len() as u64))
        }

        fn load(
            &self,
            stream_id: &StreamId,
            from_version: Option<Version>,
        ) -> Result<Vec<SerializedEvent>, EventStoreError> {
            let inner = self
                .inner
                .lock()
                .map_err(|_| EventStoreError::DatabaseError("store lock poisoned".to_string()))?;

            let skip = from_version
                .map_or(0, |v| usize::try_from(v.value()).unwrap_or(usize::MAX));

            Ok(inner
                .streams
                .get(stream_id)
                .map(|events| events.iter().skip(skip).cloned().collect())
                .unwrap_or_default())
        }
    }

    impl EventStore for InMemoryEventStore {
        fn append_events(
            &self,
            stream_id: StreamId,
            expected_version: Option<Version>,
            events: Vec<SerializedEvent>,
        ) -> Pin<Box<dyn Future<Output = Result<Version, EventStoreError>> + Send + '_>> {
            let result = self.append(stream_id, expected_version, events);
            Box::pin(async move { result })
        }

        fn load_events(
            &self,
            stream_id: StreamId,
            from_version: Option<Version>,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<SerializedEvent>, EventStoreError>> + Send + '_>>
        {
            let result = self.load(&stream_id, from_version);
            Box::pin(async move { result })
        }
    }
}

// Re-export commonly used items
pub use mocks::{FixedClock, InMemoryEventStore, test_clock};
