//! Event store abstraction with optimistic concurrency.
//!
//! Every event aggregate persists its decisions into one append-only stream.
//! The store only needs two operations: append (guarded by an expected
//! version) and load (for replay).
//!
//! `InMemoryEventStore` in `waitlist-testing` is the reference implementation.
//!
//! # Example
//!
//! ```no_run
//! use waitlist_core::event_store::{EventStore, EventStoreError};
//! use waitlist_core::stream::{StreamId, Version};
//!
//! async fn example(store: &dyn EventStore) -> Result<(), EventStoreError> {
//!     let stream_id = StreamId::new("event-spring-swim");
//!
//!     let version = store
//!         .append_events(stream_id.clone(), Some(Version::INITIAL), vec![])
//!         .await?;
//!
//!     let history = store.load_events(stream_id, None).await?;
//!     assert_eq!(history.len() as u64, version.value());
//!     Ok(())
//! }
//! ```

use crate::event::SerializedEvent;
use crate::stream::{StreamId, Version};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during event store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventStoreError {
    /// The stream moved on since the caller last read it.
    #[error("Concurrency conflict on {stream_id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        /// The stream ID where the conflict occurred.
        stream_id: StreamId,
        /// The version we expected the stream to be at.
        expected: Version,
        /// The actual current version of the stream.
        actual: Version,
    },

    /// Stream not found in the event store.
    #[error("Stream not found: {0}")]
    StreamNotFound(StreamId),

    /// Backend connection or query error.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// General I/O error.
    #[error("I/O error: {0}")]
    IoError(String),
}

impl EventStoreError {
    /// Whether retrying the same operation could succeed.
    ///
    /// Conflicts and bad payloads fail the same way every time.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::DatabaseError(_) | Self::IoError(_))
    }
}

/// Event store abstraction for storing and retrieving event streams.
///
/// Methods return `Pin<Box<dyn Future>>` instead of using `async fn` so the
/// trait stays dyn-compatible: effects capture an `Arc<dyn EventStore>`.
pub trait EventStore: Send + Sync {
    /// Append events to a stream.
    ///
    /// `expected_version` of `Some(v)` asserts the stream currently holds `v`
    /// events; `None` skips the check. Returns the version after the append.
    ///
    /// # Errors
    ///
    /// - `ConcurrencyConflict`: the stream is not at `expected_version`
    /// - `DatabaseError` / `IoError`: the backend failed
    /// - `SerializationError`: events could not be encoded
    fn append_events(
        &self,
        stream_id: StreamId,
        expected_version: Option<Version>,
        events: Vec<SerializedEvent>,
    ) -> Pin<Box<dyn Future<Output = Result<Version, EventStoreError>> + Send + '_>>;

    /// Load events from a stream, oldest first.
    ///
    /// `from_version` of `Some(v)` skips the first `v` events. A stream that
    /// was never written returns an empty vector.
    ///
    /// # Errors
    ///
    /// - `DatabaseError` / `IoError`: the backend failed
    /// - `SerializationError`: stored events could not be decoded
    fn load_events(
        &self,
        stream_id: StreamId,
        from_version: Option<Version>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<SerializedEvent>, EventStoreError>> + Send + '_>>;
}
