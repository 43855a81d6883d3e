//! # Waitlist Runtime
//!
//! The `Store` runtime that coordinates reducer execution and effect handling.
//!
//! A store owns one piece of state (for example one event's entrant pool),
//! serializes every action through its reducer behind a write lock, and runs
//! the returned effects on the tokio runtime. Actions produced by effects are
//! fed back into the same store.
//!
//! ## Example
//!
//! ```ignore
//! use waitlist_runtime::Store;
//!
//! let store = Store::new(EventState::new(), EventReducer::new(), environment);
//!
//! let mut handle = store.send(EventAction::DrawEntrants { count: 3 }).await?;
//! handle.wait().await;
//!
//! let selected = store.state(|s| s.pool.selected().len()).await;
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{RwLock, watch};
use waitlist_core::{effect::Effect, reducer::Reducer};

/// Retry logic with exponential backoff
pub mod retry;

/// Metric names and recorders
pub mod metrics;

pub use retry::RetryPolicy;

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum StoreError {
        /// Store is shutting down and not accepting new actions
        #[error("Store is shutting down")]
        ShutdownInProgress,

        /// Shutdown timed out waiting for effects to complete
        #[error("Shutdown timed out with {0} effects still running")]
        ShutdownTimeout(usize),
    }
}

pub use error::StoreError;

/// Configuration for Store instances
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use waitlist_runtime::{RetryPolicy, StoreConfig};
///
/// let config = StoreConfig::default()
///     .with_retry_policy(RetryPolicy::builder().max_retries(5).build())
///     .with_shutdown_timeout(Duration::from_secs(10));
/// assert_eq!(config.retry_policy.max_retries, 5);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct StoreConfig {
    /// Retry policy for event store effects
    pub retry_policy: RetryPolicy,
    /// Default timeout for graceful shutdown
    pub shutdown_timeout: Duration,
}

impl StoreConfig {
    /// Create a configuration with explicit values
    #[must_use]
    pub const fn new(retry_policy: RetryPolicy, shutdown_timeout: Duration) -> Self {
        Self {
            retry_policy,
            shutdown_timeout,
        }
    }

    /// Set the retry policy
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Set the default shutdown timeout
    #[must_use]
    pub const fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            retry_policy: RetryPolicy::default(),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

/// Handle for tracking effect completion
///
/// Returned by [`Store::send()`]. Waiting on it returns once every effect the
/// action spawned has finished, including the reducer call for any action
/// those effects fed back.
///
/// # Example
///
/// ```ignore
/// let mut handle = store.send(EventAction::JoinWaitlist { .. }).await?;
/// handle.wait_with_timeout(Duration::from_secs(5)).await?;
/// ```
#[derive(Clone)]
pub struct EffectHandle {
    effects: Arc<AtomicUsize>,
    completion: watch::Receiver<()>,
}

impl EffectHandle {
    fn new() -> (Self, EffectTracking) {
        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = watch::channel(());

        let handle = Self {
            effects: Arc::clone(&counter),
            completion: rx,
        };

        let tracking = EffectTracking {
            counter,
            notifier: Arc::new(tx),
        };

        (handle, tracking)
    }

    /// Create a handle that's already complete
    #[must_use]
    pub fn completed() -> Self {
        let (tx, rx) = watch::channel(());
        let _ = tx.send(());

        Self {
            effects: Arc::new(AtomicUsize::new(0)),
            completion: rx,
        }
    }

    /// Number of effects still running
    #[must_use]
    pub fn pending(&self) -> usize {
        self.effects.load(Ordering::SeqCst)
    }

    /// Wait for all effects to complete
    pub async fn wait(&mut self) {
        while self.effects.load(Ordering::SeqCst) > 0 {
            if self.completion.changed().await.is_err() {
                break;
            }
        }
    }

    /// Wait for all effects to complete with a timeout
    ///
    /// # Errors
    ///
    /// Returns `Err(())` if the timeout expires before all effects complete.
    pub async fn wait_with_timeout(&mut self, timeout: Duration) -> Result<(), ()> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| ())
    }
}

impl std::fmt::Debug for EffectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectHandle")
            .field("pending_effects", &self.pending())
            .finish_non_exhaustive()
    }
}

/// Internal: tracking context passed through effect execution
#[derive(Clone)]
struct EffectTracking {
    counter: Arc<AtomicUsize>,
    notifier: Arc<watch::Sender<()>>,
}

impl EffectTracking {
    fn increment(&self) {
        self.counter.fetch_add(1, Ordering::SeqCst);
    }

    fn decrement(&self) {
        if self.counter.fetch_sub(1, Ordering::SeqCst) == 1 {
            let _ = self.notifier.send(());
        }
    }
}

/// Internal: RAII guard that decrements the effect counter on drop
///
/// Runs even when the effect task panics.
struct DecrementGuard(EffectTracking);

impl Drop for DecrementGuard {
    fn drop(&mut self) {
        self.0.decrement();
    }
}

/// Guard that decrements the store-wide pending counter on drop
struct AtomicCounterGuard(Arc<AtomicUsize>);

impl Drop for AtomicCounterGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Store runtime for coordinating reducer execution and effect handling.
pub mod store {
    use super::{
        Arc, AtomicBool, AtomicCounterGuard, AtomicUsize, DecrementGuard, Duration, Effect,
        EffectHandle, EffectTracking, Ordering, Reducer, RwLock, StoreConfig, StoreError, watch,
    };
    use crate::metrics::StoreMetrics;
    use crate::retry::retry_with_predicate;
    use waitlist_core::effect::EventStoreOperation;
    use waitlist_core::event_store::EventStoreError;

    /// The Store - runtime coordinator for a reducer
    ///
    /// # Type Parameters
    ///
    /// - `S`: State type
    /// - `A`: Action type
    /// - `E`: Environment type
    /// - `R`: Reducer implementation
    pub struct Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        state: Arc<RwLock<S>>,
        reducer: R,
        environment: E,
        config: StoreConfig,
        shutdown: Arc<AtomicBool>,
        pending_effects: Arc<AtomicUsize>,
    }

    impl<S, A, E, R> Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Clone + Send + Sync + 'static,
        A: Clone + Send + 'static,
        S: Send + Sync + 'static,
        E: Clone + Send + Sync + 'static,
    {
        /// Create a new store with the default configuration
        #[must_use]
        pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
            Self::with_config(initial_state, reducer, environment, StoreConfig::default())
        }

        /// Create a new Store with custom configuration
        #[must_use]
        pub fn with_config(
            initial_state: S,
            reducer: R,
            environment: E,
            config: StoreConfig,
        ) -> Self {
            Self {
                state: Arc::new(RwLock::new(initial_state)),
                reducer,
                environment,
                config,
                shutdown: Arc::new(AtomicBool::new(false)),
                pending_effects: Arc::new(AtomicUsize::new(0)),
            }
        }

        /// The configuration this store runs with
        #[must_use]
        pub const fn config(&self) -> &StoreConfig {
            &self.config
        }

        /// Initiate graceful shutdown of the store
        ///
        /// Rejects new actions, then waits for pending effects to finish.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownTimeout`] if the timeout expires before all
        /// pending effects complete.
        pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
            tracing::info!("Initiating graceful shutdown");
            self.shutdown.store(true, Ordering::Release);

            let start = std::time::Instant::now();
            let poll_interval = Duration::from_millis(10);

            loop {
                let pending = self.pending_effects.load(Ordering::Acquire);

                if pending == 0 {
                    tracing::info!("All effects completed, shutdown successful");
                    return Ok(());
                }

                let remaining = timeout.saturating_sub(start.elapsed());
                if remaining.is_zero() {
                    tracing::error!(pending_effects = pending, "Shutdown timed out");
                    return Err(StoreError::ShutdownTimeout(pending));
                }

                tracing::debug!(pending_effects = pending, "Waiting for effects to complete");
                tokio::time::sleep(poll_interval.min(remaining)).await;
            }
        }

        /// Send an action to the store
        ///
        /// The reducer runs while the write lock is held, so concurrent sends
        /// are serialized. Effects start before this returns but may still be
        /// running; use the returned [`EffectHandle`] to wait for them.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownInProgress`] if the store is shutting down.
        #[tracing::instrument(skip(self, action), name = "store_send")]
        pub async fn send(&self, action: A) -> Result<EffectHandle, StoreError> {
            let (handle, tracking) = EffectHandle::new();
            self.send_tracked(action, &tracking).await?;
            Ok(handle)
        }

        async fn send_tracked(&self, action: A, tracking: &EffectTracking) -> Result<(), StoreError> {
            if self.shutdown.load(Ordering::Acquire) {
                tracing::warn!("Rejected action: store is shutting down");
                StoreMetrics::record_rejected();
                return Err(StoreError::ShutdownInProgress);
            }

            let effects = {
                let mut state = self.state.write().await;

                let start = std::time::Instant::now();
                let effects = self.reducer.reduce(&mut *state, action, &self.environment);
                StoreMetrics::record_action(start.elapsed());

                tracing::trace!("Reducer completed, returned {} effects", effects.len());
                effects
            };

            for effect in effects {
                self.execute_effect(effect, tracking.clone());
            }

            Ok(())
        }

        /// Read current state via a closure
        ///
        /// ```ignore
        /// let waiting = store.state(|s| s.pool.waiting().len()).await;
        /// ```
        pub async fn state<F, T>(&self, f: F) -> T
        where
            F: FnOnce(&S) -> T,
        {
            let state = self.state.read().await;
            f(&*state)
        }

        /// Feed an action produced by an effect back into the store.
        ///
        /// Effects it spawns count against the original action's handle.
        async fn feed_back(&self, action: A, tracking: &EffectTracking) {
            if let Err(error) = self.send_tracked(action, tracking).await {
                tracing::warn!(error = %error, "Dropped feedback action");
            }
        }

        /// Track one spawned effect on both the handle and the store.
        fn begin_effect(&self, tracking: &EffectTracking) -> (DecrementGuard, AtomicCounterGuard) {
            tracking.increment();
            self.pending_effects.fetch_add(1, Ordering::SeqCst);
            (
                DecrementGuard(tracking.clone()),
                AtomicCounterGuard(Arc::clone(&self.pending_effects)),
            )
        }

        /// Execute an effect
        ///
        /// Panics inside spawned effects are isolated to their task; the
        /// guards still release the effect counters.
        #[allow(clippy::needless_pass_by_value)] // tracking is cloned into tasks
        #[allow(clippy::too_many_lines)]
        fn execute_effect(&self, effect: Effect<A>, tracking: EffectTracking) {
            match effect {
                Effect::None => {
                    StoreMetrics::record_effect("none");
                },
                Effect::Future(fut) => {
                    StoreMetrics::record_effect("future");
                    let guards = self.begin_effect(&tracking);
                    let store = self.clone();

                    tokio::spawn(async move {
                        let _guards = guards;
                        if let Some(action) = fut.await {
                            tracing::trace!("Effect::Future produced an action");
                            store.feed_back(action, &tracking).await;
                        }
                    });
                },
                Effect::Delay { duration, action } => {
                    StoreMetrics::record_effect("delay");
                    let guards = self.begin_effect(&tracking);
                    let store = self.clone();

                    tokio::spawn(async move {
                        let _guards = guards;
                        tokio::time::sleep(duration).await;
                        store.feed_back(*action, &tracking).await;
                    });
                },
                Effect::Parallel(effects) => {
                    StoreMetrics::record_effect("parallel");
                    for effect in effects {
                        self.execute_effect(effect, tracking.clone());
                    }
                },
                Effect::Sequential(effects) => {
                    StoreMetrics::record_effect("sequential");
                    let guards = self.begin_effect(&tracking);
                    let store = self.clone();

                    tokio::spawn(async move {
                        let _guards = guards;

                        for effect in effects {
                            let (step_tx, mut step_rx) = watch::channel(());
                            let step = EffectTracking {
                                counter: Arc::new(AtomicUsize::new(0)),
                                notifier: Arc::new(step_tx),
                            };

                            // Keep the outer handle open while this step runs.
                            store.execute_effect(effect, step.clone());
                            while step.counter.load(Ordering::SeqCst) > 0 {
                                if step_rx.changed().await.is_err() {
                                    break;
                                }
                            }
                        }
                    });
                },
                Effect::EventStore(op) => {
                    StoreMetrics::record_effect("event_store");
                    let guards = self.begin_effect(&tracking);
                    let store = self.clone();

                    tokio::spawn(async move {
                        let _guards = guards;
                        if let Some(action) = store.run_event_store_operation(op).await {
                            store.feed_back(action, &tracking).await;
                        }
                    });
                },
            }
        }

        /// Run an event store operation with retries and hand its outcome to
        /// the operation's callback.
        async fn run_event_store_operation(&self, op: EventStoreOperation<A>) -> Option<A> {
            let policy = &self.config.retry_policy;

            match op {
                EventStoreOperation::AppendEvents {
                    event_store,
                    stream_id,
                    expected_version,
                    events,
                    on_success,
                    on_error,
                } => {
                    tracing::debug!(
                        stream_id = %stream_id,
                        expected_version = ?expected_version,
                        event_count = events.len(),
                        "Executing append_events"
                    );

                    let result = retry_with_predicate(
                        policy,
                        "append_events",
                        || {
                            let event_store = Arc::clone(&event_store);
                            let stream_id = stream_id.clone();
                            let events = events.clone();
                            async move {
                                event_store
                                    .append_events(stream_id, expected_version, events)
                                    .await
                            }
                        },
                        EventStoreError::is_transient,
                    )
                    .await;

                    match result {
                        Ok(version) => {
                            tracing::debug!(new_version = %version, "append_events succeeded");
                            on_success(version)
                        },
                        Err(error) => {
                            tracing::warn!(stream_id = %stream_id, error = %error, "append_events failed");
                            on_error(error)
                        },
                    }
                },
                EventStoreOperation::LoadEvents {
                    event_store,
                    stream_id,
                    from_version,
                    on_success,
                    on_error,
                } => {
                    tracing::debug!(
                        stream_id = %stream_id,
                        from_version = ?from_version,
                        "Executing load_events"
                    );

                    let result = retry_with_predicate(
                        policy,
                        "load_events",
                        || {
                            let event_store = Arc::clone(&event_store);
                            let stream_id = stream_id.clone();
                            async move { event_store.load_events(stream_id, from_version).await }
                        },
                        EventStoreError::is_transient,
                    )
                    .await;

                    match result {
                        Ok(events) => {
                            tracing::debug!(event_count = events.len(), "load_events succeeded");
                            on_success(events)
                        },
                        Err(error) => {
                            tracing::warn!(stream_id = %stream_id, error = %error, "load_events failed");
                            on_error(error)
                        },
                    }
                },
            }
        }
    }

    impl<S, A, E, R> Clone for Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Clone,
        E: Clone,
    {
        fn clone(&self) -> Self {
            Self {
                state: Arc::clone(&self.state),
                reducer: self.reducer.clone(),
                environment: self.environment.clone(),
                config: self.config.clone(),
                shutdown: Arc::clone(&self.shutdown),
                pending_effects: Arc::clone(&self.pending_effects),
            }
        }
    }

    impl<S, A, E, R> std::fmt::Debug for Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("Store")
                .field("config", &self.config)
                .field("pending_effects", &self.pending_effects.load(Ordering::SeqCst))
                .finish_non_exhaustive()
        }
    }
}

// Re-export for convenience
pub use store::Store;

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;
    use waitlist_core::effect::EventStoreOperation;
    use waitlist_core::event::SerializedEvent;
    use waitlist_core::event_store::{EventStore, EventStoreError};
    use waitlist_core::stream::{StreamId, Version};
    use waitlist_core::{SmallVec, smallvec};

    #[derive(Debug, Clone)]
    struct TestState {
        value: i32,
        last_error: Option<String>,
    }

    #[derive(Debug, Clone)]
    enum TestAction {
        Increment,
        Decrement,
        ProduceEffect,
        ProduceDelayedAction,
        ProduceParallelEffects,
        ProduceSequentialEffects,
        ProducePanickingEffect,
        Persist,
        Failed(String),
    }

    /// Fails the first `failures` appends with the given error.
    struct FlakyStore {
        failures: Mutex<usize>,
        error: EventStoreError,
        appends: Mutex<usize>,
    }

    impl FlakyStore {
        fn new(failures: usize, error: EventStoreError) -> Self {
            Self {
                failures: Mutex::new(failures),
                error,
                appends: Mutex::new(0),
            }
        }

        #[allow(clippy::unwrap_used)]
        fn attempts(&self) -> usize {
            *self.appends.lock().unwrap()
        }
    }

    impl EventStore for FlakyStore {
        #[allow(clippy::unwrap_used)]
        fn append_events(
            &self,
            _stream_id: StreamId,
            _expected_version: Option<Version>,
            events: Vec<SerializedEvent>,
        ) -> Pin<Box<dyn Future<Output = Result<Version, EventStoreError>> + Send + '_>> {
            *self.appends.lock().unwrap() += 1;
            let mut failures = self.failures.lock().unwrap();
            let result = if *failures > 0 {
                *failures -= 1;
                Err(self.error.clone())
            } else {
                Ok(Version::new(events.len() as u64))
            };
            Box::pin(async move { result })
        }

        fn load_events(
            &self,
            _stream_id: StreamId,
            _from_version: Option<Version>,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<SerializedEvent>, EventStoreError>> + Send + '_>>
        {
            Box::pin(async { Ok(Vec::new()) })
        }
    }

    #[derive(Clone)]
    struct TestEnv {
        event_store: Arc<FlakyStore>,
    }

    impl TestEnv {
        fn new() -> Self {
            Self::with_store(FlakyStore::new(0, EventStoreError::IoError("unused".into())))
        }

        fn with_store(store: FlakyStore) -> Self {
            Self {
                event_store: Arc::new(store),
            }
        }
    }

    #[derive(Debug, Clone)]
    struct TestReducer;

    impl Reducer for TestReducer {
        type State = TestState;
        type Action = TestAction;
        type Environment = TestEnv;

        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]> {
            match action {
                TestAction::Increment => {
                    state.value += 1;
                    SmallVec::new()
                },
                TestAction::Decrement => {
                    state.value -= 1;
                    SmallVec::new()
                },
                TestAction::ProduceEffect => {
                    smallvec![Effect::Future(Box::pin(async { Some(TestAction::Increment) }))]
                },
                TestAction::ProduceDelayedAction => smallvec![Effect::Delay {
                    duration: Duration::from_millis(10),
                    action: Box::new(TestAction::Increment),
                }],
                TestAction::ProduceParallelEffects => smallvec![Effect::Parallel(vec![
                    Effect::Future(Box::pin(async { Some(TestAction::Increment) })),
                    Effect::Future(Box::pin(async { Some(TestAction::Increment) })),
                    Effect::Future(Box::pin(async { Some(TestAction::Increment) })),
                ])],
                TestAction::ProduceSequentialEffects => smallvec![Effect::Sequential(vec![
                    Effect::Future(Box::pin(async { Some(TestAction::Increment) })),
                    Effect::Future(Box::pin(async { Some(TestAction::Increment) })),
                    Effect::Future(Box::pin(async { Some(TestAction::Decrement) })),
                ])],
                TestAction::ProducePanickingEffect => {
                    #[allow(clippy::panic)] // Intentional panic for testing isolation
                    {
                        smallvec![Effect::Future(Box::pin(async {
                            panic!("Intentional panic in effect for testing");
                        }))]
                    }
                },
                TestAction::Persist => {
                    let event_store: Arc<dyn EventStore> = env.event_store.clone();
                    smallvec![Effect::EventStore(EventStoreOperation::AppendEvents {
                        event_store,
                        stream_id: StreamId::new("event-test"),
                        expected_version: None,
                        events: vec![SerializedEvent::new("Test.v1".into(), vec![1], None)],
                        on_success: Box::new(|_| Some(TestAction::Increment)),
                        on_error: Box::new(|error| Some(TestAction::Failed(error.to_string()))),
                    })]
                },
                TestAction::Failed(error) => {
                    state.last_error = Some(error);
                    SmallVec::new()
                },
            }
        }
    }

    fn fast_config(max_retries: usize) -> StoreConfig {
        StoreConfig::default().with_retry_policy(
            RetryPolicy::builder()
                .max_retries(max_retries)
                .initial_delay(Duration::from_millis(1))
                .max_delay(Duration::from_millis(2))
                .build(),
        )
    }

    fn initial() -> TestState {
        TestState {
            value: 0,
            last_error: None,
        }
    }

    #[tokio::test]
    async fn test_send_action() -> Result<(), StoreError> {
        let store = Store::new(initial(), TestReducer, TestEnv::new());

        store.send(TestAction::Increment).await?;
        store.send(TestAction::Increment).await?;
        store.send(TestAction::Decrement).await?;

        assert_eq!(store.state(|s| s.value).await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_effect_future_feeds_back() -> Result<(), StoreError> {
        let store = Store::new(initial(), TestReducer, TestEnv::new());

        let mut handle = store.send(TestAction::ProduceEffect).await?;
        handle.wait().await;

        assert_eq!(store.state(|s| s.value).await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_effect_delay() -> Result<(), StoreError> {
        let store = Store::new(initial(), TestReducer, TestEnv::new());

        let mut handle = store.send(TestAction::ProduceDelayedAction).await?;
        assert_eq!(store.state(|s| s.value).await, 0);

        handle.wait().await;
        assert_eq!(store.state(|s| s.value).await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_effect_parallel() -> Result<(), StoreError> {
        let store = Store::new(initial(), TestReducer, TestEnv::new());

        let mut handle = store.send(TestAction::ProduceParallelEffects).await?;
        handle.wait().await;

        assert_eq!(store.state(|s| s.value).await, 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_effect_sequential() -> Result<(), StoreError> {
        let store = Store::new(initial(), TestReducer, TestEnv::new());

        let mut handle = store.send(TestAction::ProduceSequentialEffects).await?;
        handle.wait().await;

        assert_eq!(store.state(|s| s.value).await, 1);
        Ok(())
    }

    #[tokio::test]
    #[allow(clippy::panic)] // Tests are allowed to panic on failures
    async fn test_concurrent_sends_are_serialized() {
        let store = Store::new(initial(), TestReducer, TestEnv::new());

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.send(TestAction::Increment).await })
            })
            .collect();

        for handle in handles {
            match handle.await {
                Ok(Ok(_)) => {},
                other => panic!("concurrent send failed: {other:?}"),
            }
        }

        assert_eq!(store.state(|s| s.value).await, 10);
    }

    #[tokio::test]
    async fn test_effect_panic_isolation() -> Result<(), StoreError> {
        let store = Store::new(initial(), TestReducer, TestEnv::new());

        let mut handle = store.send(TestAction::ProducePanickingEffect).await?;
        handle.wait().await;

        store.send(TestAction::Increment).await?;
        assert_eq!(store.state(|s| s.value).await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn transient_append_failures_are_retried() -> Result<(), StoreError> {
        let env = TestEnv::with_store(FlakyStore::new(
            2,
            EventStoreError::DatabaseError("connection reset".into()),
        ));
        let flaky = Arc::clone(&env.event_store);
        let store = Store::with_config(initial(), TestReducer, env, fast_config(3));

        let mut handle = store.send(TestAction::Persist).await?;
        handle.wait().await;

        assert_eq!(flaky.attempts(), 3);
        assert_eq!(store.state(|s| s.value).await, 1);
        assert!(store.state(|s| s.last_error.is_none()).await);
        Ok(())
    }

    #[tokio::test]
    async fn conflicts_are_not_retried() -> Result<(), StoreError> {
        let env = TestEnv::with_store(FlakyStore::new(
            1,
            EventStoreError::ConcurrencyConflict {
                stream_id: StreamId::new("event-test"),
                expected: Version::new(0),
                actual: Version::new(2),
            },
        ));
        let flaky = Arc::clone(&env.event_store);
        let store = Store::with_config(initial(), TestReducer, env, fast_config(3));

        let mut handle = store.send(TestAction::Persist).await?;
        handle.wait().await;

        assert_eq!(flaky.attempts(), 1);
        let error = store.state(|s| s.last_error.clone()).await;
        assert!(error.is_some_and(|e| e.contains("Concurrency conflict")));
        Ok(())
    }

    #[tokio::test]
    async fn shutdown_rejects_new_actions() -> Result<(), StoreError> {
        let store = Store::new(initial(), TestReducer, TestEnv::new());

        store.shutdown(Duration::from_secs(1)).await?;

        let result = store.send(TestAction::Increment).await;
        assert!(matches!(result, Err(StoreError::ShutdownInProgress)));
        Ok(())
    }

    #[tokio::test]
    async fn shutdown_times_out_with_long_running_effects() -> Result<(), StoreError> {
        let store = Store::new(initial(), TestReducer, TestEnv::new());
        let _handle = store.send(TestAction::ProduceDelayedAction).await?;

        let result = store.shutdown(Duration::from_millis(1)).await;
        assert!(matches!(result, Err(StoreError::ShutdownTimeout(1))));
        Ok(())
    }

    #[test]
    fn completed_handle_has_nothing_pending() {
        let handle = EffectHandle::completed();
        assert_eq!(handle.pending(), 0);
        tokio_test::block_on(async {
            let mut handle = handle;
            handle.wait().await;
        });
    }
}
