//! # Waitlist Core
//!
//! Core traits and types for the waitlist reducer architecture.
//!
//! Every piece of domain logic in this workspace is a pure reducer:
//! `(State, Action, Environment) → (State, Effects)`. Reducers never perform
//! I/O. They describe it as [`effect::Effect`] values which the runtime
//! crate executes, feeding any resulting actions back into the reducer.
//!
//! ## Core Concepts
//!
//! - **State**: Domain state for a feature (e.g. one event's entrant pool)
//! - **Action**: All inputs to a reducer (commands and events)
//! - **Reducer**: The business logic
//! - **Effect**: Side effect descriptions (persist, notify, delay)
//! - **Environment**: Injected dependencies (clock, event store, notifier, RNG)
//!
//! ## Example
//!
//! ```ignore
//! use waitlist_core::*;
//!
//! impl Reducer for EventReducer {
//!     type State = EventState;
//!     type Action = EventAction;
//!     type Environment = EventEnvironment;
//!
//!     fn reduce(
//!         &self,
//!         state: &mut EventState,
//!         action: EventAction,
//!         env: &EventEnvironment,
//!     ) -> SmallVec<[Effect<EventAction>; 4]> {
//!         SmallVec::new()
//!     }
//! }
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};
pub use smallvec::{SmallVec, smallvec};

pub mod effect_macros;
pub mod event;
pub mod event_store;
pub mod stream;

/// Reducer module - The core trait for business logic
///
/// Reducers are pure functions: `(State, Action, Environment) → (State, Effects)`.
/// They are deterministic given their environment and contain no I/O.
pub mod reducer {
    use super::effect::Effect;
    use smallvec::SmallVec;

    /// The Reducer trait - core abstraction for business logic
    ///
    /// # Type Parameters
    ///
    /// - `State`: The domain state this reducer operates on
    /// - `Action`: The action type this reducer processes
    /// - `Environment`: The injected dependencies this reducer needs
    ///
    /// Most reducers return zero to two effects, so effects are collected in a
    /// `SmallVec` that stays on the stack for the common case.
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// Reduce an action into state changes and effects
        ///
        /// 1. Validates the action
        /// 2. Updates state in place
        /// 3. Returns effect descriptions to be executed
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

/// Effect module - Side effect descriptions
///
/// Effects are values, not execution. The `Store` runtime interprets them.
pub mod effect {
    use crate::event::SerializedEvent;
    use crate::event_store::{EventStore, EventStoreError};
    use crate::stream::{StreamId, Version};
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Arc;
    use std::time::Duration;

    /// Callback invoked with the outcome of an event store operation.
    ///
    /// Returning `Some(action)` feeds the action back into the reducer.
    pub type Callback<T, Action> = Box<dyn FnOnce(T) -> Option<Action> + Send>;

    /// Event store operations a reducer can request.
    pub enum EventStoreOperation<Action> {
        /// Append events to a stream
        AppendEvents {
            /// Store to append to
            event_store: Arc<dyn EventStore>,
            /// Target stream
            stream_id: StreamId,
            /// Optimistic concurrency check (`None` appends unconditionally)
            expected_version: Option<Version>,
            /// Events to append
            events: Vec<SerializedEvent>,
            /// Called with the new stream version
            on_success: Callback<Version, Action>,
            /// Called with the final error after retries are exhausted
            on_error: Callback<EventStoreError, Action>,
        },

        /// Load events from a stream
        LoadEvents {
            /// Store to load from
            event_store: Arc<dyn EventStore>,
            /// Source stream
            stream_id: StreamId,
            /// First version to load (inclusive), `None` for the whole stream
            from_version: Option<Version>,
            /// Called with the loaded events
            on_success: Callback<Vec<SerializedEvent>, Action>,
            /// Called with the final error after retries are exhausted
            on_error: Callback<EventStoreError, Action>,
        },
    }

    /// Effect type - describes a side effect to be executed
    ///
    /// Effects are NOT executed immediately. They are descriptions of what should happen,
    /// returned from reducers and executed by the Store runtime.
    pub enum Effect<Action> {
        /// No-op effect
        None,

        /// Run effects in parallel
        Parallel(Vec<Effect<Action>>),

        /// Run effects sequentially
        Sequential(Vec<Effect<Action>>),

        /// Delayed action (for timeouts, reminders)
        Delay {
            /// How long to wait
            duration: Duration,
            /// Action to dispatch after delay
            action: Box<Action>,
        },

        /// Arbitrary async computation
        ///
        /// Returns `Option<Action>` - if Some, the action is fed back into the reducer
        Future(Pin<Box<dyn Future<Output = Option<Action>> + Send>>),

        /// Event store operation (persistence)
        EventStore(EventStoreOperation<Action>),
    }

    // Manual Debug implementation since Future and callbacks don't implement Debug
    impl<Action> std::fmt::Debug for Effect<Action>
    where
        Action: std::fmt::Debug,
    {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Effect::None => write!(f, "Effect::None"),
                Effect::Parallel(effects) => {
                    f.debug_tuple("Effect::Parallel").field(effects).finish()
                },
                Effect::Sequential(effects) => {
                    f.debug_tuple("Effect::Sequential").field(effects).finish()
                },
                Effect::Delay { duration, action } => f
                    .debug_struct("Effect::Delay")
                    .field("duration", duration)
                    .field("action", action)
                    .finish(),
                Effect::Future(_) => write!(f, "Effect::Future(<future>)"),
                Effect::EventStore(EventStoreOperation::AppendEvents {
                    stream_id, events, ..
                }) => f
                    .debug_struct("Effect::EventStore::AppendEvents")
                    .field("stream_id", stream_id)
                    .field("events", &events.len())
                    .finish(),
                Effect::EventStore(EventStoreOperation::LoadEvents {
                    stream_id,
                    from_version,
                    ..
                }) => f
                    .debug_struct("Effect::EventStore::LoadEvents")
                    .field("stream_id", stream_id)
                    .field("from_version", from_version)
                    .finish(),
            }
        }
    }

    impl<Action> Effect<Action> {
        /// Combine effects to run in parallel
        #[must_use]
        pub const fn merge(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Parallel(effects)
        }

        /// Chain effects to run sequentially
        #[must_use]
        pub const fn chain(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Sequential(effects)
        }

        /// Returns true for `Effect::None`
        #[must_use]
        pub const fn is_none(&self) -> bool {
            matches!(self, Effect::None)
        }
    }
}

/// Environment module - Dependency injection traits
///
/// All external dependencies are abstracted behind traits and injected
/// via the Environment parameter.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::effect::Effect;
    use super::environment::{Clock, SystemClock};
    use std::time::Duration;

    #[derive(Clone, Debug)]
    enum TestAction {
        Tick,
    }

    #[test]
    fn system_clock_moves_forward() {
        let clock = SystemClock;
        let first = clock.now();
        let second = clock.now();
        assert!(second >= first);
    }

    #[test]
    fn effect_debug_output() {
        let effect: Effect<TestAction> = Effect::merge(vec![
            Effect::None,
            Effect::Delay {
                duration: Duration::from_secs(1),
                action: Box::new(TestAction::Tick),
            },
        ]);

        let debug = format!("{effect:?}");
        assert!(debug.contains("Effect::Parallel"));
        assert!(debug.contains("Tick"));
    }

    #[test]
    fn effect_is_none() {
        assert!(Effect::<TestAction>::None.is_none());
        assert!(!Effect::<TestAction>::chain(vec![]).is_none());
    }
}
