//! Aggregate reducers for Can Do.
//!
//! - Event: details, waiting list, draws and invitations of one event

pub mod event;

pub use event::{
    EventAction, EventEnvironment, EventReducer, EventState, ReplayError, STALLED_MESSAGE, UnsavedEvent,
};
