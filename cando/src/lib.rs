//! Can Do - event waiting lists with lottery draws
//!
//! Organizers create events under their facility. Entrants join an event's
//! waiting list, the organizer draws a number of them at random, and each
//! drawn entrant accepts or declines the invitation.
//!
//! # Architecture
//!
//! ```text
//!   JoinWaitlist / DrawEntrants / AcceptInvitation ...
//!                        │
//!                        ▼
//!              ┌───────────────────┐        ┌──────────────┐
//!              │   EventReducer    │──uses──│ draw kernel  │
//!              │ (EntrantPool FSM) │        └──────────────┘
//!              └───────────────────┘
//!                 │             │
//!        append events     notifications
//!                 ▼             ▼
//!          ┌────────────┐  ┌──────────┐
//!          │ EventStore │  │ Notifier │
//!          └────────────┘  └──────────┘
//! ```
//!
//! - [`draw`]: uniform sampling without replacement, pure and RNG-injected
//! - [`pool`]: the Waiting → Selected → Enrolled/Cancelled state machine
//! - [`aggregates::event`]: the reducer persisting every transition
//! - [`directory`]: users, facilities and events related by id
//! - [`notification`], [`qr`], [`config`]: supporting pieces
//!
//! # Example
//!
//! ```no_run
//! use cando::aggregates::{EventAction, EventEnvironment, EventReducer, EventState};
//! use cando::notification::LogNotifier;
//! use cando::rng::SharedRng;
//! use cando::types::UserId;
//! use std::sync::Arc;
//! use waitlist_core::environment::SystemClock;
//! use waitlist_runtime::Store;
//! use waitlist_testing::InMemoryEventStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let env = EventEnvironment::new(
//!     Arc::new(SystemClock),
//!     Arc::new(InMemoryEventStore::new()),
//!     Arc::new(LogNotifier),
//!     SharedRng::from_entropy(),
//! );
//! let store = Store::new(EventState::new(), EventReducer::new(), env);
//!
//! // ... CreateEvent, JoinWaitlist ...
//! let mut handle = store.send(EventAction::DrawEntrants { count: 2 }).await?;
//! handle.wait().await;
//!
//! let selected = store.state(|s| s.pool.selected().to_vec()).await;
//! # let _: Vec<UserId> = selected;
//! # Ok(())
//! # }
//! ```

pub mod aggregates;
pub mod config;
pub mod directory;
pub mod draw;
pub mod metrics;
pub mod notification;
pub mod pool;
pub mod qr;
pub mod rng;
pub mod types;

pub use aggregates::{EventAction, EventEnvironment, EventReducer, EventState};
pub use config::Config;
pub use draw::{DrawError, DrawOutcome};
pub use pool::{EntrantPool, PoolError};
