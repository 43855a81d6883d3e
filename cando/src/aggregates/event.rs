//! Event aggregate for Can Do.
//!
//! One aggregate instance per event: its details plus the entrant pool.
//! Commands are validated against the pool's state machine, produce events,
//! and the events are applied to state and appended to the `event-<id>`
//! stream. Draws also notify selected and not-selected entrants.
//!
//! Appends to the stream are strictly ordered. At most one append runs at a
//! time; events committed meanwhile wait in [`EventState::unsaved`] and go
//! out in the next append, which expects the version the previous one
//! reported. Notifications attached to an event are released only once it
//! is stored. An append that still fails after the runtime's retries stalls
//! the aggregate: commands are rejected until [`EventAction::RetryPersist`]
//! stores the backlog.

use crate::metrics::LotteryMetrics;
use crate::notification::{
    Audience, Notification, NotificationKind, NotificationPreferences, Notifier,
    selection_notifications,
};
use crate::pool::{EntrantPool, PoolError};
use crate::rng::SharedRng;
use crate::types::{EntrantStatus, EventDetails, EventId, FacilityId, GeoPoint, NotificationId, UserId};
use crate::draw::draw;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use waitlist_core::event::{Event, EventError, SerializedEvent};
use waitlist_core::stream::Version;
use waitlist_core::{
    SmallVec, append_events, async_effect, effect::Effect, environment::Clock,
    event_store::EventStore, reducer::Reducer, smallvec,
};
use waitlist_macros::Action;
use serde::{Deserialize, Serialize};

/// Rejection for commands sent while a failed append is outstanding
pub const STALLED_MESSAGE: &str = "Event has unsaved changes; retry persistence first";

// ============================================================================
// Actions (Commands + Events)
// ============================================================================

/// Actions for the Event aggregate
///
/// Commands express intent, events record what happened.
#[derive(Action, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum EventAction {
    // Commands
    /// Create the event
    #[command]
    CreateEvent {
        /// Event identifier
        event_id: EventId,
        /// Hosting facility
        facility: FacilityId,
        /// Initial details
        details: EventDetails,
    },

    /// Replace the event's details
    #[command]
    UpdateDetails {
        /// New details
        details: EventDetails,
    },

    /// Join the waiting list
    #[command]
    JoinWaitlist {
        /// Joining user
        user: UserId,
        /// User's location, required when the event asks for geolocation
        location: Option<GeoPoint>,
    },

    /// Entrant withdraws from the waiting list
    #[command]
    LeaveWaitlist {
        /// Leaving user
        user: UserId,
    },

    /// Organizer removes an entrant from the waiting list
    #[command]
    RemoveEntrant {
        /// Removed user
        user: UserId,
    },

    /// Organizer draws entrants from the waiting list
    #[command]
    DrawEntrants {
        /// Number of entrants to draw
        count: i64,
    },

    /// Selected entrant accepts the invitation
    #[command]
    AcceptInvitation {
        /// Accepting user
        user: UserId,
    },

    /// Selected entrant declines the invitation
    #[command]
    DeclineInvitation {
        /// Declining user
        user: UserId,
    },

    /// Organizer messages one group of entrants
    #[command]
    NotifyEntrants {
        /// Recipients
        audience: Audience,
        /// Message title
        title: String,
        /// Message body
        message: String,
    },

    /// Store the events left unsaved by a failed append
    #[command]
    RetryPersist,

    // Events
    /// Event was created
    #[event]
    EventCreated {
        /// Event identifier
        event_id: EventId,
        /// Hosting facility
        facility: FacilityId,
        /// Initial details (default capacity already applied)
        details: EventDetails,
        /// When created
        created_at: DateTime<Utc>,
    },

    /// Details were replaced
    #[event]
    DetailsUpdated {
        /// New details
        details: EventDetails,
        /// When updated
        updated_at: DateTime<Utc>,
    },

    /// User joined the waiting list
    #[event]
    EntrantJoined {
        /// Joining user
        user: UserId,
        /// Location shared on join
        location: Option<GeoPoint>,
        /// When joined
        joined_at: DateTime<Utc>,
    },

    /// User left the waiting list
    #[event]
    EntrantLeft {
        /// Leaving user
        user: UserId,
        /// When left
        left_at: DateTime<Utc>,
    },

    /// Organizer removed a user from the waiting list
    #[event]
    EntrantRemoved {
        /// Removed user
        user: UserId,
        /// When removed
        removed_at: DateTime<Utc>,
    },

    /// A draw moved entrants from Waiting to Selected
    #[event]
    EntrantsDrawn {
        /// Drawn entrants, in draw order
        selected: Vec<UserId>,
        /// Entrants still waiting after the draw
        not_selected: Vec<UserId>,
        /// When drawn
        drawn_at: DateTime<Utc>,
    },

    /// Selected entrant enrolled
    #[event]
    InvitationAccepted {
        /// Accepting user
        user: UserId,
        /// When accepted
        accepted_at: DateTime<Utc>,
    },

    /// Selected entrant cancelled
    #[event]
    InvitationDeclined {
        /// Declining user
        user: UserId,
        /// When declined
        declined_at: DateTime<Utc>,
    },

    /// A notification was delivered
    #[event]
    NotificationSent {
        /// Delivered notification
        notification_id: NotificationId,
        /// Its kind
        kind: NotificationKind,
        /// Number of recipients
        recipients: usize,
    },

    /// A notification could not be delivered
    #[event]
    NotificationFailed {
        /// Error message
        error: String,
    },

    /// The running append stored its events
    #[event]
    EventsPersisted {
        /// Stream version after the append
        version: Version,
        /// Number of events the append carried
        count: usize,
    },

    /// Appending to the event store failed after retries
    #[event]
    PersistFailed {
        /// Error message
        error: String,
    },

    /// Command validation failed
    #[event]
    ValidationFailed {
        /// Error message
        error: String,
    },
}

impl Event for EventAction {
    fn event_type(&self) -> &'static str {
        Self::event_type(self)
    }
}

// ============================================================================
// State
// ============================================================================

/// State of one event
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EventState {
    /// Event id, `None` until created
    pub event_id: Option<EventId>,
    /// Hosting facility
    pub facility: Option<FacilityId>,
    /// Current details
    pub details: Option<EventDetails>,
    /// Entrant lists
    pub pool: EntrantPool,
    /// Locations shared by entrants on join
    pub locations: HashMap<UserId, GeoPoint>,
    /// Number of draws performed
    pub draws: u32,
    /// Notifications delivered, oldest first
    pub notifications: Vec<NotificationId>,
    /// Last error (validation, persistence or delivery)
    pub last_error: Option<String>,
    /// Version of the last stored event, `None` before the first append
    pub stored_version: Option<Version>,
    /// Applied events not yet stored, oldest first
    pub unsaved: Vec<UnsavedEvent>,
    /// How many of `unsaved` the running append carries, zero when idle
    pub in_flight: usize,
    /// An append failed after retries; commands wait for `RetryPersist`
    pub persist_stalled: bool,
}

/// An applied event waiting for its append
#[derive(Clone, Debug, PartialEq)]
pub struct UnsavedEvent {
    /// The event
    pub event: EventAction,
    /// Sent once the event is stored
    pub notifications: Vec<Notification>,
}

/// Stored history that does not rebuild
#[derive(Error, Debug)]
pub enum ReplayError {
    /// An event did not decode
    #[error(transparent)]
    Decode(#[from] EventError),

    /// An event's transition does not fit the state built so far
    #[error("Stored event {position} ({event_type}) does not apply: {source}")]
    Inconsistent {
        /// Zero-based position in the stream
        position: usize,
        /// Stored type name
        event_type: String,
        /// Rejected transition
        source: PoolError,
    },
}

impl EventState {
    /// Creates an empty state
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the event has been created
    #[must_use]
    pub const fn exists(&self) -> bool {
        self.event_id.is_some()
    }

    /// Status of an entrant on this event
    #[must_use]
    pub fn status_of(&self, user: &UserId) -> Option<EntrantStatus> {
        self.pool.status_of(user)
    }

    /// Whether every applied event has been stored
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.unsaved.is_empty()
    }

    /// Rebuild state from stored events, oldest first
    ///
    /// The rebuilt state continues appending after the last replayed event.
    ///
    /// # Errors
    ///
    /// [`ReplayError::Decode`] if an event does not decode,
    /// [`ReplayError::Inconsistent`] if an event's transition is rejected by
    /// the pool built from the events before it.
    pub fn replay(events: &[SerializedEvent]) -> Result<Self, ReplayError> {
        let mut state = Self::new();
        for (position, serialized) in events.iter().enumerate() {
            let event: EventAction = serialized.decode()?;
            EventReducer::apply_event(&mut state, &event).map_err(|source| {
                ReplayError::Inconsistent {
                    position,
                    event_type: serialized.event_type.clone(),
                    source,
                }
            })?;
        }
        if !events.is_empty() {
            let stored = u64::try_from(events.len()).unwrap_or(u64::MAX);
            state.stored_version = Some(Version::new(stored));
        }
        Ok(state)
    }
}

// ============================================================================
// Environment
// ============================================================================

/// Environment dependencies for the Event aggregate
#[derive(Clone)]
pub struct EventEnvironment {
    /// Clock for timestamps and registration windows
    pub clock: Arc<dyn Clock>,
    /// Event store for persistence
    pub event_store: Arc<dyn EventStore>,
    /// Notification delivery
    pub notifier: Arc<dyn Notifier>,
    /// Random source for draws
    pub rng: SharedRng,
    /// Who turned off organizer messages
    pub preferences: NotificationPreferences,
    /// Waiting list cap applied to events created without one
    pub default_waitlist_capacity: Option<u32>,
}

impl EventEnvironment {
    /// Creates a new `EventEnvironment`
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        event_store: Arc<dyn EventStore>,
        notifier: Arc<dyn Notifier>,
        rng: SharedRng,
    ) -> Self {
        Self {
            clock,
            event_store,
            notifier,
            rng,
            preferences: NotificationPreferences::new(),
            default_waitlist_capacity: None,
        }
    }

    /// Share notification preferences, usually the directory's
    #[must_use]
    pub fn with_preferences(mut self, preferences: NotificationPreferences) -> Self {
        self.preferences = preferences;
        self
    }

    /// Set the waiting list cap for events created without one
    #[must_use]
    pub const fn with_default_capacity(mut self, capacity: Option<u32>) -> Self {
        self.default_waitlist_capacity = capacity;
        self
    }
}

// ============================================================================
// Reducer
// ============================================================================

/// Reducer for the Event aggregate
#[derive(Clone, Debug)]
pub struct EventReducer;

impl EventReducer {
    /// Creates a new `EventReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Starts the append for everything unsaved, unless one is running
    ///
    /// The append expects the stream at the last stored version, so the
    /// stored order always matches the order events were applied in.
    fn flush(state: &mut EventState, env: &EventEnvironment) -> Option<Effect<EventAction>> {
        if state.in_flight > 0 || state.persist_stalled || state.unsaved.is_empty() {
            return None;
        }
        let stream = state.event_id.as_ref()?.stream_id();
        let events = match state
            .unsaved
            .iter()
            .map(|unsaved| SerializedEvent::from_event(&unsaved.event, None))
            .collect::<Result<Vec<_>, _>>()
        {
            Ok(events) => events,
            Err(error) => {
                tracing::error!("Failed to serialize event: {error}");
                state.persist_stalled = true;
                state.last_error = Some(error.to_string());
                return None;
            },
        };
        let count = events.len();
        let expected = state.stored_version.unwrap_or(Version::INITIAL);
        state.in_flight = count;
        tracing::debug!(count, expected = %expected, "Appending events");

        Some(append_events! {
            store: env.event_store,
            stream: stream.as_str(),
            expected_version: Some(expected),
            events: events,
            on_success: |version| Some(EventAction::EventsPersisted { version, count }),
            on_error: |error| {
                tracing::warn!(%error, "Failed to persist events");
                Some(EventAction::PersistFailed {
                    error: error.to_string(),
                })
            }
        })
    }

    /// Sends `notifications` one after another
    fn notify_all(
        notifier: &Arc<dyn Notifier>,
        notifications: Vec<Notification>,
    ) -> Option<Effect<EventAction>> {
        if notifications.is_empty() {
            return None;
        }
        Some(Effect::Sequential(
            notifications
                .into_iter()
                .map(|notification| Self::notify(notifier, notification))
                .collect(),
        ))
    }

    /// Creates the effect delivering one notification
    fn notify(notifier: &Arc<dyn Notifier>, notification: Notification) -> Effect<EventAction> {
        let notifier = Arc::clone(notifier);
        let notification_id = notification.id;
        let kind = notification.kind;
        let recipients = notification.recipients.len();

        async_effect! {
            match notifier.notify(notification).await {
                Ok(()) => {
                    LotteryMetrics::record_notification(true);
                    Some(EventAction::NotificationSent {
                        notification_id,
                        kind,
                        recipients,
                    })
                },
                Err(error) => {
                    LotteryMetrics::record_notification(false);
                    tracing::warn!(%error, "Failed to deliver notification");
                    Some(EventAction::NotificationFailed {
                        error: error.to_string(),
                    })
                },
            }
        }
    }

    fn require_details(state: &EventState) -> Result<&EventDetails, String> {
        state
            .details
            .as_ref()
            .filter(|_| state.exists())
            .ok_or_else(|| "Event does not exist".to_string())
    }

    /// Validates `CreateEvent` command
    fn validate_create_event(
        state: &EventState,
        event_id: &EventId,
        details: &EventDetails,
    ) -> Result<(), String> {
        if state.exists() {
            return Err(format!("Event {event_id} already exists"));
        }
        details.validate()
    }

    /// Validates `UpdateDetails` command
    fn validate_update_details(state: &EventState, details: &EventDetails) -> Result<(), String> {
        Self::require_details(state)?;
        details.validate()?;

        let waiting = state.pool.waiting().len();
        if let Some(capacity) = details.waitlist_capacity {
            if usize::try_from(capacity).unwrap_or(usize::MAX) < waiting {
                return Err(format!(
                    "Waitlist capacity {capacity} is below the {waiting} entrants already waiting"
                ));
            }
        }
        Ok(())
    }

    /// Validates `JoinWaitlist` command
    fn validate_join(
        state: &EventState,
        user: &UserId,
        location: Option<&GeoPoint>,
        now: DateTime<Utc>,
    ) -> Result<(), String> {
        let details = Self::require_details(state)?;

        if let Some(status) = state.pool.status_of(user) {
            return Err(PoolError::AlreadyRegistered {
                entrant: user.clone(),
                status,
            }
            .to_string());
        }

        if !details.registration_open_at(now) {
            return Err("Registration is not open".to_string());
        }

        if let Some(capacity) = details.waitlist_capacity {
            if state.pool.waiting().len() >= usize::try_from(capacity).unwrap_or(usize::MAX) {
                return Err("Waitlist is full".to_string());
            }
        }

        match location {
            None if details.geolocation_required => {
                Err("This event requires geolocation".to_string())
            },
            Some(point) if !point.is_valid() => Err("Invalid location".to_string()),
            _ => Ok(()),
        }
    }

    /// Validates that `user` currently has `expected` status
    fn validate_status(
        state: &EventState,
        user: &UserId,
        expected: EntrantStatus,
    ) -> Result<(), String> {
        Self::require_details(state)?;
        if state.pool.status_of(user) == Some(expected) {
            Ok(())
        } else {
            Err(PoolError::NotFound {
                entrant: user.clone(),
                expected,
            }
            .to_string())
        }
    }

    /// Validates `NotifyEntrants` command
    fn validate_notify(state: &EventState, audience: Audience, message: &str) -> Result<(), String> {
        Self::require_details(state)?;
        if message.trim().is_empty() {
            return Err("Message cannot be empty".to_string());
        }
        if state.pool.members(audience.status()).is_empty() {
            return Err(format!("No {} entrants to notify", audience.status()));
        }
        Ok(())
    }

    /// Applies an event to state
    ///
    /// Used for both live commands and replay.
    ///
    /// # Errors
    ///
    /// Returns the [`PoolError`] of a transition that does not fit the
    /// current pool; state is left as it was.
    pub fn apply_event(state: &mut EventState, action: &EventAction) -> Result<(), PoolError> {
        match action {
            EventAction::EventCreated {
                event_id,
                facility,
                details,
                ..
            } => {
                state.event_id = Some(event_id.clone());
                state.facility = Some(facility.clone());
                state.details = Some(details.clone());
                state.last_error = None;
            },
            EventAction::DetailsUpdated { details, .. } => {
                state.details = Some(details.clone());
                state.last_error = None;
            },
            EventAction::EntrantJoined { user, location, .. } => {
                Self::transition(state, |pool| pool.join(user.clone()))?;
                if let Some(point) = location {
                    state.locations.insert(user.clone(), *point);
                }
            },
            EventAction::EntrantLeft { user, .. } => {
                Self::transition(state, |pool| pool.leave(user))?;
                state.locations.remove(user);
            },
            EventAction::EntrantRemoved { user, .. } => {
                Self::transition(state, |pool| pool.remove(user))?;
                state.locations.remove(user);
            },
            EventAction::EntrantsDrawn { selected, .. } => {
                Self::transition(state, |pool| pool.select(selected))?;
                state.draws += 1;
            },
            EventAction::InvitationAccepted { user, .. } => {
                Self::transition(state, |pool| pool.accept(user))?;
            },
            EventAction::InvitationDeclined { user, .. } => {
                Self::transition(state, |pool| pool.decline(user))?;
            },
            EventAction::NotificationSent {
                notification_id, ..
            } => {
                state.notifications.push(*notification_id);
            },
            EventAction::EventsPersisted { version, count } => {
                let stored = (*count).min(state.unsaved.len());
                state.unsaved.drain(..stored);
                state.stored_version = Some(*version);
                state.in_flight = 0;
            },
            EventAction::PersistFailed { error } => {
                state.last_error = Some(error.clone());
                state.in_flight = 0;
                state.persist_stalled = true;
            },
            EventAction::NotificationFailed { error } | EventAction::ValidationFailed { error } => {
                state.last_error = Some(error.clone());
            },
            // Commands don't modify state
            EventAction::CreateEvent { .. }
            | EventAction::UpdateDetails { .. }
            | EventAction::JoinWaitlist { .. }
            | EventAction::LeaveWaitlist { .. }
            | EventAction::RemoveEntrant { .. }
            | EventAction::DrawEntrants { .. }
            | EventAction::AcceptInvitation { .. }
            | EventAction::DeclineInvitation { .. }
            | EventAction::NotifyEntrants { .. }
            | EventAction::RetryPersist => {},
        }
        Ok(())
    }

    fn transition(
        state: &mut EventState,
        transition: impl FnOnce(&mut EntrantPool) -> Result<(), PoolError>,
    ) -> Result<(), PoolError> {
        transition(&mut state.pool)?;
        state.last_error = None;
        Ok(())
    }

    /// Applies an event that was validated or fed back by an effect
    fn apply_live(state: &mut EventState, event: &EventAction) {
        if let Err(error) = Self::apply_event(state, event) {
            tracing::warn!(%error, "Skipping inconsistent transition");
        }
    }

    /// Validation failure: record it, no effects
    fn reject(state: &mut EventState, command: &str, error: String) -> SmallVec<[Effect<EventAction>; 4]> {
        tracing::warn!("{command} validation failed: {error}");
        Self::apply_live(state, &EventAction::ValidationFailed { error });
        SmallVec::new()
    }

    /// Apply `event` and queue it, with `notifications` to send once stored
    fn commit(
        state: &mut EventState,
        event: EventAction,
        notifications: Vec<Notification>,
        env: &EventEnvironment,
    ) -> SmallVec<[Effect<EventAction>; 4]> {
        if let Err(error) = Self::apply_event(state, &event) {
            return Self::reject(state, event.event_type(), error.to_string());
        }
        state.unsaved.push(UnsavedEvent {
            event,
            notifications,
        });
        Self::flush(state, env).into_iter().collect()
    }
}

impl Default for EventReducer {
    fn default() -> Self {
        Self::new()
    }
}

impl Reducer for EventReducer {
    type State = EventState;
    type Action = EventAction;
    type Environment = EventEnvironment;

    #[allow(clippy::too_many_lines)] // One arm per command
    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        if state.persist_stalled && action.is_command() && action != EventAction::RetryPersist {
            return Self::reject(state, "Command", STALLED_MESSAGE.to_string());
        }

        match action {
            // ========== Commands ==========
            EventAction::CreateEvent {
                event_id,
                facility,
                mut details,
            } => {
                if details.waitlist_capacity.is_none() {
                    details.waitlist_capacity = env.default_waitlist_capacity;
                }
                if let Err(error) = Self::validate_create_event(state, &event_id, &details) {
                    return Self::reject(state, "CreateEvent", error);
                }

                let event = EventAction::EventCreated {
                    event_id,
                    facility,
                    details,
                    created_at: env.clock.now(),
                };
                Self::commit(state, event, Vec::new(), env)
            },

            EventAction::UpdateDetails { details } => {
                if let Err(error) = Self::validate_update_details(state, &details) {
                    return Self::reject(state, "UpdateDetails", error);
                }

                let event = EventAction::DetailsUpdated {
                    details,
                    updated_at: env.clock.now(),
                };
                Self::commit(state, event, Vec::new(), env)
            },

            EventAction::JoinWaitlist { user, location } => {
                let now = env.clock.now();
                if let Err(error) = Self::validate_join(state, &user, location.as_ref(), now) {
                    return Self::reject(state, "JoinWaitlist", error);
                }

                LotteryMetrics::record_join();
                let event = EventAction::EntrantJoined {
                    user,
                    location,
                    joined_at: now,
                };
                Self::commit(state, event, Vec::new(), env)
            },

            EventAction::LeaveWaitlist { user } => {
                if let Err(error) = Self::validate_status(state, &user, EntrantStatus::Waiting) {
                    return Self::reject(state, "LeaveWaitlist", error);
                }

                let event = EventAction::EntrantLeft {
                    user,
                    left_at: env.clock.now(),
                };
                Self::commit(state, event, Vec::new(), env)
            },

            EventAction::RemoveEntrant { user } => {
                if let Err(error) = Self::validate_status(state, &user, EntrantStatus::Waiting) {
                    return Self::reject(state, "RemoveEntrant", error);
                }

                let event = EventAction::EntrantRemoved {
                    user,
                    removed_at: env.clock.now(),
                };
                Self::commit(state, event, Vec::new(), env)
            },

            EventAction::DrawEntrants { count } => {
                if let Err(error) = Self::require_details(state) {
                    return Self::reject(state, "DrawEntrants", error);
                }
                let outcome = match env.rng.with(|rng| draw(state.pool.waiting(), count, rng)) {
                    Ok(outcome) => outcome,
                    Err(error) => return Self::reject(state, "DrawEntrants", error.to_string()),
                };

                tracing::info!(
                    selected = outcome.selected.len(),
                    remaining = outcome.remaining.len(),
                    "Entrants drawn"
                );
                LotteryMetrics::record_draw(outcome.selected.len());

                let now = env.clock.now();
                let notifications = match (&state.event_id, &state.facility) {
                    (Some(event_id), Some(facility)) => selection_notifications(
                        event_id,
                        facility,
                        &outcome.selected,
                        &outcome.remaining,
                        now,
                    ),
                    _ => Vec::new(),
                };
                let event = EventAction::EntrantsDrawn {
                    selected: outcome.selected,
                    not_selected: outcome.remaining,
                    drawn_at: now,
                };
                Self::commit(state, event, notifications, env)
            },

            EventAction::AcceptInvitation { user } => {
                if let Err(error) = Self::validate_status(state, &user, EntrantStatus::Selected) {
                    return Self::reject(state, "AcceptInvitation", error);
                }

                LotteryMetrics::record_invitation(true);
                let event = EventAction::InvitationAccepted {
                    user,
                    accepted_at: env.clock.now(),
                };
                Self::commit(state, event, Vec::new(), env)
            },

            EventAction::DeclineInvitation { user } => {
                if let Err(error) = Self::validate_status(state, &user, EntrantStatus::Selected) {
                    return Self::reject(state, "DeclineInvitation", error);
                }

                LotteryMetrics::record_invitation(false);
                let event = EventAction::InvitationDeclined {
                    user,
                    declined_at: env.clock.now(),
                };
                Self::commit(state, event, Vec::new(), env)
            },

            EventAction::NotifyEntrants {
                audience,
                title,
                message,
            } => {
                if let Err(error) = Self::validate_notify(state, audience, &message) {
                    return Self::reject(state, "NotifyEntrants", error);
                }
                let recipients = env
                    .preferences
                    .filter(NotificationKind::Message, state.pool.members(audience.status()));
                if recipients.is_empty() {
                    let error = format!("All {} entrants turned off organizer messages", audience.status());
                    return Self::reject(state, "NotifyEntrants", error);
                }
                let (Some(event_id), Some(facility)) = (&state.event_id, &state.facility) else {
                    return SmallVec::new();
                };

                let notification = Notification::new(
                    NotificationKind::Message,
                    title,
                    message,
                    facility.clone(),
                    event_id.clone(),
                    recipients,
                    env.clock.now(),
                );
                smallvec![Self::notify(&env.notifier, notification)]
            },

            EventAction::RetryPersist => {
                if !state.persist_stalled {
                    return Self::reject(state, "RetryPersist", "No failed append to retry".to_string());
                }
                state.persist_stalled = false;
                tracing::info!(unsaved = state.unsaved.len(), "Retrying persistence");
                Self::flush(state, env).into_iter().collect()
            },

            // ========== Events (from replay or effect feedback) ==========
            EventAction::EventsPersisted { count, .. } => {
                let notifications: Vec<Notification> = state
                    .unsaved
                    .iter()
                    .take(count)
                    .flat_map(|unsaved| unsaved.notifications.iter().cloned())
                    .collect();
                Self::apply_live(state, &action);

                let mut effects: SmallVec<[Effect<EventAction>; 4]> = SmallVec::new();
                effects.extend(Self::notify_all(&env.notifier, notifications));
                effects.extend(Self::flush(state, env));
                effects
            },

            event => {
                Self::apply_live(state, &event);
                SmallVec::new()
            },
        }
    }
}
