//! Users, facilities and events, related by id.
//!
//! The directory owns every record; relations are ids resolved through it,
//! so there are no reference cycles between users, facilities and events.
//! The signed-in user is passed explicitly as a [`Session`].

use crate::notification::NotificationPreferences;
use crate::types::{EventDetails, EventId, Facility, FacilityId, GeoPoint, User, UserId};
use std::collections::HashMap;
use thiserror::Error;

/// Directory lookup and consistency errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    /// No user with this id
    #[error("Unknown user: {0}")]
    UnknownUser(UserId),

    /// No facility with this id
    #[error("Unknown facility: {0}")]
    UnknownFacility(FacilityId),

    /// No event with this id
    #[error("Unknown event: {0}")]
    UnknownEvent(EventId),

    /// A user with this id is already registered
    #[error("User {0} is already registered")]
    DuplicateUser(UserId),

    /// The user already owns a facility
    #[error("User {0} already owns a facility")]
    FacilityExists(UserId),

    /// The session user may not perform the operation
    #[error("User {user} may not manage event {event}")]
    NotPermitted {
        /// Session user
        user: UserId,
        /// Event the operation targets
        event: EventId,
    },

    /// The operation is reserved for administrators
    #[error("Only administrators can delete users")]
    AdminRequired(UserId),

    /// Event details failed validation
    #[error("Invalid event details: {0}")]
    InvalidDetails(String),
}

/// What went with a deleted user
#[derive(Clone, Debug, PartialEq)]
pub struct UserRemoval {
    /// The deleted record; its `events_joined` and `events_enrolled` name
    /// the events whose entrant lists still mention the user
    pub user: User,
    /// The user's facility, if they organized one
    pub facility: Option<Facility>,
    /// Events hosted by that facility
    pub events: Vec<EventRecord>,
}

/// An event's catalogue entry
#[derive(Clone, Debug, PartialEq)]
pub struct EventRecord {
    /// Event id
    pub id: EventId,
    /// Hosting facility
    pub facility: FacilityId,
    /// Current details
    pub details: EventDetails,
}

/// Arena of users, facilities and events
#[derive(Debug, Default)]
pub struct Directory {
    users: HashMap<UserId, User>,
    facilities: HashMap<FacilityId, Facility>,
    events: HashMap<EventId, EventRecord>,
    preferences: NotificationPreferences,
}

impl Directory {
    /// Creates an empty directory
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new user
    ///
    /// # Errors
    ///
    /// [`DirectoryError::DuplicateUser`] if the id is taken.
    pub fn register_user(&mut self, user: User) -> Result<(), DirectoryError> {
        if self.users.contains_key(&user.id) {
            return Err(DirectoryError::DuplicateUser(user.id));
        }
        tracing::debug!(user = %user.id, "User registered");
        self.preferences.set_enabled(&user.id, user.notifications_enabled);
        self.users.insert(user.id.clone(), user);
        Ok(())
    }

    /// Delete a user, their facility and its events
    ///
    /// Entrant lists live in the event aggregates; the returned user's
    /// event history says which ones to update.
    ///
    /// # Errors
    ///
    /// [`DirectoryError::AdminRequired`] unless the session user is an
    /// administrator, [`DirectoryError::UnknownUser`] if `id` is not
    /// registered.
    pub fn remove_user(&mut self, session: &Session, id: &UserId) -> Result<UserRemoval, DirectoryError> {
        if !self.user(&session.user).is_some_and(|user| user.is_admin) {
            return Err(DirectoryError::AdminRequired(session.user.clone()));
        }
        if !self.users.contains_key(id) {
            return Err(DirectoryError::UnknownUser(id.clone()));
        }

        let facility = self.facilities.remove(&FacilityId::owned_by(id));
        let mut events = Vec::new();
        if let Some(facility) = &facility {
            for event in &facility.events {
                events.extend(self.remove_event(event).ok());
            }
        }
        self.preferences.set_enabled(id, true);
        let user = self
            .users
            .remove(id)
            .ok_or_else(|| DirectoryError::UnknownUser(id.clone()))?;

        tracing::info!(
            user = %id,
            removed_by = %session.user,
            events = events.len(),
            "User deleted"
        );
        Ok(UserRemoval {
            user,
            facility,
            events,
        })
    }

    /// Turn organizer messages on or off for a user
    ///
    /// # Errors
    ///
    /// [`DirectoryError::UnknownUser`] if the user is not registered.
    pub fn set_notifications_enabled(&mut self, id: &UserId, enabled: bool) -> Result<(), DirectoryError> {
        self.user_mut(id)?.notifications_enabled = enabled;
        self.preferences.set_enabled(id, enabled);
        Ok(())
    }

    /// Handle on the notification choices, for event environments
    #[must_use]
    pub fn preferences(&self) -> NotificationPreferences {
        self.preferences.clone()
    }

    /// Look up a user
    #[must_use]
    pub fn user(&self, id: &UserId) -> Option<&User> {
        self.users.get(id)
    }

    /// Replace a user's contact details
    ///
    /// # Errors
    ///
    /// [`DirectoryError::UnknownUser`] if the user is not registered.
    pub fn update_profile(
        &mut self,
        id: &UserId,
        name: String,
        email: String,
        phone: Option<String>,
    ) -> Result<(), DirectoryError> {
        let user = self.user_mut(id)?;
        user.name = name;
        user.email = email;
        user.phone = phone;
        Ok(())
    }

    /// Record the user's last known location
    ///
    /// # Errors
    ///
    /// [`DirectoryError::UnknownUser`] if the user is not registered.
    pub fn set_location(&mut self, id: &UserId, location: GeoPoint) -> Result<(), DirectoryError> {
        self.user_mut(id)?.location = Some(location);
        Ok(())
    }

    /// Create the facility owned by `owner`
    ///
    /// A user owns at most one facility and its id is the owner's id.
    ///
    /// # Errors
    ///
    /// [`DirectoryError::UnknownUser`] if the owner is not registered,
    /// [`DirectoryError::FacilityExists`] if they already own one.
    pub fn create_facility(
        &mut self,
        owner: &UserId,
        name: impl Into<String>,
        address: impl Into<String>,
    ) -> Result<FacilityId, DirectoryError> {
        let id = FacilityId::owned_by(owner);
        if self.facilities.contains_key(&id) {
            return Err(DirectoryError::FacilityExists(owner.clone()));
        }
        self.user_mut(owner)?.facility = Some(id.clone());
        self.facilities.insert(
            id.clone(),
            Facility {
                id: id.clone(),
                owner: owner.clone(),
                name: name.into(),
                address: address.into(),
                events: Vec::new(),
            },
        );
        tracing::debug!(facility = %id, "Facility created");
        Ok(id)
    }

    /// The facility owned by `owner`
    #[must_use]
    pub fn facility_of(&self, owner: &UserId) -> Option<&Facility> {
        self.facilities.get(&FacilityId::owned_by(owner))
    }

    /// Look up a facility
    #[must_use]
    pub fn facility(&self, id: &FacilityId) -> Option<&Facility> {
        self.facilities.get(id)
    }

    /// Catalogue a new event under `facility`
    ///
    /// # Errors
    ///
    /// [`DirectoryError::InvalidDetails`] if the details do not validate,
    /// [`DirectoryError::UnknownFacility`] if the facility does not exist.
    pub fn add_event(
        &mut self,
        facility: &FacilityId,
        details: EventDetails,
    ) -> Result<EventId, DirectoryError> {
        details.validate().map_err(DirectoryError::InvalidDetails)?;
        let host = self
            .facilities
            .get_mut(facility)
            .ok_or_else(|| DirectoryError::UnknownFacility(facility.clone()))?;
        let id = EventId::generate();
        host.events.push(id.clone());
        self.events.insert(
            id.clone(),
            EventRecord {
                id: id.clone(),
                facility: facility.clone(),
                details,
            },
        );
        Ok(id)
    }

    /// Look up an event
    #[must_use]
    pub fn event(&self, id: &EventId) -> Option<&EventRecord> {
        self.events.get(id)
    }

    /// Replace an event's catalogued details
    ///
    /// # Errors
    ///
    /// [`DirectoryError::InvalidDetails`] if the details do not validate,
    /// [`DirectoryError::UnknownEvent`] if the event does not exist.
    pub fn update_event(&mut self, id: &EventId, details: EventDetails) -> Result<(), DirectoryError> {
        details.validate().map_err(DirectoryError::InvalidDetails)?;
        let record = self
            .events
            .get_mut(id)
            .ok_or_else(|| DirectoryError::UnknownEvent(id.clone()))?;
        record.details = details;
        Ok(())
    }

    /// Remove an event and every reference to it
    ///
    /// # Errors
    ///
    /// [`DirectoryError::UnknownEvent`] if the event does not exist.
    pub fn remove_event(&mut self, id: &EventId) -> Result<EventRecord, DirectoryError> {
        let record = self
            .events
            .remove(id)
            .ok_or_else(|| DirectoryError::UnknownEvent(id.clone()))?;
        if let Some(facility) = self.facilities.get_mut(&record.facility) {
            facility.events.retain(|e| e != id);
        }
        for user in self.users.values_mut() {
            user.events_joined.retain(|e| e != id);
            user.events_enrolled.retain(|e| e != id);
        }
        Ok(record)
    }

    /// Events hosted by `facility`, oldest first
    ///
    /// # Errors
    ///
    /// [`DirectoryError::UnknownFacility`] if the facility does not exist.
    pub fn events_of(&self, facility: &FacilityId) -> Result<Vec<&EventRecord>, DirectoryError> {
        let host = self
            .facilities
            .get(facility)
            .ok_or_else(|| DirectoryError::UnknownFacility(facility.clone()))?;
        Ok(host.events.iter().filter_map(|id| self.events.get(id)).collect())
    }

    /// The facility hosting an event
    #[must_use]
    pub fn facility_of_event(&self, event: &EventId) -> Option<&Facility> {
        self.events
            .get(event)
            .and_then(|record| self.facilities.get(&record.facility))
    }

    /// The organizer of an event
    #[must_use]
    pub fn owner_of_event(&self, event: &EventId) -> Option<&UserId> {
        self.facility_of_event(event).map(|facility| &facility.owner)
    }

    /// Note that `user` joined the waiting list of `event`
    ///
    /// # Errors
    ///
    /// [`DirectoryError::UnknownUser`] or [`DirectoryError::UnknownEvent`].
    pub fn record_joined(&mut self, user: &UserId, event: &EventId) -> Result<(), DirectoryError> {
        self.require_event(event)?;
        let user = self.user_mut(user)?;
        if !user.events_joined.contains(event) {
            user.events_joined.push(event.clone());
        }
        Ok(())
    }

    /// Note that `user` left the waiting list of `event`
    ///
    /// # Errors
    ///
    /// [`DirectoryError::UnknownUser`] if the user is not registered.
    pub fn record_left(&mut self, user: &UserId, event: &EventId) -> Result<(), DirectoryError> {
        self.user_mut(user)?.events_joined.retain(|e| e != event);
        Ok(())
    }

    /// Note that `user` enrolled in `event`
    ///
    /// # Errors
    ///
    /// [`DirectoryError::UnknownUser`] or [`DirectoryError::UnknownEvent`].
    pub fn record_enrolled(&mut self, user: &UserId, event: &EventId) -> Result<(), DirectoryError> {
        self.require_event(event)?;
        let user = self.user_mut(user)?;
        user.events_joined.retain(|e| e != event);
        if !user.events_enrolled.contains(event) {
            user.events_enrolled.push(event.clone());
        }
        Ok(())
    }

    fn user_mut(&mut self, id: &UserId) -> Result<&mut User, DirectoryError> {
        self.users
            .get_mut(id)
            .ok_or_else(|| DirectoryError::UnknownUser(id.clone()))
    }

    fn require_event(&self, id: &EventId) -> Result<(), DirectoryError> {
        if self.events.contains_key(id) {
            Ok(())
        } else {
            Err(DirectoryError::UnknownEvent(id.clone()))
        }
    }
}

/// The signed-in user
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    /// Who is acting
    pub user: UserId,
}

impl Session {
    /// Creates a session for `user`
    #[must_use]
    pub const fn new(user: UserId) -> Self {
        Self { user }
    }

    /// The session user's facility
    ///
    /// # Errors
    ///
    /// [`DirectoryError::UnknownUser`] if the user is not registered,
    /// [`DirectoryError::UnknownFacility`] if they own no facility.
    pub fn require_organizer<'a>(&self, directory: &'a Directory) -> Result<&'a Facility, DirectoryError> {
        if directory.user(&self.user).is_none() {
            return Err(DirectoryError::UnknownUser(self.user.clone()));
        }
        directory
            .facility_of(&self.user)
            .ok_or_else(|| DirectoryError::UnknownFacility(FacilityId::owned_by(&self.user)))
    }

    /// Check the session user may manage `event`: its organizer or an admin
    ///
    /// # Errors
    ///
    /// [`DirectoryError::UnknownEvent`] if the event does not exist,
    /// [`DirectoryError::NotPermitted`] if the user is neither.
    pub fn require_manager(&self, directory: &Directory, event: &EventId) -> Result<(), DirectoryError> {
        let owner = directory
            .owner_of_event(event)
            .ok_or_else(|| DirectoryError::UnknownEvent(event.clone()))?;
        let is_admin = directory.user(&self.user).is_some_and(|user| user.is_admin);
        if *owner == self.user || is_admin {
            Ok(())
        } else {
            Err(DirectoryError::NotPermitted {
                user: self.user.clone(),
                event: event.clone(),
            })
        }
    }
}
