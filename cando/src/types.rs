//! Core domain types for Can Do.
//!
//! Users join the waiting lists of events hosted by facilities. Relations
//! between users, facilities and events are held as ids only; the
//! [`crate::directory::Directory`] resolves them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use waitlist_core::stream::StreamId;

/// Identifier of a user (the device/account id)
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    /// Creates a new `UserId` from a string
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the inner string value
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a facility
///
/// A facility shares its id with the user who owns it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FacilityId(String);

impl FacilityId {
    /// Creates a new `FacilityId` from a string
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The facility id owned by `owner`
    #[must_use]
    pub fn owned_by(owner: &UserId) -> Self {
        Self(owner.as_str().to_string())
    }

    /// Returns the inner string value
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FacilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of an event
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(String);

impl EventId {
    /// Creates a new `EventId` from a string
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Creates a random `EventId`
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Returns the inner string value
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Event store stream holding this event's history (`event-<id>`)
    #[must_use]
    pub fn stream_id(&self) -> StreamId {
        StreamId::new(format!("event-{}", self.0))
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a notification
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationId(Uuid);

impl NotificationId {
    /// Creates a new random `NotificationId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `NotificationId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for NotificationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where an entrant currently sits in an event's lottery
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntrantStatus {
    /// On the waiting list, eligible for a draw
    Waiting,
    /// Drawn, invitation pending
    Selected,
    /// Accepted the invitation
    Enrolled,
    /// Declined the invitation
    Cancelled,
}

impl fmt::Display for EntrantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Waiting => write!(f, "Waiting"),
            Self::Selected => write!(f, "Selected"),
            Self::Enrolled => write!(f, "Enrolled"),
            Self::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// A WGS84 coordinate
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees
    pub latitude: f64,
    /// Longitude in degrees
    pub longitude: f64,
}

impl GeoPoint {
    /// Creates a new `GeoPoint`
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Whether both coordinates are within their valid ranges
    #[must_use]
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Organizer-editable description of an event
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventDetails {
    /// Display name
    pub name: String,
    /// Free-form description
    pub description: String,
    /// Registration opens (inclusive)
    pub registration_opens: DateTime<Utc>,
    /// Registration closes (inclusive)
    pub registration_closes: DateTime<Utc>,
    /// Event start
    pub starts_at: DateTime<Utc>,
    /// Event end
    pub ends_at: DateTime<Utc>,
    /// Maximum size of the waiting list, unlimited when `None`
    pub waitlist_capacity: Option<u32>,
    /// Entrants must share a location to join
    pub geolocation_required: bool,
}

impl EventDetails {
    /// Whether registration is open at `now`
    #[must_use]
    pub fn registration_open_at(&self, now: DateTime<Utc>) -> bool {
        self.registration_opens <= now && now <= self.registration_closes
    }

    /// Checks the details are internally consistent
    ///
    /// # Errors
    ///
    /// Returns a description of the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Event name cannot be empty".to_string());
        }
        if self.registration_closes < self.registration_opens {
            return Err("Registration cannot close before it opens".to_string());
        }
        if self.ends_at < self.starts_at {
            return Err("Event cannot end before it starts".to_string());
        }
        if self.waitlist_capacity == Some(0) {
            return Err("Waitlist capacity must be greater than zero".to_string());
        }
        Ok(())
    }
}

/// A registered user
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// User id
    pub id: UserId,
    /// Display name
    pub name: String,
    /// Contact email
    pub email: String,
    /// Contact phone number
    pub phone: Option<String>,
    /// Administrators may browse and remove any profile, facility or event
    pub is_admin: bool,
    /// The facility this user organizes, if any
    pub facility: Option<FacilityId>,
    /// Events whose waiting list the user joined
    pub events_joined: Vec<EventId>,
    /// Events the user enrolled in
    pub events_enrolled: Vec<EventId>,
    /// Last location the user shared
    pub location: Option<GeoPoint>,
    /// Receives messages from organizers
    pub notifications_enabled: bool,
}

impl User {
    /// Creates a user with no facility and no event history
    #[must_use]
    pub fn new(id: UserId, name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            email: email.into(),
            phone: None,
            is_admin: false,
            facility: None,
            events_joined: Vec::new(),
            events_enrolled: Vec::new(),
            location: None,
            notifications_enabled: true,
        }
    }
}

/// An organizer's venue
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Facility {
    /// Facility id (equal to the owner's user id)
    pub id: FacilityId,
    /// Organizer owning the facility
    pub owner: UserId,
    /// Display name
    pub name: String,
    /// Street address
    pub address: String,
    /// Events hosted here, oldest first
    pub events: Vec<EventId>,
}
