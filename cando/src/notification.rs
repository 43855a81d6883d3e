//! Notifications sent to entrants.
//!
//! Delivery sits behind the [`Notifier`] trait so reducers can request it
//! as an effect. [`LogNotifier`] writes to the tracing log and
//! [`RecordingNotifier`] keeps every notification in memory for tests and
//! the demo. Users can turn off organizer messages; the shared
//! [`NotificationPreferences`] records who did.

use crate::types::{EntrantStatus, EventId, FacilityId, NotificationId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use thiserror::Error;

/// Title of the notifications sent after a draw
pub const SELECTION_TITLE: &str = "Selection Update";

/// Body sent to drawn entrants
pub const SELECTED_MESSAGE: &str = "You have been selected to participate!";

/// Body sent to entrants left on the waiting list
pub const NOT_SELECTED_MESSAGE: &str =
    "Unfortunately, you were not selected this time. Stay tuned for future opportunities!";

/// What a notification is about
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationKind {
    /// Free-form organizer message
    Message,
    /// Recipient was drawn
    Selected,
    /// Recipient was not drawn
    NotSelected,
}

/// Which entrants of an event a message is for
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Audience {
    /// Everyone still on the waiting list
    Waiting,
    /// Drawn entrants who have not answered
    Selected,
    /// Entrants who accepted
    Enrolled,
    /// Entrants who declined
    Cancelled,
}

impl Audience {
    /// The entrant list this audience maps to
    #[must_use]
    pub const fn status(self) -> EntrantStatus {
        match self {
            Self::Waiting => EntrantStatus::Waiting,
            Self::Selected => EntrantStatus::Selected,
            Self::Enrolled => EntrantStatus::Enrolled,
            Self::Cancelled => EntrantStatus::Cancelled,
        }
    }
}

/// A notification addressed to a group of users
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Unique id
    pub id: NotificationId,
    /// Kind
    pub kind: NotificationKind,
    /// Title
    pub title: String,
    /// Body
    pub content: String,
    /// Sending facility
    pub facility: FacilityId,
    /// Event the notification is about
    pub event: EventId,
    /// Recipients
    pub recipients: Vec<UserId>,
    /// When it was created
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Creates a notification with a fresh id
    #[must_use]
    pub fn new(
        kind: NotificationKind,
        title: impl Into<String>,
        content: impl Into<String>,
        facility: FacilityId,
        event: EventId,
        recipients: Vec<UserId>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: NotificationId::new(),
            kind,
            title: title.into(),
            content: content.into(),
            facility,
            event,
            recipients,
            created_at,
        }
    }
}

/// The notifications announcing a draw's result
///
/// One for the drawn entrants and one for those still waiting. A group with
/// no members gets no notification.
#[must_use]
pub fn selection_notifications(
    event: &EventId,
    facility: &FacilityId,
    selected: &[UserId],
    not_selected: &[UserId],
    now: DateTime<Utc>,
) -> Vec<Notification> {
    [
        (NotificationKind::Selected, SELECTED_MESSAGE, selected),
        (NotificationKind::NotSelected, NOT_SELECTED_MESSAGE, not_selected),
    ]
    .into_iter()
    .filter(|(_, _, recipients)| !recipients.is_empty())
    .map(|(kind, message, recipients)| {
        Notification::new(
            kind,
            SELECTION_TITLE,
            message,
            facility.clone(),
            event.clone(),
            recipients.to_vec(),
            now,
        )
    })
    .collect()
}

/// Users who turned off organizer messages
///
/// Clones share one set, so the directory and the event aggregates see the
/// same choices. Selection results are always delivered.
#[derive(Clone, Debug, Default)]
pub struct NotificationPreferences {
    opted_out: Arc<RwLock<HashSet<UserId>>>,
}

impl NotificationPreferences {
    /// Everyone receives everything
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Turn organizer messages on or off for `user`
    pub fn set_enabled(&self, user: &UserId, enabled: bool) {
        let mut opted_out = self.opted_out.write().unwrap_or_else(PoisonError::into_inner);
        if enabled {
            opted_out.remove(user);
        } else {
            opted_out.insert(user.clone());
        }
    }

    /// Whether `user` receives notifications of `kind`
    #[must_use]
    pub fn allows(&self, user: &UserId, kind: NotificationKind) -> bool {
        kind != NotificationKind::Message
            || !self
                .opted_out
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .contains(user)
    }

    /// The members of `recipients` who receive notifications of `kind`
    #[must_use]
    pub fn filter(&self, kind: NotificationKind, recipients: &[UserId]) -> Vec<UserId> {
        recipients
            .iter()
            .filter(|user| self.allows(user, kind))
            .cloned()
            .collect()
    }
}

/// Delivery failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    /// Backend refused or failed to deliver
    #[error("Notification delivery failed: {0}")]
    DeliveryFailed(String),

    /// Notification has no recipients
    #[error("Notification {0} has no recipients")]
    NoRecipients(NotificationId),
}

/// Delivers notifications
pub trait Notifier: Send + Sync {
    /// Deliver one notification to all its recipients
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError`] if delivery fails.
    fn notify(
        &self,
        notification: Notification,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + '_>>;
}

/// Notifier that logs each notification
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(
        &self,
        notification: Notification,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + '_>> {
        Box::pin(async move {
            if notification.recipients.is_empty() {
                return Err(NotifyError::NoRecipients(notification.id));
            }
            tracing::info!(
                id = %notification.id,
                event = %notification.event,
                kind = ?notification.kind,
                recipients = notification.recipients.len(),
                title = %notification.title,
                "Notification sent"
            );
            Ok(())
        })
    }
}

/// Notifier that keeps what it was asked to send
///
/// `fail_next` makes upcoming deliveries fail, for exercising error paths.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    failures_remaining: Mutex<usize>,
}

impl RecordingNotifier {
    /// Creates an empty recorder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` deliveries fail
    pub fn fail_next(&self, count: usize) {
        if let Ok(mut remaining) = self.failures_remaining.lock() {
            *remaining = count;
        }
    }

    /// Everything delivered so far, oldest first
    #[must_use]
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    /// Notifications delivered to `user`
    #[must_use]
    pub fn received_by(&self, user: &UserId) -> Vec<Notification> {
        self.sent()
            .into_iter()
            .filter(|n| n.recipients.contains(user))
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(
        &self,
        notification: Notification,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + '_>> {
        let result = self.record(notification);
        Box::pin(async move { result })
    }
}

impl RecordingNotifier {
    fn record(&self, notification: Notification) -> Result<(), NotifyError> {
        if let Ok(mut remaining) = self.failures_remaining.lock() {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(NotifyError::DeliveryFailed("injected failure".to_string()));
            }
        }
        let mut sent = self
            .sent
            .lock()
            .map_err(|_| NotifyError::DeliveryFailed("recorder lock poisoned".to_string()))?;
        sent.push(notification);
        Ok(())
    }
}
