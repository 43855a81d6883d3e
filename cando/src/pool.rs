//! Entrant pool: the per-event list transition state machine.
//!
//! ```text
//! join ──► Waiting ──draw──► Selected ──accept──► Enrolled
//!             │                  │
//!        leave/remove         decline
//!             ▼                  ▼
//!          (gone)            Cancelled
//! ```
//!
//! Every entrant sits in at most one list. Enrolled and Cancelled are
//! terminal: such entrants can neither re-join nor be drawn again.

use crate::draw::{DrawError, draw};
use crate::types::{EntrantStatus, UserId};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from pool transitions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// Draw count outside `1..=waiting`
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The entrant is not in the list the transition starts from
    #[error("Entrant {entrant} is not {expected}")]
    NotFound {
        /// Entrant the transition was requested for
        entrant: UserId,
        /// List the entrant was expected in
        expected: EntrantStatus,
    },

    /// The entrant already has a status on this event
    #[error("Entrant {entrant} is already registered ({status})")]
    AlreadyRegistered {
        /// Entrant that tried to join
        entrant: UserId,
        /// Current status
        status: EntrantStatus,
    },
}

impl From<DrawError> for PoolError {
    fn from(error: DrawError) -> Self {
        match error {
            DrawError::InvalidArgument(message) => Self::InvalidArgument(message),
        }
    }
}

/// The four entrant lists of one event
///
/// Lists keep insertion order: waiting is first come first listed, selected
/// is in draw order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntrantPool {
    waiting: Vec<UserId>,
    selected: Vec<UserId>,
    enrolled: Vec<UserId>,
    cancelled: Vec<UserId>,
}

impl EntrantPool {
    /// Creates an empty pool
    #[must_use]
    pub const fn new() -> Self {
        Self {
            waiting: Vec::new(),
            selected: Vec::new(),
            enrolled: Vec::new(),
            cancelled: Vec::new(),
        }
    }

    /// Add an entrant to the waiting list
    ///
    /// # Errors
    ///
    /// [`PoolError::AlreadyRegistered`] if the entrant is in any list.
    pub fn join(&mut self, entrant: UserId) -> Result<(), PoolError> {
        if let Some(status) = self.status_of(&entrant) {
            return Err(PoolError::AlreadyRegistered { entrant, status });
        }
        self.waiting.push(entrant);
        Ok(())
    }

    /// Entrant withdraws from the waiting list
    ///
    /// # Errors
    ///
    /// [`PoolError::NotFound`] if the entrant is not waiting.
    pub fn leave(&mut self, entrant: &UserId) -> Result<(), PoolError> {
        take(&mut self.waiting, entrant, EntrantStatus::Waiting)
    }

    /// Organizer removes an entrant from the waiting list
    ///
    /// # Errors
    ///
    /// [`PoolError::NotFound`] if the entrant is not waiting.
    pub fn remove(&mut self, entrant: &UserId) -> Result<(), PoolError> {
        take(&mut self.waiting, entrant, EntrantStatus::Waiting)
    }

    /// Move `k` random waiting entrants to Selected
    ///
    /// Returns the newly selected entrants in draw order. On error the pool
    /// is unchanged.
    ///
    /// # Errors
    ///
    /// [`PoolError::InvalidArgument`] if `k <= 0` or `k` exceeds the number
    /// waiting.
    pub fn draw<R: Rng + ?Sized>(&mut self, k: i64, rng: &mut R) -> Result<Vec<UserId>, PoolError> {
        let outcome = draw(&self.waiting, k, rng)?;
        self.waiting = outcome.remaining;
        self.selected.extend(outcome.selected.iter().cloned());
        Ok(outcome.selected)
    }

    /// Move specific waiting entrants to Selected
    ///
    /// Applies the outcome of an earlier draw when replaying history. Either
    /// every entrant moves or none does.
    ///
    /// # Errors
    ///
    /// [`PoolError::NotFound`] for the first entrant that is not waiting.
    pub fn select(&mut self, entrants: &[UserId]) -> Result<(), PoolError> {
        if let Some(missing) = entrants.iter().find(|e| !self.waiting.contains(e)) {
            return Err(PoolError::NotFound {
                entrant: missing.clone(),
                expected: EntrantStatus::Waiting,
            });
        }
        self.waiting.retain(|e| !entrants.contains(e));
        self.selected.extend(entrants.iter().cloned());
        Ok(())
    }

    /// Selected entrant accepts the invitation
    ///
    /// # Errors
    ///
    /// [`PoolError::NotFound`] if the entrant is not selected.
    pub fn accept(&mut self, entrant: &UserId) -> Result<(), PoolError> {
        take(&mut self.selected, entrant, EntrantStatus::Selected)?;
        self.enrolled.push(entrant.clone());
        Ok(())
    }

    /// Selected entrant declines the invitation
    ///
    /// # Errors
    ///
    /// [`PoolError::NotFound`] if the entrant is not selected.
    pub fn decline(&mut self, entrant: &UserId) -> Result<(), PoolError> {
        take(&mut self.selected, entrant, EntrantStatus::Selected)?;
        self.cancelled.push(entrant.clone());
        Ok(())
    }

    /// Current status of an entrant, `None` if never joined (or left)
    #[must_use]
    pub fn status_of(&self, entrant: &UserId) -> Option<EntrantStatus> {
        [
            EntrantStatus::Waiting,
            EntrantStatus::Selected,
            EntrantStatus::Enrolled,
            EntrantStatus::Cancelled,
        ]
        .into_iter()
        .find(|status| self.members(*status).contains(entrant))
    }

    /// Entrants in the list for `status`
    #[must_use]
    pub fn members(&self, status: EntrantStatus) -> &[UserId] {
        match status {
            EntrantStatus::Waiting => &self.waiting,
            EntrantStatus::Selected => &self.selected,
            EntrantStatus::Enrolled => &self.enrolled,
            EntrantStatus::Cancelled => &self.cancelled,
        }
    }

    /// Waiting entrants
    #[must_use]
    pub fn waiting(&self) -> &[UserId] {
        &self.waiting
    }

    /// Selected entrants
    #[must_use]
    pub fn selected(&self) -> &[UserId] {
        &self.selected
    }

    /// Enrolled entrants
    #[must_use]
    pub fn enrolled(&self) -> &[UserId] {
        &self.enrolled
    }

    /// Cancelled entrants
    #[must_use]
    pub fn cancelled(&self) -> &[UserId] {
        &self.cancelled
    }

    /// Total number of entrants across all lists
    #[must_use]
    pub fn len(&self) -> usize {
        self.waiting.len() + self.selected.len() + self.enrolled.len() + self.cancelled.len()
    }

    /// True if no entrant has any status
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the entrant is in any list
    #[must_use]
    pub fn contains(&self, entrant: &UserId) -> bool {
        self.status_of(entrant).is_some()
    }
}

fn take(list: &mut Vec<UserId>, entrant: &UserId, expected: EntrantStatus) -> Result<(), PoolError> {
    let Some(index) = list.iter().position(|e| e == entrant) else {
        return Err(PoolError::NotFound {
            entrant: entrant.clone(),
            expected,
        });
    };
    list.remove(index);
    Ok(())
}
