//! QR code payloads.
//!
//! Each event's QR code encodes `cando-<event id>`. Scanning one leads the
//! entrant to the event page.

use crate::types::EventId;
use thiserror::Error;

/// Prefix identifying Can Do payloads
pub const PREFIX: &str = "cando-";

/// Errors decoding a scanned payload
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QrError {
    /// Payload does not come from this app
    #[error("Invalid QR code: missing \"{PREFIX}\" prefix")]
    MissingPrefix,

    /// Prefix present, event id missing
    #[error("Invalid QR code: no event id")]
    EmptyEventId,
}

/// Payload for an event's QR code
#[must_use]
pub fn encode(event: &EventId) -> String {
    format!("{PREFIX}{event}")
}

/// Event id from a scanned payload
///
/// # Errors
///
/// [`QrError::MissingPrefix`] for foreign payloads, [`QrError::EmptyEventId`]
/// when nothing follows the prefix.
pub fn decode(payload: &str) -> Result<EventId, QrError> {
    let id = payload
        .trim()
        .strip_prefix(PREFIX)
        .ok_or(QrError::MissingPrefix)?;
    if id.is_empty() {
        return Err(QrError::EmptyEventId);
    }
    Ok(EventId::new(id))
}
