//! Lottery metrics.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `lottery.draws` - Draws performed
//! - `lottery.entrants.selected` - Entrants moved from Waiting to Selected
//! - `lottery.entrants.joined` - Entrants who joined a waiting list
//! - `lottery.invitations{outcome}` - Invitation answers (accepted, declined)
//! - `lottery.notifications{result}` - Notification deliveries (sent, failed)

use metrics::{counter, describe_counter};

/// Draws performed
pub const DRAWS: &str = "lottery.draws";
/// Entrants selected across all draws
pub const ENTRANTS_SELECTED: &str = "lottery.entrants.selected";
/// Entrants who joined a waiting list
pub const ENTRANTS_JOINED: &str = "lottery.entrants.joined";
/// Invitation answers, labelled by outcome
pub const INVITATIONS: &str = "lottery.invitations";
/// Notification deliveries, labelled by result
pub const NOTIFICATIONS: &str = "lottery.notifications";

/// Register descriptions for all lottery metrics.
///
/// Call once at startup, alongside the runtime's `register_metrics`.
pub fn register_lottery_metrics() {
    describe_counter!(DRAWS, "Total number of lottery draws");
    describe_counter!(ENTRANTS_SELECTED, "Total number of entrants selected by draws");
    describe_counter!(ENTRANTS_JOINED, "Total number of waiting list joins");
    describe_counter!(INVITATIONS, "Invitation answers by outcome (accepted, declined)");
    describe_counter!(NOTIFICATIONS, "Notification deliveries by result (sent, failed)");
}

/// Recording helpers for lottery metrics
pub struct LotteryMetrics;

impl LotteryMetrics {
    /// Record a draw that selected `selected` entrants
    pub fn record_draw(selected: usize) {
        counter!(DRAWS).increment(1);
        counter!(ENTRANTS_SELECTED).increment(u64::try_from(selected).unwrap_or(u64::MAX));
    }

    /// Record a waiting list join
    pub fn record_join() {
        counter!(ENTRANTS_JOINED).increment(1);
    }

    /// Record an invitation answer
    pub fn record_invitation(accepted: bool) {
        let outcome = if accepted { "accepted" } else { "declined" };
        counter!(INVITATIONS, "outcome" => outcome).increment(1);
    }

    /// Record a notification delivery attempt
    pub fn record_notification(delivered: bool) {
        let result = if delivered { "sent" } else { "failed" };
        counter!(NOTIFICATIONS, "result" => result).increment(1);
    }
}
