//! Metric names and recorders used by the runtime.
//!
//! Metrics go through the `metrics` facade; without an installed recorder
//! every call is a no-op. Binaries that install an exporter should call
//! [`register_metrics`] once so descriptions show up next to the values.

use metrics::{describe_counter, describe_histogram};
use std::time::Duration;

// Re-export metrics macros for use in other crates
pub use metrics::{counter, gauge, histogram};

/// Actions processed by a store (commands and feedback events).
pub const ACTIONS_PROCESSED: &str = "store.actions.processed";
/// Effects executed, labelled by `type`.
pub const EFFECTS_EXECUTED: &str = "store.effects.executed";
/// Time spent inside a reducer call.
pub const REDUCER_DURATION: &str = "store.reducer.duration_seconds";
/// Actions rejected because the store was shutting down.
pub const SHUTDOWN_REJECTED: &str = "store.shutdown.rejected_actions";
/// Retry attempts, labelled by `operation`.
pub const RETRY_ATTEMPT: &str = "store.retry.attempt";
/// Operations that succeeded after at least one retry.
pub const RETRY_SUCCESS: &str = "store.retry.success";
/// Operations that gave up after the last retry.
pub const RETRY_EXHAUSTED: &str = "store.retry.exhausted";

/// Register all runtime metric descriptions.
pub fn register_metrics() {
    describe_counter!(ACTIONS_PROCESSED, "Total number of actions sent to stores");
    describe_counter!(EFFECTS_EXECUTED, "Total number of effects executed, by type");
    describe_histogram!(REDUCER_DURATION, "Time taken to execute reducers");
    describe_counter!(
        SHUTDOWN_REJECTED,
        "Actions rejected because the store was shutting down"
    );
    describe_counter!(RETRY_ATTEMPT, "Total number of retry attempts");
    describe_counter!(RETRY_SUCCESS, "Operations that succeeded after retrying");
    describe_counter!(RETRY_EXHAUSTED, "Operations that failed after exhausting retries");
}

/// Store metrics recorder.
pub struct StoreMetrics;

impl StoreMetrics {
    /// Record one reducer invocation.
    pub fn record_action(duration: Duration) {
        counter!(ACTIONS_PROCESSED).increment(1);
        histogram!(REDUCER_DURATION).record(duration.as_secs_f64());
    }

    /// Record one executed effect.
    pub fn record_effect(kind: &'static str) {
        counter!(EFFECTS_EXECUTED, "type" => kind).increment(1);
    }

    /// Record an action rejected during shutdown.
    pub fn record_rejected() {
        counter!(SHUTDOWN_REJECTED).increment(1);
    }
}

/// Retry metrics recorder.
pub struct RetryMetrics;

impl RetryMetrics {
    /// Record a failed attempt that will be retried.
    pub fn record_attempt(operation: &str, attempt: usize) {
        counter!(
            RETRY_ATTEMPT,
            "operation" => operation.to_string(),
            "attempt" => attempt.to_string()
        )
        .increment(1);
    }

    /// Record success after `attempts` retries.
    pub fn record_success(operation: &str, attempts: usize) {
        counter!(
            RETRY_SUCCESS,
            "operation" => operation.to_string(),
            "attempts" => attempts.to_string()
        )
        .increment(1);
    }

    /// Record an operation abandoned after `attempts` retries.
    pub fn record_exhausted(operation: &str, attempts: usize) {
        counter!(
            RETRY_EXHAUSTED,
            "operation" => operation.to_string(),
            "attempts" => attempts.to_string()
        )
        .increment(1);
    }
}
