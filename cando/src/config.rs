//! Configuration management for Can Do.
//!
//! Loads configuration from environment variables with sensible defaults.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use waitlist_runtime::{RetryPolicy, StoreConfig};

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Lottery defaults
    pub lottery: LotteryConfig,
    /// Store runtime configuration
    pub store: StoreSettings,
    /// Default tracing filter when `RUST_LOG` is unset
    pub log_level: String,
}

/// Lottery configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotteryConfig {
    /// Waiting list cap for events created without one
    pub default_waitlist_capacity: Option<u32>,
    /// Fixed RNG seed for reproducible draws (demos only)
    pub rng_seed: Option<u64>,
}

/// Store runtime configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSettings {
    /// Retries for transient event store failures
    pub max_retries: usize,
    /// First retry delay in milliseconds
    pub initial_delay_ms: u64,
    /// Retry delay cap in milliseconds
    pub max_delay_ms: u64,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_secs: u64,
}

impl Config {
    /// Load configuration from environment variables
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            lottery: LotteryConfig {
                default_waitlist_capacity: lookup("WAITLIST_DEFAULT_CAPACITY")
                    .and_then(|s| s.parse::<u32>().ok())
                    .filter(|capacity| *capacity > 0),
                rng_seed: lookup("LOTTERY_RNG_SEED").and_then(|s| s.parse().ok()),
            },
            store: StoreSettings {
                max_retries: lookup("STORE_MAX_RETRIES")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(3),
                initial_delay_ms: lookup("STORE_RETRY_INITIAL_DELAY_MS")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(100),
                max_delay_ms: lookup("STORE_RETRY_MAX_DELAY_MS")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30_000),
                shutdown_timeout_secs: lookup("SHUTDOWN_TIMEOUT")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            },
            log_level: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
        }
    }

    /// Runtime configuration for a `Store`
    #[must_use]
    pub fn store_config(&self) -> StoreConfig {
        let retry_policy = RetryPolicy::builder()
            .max_retries(self.store.max_retries)
            .initial_delay(Duration::from_millis(self.store.initial_delay_ms))
            .max_delay(Duration::from_millis(self.store.max_delay_ms))
            .build();
        StoreConfig::new(
            retry_policy,
            Duration::from_secs(self.store.shutdown_timeout_secs),
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}
