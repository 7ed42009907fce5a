//! Sync policy configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Limits and retry timing used by the sync reducer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Documents larger than this (in position units) stop syncing.
    #[serde(default = "default_max_doc_size")]
    pub max_doc_size: usize,

    /// First retry delay after a transient failure (default: 200ms)
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Upper bound for the retry delay (default: 60s)
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// A delay notice is shown once the retry delay grows past this.
    #[serde(default = "default_delay_notice_ms")]
    pub delay_notice_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_doc_size: default_max_doc_size(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            delay_notice_ms: default_delay_notice_ms(),
        }
    }
}

fn default_max_doc_size() -> usize {
    40_000
}

fn default_initial_backoff_ms() -> u64 {
    200
}

fn default_max_backoff_ms() -> u64 {
    60_000
}

fn default_delay_notice_ms() -> u64 {
    1_000
}

/// Calculates the next retry delay from the current one using exponential
/// backoff. A current delay of zero means no failure happened yet.
pub fn calculate_backoff(current: Duration, config: &SyncConfig) -> Duration {
    let next_ms = if current.is_zero() {
        config.initial_backoff_ms
    } else {
        (current.as_millis() as u64)
            .saturating_mul(2)
            .min(config.max_backoff_ms)
    };
    Duration::from_millis(next_ms)
}

/// Whether moving from `previous` to `next` crosses the delay notice
/// threshold upwards.
pub fn crosses_delay_notice(previous: Duration, next: Duration, config: &SyncConfig) -> bool {
    let threshold = Duration::from_millis(config.delay_notice_ms);
    next > threshold && previous < threshold
}
