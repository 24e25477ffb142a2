//! Watcher configuration.

use std::time::Duration;

use chaincall_core::Endpoint;
use serde::{Deserialize, Serialize};

fn default_interval_ms() -> u64 {
    1_000
}
fn default_stale_block_retry_wait_ms() -> u64 {
    3_000
}
fn default_error_retry_wait_ms() -> u64 {
    5_000
}

/// Endpoint plus polling cadence.
///
/// Deserializes from the flat JSON shape used by existing configs:
/// `{ "preset": "ethereum", "interval": 1000 }` or
/// `{ "rpcUrl": "…", "multicallAddress": "0x…", "errorRetryWait": 5000 }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatcherConfig {
    #[serde(flatten)]
    pub endpoint: Endpoint,
    /// Delay between successful polls.
    #[serde(rename = "interval", default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Delay before re-polling after a response for an old block.
    #[serde(rename = "staleBlockRetryWait", default = "default_stale_block_retry_wait_ms")]
    pub stale_block_retry_wait_ms: u64,
    /// Delay before re-polling after a failed poll.
    #[serde(rename = "errorRetryWait", default = "default_error_retry_wait_ms")]
    pub error_retry_wait_ms: u64,
}

impl WatcherConfig {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            interval_ms: default_interval_ms(),
            stale_block_retry_wait_ms: default_stale_block_retry_wait_ms(),
            error_retry_wait_ms: default_error_retry_wait_ms(),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_stale_block_retry_wait(mut self, wait: Duration) -> Self {
        self.stale_block_retry_wait_ms = wait.as_millis() as u64;
        self
    }

    pub fn with_error_retry_wait(mut self, wait: Duration) -> Self {
        self.error_retry_wait_ms = wait.as_millis() as u64;
        self
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn stale_block_retry_wait(&self) -> Duration {
        Duration::from_millis(self.stale_block_retry_wait_ms)
    }

    pub fn error_retry_wait(&self) -> Duration {
        Duration::from_millis(self.error_retry_wait_ms)
    }
}
