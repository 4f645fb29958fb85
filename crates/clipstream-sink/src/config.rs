//! Sink Configuration
//!
//! ## SinkConfig
//!
//! - **topic**: Topic to consume (default: events)
//! - **max_inflight_batches**: Batch writes allowed to run at once (default: 16)
//! - **recompute_timeout_ms**: Upper bound for one leaderboard recompute (default: 30s)
//! - **writer**: [`WriterConfig`] for the durable writer
//!
//! ## WriterConfig
//!
//! - **write_timeout_ms**: Upper bound for one INSERT attempt (default: 10s)
//! - **max_retries**: Retries for transient store errors (default: 3)
//! - **initial_backoff_ms** / **max_backoff_ms**: Exponential backoff bounds
//!   (default: 50ms / 2s)
//!
//! ## Usage
//!
//! ```ignore
//! use clipstream_sink::SinkConfig;
//!
//! let config = SinkConfig {
//!     max_inflight_batches: 4,
//!     ..Default::default()
//! };
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Topic to consume
    #[serde(default = "default_topic")]
    pub topic: String,

    /// Maximum batch writes in flight at once (default: 16)
    #[serde(default = "default_max_inflight_batches")]
    pub max_inflight_batches: usize,

    /// Leaderboard recompute timeout in milliseconds (default: 30s)
    #[serde(default = "default_recompute_timeout_ms")]
    pub recompute_timeout_ms: u64,

    /// Durable writer settings
    #[serde(default)]
    pub writer: WriterConfig,
}

fn default_topic() -> String {
    "events".to_string()
}

fn default_max_inflight_batches() -> usize {
    16
}

fn default_recompute_timeout_ms() -> u64 {
    30_000
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            topic: default_topic(),
            max_inflight_batches: default_max_inflight_batches(),
            recompute_timeout_ms: default_recompute_timeout_ms(),
            writer: WriterConfig::default(),
        }
    }
}

impl SinkConfig {
    pub fn recompute_timeout(&self) -> Duration {
        Duration::from_millis(self.recompute_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriterConfig {
    /// Timeout for a single INSERT attempt in milliseconds (default: 10s)
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,

    /// Retries for transient errors (default: 3)
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// First backoff in milliseconds (default: 50)
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Backoff cap in milliseconds (default: 2000)
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_write_timeout_ms() -> u64 {
    10_000
}

fn default_max_retries() -> usize {
    3
}

fn default_initial_backoff_ms() -> u64 {
    50
}

fn default_max_backoff_ms() -> u64 {
    2_000
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            write_timeout_ms: default_write_timeout_ms(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl WriterConfig {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            Duration::from_millis(self.initial_backoff_ms),
            Duration::from_millis(self.max_backoff_ms),
            2.0,
        )
    }
}
