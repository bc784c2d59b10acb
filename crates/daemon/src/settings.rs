//! Daemon settings
//!
//! Every field can be overridden with a `STREAMQ_<FIELD>` environment
//! variable, e.g. `STREAMQ_STREAM=orders STREAMQ_CONCURRENT_SIZE=8`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;
use streamq_core::domain::options::{
    DEFAULT_CLOSE_TIMEOUT, DEFAULT_CONCURRENT_SIZE, DEFAULT_MAX_RETRIES, DEFAULT_MIN_IDLE_TIME,
};
use streamq_core::{ConsumerOptions, StreamOptions};

const ENV_PREFIX: &str = "STREAMQ";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub stream: String,
    pub group: String,
    pub consumer_prefix: String,
    /// Milliseconds between demo publishes (0 disables the producer)
    pub publish_interval_ms: u64,
    /// Simulated handler work per message
    pub work_ms: u64,
    /// Fail the first attempt of every Nth order (0 never fails)
    pub fail_every: u64,
    pub max_len: usize,
    pub concurrent_size: usize,
    pub max_retries: i32,
    pub min_idle_ms: u64,
    pub close_timeout_ms: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            stream: "orders".to_string(),
            group: "order-workers".to_string(),
            consumer_prefix: "streamq".to_string(),
            publish_interval_ms: 1000,
            work_ms: 50,
            fail_every: 0,
            max_len: 10_000,
            concurrent_size: DEFAULT_CONCURRENT_SIZE.max(4),
            max_retries: DEFAULT_MAX_RETRIES,
            min_idle_ms: DEFAULT_MIN_IDLE_TIME.as_millis() as u64,
            close_timeout_ms: DEFAULT_CLOSE_TIMEOUT.as_millis() as u64,
        }
    }
}

impl DaemonConfig {
    /// Load defaults overlaid with `STREAMQ_*` environment variables
    pub fn load() -> Result<Self> {
        Self::from_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
    }

    fn from_source<S>(source: S) -> Result<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        config::Config::builder()
            .add_source(source)
            .build()
            .and_then(|c| c.try_deserialize())
            .context("Invalid daemon configuration")
    }

    pub fn stream_options(&self) -> StreamOptions {
        StreamOptions {
            max_len: self.max_len,
            approximate_len: true,
            close_timeout: Duration::from_millis(self.close_timeout_ms),
            ..Default::default()
        }
    }

    pub fn consumer_options(&self) -> ConsumerOptions {
        ConsumerOptions {
            concurrent_size: self.concurrent_size,
            max_retries: self.max_retries,
            min_idle_time: Duration::from_millis(self.min_idle_ms),
            ..Default::default()
        }
    }

    /// Unique consumer name for this process
    pub fn consumer_name(&self) -> String {
        format!("{}-{}", self.consumer_prefix, uuid::Uuid::new_v4())
    }
}
