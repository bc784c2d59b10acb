// Queue and Consumer Options
//
// Explicit values constructed at call sites; there is no global default instance.

use super::error::{DomainError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default read timeout for non-blocking store calls (3s)
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(3);

/// Default publish timeout (3s)
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(3);

/// Default bound on `Queue::close` waiting for background tasks (30s)
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default messages fetched per group read
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Default long-poll wait of a group read (2s)
pub const DEFAULT_BLOCK_DURATION: Duration = Duration::from_secs(2);

/// Default backoff between handler retries and after read failures (1s)
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Default handler retries before a message is abandoned
pub const DEFAULT_MAX_RETRIES: i32 = 3;

/// Default worker count
pub const DEFAULT_CONCURRENT_SIZE: usize = 1;

/// Default idle time after which a pending message may be reclaimed (30s)
pub const DEFAULT_MIN_IDLE_TIME: Duration = Duration::from_secs(30);

/// Stream-level options, fixed for the lifetime of a `Queue`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamOptions {
    /// Retention bound on stream length (0 = unbounded)
    pub max_len: usize,
    /// Trade trim precision for append speed
    pub approximate_len: bool,
    #[serde(with = "duration_ms")]
    pub read_timeout: Duration,
    #[serde(with = "duration_ms")]
    pub write_timeout: Duration,
    #[serde(with = "duration_ms")]
    pub close_timeout: Duration,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            max_len: 0,
            approximate_len: true,
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }
}

/// Per-`consume` options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerOptions {
    /// Messages per group read; also the work channel capacity
    pub batch_size: usize,
    #[serde(with = "duration_ms")]
    pub block_duration: Duration,
    #[serde(with = "duration_ms")]
    pub retry_delay: Duration,
    /// Negative = retry forever
    pub max_retries: i32,
    /// Worker count (>= 1)
    pub concurrent_size: usize,
    #[serde(with = "duration_ms")]
    pub min_idle_time: Duration,
}

impl Default for ConsumerOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            block_duration: DEFAULT_BLOCK_DURATION,
            retry_delay: DEFAULT_RETRY_DELAY,
            max_retries: DEFAULT_MAX_RETRIES,
            concurrent_size: DEFAULT_CONCURRENT_SIZE,
            min_idle_time: DEFAULT_MIN_IDLE_TIME,
        }
    }
}

impl ConsumerOptions {
    /// Reject values the consume loops cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(DomainError::InvalidOptions(
                "batch_size must be at least 1".to_string(),
            ));
        }
        if self.concurrent_size == 0 {
            return Err(DomainError::InvalidOptions(
                "concurrent_size must be at least 1".to_string(),
            ));
        }
        if self.min_idle_time.is_zero() {
            return Err(DomainError::InvalidOptions(
                "min_idle_time must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Reclaimer tick period: half of `min_idle_time`
    pub fn reclaim_interval(&self) -> Duration {
        (self.min_idle_time / 2).max(Duration::from_millis(1))
    }
}

/// Durations as integer milliseconds in external config
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
