// Handler retry logic
use crate::domain::ConsumerOptions;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry decision result
#[derive(Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Invoke the handler again after the delay
    Retry(Duration),
    /// Retries exhausted; leave the message pending
    Abandon,
}

/// Fixed-delay retry policy for in-place handler retries
///
/// A message is attempted at most `max(max_retries, 0) + 1` times; a negative
/// `max_retries` retries forever.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: i32,
    delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: i32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    pub fn from_options(opts: &ConsumerOptions) -> Self {
        Self::new(opts.max_retries, opts.retry_delay)
    }

    /// Decide what happens after the `failures`-th failed attempt
    ///
    /// # Example
    /// ```text
    /// let policy = RetryPolicy::new(3, Duration::from_millis(100));
    /// assert_eq!(policy.should_retry("1-0", 3), RetryDecision::Retry(..));
    /// assert_eq!(policy.should_retry("1-0", 4), RetryDecision::Abandon);
    /// ```
    pub fn should_retry(&self, message_id: &str, failures: u32) -> RetryDecision {
        if self.max_retries >= 0 && failures > self.max_retries as u32 {
            warn!(
                message_id = %message_id,
                failures = failures,
                max_retries = self.max_retries,
                "Max retry attempts reached"
            );
            return RetryDecision::Abandon;
        }

        debug!(
            message_id = %message_id,
            failures = failures,
            delay_ms = self.delay.as_millis() as u64,
            "Scheduling retry"
        );
        RetryDecision::Retry(self.delay)
    }

    /// Total handler invocations for a message that always fails
    pub fn max_attempts(&self) -> Option<u32> {
        if self.max_retries < 0 {
            None
        } else {
            Some(self.max_retries as u32 + 1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retries_until_bound_then_abandons() {
        let policy = RetryPolicy::new(3, Duration::from_millis(10));
        for failures in 1..=3 {
            assert_eq!(
                policy.should_retry("1-0", failures),
                RetryDecision::Retry(Duration::from_millis(10))
            );
        }
        assert_eq!(policy.should_retry("1-0", 4), RetryDecision::Abandon);
        assert_eq!(policy.max_attempts(), Some(4));
    }

    #[test]
    fn test_zero_retries_means_single_attempt() {
        let policy = RetryPolicy::new(0, Duration::ZERO);
        assert_eq!(policy.should_retry("1-0", 1), RetryDecision::Abandon);
        assert_eq!(policy.max_attempts(), Some(1));
    }

    #[test]
    fn test_negative_retries_is_unlimited() {
        let policy = RetryPolicy::from_options(&ConsumerOptions {
            max_retries: -1,
            retry_delay: Duration::from_millis(5),
            ..Default::default()
        });
        // A saturated failure counter still retries
        assert_eq!(
            policy.should_retry("1-0", u32::MAX),
            RetryDecision::Retry(Duration::from_millis(5))
        );
        assert_eq!(policy.max_attempts(), None);
    }
}
