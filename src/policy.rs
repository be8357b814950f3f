use std::time::Duration;

use crate::{RequestError, Result};

/// Configures per-attempt timeout and fixed-delay retry behavior.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one. Must be at least 1.
    pub max_attempts: u32,
    /// Fixed wait between a retryable failure and the next attempt.
    pub delay: Duration,
    /// Deadline applied to each attempt independently.
    pub timeout: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration, timeout: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            timeout,
        }
    }

    /// A policy that makes exactly one attempt.
    pub fn no_retry(timeout: Duration) -> Self {
        Self::new(1, Duration::ZERO, timeout)
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(RequestError::InvalidPolicy(
                "max_attempts must be at least 1".to_owned(),
            ));
        }
        Ok(())
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            delay: Duration::from_millis(1_000),
            timeout: Duration::from_millis(10_000),
        }
    }
}
