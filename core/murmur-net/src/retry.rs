//! Bounded retry with a fixed delay.

use crate::ConnectionPolicy;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// How many times to attempt an operation and how long to wait between
/// attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Always at least 1.
    pub max_attempts: u32,
    /// Delay before each retry.
    pub delay: Duration,
}

impl RetryPolicy {
    /// Creates a policy.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// A policy that never retries.
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Derives the policy from a connection tier's parameters.
    pub fn from_connection(policy: &ConnectionPolicy) -> Self {
        Self::new(policy.max_retries.saturating_add(1), policy.retry_delay())
    }

    /// Runs `op` until it succeeds, fails with an error `is_retryable`
    /// rejects, or the attempt budget runs out. `op` receives the 1-based
    /// attempt number.
    pub async fn run<T, E, F, Fut>(&self, mut op: F, is_retryable: impl Fn(&E) -> bool) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_attempts && is_retryable(&e) => {
                    debug!(
                        "Attempt {}/{} failed: {}, retrying in {:?}",
                        attempt, self.max_attempts, e, self.delay
                    );
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
