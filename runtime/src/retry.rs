//! Bounded retry for transient backend errors.
//!
//! The store client retries optimistic-transaction conflicts internally;
//! this policy covers the other kind of transient failure (connection
//! blips) for callers that want a couple of spaced attempts before giving
//! up and logging.

use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// A fixed-backoff retry policy.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first (minimum 1).
    pub max_attempts: u32,
    /// Delay between attempts.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, backoff: Duration::from_millis(100) }
    }
}

impl RetryPolicy {
    /// Runs `op` until it succeeds or attempts are exhausted.
    ///
    /// `op` is a factory producing one attempt per call.
    ///
    /// # Errors
    ///
    /// Returns the last attempt's error when every attempt failed.
    pub async fn run<T, E, F, Fut>(&self, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let attempts = self.max_attempts.max(1);
        let mut last_err = None;
        for attempt in 1..=attempts {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    debug!(attempt, error = %e, "attempt failed");
                    last_err = Some(e);
                    if attempt < attempts {
                        tokio::time::sleep(self.backoff).await;
                    }
                },
            }
        }
        // attempts >= 1, so at least one error was recorded.
        #[allow(clippy::unwrap_used)]
        Err(last_err.unwrap())
    }
}
