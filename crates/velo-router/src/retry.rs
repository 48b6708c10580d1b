//! Fixed-delay retry for router requests.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::RoutingError;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Passed to the retry callback before each backoff sleep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryNotice {
    /// 1-based number of the retry about to happen.
    pub attempt: u32,
    pub max_retries: u32,
    pub delay: Duration,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    pub fn never() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Run `operation` until it succeeds, fails permanently or runs out of retries.
    pub async fn run<T, F, Fut>(
        &self,
        on_retry: &(dyn Fn(RetryNotice) + Send + Sync),
        mut operation: F,
    ) -> Result<T, RoutingError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RoutingError>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        attempt,
                        max_retries = self.max_retries,
                        error = %err,
                        "Router request failed, retrying in {:?}",
                        self.delay
                    );
                    on_retry(RetryNotice {
                        attempt,
                        max_retries: self.max_retries,
                        delay: self.delay,
                        reason: err.to_string(),
                    });
                    tokio::time::sleep(self.delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
