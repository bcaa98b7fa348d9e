//! Job-level retry of grade sync attempts.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::{GradeSyncError, GradeSyncResult};

/// How often, and how patiently, a grade sync job is rerun.
///
/// Only lock contention is retried: a held lock is released or expires
/// eventually. Every other error ends the job on the first attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub limit: u32,
    /// Pause before each retry.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            limit: 5,
            delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Create a policy.
    pub const fn new(limit: u32, delay: Duration) -> Self {
        Self { limit, delay }
    }

    /// A policy that never retries.
    pub const fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Run `attempt` until it succeeds, fails for good, or the limit is reached.
    ///
    /// `attempt` receives the 1-based attempt number. `on_retry` is called with
    /// the number of the failed attempt before each pause.
    pub async fn run<F, Fut, T>(
        &self,
        mut attempt: F,
        mut on_retry: impl FnMut(u32),
    ) -> GradeSyncResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = GradeSyncResult<T>>,
    {
        let mut number = 1;
        loop {
            match attempt(number).await {
                Ok(value) => return Ok(value),
                Err(GradeSyncError::Lock(source)) if source.is_timeout() => {
                    rollbook_telemetry::metrics::record_lock_contention();
                    if number > self.limit {
                        return Err(GradeSyncError::retries_exhausted(number, source));
                    }
                    warn!(
                        attempt = number,
                        retry_in = ?self.delay,
                        error = %source,
                        "Grade lock contended, retrying"
                    );
                    on_retry(number);
                    tokio::time::sleep(self.delay).await;
                    number += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
