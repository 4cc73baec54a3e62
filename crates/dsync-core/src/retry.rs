//! Bounded exponential backoff for rate-limited calls
//!
//! Only errors reporting [`Retryable::is_transient_throttle`] are retried.
//! The wait before retry `n` is `base_delay^n` seconds: 2s, 4s, 8s... for the
//! default base of two seconds.

use crate::error::Retryable;
use crate::notify::Notifier;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Default total attempts per call
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default backoff base
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(2);

/// Upper bound on a single wait
pub const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Retry policy for a single remote call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    /// Create policy; at least one attempt is always made
    #[inline]
    #[must_use]
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries: max_retries.max(1),
            base_delay,
        }
    }

    /// Total attempts allowed
    #[inline]
    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Wait before retry number `retry` (1-based)
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let secs = self.base_delay.as_secs_f64().powi(exponent);
        Duration::from_secs_f64(secs.min(MAX_BACKOFF.as_secs_f64()))
    }

    /// Run `call` until it succeeds, fails permanently, or attempts run out
    ///
    /// The error of the last attempt is returned unmodified.
    pub async fn run<T, E, F, Fut>(
        &self,
        operation: &str,
        notifier: &dyn Notifier,
        mut call: F,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + Display,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient_throttle() && attempt < self.max_retries => {
                    let wait = self.delay_for(attempt);
                    notifier.warning(&format!(
                        "{operation} rate limited ({err}), retrying in {}s [{attempt}/{}]",
                        wait.as_secs_f64(),
                        self.max_retries
                    ));
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES, DEFAULT_BASE_DELAY)
    }
}
