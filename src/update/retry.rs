//! Bounded exponential backoff for transient failures.

use std::future::Future;
use std::time::Duration;
use tokio_retry::RetryIf;
use tokio_retry::strategy::ExponentialBackoff;
use tracing::warn;

use crate::constants::{DEFAULT_MAX_RETRIES, MAX_BACKOFF_DELAY_MS, STARTING_BACKOFF_DELAY_MS};
use crate::core::{Result, UpdateError};

/// How often and how patiently a transient failure is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: usize,
    /// Delay before the first retry; doubles on every further one.
    pub base_delay: Duration,
    /// Cap on a single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: Duration::from_millis(STARTING_BACKOFF_DELAY_MS),
            max_delay: Duration::from_millis(MAX_BACKOFF_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    /// A policy with the default delays and the given retry count.
    #[must_use]
    pub fn with_max_retries(max_retries: usize) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// Millisecond-scale delays, for tests against a local server.
    #[must_use]
    pub const fn fast(max_retries: usize) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_millis(2),
            max_delay: Duration::from_millis(20),
        }
    }

    /// The delay sequence: base, 2×base, 4×base… capped, `max_retries` long.
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        // ExponentialBackoff yields factor·base^n, so base 2 with factor base/2 doubles
        let factor = (self.base_delay.as_millis() as u64 / 2).max(1);
        ExponentialBackoff::from_millis(2)
            .factor(factor)
            .max_delay(self.max_delay)
            .take(self.max_retries)
    }

    /// Run `action`, retrying while it fails with a retryable error.
    ///
    /// Non-retryable errors (integrity, not-found, cancellation) are returned at once.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut action: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        RetryIf::start(
            self.delays(),
            || action(),
            |error: &UpdateError| {
                let retry = error.is_retryable();
                if retry {
                    warn!(
                        operation,
                        error_kind = error.kind(),
                        error = %error,
                        "Transient failure, retrying"
                    );
                }
                retry
            },
        )
        .await
    }
}
