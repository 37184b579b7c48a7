//! Bounded retry of store operations that hit transient contention.
//!
//! Contention (a busy database, a serialization failure, an exhausted
//! connection pool) is retried a few times within the current cycle with a
//! short doubling delay. Anything else, including the last contention error,
//! is returned to the caller, which defers the work to the next poll.

use std::future::Future;
use std::time::Duration;
use tokio_retry::RetryIf;

/// Classifies errors that are worth retrying immediately.
pub trait Contended {
    /// Returns `true` when the error is transient store contention.
    fn is_contention(&self) -> bool;
}

/// Retry settings for contended store operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentionRetry {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubles for each later retry.
    pub initial_delay: Duration,
}

impl ContentionRetry {
    /// Creates retry settings.
    #[must_use]
    pub const fn new(max_retries: u32, initial_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
        }
    }

    /// Settings that never retry.
    #[must_use]
    pub const fn disabled() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Delays before each retry, doubling from `initial_delay`.
    #[must_use]
    pub fn backoff(self) -> impl Iterator<Item = Duration> {
        let retries = usize::try_from(self.max_retries).unwrap_or(usize::MAX);
        std::iter::successors(Some(self.initial_delay), |delay| Some(delay.saturating_mul(2)))
            .take(retries)
    }
}

impl Default for ContentionRetry {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(100))
    }
}

/// Runs `operation`, retrying while it fails with contention.
///
/// # Errors
///
/// Returns the first non-contention error, or the last contention error once
/// the retries are used up.
pub async fn with_contention_retry<T, E, F, Fut>(
    policy: ContentionRetry,
    operation: F,
) -> Result<T, E>
where
    E: Contended + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_retries = policy.max_retries;
    RetryIf::spawn(policy.backoff(), operation, move |err: &E| {
        let contended = err.is_contention();
        if contended && max_retries > 0 {
            tracing::warn!(max_retries, error = %err, "store contention");
        }
        contended
    })
    .await
}
