//! Port for the external AI clarifier.

use crate::capture::domain::Clarification;
use async_trait::async_trait;
use thiserror::Error;

/// Result type for clarifier calls.
pub type ClarifierResult<T> = Result<T, ClarifyError>;

/// Turns raw capture text into a structured clarification.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Clarifier: Send + Sync {
    /// Clarifies one capture's raw text.
    async fn clarify(&self, raw_text: &str) -> ClarifierResult<Clarification>;
}

/// Classified clarifier failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClarifyError {
    /// No response before the deadline.
    #[error("clarifier timed out: {0}")]
    Timeout(String),

    /// The response could not be parsed into a clarification.
    #[error("clarifier returned a malformed response: {0}")]
    Malformed(String),

    /// The clarifier throttled the request.
    #[error("clarifier rate limited the request: {0}")]
    RateLimited(String),

    /// The clarifier is unreachable or failing.
    #[error("clarifier unavailable: {0}")]
    Unavailable(String),
}

impl ClarifyError {
    /// Returns a stable label for log fields.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::Malformed(_) => "malformed",
            Self::RateLimited(_) => "rate_limited",
            Self::Unavailable(_) => "unavailable",
        }
    }
}
