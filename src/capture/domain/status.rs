//! Lifecycle status enums for captures.
//!
//! The string forms returned by `as_str` are persisted verbatim and read by
//! external tooling, so they must not change.

use super::ParseStatusError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Progress of AI clarification for a capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClarifyStatus {
    /// Never attempted.
    Pending,
    /// Claimed by a clarification cycle; the clarifier is being called.
    InProgress,
    /// A structured clarification is stored.
    Completed,
    /// The last attempt failed; eligible again after backoff.
    Failed,
    /// Out of attempts; requires a human.
    PermanentlyFailed,
}

impl ClarifyStatus {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::PermanentlyFailed => "permanently_failed",
        }
    }

    /// Returns `true` when a clarification cycle may claim this status.
    #[must_use]
    pub const fn is_claimable(self) -> bool {
        matches!(self, Self::Pending | Self::Failed)
    }
}

impl fmt::Display for ClarifyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ClarifyStatus {
    type Error = ParseStatusError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "permanently_failed" => Ok(Self::PermanentlyFailed),
            _ => Err(ParseStatusError::new("clarify_status", value)),
        }
    }
}

/// Human review decision for a capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
    /// Awaiting review.
    Proposed,
    /// Approved for commit to the task manager.
    Approved,
    /// Discarded by the reviewer.
    Rejected,
}

impl DecisionStatus {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Proposed => "proposed",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for DecisionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for DecisionStatus {
    type Error = ParseStatusError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "proposed" => Ok(Self::Proposed),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            _ => Err(ParseStatusError::new("decision_status", value)),
        }
    }
}

/// State of the external commit side effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitStatus {
    /// No attempt has been made, or an operator requeued the capture.
    Pending,
    /// The remote task was confirmed.
    Committed,
    /// A definite failure; retried until the attempt ceiling.
    Failed,
    /// The outcome could not be verified. Never retried automatically.
    Unknown,
    /// Credentials were rejected; waits for an external refresh.
    AuthFailed,
}

impl CommitStatus {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Committed => "committed",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
            Self::AuthFailed => "auth_failed",
        }
    }
}

impl fmt::Display for CommitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for CommitStatus {
    type Error = ParseStatusError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "committed" => Ok(Self::Committed),
            "failed" => Ok(Self::Failed),
            "unknown" => Ok(Self::Unknown),
            "auth_failed" => Ok(Self::AuthFailed),
            _ => Err(ParseStatusError::new("commit_status", value)),
        }
    }
}
