//! Error types for capture domain validation and state transitions.

use super::{AnchorId, CaptureId, ClarifyStatus, CommitStatus, DecisionStatus};
use thiserror::Error;

/// Errors returned while constructing or transitioning captures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CaptureDomainError {
    /// The capture text is empty after trimming.
    #[error("capture text must not be empty")]
    EmptyRawText,

    /// The capture source kind is empty after trimming.
    #[error("capture source kind must not be empty")]
    EmptySourceKind,

    /// The clarified title is empty after trimming.
    #[error("clarification title must not be empty")]
    EmptyTitle,

    /// A project clarification lacks the shortname used to prefix its task.
    #[error("project clarification for capture {0} has no project shortname")]
    MissingProjectShortname(CaptureId),

    /// The clarification lifecycle does not allow the requested step.
    #[error("capture {capture_id} cannot {action} while clarify_status is {status}")]
    InvalidClarifyTransition {
        /// Capture identifier.
        capture_id: CaptureId,
        /// Current clarification status.
        status: ClarifyStatus,
        /// Attempted step.
        action: &'static str,
    },

    /// The review decision has already been made or is not yet possible.
    #[error("capture {capture_id} cannot become {requested} while decision_status is {status}")]
    InvalidDecisionTransition {
        /// Capture identifier.
        capture_id: CaptureId,
        /// Current decision.
        status: DecisionStatus,
        /// Requested decision.
        requested: DecisionStatus,
    },

    /// Approval requires a completed clarification.
    #[error("capture {0} has no completed clarification")]
    NotClarified(CaptureId),

    /// Commit steps require an approved capture.
    #[error("capture {0} is not approved")]
    NotApproved(CaptureId),

    /// The commit lifecycle does not allow the requested step.
    #[error("capture {capture_id} cannot {action} while commit_status is {status}")]
    InvalidCommitTransition {
        /// Capture identifier.
        capture_id: CaptureId,
        /// Current commit status.
        status: CommitStatus,
        /// Attempted step.
        action: &'static str,
    },
}

/// Errors returned by approval anchor transitions.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AnchorDomainError {
    /// The anchor lifecycle does not allow the requested step.
    #[error("anchor {anchor_id} cannot {action} while {state}")]
    InvalidTransition {
        /// Anchor identifier.
        anchor_id: AnchorId,
        /// Current status or external state.
        state: &'static str,
        /// Attempted step.
        action: &'static str,
    },
}

/// Error returned while parsing persisted status strings.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown {field} value: {value}")]
pub struct ParseStatusError {
    field: &'static str,
    value: String,
}

impl ParseStatusError {
    pub(crate) fn new(field: &'static str, value: &str) -> Self {
        Self {
            field,
            value: value.to_owned(),
        }
    }

    /// Returns the durable field name that failed to parse.
    #[must_use]
    pub const fn field(&self) -> &'static str {
        self.field
    }
}
