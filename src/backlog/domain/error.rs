//! Error types for backlog validation and state transitions.

use super::{BacklogItemId, BacklogStatus};
use thiserror::Error;

/// Errors returned while constructing or transitioning backlog items.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BacklogDomainError {
    /// The item text is empty after trimming.
    #[error("backlog item text must not be empty")]
    EmptyRawText,

    /// The item is not in a state that allows the requested step.
    #[error("backlog item {item_id} cannot {action} while status is {status}")]
    InvalidTransition {
        /// Item identifier.
        item_id: BacklogItemId,
        /// Current status.
        status: BacklogStatus,
        /// Attempted step.
        action: &'static str,
    },

    /// The item is already linked to a different capture.
    #[error("backlog item {0} is already linked to a capture")]
    CaptureAlreadyLinked(BacklogItemId),

    /// A persisted status string is not recognised.
    #[error("unknown backlog status value: {0}")]
    UnknownStatus(String),
}
