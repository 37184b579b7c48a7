//! Port for the external task manager's task creation call.

use crate::capture::domain::{CaptureId, CommitFailureKind, RemoteTaskRef};
use async_trait::async_trait;
use thiserror::Error;

/// Result type for task sync calls.
pub type TaskSyncResult<T> = Result<T, TaskSyncError>;

/// Task to create in the remote task manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRequest {
    /// Capture the task is created for.
    pub capture_id: CaptureId,
    /// Commit attempt number, starting at 1.
    pub attempt: u32,
    /// Plain task name.
    pub name: String,
    /// Smart-add string including tags and due date.
    pub smart_add: String,
}

/// Creates tasks in the remote task manager.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TaskSyncClient: Send + Sync {
    /// Creates the task and returns its remote reference once confirmed.
    async fn create_task(&self, request: &CommitRequest) -> TaskSyncResult<RemoteTaskRef>;

    /// Creates a plain reminder task from a smart-add string, outside any
    /// capture or project.
    async fn create_reminder(&self, smart_add: &str) -> TaskSyncResult<RemoteTaskRef>;
}

/// Classified task creation failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskSyncError {
    /// The task manager definitely did not create the task.
    #[error("task manager rejected the task: {0}")]
    Rejected(String),

    /// Credentials were refused.
    #[error("task manager authentication failed: {0}")]
    Unauthorized(String),

    /// The request may have been applied but was not confirmed.
    #[error("task creation outcome unknown: {0}")]
    Ambiguous(String),
}

impl TaskSyncError {
    /// Maps the error onto the capture's commit failure classification.
    #[must_use]
    pub const fn failure_kind(&self) -> CommitFailureKind {
        match self {
            Self::Rejected(_) => CommitFailureKind::Rejected,
            Self::Unauthorized(_) => CommitFailureKind::Unauthorized,
            Self::Ambiguous(_) => CommitFailureKind::Ambiguous,
        }
    }
}
