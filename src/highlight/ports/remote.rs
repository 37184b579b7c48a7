//! Ports for reading tasks from, and labelling tasks in, the remote task
//! manager.

use crate::highlight::domain::{RemoteTaskSnapshot, RtmTaskCacheEntry};
use async_trait::async_trait;
use thiserror::Error;

/// Result type for remote task manager calls.
pub type RemoteTaskResult<T> = Result<T, RemoteTaskError>;

/// Full snapshot of the user's tasks.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteTaskSource: Send + Sync {
    /// Returns every task the user can see, completed ones included when
    /// the remote reports them.
    async fn fetch_all(&self) -> RemoteTaskResult<Vec<RemoteTaskSnapshot>>;

    /// Looks up one task by its remote identifiers.
    ///
    /// Returns `Ok(None)` when the task no longer exists in `list_id`.
    async fn fetch_task(
        &self,
        list_id: &str,
        taskseries_id: &str,
        task_id: &str,
    ) -> RemoteTaskResult<Option<RemoteTaskSnapshot>>;
}

/// Owns the system highlight label in the remote task manager.
///
/// The label is distinct from the user's own `highlight` tag, which is never
/// added or removed here.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HighlightPublisher: Send + Sync {
    /// Removes the system label from every task carrying it and returns how
    /// many tasks were cleared.
    async fn clear(&self) -> RemoteTaskResult<usize>;

    /// Labels `entries` as today's highlights.
    async fn publish(&self, entries: &[RtmTaskCacheEntry]) -> RemoteTaskResult<()>;
}

/// Classified remote task manager failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteTaskError {
    /// Credentials were refused.
    #[error("task manager authentication failed: {0}")]
    Unauthorized(String),

    /// The task manager could not be reached or returned an error.
    #[error("task manager unavailable: {0}")]
    Unavailable(String),
}
