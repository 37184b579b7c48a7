//! Repository port for the remote task cache.

use crate::highlight::domain::RtmTaskCacheEntry;
use crate::retry::Contended;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for task cache operations.
pub type TaskCacheResult<T> = Result<T, TaskCacheError>;

/// Task cache persistence contract.
///
/// Updates are compare-and-set on the entry version. Concurrent suggesters
/// therefore cannot both count the same suggestion: the second write fails
/// with [`TaskCacheError::Conflict`].
#[async_trait]
pub trait TaskCacheRepository: Send + Sync {
    /// Inserts an entry for a task seen for the first time.
    ///
    /// # Errors
    ///
    /// Returns [`TaskCacheError::DuplicateTask`] when the task is cached.
    async fn insert(&self, entry: &RtmTaskCacheEntry) -> TaskCacheResult<()>;

    /// Persists a change and returns the entry at its new version.
    ///
    /// # Errors
    ///
    /// Returns [`TaskCacheError::Conflict`] when the stored version differs
    /// from `entry.version()`.
    async fn update(&self, entry: &RtmTaskCacheEntry) -> TaskCacheResult<RtmTaskCacheEntry>;

    /// Finds the entry for a remote task.
    async fn find_by_task_id(&self, task_id: &str) -> TaskCacheResult<Option<RtmTaskCacheEntry>>;

    /// Returns every entry, completed ones included.
    async fn find_all(&self) -> TaskCacheResult<Vec<RtmTaskCacheEntry>>;

    /// Returns open entries without a project.
    async fn find_lonely_actions(&self) -> TaskCacheResult<Vec<RtmTaskCacheEntry>>;
}

/// Errors returned by task cache implementations.
#[derive(Debug, Clone, Error)]
pub enum TaskCacheError {
    /// The task is already cached.
    #[error("task {0} is already cached")]
    DuplicateTask(String),

    /// The task is not cached.
    #[error("task {0} is not cached")]
    NotFound(String),

    /// The entry changed since it was read.
    #[error("cache entry {task_id} changed since version {expected_version}")]
    Conflict {
        /// Remote task identifier.
        task_id: String,
        /// Version the caller read.
        expected_version: u64,
    },

    /// The store is busy; the operation may succeed if retried.
    #[error("store contention: {0}")]
    Contention(Arc<dyn std::error::Error + Send + Sync>),

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl TaskCacheError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }

    /// Wraps a transient contention error.
    pub fn contention(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Contention(Arc::new(err))
    }
}

impl Contended for TaskCacheError {
    fn is_contention(&self) -> bool {
        matches!(self, Self::Contention(_))
    }
}
