//! Repository port for backlog items.
//!
//! Updates are compare-and-set on the item version, so a claim made by one
//! drip cycle cannot be overwritten by another.

use crate::backlog::domain::{BacklogItem, BacklogItemId};
use crate::retry::Contended;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

/// Result type for backlog repository operations.
pub type BacklogRepositoryResult<T> = Result<T, BacklogRepositoryError>;

/// Number of backlog items in each status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BacklogStatusCounts {
    /// Waiting for a daily slot.
    pub pending: usize,
    /// Claimed and in the pipeline.
    pub processing: usize,
    /// Committed.
    pub processed: usize,
    /// Failed terminally.
    pub failed: usize,
}

impl BacklogStatusCounts {
    /// Returns the total number of items.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.pending + self.processing + self.processed + self.failed
    }
}

/// Backlog persistence contract.
#[async_trait]
pub trait BacklogRepository: Send + Sync {
    /// Stores newly imported items in one batch.
    ///
    /// # Errors
    ///
    /// Returns [`BacklogRepositoryError::DuplicateItem`] when an identifier
    /// already exists; no item of the batch is stored in that case.
    async fn store_all(&self, items: &[BacklogItem]) -> BacklogRepositoryResult<()>;

    /// Persists a transition and returns the item at its new version.
    ///
    /// # Errors
    ///
    /// Returns [`BacklogRepositoryError::Conflict`] when the stored version
    /// differs from `item.version()`.
    async fn update(&self, item: &BacklogItem) -> BacklogRepositoryResult<BacklogItem>;

    /// Finds an item by identifier.
    async fn find_by_id(&self, id: BacklogItemId) -> BacklogRepositoryResult<Option<BacklogItem>>;

    /// Returns up to `limit` pending items, oldest import first.
    async fn find_pending(&self, limit: usize) -> BacklogRepositoryResult<Vec<BacklogItem>>;

    /// Returns every processing item, oldest claim first.
    async fn find_processing(&self) -> BacklogRepositoryResult<Vec<BacklogItem>>;

    /// Counts items claimed at or after `since`, whatever their status now.
    async fn count_claimed_since(&self, since: DateTime<Utc>) -> BacklogRepositoryResult<usize>;

    /// Counts items per status.
    async fn status_counts(&self) -> BacklogRepositoryResult<BacklogStatusCounts>;
}

/// Errors returned by backlog repository implementations.
#[derive(Debug, Clone, Error)]
pub enum BacklogRepositoryError {
    /// An item with the same identifier already exists.
    #[error("duplicate backlog item: {0}")]
    DuplicateItem(BacklogItemId),

    /// The item was not found.
    #[error("backlog item not found: {0}")]
    NotFound(BacklogItemId),

    /// The item changed since it was read.
    #[error("backlog item {id} changed since version {expected_version}")]
    Conflict {
        /// Item identifier.
        id: BacklogItemId,
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

impl BacklogRepositoryError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }

    /// Wraps a transient contention error.
    pub fn contention(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Contention(Arc::new(err))
    }
}

impl Contended for BacklogRepositoryError {
    fn is_contention(&self) -> bool {
        matches!(self, Self::Contention(_))
    }
}
