//! Repository port for approval anchors.
//!
//! At most one anchor of a kind is active at a time; stores enforce this so
//! two pipelines racing to anchor the same day cannot both succeed.

use crate::capture::domain::{Anchor, AnchorId, AnchorKind};
use crate::retry::Contended;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for anchor repository operations.
pub type AnchorRepositoryResult<T> = Result<T, AnchorRepositoryError>;

/// Anchor persistence contract.
#[async_trait]
pub trait AnchorRepository: Send + Sync {
    /// Stores a new anchor.
    ///
    /// # Errors
    ///
    /// Returns [`AnchorRepositoryError::ActiveExists`] when another anchor of
    /// the same kind is still active.
    async fn store(&self, anchor: &Anchor) -> AnchorRepositoryResult<()>;

    /// Persists a transition and returns the anchor at its new version.
    ///
    /// # Errors
    ///
    /// Returns [`AnchorRepositoryError::Conflict`] when the stored version
    /// differs from `anchor.version()`.
    async fn update(&self, anchor: &Anchor) -> AnchorRepositoryResult<Anchor>;

    /// Returns active anchors of `kind`, newest first.
    async fn find_active(&self, kind: AnchorKind) -> AnchorRepositoryResult<Vec<Anchor>>;
}

/// Errors returned by anchor repository implementations.
#[derive(Debug, Clone, Error)]
pub enum AnchorRepositoryError {
    /// Another anchor of the kind is active.
    #[error("an active {0} already exists")]
    ActiveExists(&'static str),

    /// The anchor was not found.
    #[error("anchor not found: {0}")]
    NotFound(AnchorId),

    /// The anchor changed since it was read.
    #[error("anchor {id} changed since version {expected_version}")]
    Conflict {
        /// Anchor identifier.
        id: AnchorId,
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

impl AnchorRepositoryError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }

    /// Wraps a transient contention error.
    pub fn contention(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Contention(Arc::new(err))
    }
}

impl Contended for AnchorRepositoryError {
    fn is_contention(&self) -> bool {
        matches!(self, Self::Contention(_))
    }
}
