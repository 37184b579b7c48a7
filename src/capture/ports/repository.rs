//! Repository port for capture persistence and lifecycle queries.
//!
//! Every write is a compare-and-set on the capture's `version`: an update
//! succeeds only when the stored version still equals the version the
//! caller read. This is what makes claims atomic across polling loops.

use crate::capture::domain::{Capture, CaptureId};
use crate::retry::Contended;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for capture repository operations.
pub type CaptureRepositoryResult<T> = Result<T, CaptureRepositoryError>;

/// Capture persistence contract.
#[async_trait]
pub trait CaptureRepository: Send + Sync {
    /// Stores a new capture.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureRepositoryError::DuplicateCapture`] when the ID
    /// exists or [`CaptureRepositoryError::DuplicateSource`] when another
    /// capture already has the same source kind and source identifier.
    async fn store(&self, capture: &Capture) -> CaptureRepositoryResult<()>;

    /// Persists a transition and returns the capture at its new version.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureRepositoryError::Conflict`] when the stored version
    /// differs from `capture.version()`, or
    /// [`CaptureRepositoryError::NotFound`] when the capture does not exist.
    async fn update(&self, capture: &Capture) -> CaptureRepositoryResult<Capture>;

    /// Finds a capture by identifier.
    async fn find_by_id(&self, id: CaptureId) -> CaptureRepositoryResult<Option<Capture>>;

    /// Finds the capture ingested from the given originating message.
    async fn find_by_source(
        &self,
        kind: &str,
        source_id: &str,
    ) -> CaptureRepositoryResult<Option<Capture>>;

    /// Returns proposed captures whose clarification is pending or failed,
    /// oldest first.
    async fn find_clarification_candidates(&self) -> CaptureRepositoryResult<Vec<Capture>>;

    /// Returns captures whose clarification is marked in progress.
    async fn find_interrupted_clarifications(&self) -> CaptureRepositoryResult<Vec<Capture>>;

    /// Returns approved captures eligible for a commit attempt, in decision
    /// order: pending, or failed with fewer than `retry_ceiling` attempts.
    async fn find_commit_candidates(
        &self,
        retry_ceiling: u32,
        limit: usize,
    ) -> CaptureRepositoryResult<Vec<Capture>>;

    /// Returns proposed captures with a completed clarification, oldest
    /// first.
    async fn find_pending_review(&self) -> CaptureRepositoryResult<Vec<Capture>>;

    /// Returns `true` when any capture is still awaiting a decision.
    async fn has_proposed(&self) -> CaptureRepositoryResult<bool>;

    /// Returns captures in a terminal non-success state, oldest first.
    async fn find_requiring_attention(
        &self,
        retry_ceiling: u32,
    ) -> CaptureRepositoryResult<Vec<Capture>>;
}

/// Errors returned by capture repository implementations.
#[derive(Debug, Clone, Error)]
pub enum CaptureRepositoryError {
    /// A capture with the same identifier already exists.
    #[error("duplicate capture identifier: {0}")]
    DuplicateCapture(CaptureId),

    /// A capture for the originating message already exists.
    #[error("duplicate capture source {kind}:{source_id}")]
    DuplicateSource {
        /// Source kind.
        kind: String,
        /// Originating message identifier.
        source_id: String,
    },

    /// The capture was not found.
    #[error("capture not found: {0}")]
    NotFound(CaptureId),

    /// The capture changed since it was read.
    #[error("capture {id} changed since version {expected_version}")]
    Conflict {
        /// Capture identifier.
        id: CaptureId,
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

impl CaptureRepositoryError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }

    /// Wraps a transient contention error.
    pub fn contention(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Contention(Arc::new(err))
    }
}

impl Contended for CaptureRepositoryError {
    fn is_contention(&self) -> bool {
        matches!(self, Self::Contention(_))
    }
}
