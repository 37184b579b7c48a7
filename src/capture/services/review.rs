//! Human review gate and operator overrides.
//!
//! Every override is a versioned update of a single capture. A capture that
//! changed since it was loaded surfaces as
//! [`CaptureRepositoryError::Conflict`] and the operator retries.

use crate::capture::{
    domain::{Capture, CaptureDomainError, CaptureId, Clarification, CommitResolution},
    ports::{CaptureRepository, CaptureRepositoryError},
};
use crate::retry::{ContentionRetry, with_contention_retry};
use mockable::Clock;
use std::sync::Arc;
use thiserror::Error;

/// Service-level errors for review and override operations.
#[derive(Debug, Error)]
pub enum ReviewError {
    /// The requested transition is not allowed.
    #[error(transparent)]
    Domain(#[from] CaptureDomainError),
    /// Repository operation failed.
    #[error(transparent)]
    Repository(#[from] CaptureRepositoryError),
}

/// Result type for review operations.
pub type ReviewResult<T> = Result<T, ReviewError>;

/// Review gate and override service.
#[derive(Clone)]
pub struct ReviewService<R, C>
where
    R: CaptureRepository,
    C: Clock + Send + Sync,
{
    repository: Arc<R>,
    clock: Arc<C>,
    retry_ceiling: u32,
    contention: ContentionRetry,
}

impl<R, C> ReviewService<R, C>
where
    R: CaptureRepository,
    C: Clock + Send + Sync,
{
    /// Creates a review service using the given commit retry ceiling to
    /// classify exhausted commits.
    #[must_use]
    pub fn new(repository: Arc<R>, clock: Arc<C>, retry_ceiling: u32) -> Self {
        Self {
            repository,
            clock,
            retry_ceiling,
            contention: ContentionRetry::default(),
        }
    }

    /// Replaces the store contention retry settings.
    #[must_use]
    pub const fn with_contention(mut self, contention: ContentionRetry) -> Self {
        self.contention = contention;
        self
    }

    /// Lists proposed captures with a completed clarification, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewError::Repository`] when the query fails.
    pub async fn pending_review(&self) -> ReviewResult<Vec<Capture>> {
        let repository = &*self.repository;
        let captures = with_contention_retry(self.contention, move || {
            repository.find_pending_review()
        })
        .await?;
        Ok(captures)
    }

    /// Lists captures that automation has stopped on: clarification
    /// permanently failed, commit unknown, commit refused on credentials, or
    /// commit failed at the retry ceiling.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewError::Repository`] when the query fails.
    pub async fn attention_required(&self) -> ReviewResult<Vec<Capture>> {
        let repository = &*self.repository;
        let ceiling = self.retry_ceiling;
        let captures = with_contention_retry(self.contention, move || {
            repository.find_requiring_attention(ceiling)
        })
        .await?;
        Ok(captures)
    }

    /// Approves a clarified capture for commit.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewError::Domain`] when the capture is already decided or
    /// not clarified, and [`ReviewError::Repository`] when it is missing or
    /// changed concurrently.
    pub async fn approve(&self, id: CaptureId, notes: Option<String>) -> ReviewResult<Capture> {
        let clock = &*self.clock;
        self.transition(id, "approved", move |capture| capture.approve(notes, clock))
            .await
    }

    /// Rejects a capture.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewError::Domain`] when the capture is already decided,
    /// and [`ReviewError::Repository`] when it is missing or changed
    /// concurrently.
    pub async fn reject(&self, id: CaptureId, notes: Option<String>) -> ReviewResult<Capture> {
        let clock = &*self.clock;
        self.transition(id, "rejected", move |capture| capture.reject(notes, clock))
            .await
    }

    /// Resolves a commit whose outcome is unknown after manual verification.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewError::Domain`] unless the commit status is unknown.
    pub async fn resolve_unknown(
        &self,
        id: CaptureId,
        resolution: CommitResolution,
    ) -> ReviewResult<Capture> {
        let clock = &*self.clock;
        self.transition(id, "unknown commit resolved", move |capture| {
            capture.resolve_unknown_commit(resolution, clock)
        })
        .await
    }

    /// Requeues a capture whose commit was refused on credentials, after the
    /// credentials have been refreshed.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewError::Domain`] unless the commit status is
    /// `auth_failed`.
    pub async fn reset_auth_failed(&self, id: CaptureId) -> ReviewResult<Capture> {
        let clock = &*self.clock;
        self.transition(id, "auth failure reset", move |capture| {
            capture.reset_auth_failure(clock)
        })
        .await
    }

    /// Requeues a failed commit with a fresh retry budget.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewError::Domain`] unless the commit status is failed.
    pub async fn requeue_failed_commit(&self, id: CaptureId) -> ReviewResult<Capture> {
        let clock = &*self.clock;
        self.transition(id, "failed commit requeued", move |capture| {
            capture.requeue_failed_commit(clock)
        })
        .await
    }

    /// Replaces the clarification by hand while the capture awaits review.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewError::Domain`] once a decision was made or while an
    /// automatic attempt is in flight.
    pub async fn edit_clarification(
        &self,
        id: CaptureId,
        clarification: Clarification,
    ) -> ReviewResult<Capture> {
        let clock = &*self.clock;
        self.transition(id, "clarification edited", move |capture| {
            capture.edit_clarification(clarification, clock)
        })
        .await
    }

    async fn transition<F>(
        &self,
        id: CaptureId,
        action: &'static str,
        apply: F,
    ) -> ReviewResult<Capture>
    where
        F: FnOnce(&mut Capture) -> Result<(), CaptureDomainError>,
    {
        let repository = &*self.repository;
        let mut capture = with_contention_retry(self.contention, move || repository.find_by_id(id))
            .await?
            .ok_or(CaptureRepositoryError::NotFound(id))?;
        apply(&mut capture)?;
        let updated = {
            let capture = &capture;
            with_contention_retry(self.contention, move || repository.update(capture)).await?
        };
        tracing::info!(capture_id = %id, action, "capture updated by operator");
        Ok(updated)
    }
}
