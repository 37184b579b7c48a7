//! Capture intake: creates captures from raw text, once per originating
//! message.

use crate::capture::{
    domain::{Capture, CaptureDomainError, CaptureSource},
    ports::{CaptureFeed, CaptureFeedError, CaptureRepository, CaptureRepositoryError},
};
use crate::retry::{ContentionRetry, with_contention_retry};
use mockable::Clock;
use std::sync::Arc;
use thiserror::Error;

/// Service-level errors for capture intake.
#[derive(Debug, Error)]
pub enum IntakeError {
    /// The capture failed validation.
    #[error(transparent)]
    Domain(#[from] CaptureDomainError),
    /// Repository operation failed.
    #[error(transparent)]
    Repository(#[from] CaptureRepositoryError),
    /// The feed could not be read.
    #[error(transparent)]
    Feed(#[from] CaptureFeedError),
}

/// Result type for intake operations.
pub type IntakeResult<T> = Result<T, IntakeError>;

/// Result of ingesting one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// A new capture was stored.
    Created(Capture),
    /// The originating message was ingested before; the existing capture is
    /// returned unchanged.
    AlreadyIngested(Capture),
}

impl IngestOutcome {
    /// Returns the capture regardless of whether it was new.
    #[must_use]
    pub const fn capture(&self) -> &Capture {
        match self {
            Self::Created(capture) | Self::AlreadyIngested(capture) => capture,
        }
    }

    /// Consumes the outcome and returns the capture.
    #[must_use]
    pub fn into_capture(self) -> Capture {
        match self {
            Self::Created(capture) | Self::AlreadyIngested(capture) => capture,
        }
    }

    /// Returns `true` when a new capture was stored.
    #[must_use]
    pub const fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// Counters describing one pass over a capture feed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// New captures stored.
    pub created: usize,
    /// Items that had already been ingested.
    pub duplicates: usize,
    /// Items dropped because they failed validation.
    pub rejected: usize,
}

/// Creates captures idempotently.
#[derive(Clone)]
pub struct CaptureIntakeService<R, C>
where
    R: CaptureRepository,
    C: Clock + Send + Sync,
{
    repository: Arc<R>,
    clock: Arc<C>,
    contention: ContentionRetry,
}

impl<R, C> CaptureIntakeService<R, C>
where
    R: CaptureRepository,
    C: Clock + Send + Sync,
{
    /// Creates an intake service.
    #[must_use]
    pub fn new(repository: Arc<R>, clock: Arc<C>) -> Self {
        Self {
            repository,
            clock,
            contention: ContentionRetry::default(),
        }
    }

    /// Replaces the store contention retry settings.
    #[must_use]
    pub const fn with_contention(mut self, contention: ContentionRetry) -> Self {
        self.contention = contention;
        self
    }

    /// Ingests one raw capture.
    ///
    /// Keyed by source kind and source identifier: a re-delivered message
    /// returns the capture created the first time. Sources without an
    /// identifier always create a new capture.
    ///
    /// # Errors
    ///
    /// Returns [`IntakeError::Domain`] for blank text and
    /// [`IntakeError::Repository`] when the store fails.
    pub async fn ingest(
        &self,
        raw_text: impl Into<String>,
        source: CaptureSource,
    ) -> IntakeResult<IngestOutcome> {
        if let Some(existing) = self.existing(&source).await? {
            return Ok(IngestOutcome::AlreadyIngested(existing));
        }

        let capture = Capture::new(raw_text, source, &*self.clock)?;
        let repository = &*self.repository;
        let stored = {
            let capture = &capture;
            with_contention_retry(self.contention, move || repository.store(capture)).await
        };
        match stored {
            Ok(()) => {
                tracing::info!(
                    capture_id = %capture.id(),
                    source = %capture.source(),
                    "capture ingested"
                );
                Ok(IngestOutcome::Created(capture))
            }
            Err(CaptureRepositoryError::DuplicateSource { kind, source_id }) => {
                let existing = self
                    .existing(capture.source())
                    .await?
                    .ok_or(CaptureRepositoryError::DuplicateSource { kind, source_id })?;
                Ok(IngestOutcome::AlreadyIngested(existing))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Pulls every pending item from `feed`, ingests it and acknowledges it.
    ///
    /// Items that fail validation are acknowledged and dropped so they are
    /// not delivered forever. Acknowledgement failures are logged; the item
    /// comes back on the next pull and is ingested idempotently.
    ///
    /// # Errors
    ///
    /// Returns [`IntakeError::Feed`] when the feed cannot be read and
    /// [`IntakeError::Repository`] when the store fails; items handled before
    /// the failure stay ingested.
    pub async fn ingest_feed<F>(&self, feed: &F) -> IntakeResult<IngestReport>
    where
        F: CaptureFeed + ?Sized,
    {
        let mut report = IngestReport::default();
        for item in feed.pull().await? {
            match self.ingest(item.raw_text.clone(), item.source.clone()).await {
                Ok(IngestOutcome::Created(_)) => report.created += 1,
                Ok(IngestOutcome::AlreadyIngested(_)) => report.duplicates += 1,
                Err(IntakeError::Domain(err)) => {
                    tracing::warn!(source = %item.source, error = %err, "dropping invalid capture");
                    report.rejected += 1;
                }
                Err(err) => return Err(err),
            }
            if let Err(err) = feed.acknowledge(&item).await {
                tracing::warn!(source = %item.source, error = %err, "failed to acknowledge capture");
            }
        }
        Ok(report)
    }

    async fn existing(&self, source: &CaptureSource) -> IntakeResult<Option<Capture>> {
        let Some(source_id) = source.source_id() else {
            return Ok(None);
        };
        let repository = &*self.repository;
        let kind = source.kind();
        let found = with_contention_retry(self.contention, move || {
            repository.find_by_source(kind, source_id)
        })
        .await?;
        Ok(found)
    }
}
