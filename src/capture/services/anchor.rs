//! Daily approval reminder.
//!
//! After a commit cycle, if captures are waiting for a decision and no
//! anchor covers today, one reminder task is created in the task manager.
//! The anchor is stored with its call marked in progress before the call is
//! made, and whatever the call returns, no second reminder is attempted that
//! day.

use crate::capture::{
    domain::{
        APPROVAL_ANCHOR_SMART_ADD, Anchor, AnchorDomainError, AnchorId, AnchorKind,
        RemoteTaskRef,
    },
    ports::{
        AnchorRepository, AnchorRepositoryError, CaptureRepository, CaptureRepositoryError,
        TaskSyncClient, TaskSyncError,
    },
};
use crate::retry::{ContentionRetry, with_contention_retry};
use mockable::Clock;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while anchoring pending approvals.
#[derive(Debug, Error)]
pub enum AnchorError {
    /// An anchor transition was rejected.
    #[error(transparent)]
    Domain(#[from] AnchorDomainError),
    /// Anchor store failure.
    #[error(transparent)]
    Anchors(#[from] AnchorRepositoryError),
    /// Capture store failure.
    #[error(transparent)]
    Captures(#[from] CaptureRepositoryError),
}

/// Result type for anchor operations.
pub type AnchorResult<T> = Result<T, AnchorError>;

/// What one anchoring pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnchorOutcome {
    /// No capture is awaiting a decision.
    NothingPending,
    /// An active anchor already covers today.
    AlreadyAnchored(AnchorId),
    /// A new anchor was created and its reminder call made.
    Created {
        /// The new anchor.
        anchor_id: AnchorId,
        /// `true` when the task manager confirmed the reminder task.
        committed: bool,
    },
    /// Another writer anchored the day first.
    LostRace,
}

/// Keeps one reminder task per day while approvals are pending.
pub struct ApprovalAnchorService<R, A, S, C>
where
    R: CaptureRepository,
    A: AnchorRepository,
    S: TaskSyncClient,
    C: Clock + Send + Sync,
{
    captures: Arc<R>,
    anchors: Arc<A>,
    sync_client: Arc<S>,
    clock: Arc<C>,
    call_timeout: Duration,
    contention: ContentionRetry,
}

impl<R, A, S, C> ApprovalAnchorService<R, A, S, C>
where
    R: CaptureRepository,
    A: AnchorRepository,
    S: TaskSyncClient,
    C: Clock + Send + Sync,
{
    /// Creates the service with a 20 second call deadline.
    #[must_use]
    pub fn new(captures: Arc<R>, anchors: Arc<A>, sync_client: Arc<S>, clock: Arc<C>) -> Self {
        Self {
            captures,
            anchors,
            sync_client,
            clock,
            call_timeout: Duration::from_secs(20),
            contention: ContentionRetry::default(),
        }
    }

    /// Replaces the reminder call deadline.
    #[must_use]
    pub const fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Replaces the store contention retry settings.
    #[must_use]
    pub const fn with_contention(mut self, contention: ContentionRetry) -> Self {
        self.contention = contention;
        self
    }

    /// Creates today's reminder when approvals are pending and no active
    /// anchor covers today. Active anchors from earlier days are expired
    /// first.
    ///
    /// A failed or unconfirmed reminder call is recorded on the anchor as
    /// `unknown` and is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`AnchorError`] when a store read or write fails.
    pub async fn ensure_anchor(&self) -> AnchorResult<AnchorOutcome> {
        let captures = &*self.captures;
        if !with_contention_retry(self.contention, move || captures.has_proposed()).await? {
            return Ok(AnchorOutcome::NothingPending);
        }

        let today = self.clock.utc().date_naive();
        let anchors = &*self.anchors;
        let active = with_contention_retry(self.contention, move || {
            anchors.find_active(AnchorKind::Approval)
        })
        .await?;
        if let Some(current) = active.iter().find(|anchor| anchor.is_valid_on(today)) {
            return Ok(AnchorOutcome::AlreadyAnchored(current.id()));
        }
        for mut stale in active {
            stale.expire(&*self.clock)?;
            match self.persist(&stale).await {
                Ok(_) | Err(AnchorRepositoryError::Conflict { .. }) => {}
                Err(err) => return Err(err.into()),
            }
        }

        let mut anchor = Anchor::approval(today, &*self.clock);
        anchor.begin_task(APPROVAL_ANCHOR_SMART_ADD, &*self.clock)?;
        match self.anchors.store(&anchor).await {
            Ok(()) => {}
            Err(AnchorRepositoryError::ActiveExists(_)) => {
                tracing::debug!("approval anchor created elsewhere");
                return Ok(AnchorOutcome::LostRace);
            }
            Err(err) => return Err(err.into()),
        }

        let anchor_id = anchor.id();
        let committed = match self.call_sync_client().await {
            Ok(task) => {
                tracing::info!(anchor_id = %anchor_id, remote_task = %task, "approval anchor created");
                anchor.record_committed(task, &*self.clock)?;
                true
            }
            Err(err) => {
                tracing::warn!(
                    anchor_id = %anchor_id,
                    error = %err,
                    "approval anchor outcome unknown, not retrying today"
                );
                anchor.record_unknown(err.to_string(), &*self.clock)?;
                false
            }
        };
        self.persist(&anchor).await?;
        Ok(AnchorOutcome::Created {
            anchor_id,
            committed,
        })
    }

    async fn call_sync_client(&self) -> Result<RemoteTaskRef, TaskSyncError> {
        let deadline = self.call_timeout;
        tokio::time::timeout(
            deadline,
            self.sync_client.create_reminder(APPROVAL_ANCHOR_SMART_ADD),
        )
        .await
        .unwrap_or_else(|_| {
            Err(TaskSyncError::Ambiguous(format!(
                "no confirmation within {}s",
                deadline.as_secs()
            )))
        })
    }

    async fn persist(&self, anchor: &Anchor) -> Result<Anchor, AnchorRepositoryError> {
        let anchors = &*self.anchors;
        with_contention_retry(self.contention, move || anchors.update(anchor)).await
    }
}
