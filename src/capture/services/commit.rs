//! Commit orchestration with at-most-once delivery to the task manager.
//!
//! Every attempt is claimed before the sync client is called: the claim
//! persists `commit_status = unknown` with the incremented attempt count.
//! The outcome then overwrites it. If the process dies mid-call the capture
//! stays `unknown`, and nothing in this module ever selects an unknown
//! capture again.

use super::circuit_breaker::{Admission, CommitCircuitBreaker};
use crate::capture::{
    domain::{
        Capture, CaptureDomainError, CaptureId, CommitFailureKind, RemoteTaskRef, TaskEntry,
    },
    ports::{
        CaptureRepository, CaptureRepositoryError, CommitRequest, TaskSyncClient, TaskSyncError,
    },
};
use crate::retry::{ContentionRetry, with_contention_retry};
use mockable::Clock;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Service-level errors for commit cycles.
#[derive(Debug, Error)]
pub enum CommitError {
    /// A lifecycle transition was rejected.
    #[error(transparent)]
    Domain(#[from] CaptureDomainError),
    /// Repository operation failed.
    #[error(transparent)]
    Repository(#[from] CaptureRepositoryError),
}

/// Result type for commit operations.
pub type CommitResult<T> = Result<T, CommitError>;

/// Tuning for the commit orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitConfig {
    /// Maximum captures selected per cycle.
    pub batch_size: usize,
    /// Attempts after which a definite failure is left for an operator.
    pub retry_ceiling: u32,
    /// Deadline for one sync call; exceeding it is ambiguous.
    pub call_timeout: Duration,
    /// Retry settings for contended store operations.
    pub contention: ContentionRetry,
}

impl Default for CommitConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            retry_ceiling: 3,
            call_timeout: Duration::from_secs(20),
            contention: ContentionRetry::default(),
        }
    }
}

/// Counters describing one commit cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitReport {
    /// Sync client calls made.
    pub attempted: usize,
    /// Tasks confirmed by the task manager.
    pub committed: usize,
    /// Definite failures, including local validation failures.
    pub failed: usize,
    /// Attempts whose outcome could not be confirmed.
    pub unknown: usize,
    /// Attempts refused on credentials.
    pub auth_failed: usize,
    /// Captures whose claim was lost to a concurrent writer.
    pub skipped: usize,
    /// `true` when the breaker stopped the cycle before every candidate was
    /// attempted.
    pub breaker_blocked: bool,
}

/// Drives approved captures into the external task manager.
#[derive(Clone)]
pub struct CommitOrchestrator<R, S, C>
where
    R: CaptureRepository,
    S: TaskSyncClient,
    C: Clock + Send + Sync,
{
    repository: Arc<R>,
    sync_client: Arc<S>,
    clock: Arc<C>,
    config: CommitConfig,
}

enum AttemptOutcome {
    Committed,
    Failed,
    Unknown,
    AuthFailed,
    Skipped,
}

impl<R, S, C> CommitOrchestrator<R, S, C>
where
    R: CaptureRepository,
    S: TaskSyncClient,
    C: Clock + Send + Sync,
{
    /// Creates an orchestrator with default settings.
    #[must_use]
    pub fn new(repository: Arc<R>, sync_client: Arc<S>, clock: Arc<C>) -> Self {
        Self {
            repository,
            sync_client,
            clock,
            config: CommitConfig::default(),
        }
    }

    /// Replaces the orchestrator settings.
    #[must_use]
    pub const fn with_config(mut self, config: CommitConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the orchestrator settings.
    #[must_use]
    pub const fn config(&self) -> &CommitConfig {
        &self.config
    }

    /// Runs one commit cycle.
    ///
    /// An open breaker skips the cycle without touching the store. The
    /// breaker is consulted again before each attempt; a half-open probe is
    /// the only attempt of its cycle, and an authentication failure ends the
    /// cycle.
    ///
    /// # Errors
    ///
    /// Returns [`CommitError::Repository`] when candidates cannot be loaded.
    /// Failures on individual captures are logged and the cycle moves on.
    pub async fn run_cycle(&self, breaker: &mut CommitCircuitBreaker) -> CommitResult<CommitReport> {
        let mut report = CommitReport::default();
        if breaker.is_open_at(self.clock.utc()) {
            tracing::debug!(component = "commit", "circuit breaker open, skipping cycle");
            report.breaker_blocked = true;
            return Ok(report);
        }

        let repository = &*self.repository;
        let ceiling = self.config.retry_ceiling;
        let limit = self.config.batch_size;
        let candidates = with_contention_retry(self.config.contention, move || {
            repository.find_commit_candidates(ceiling, limit)
        })
        .await?;

        for capture in candidates {
            if !capture.is_commit_eligible(ceiling) {
                continue;
            }
            let capture_id = capture.id();

            let entry = match Self::task_entry(&capture) {
                Ok(entry) => entry,
                Err(err) => {
                    match self.fail_locally(capture, &err).await {
                        Ok(AttemptOutcome::Skipped) => report.skipped += 1,
                        Ok(_) => report.failed += 1,
                        Err(store_err) => log_unrecorded(capture_id, &store_err),
                    }
                    continue;
                }
            };

            let admission = breaker.admit(self.clock.utc());
            if !admission.is_admitted() {
                tracing::warn!(
                    capture_id = %capture_id,
                    "circuit breaker rejected commit attempt, deferring"
                );
                report.breaker_blocked = true;
                break;
            }

            let outcome = self.attempt(capture, entry, breaker).await;
            let outcome = match outcome {
                Ok(outcome) => outcome,
                Err(err) => {
                    breaker.release_probe();
                    log_unrecorded(capture_id, &err);
                    continue;
                }
            };
            match outcome {
                AttemptOutcome::Skipped => {
                    if matches!(admission, Admission::Probe) {
                        breaker.release_probe();
                    }
                    report.skipped += 1;
                    continue;
                }
                AttemptOutcome::Committed => report.committed += 1,
                AttemptOutcome::Failed => report.failed += 1,
                AttemptOutcome::Unknown => report.unknown += 1,
                AttemptOutcome::AuthFailed => report.auth_failed += 1,
            }
            report.attempted += 1;

            if matches!(outcome, AttemptOutcome::AuthFailed) {
                tracing::error!(
                    component = "commit",
                    "task manager refused credentials, ending commit cycle"
                );
                break;
            }
            if matches!(admission, Admission::Probe) {
                break;
            }
        }

        if report != CommitReport::default() {
            tracing::info!(
                component = "commit",
                attempted = report.attempted,
                committed = report.committed,
                failed = report.failed,
                unknown = report.unknown,
                auth_failed = report.auth_failed,
                skipped = report.skipped,
                breaker_blocked = report.breaker_blocked,
                "commit cycle finished"
            );
        }
        Ok(report)
    }

    fn task_entry(capture: &Capture) -> Result<TaskEntry, CaptureDomainError> {
        capture
            .clarify_result()
            .ok_or(CaptureDomainError::NotClarified(capture.id()))?
            .task_entry(capture.id())
    }

    async fn fail_locally(
        &self,
        mut capture: Capture,
        reason: &CaptureDomainError,
    ) -> CommitResult<AttemptOutcome> {
        capture.fail_commit_locally(reason.to_string(), &*self.clock)?;
        match self.persist(&capture).await {
            Ok(stored) => {
                tracing::warn!(
                    capture_id = %stored.id(),
                    attempt = stored.commit_attempt_count(),
                    error_type = "validation",
                    error = %reason,
                    "commit request could not be built"
                );
                Ok(AttemptOutcome::Failed)
            }
            Err(CaptureRepositoryError::Conflict { .. }) => Ok(AttemptOutcome::Skipped),
            Err(err) => Err(err.into()),
        }
    }

    async fn attempt(
        &self,
        mut capture: Capture,
        entry: TaskEntry,
        breaker: &mut CommitCircuitBreaker,
    ) -> CommitResult<AttemptOutcome> {
        capture.begin_commit(&*self.clock)?;
        let mut capture = match self.persist(&capture).await {
            Ok(stored) => stored,
            Err(CaptureRepositoryError::Conflict { id, .. }) => {
                tracing::debug!(capture_id = %id, "commit claim lost");
                return Ok(AttemptOutcome::Skipped);
            }
            Err(err) => return Err(err.into()),
        };

        let request = CommitRequest {
            capture_id: capture.id(),
            attempt: capture.commit_attempt_count(),
            name: entry.name,
            smart_add: entry.smart_add,
        };
        let result = self.call_sync_client(&request).await;

        let outcome = match result {
            Ok(remote_task) => {
                breaker.record_success();
                tracing::info!(
                    capture_id = %request.capture_id,
                    attempt = request.attempt,
                    remote_task = %remote_task,
                    "capture committed"
                );
                capture.record_commit_success(remote_task, &*self.clock)?;
                AttemptOutcome::Committed
            }
            Err(err) => {
                breaker.record_failure(self.clock.utc());
                let kind = err.failure_kind();
                tracing::warn!(
                    capture_id = %request.capture_id,
                    attempt = request.attempt,
                    error_type = failure_label(kind),
                    error = %err,
                    "commit attempt failed"
                );
                capture.record_commit_failure(kind, err.to_string(), &*self.clock)?;
                match kind {
                    CommitFailureKind::Rejected => AttemptOutcome::Failed,
                    CommitFailureKind::Unauthorized => AttemptOutcome::AuthFailed,
                    CommitFailureKind::Ambiguous => AttemptOutcome::Unknown,
                }
            }
        };

        self.persist(&capture).await?;
        Ok(outcome)
    }

    async fn call_sync_client(&self, request: &CommitRequest) -> Result<RemoteTaskRef, TaskSyncError> {
        let deadline = self.config.call_timeout;
        match tokio::time::timeout(deadline, self.sync_client.create_task(request)).await {
            Ok(result) => result,
            Err(_) => Err(TaskSyncError::Ambiguous(format!(
                "no confirmation within {}s",
                deadline.as_secs()
            ))),
        }
    }

    async fn persist(&self, capture: &Capture) -> Result<Capture, CaptureRepositoryError> {
        let repository = &*self.repository;
        with_contention_retry(self.config.contention, move || repository.update(capture)).await
    }
}

const fn failure_label(kind: CommitFailureKind) -> &'static str {
    match kind {
        CommitFailureKind::Rejected => "rejected",
        CommitFailureKind::Unauthorized => "unauthorized",
        CommitFailureKind::Ambiguous => "ambiguous",
    }
}

fn log_unrecorded(capture_id: CaptureId, err: &CommitError) {
    tracing::error!(
        capture_id = %capture_id,
        error = %err,
        "commit attempt could not be recorded"
    );
}
