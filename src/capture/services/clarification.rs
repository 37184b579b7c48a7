//! Clarification orchestration: claims eligible captures and calls the
//! clarifier.

use super::retry_policy::{ClarifyRetryPolicy, RetryDecision};
use crate::capture::{
    domain::{Capture, CaptureDomainError, CaptureId, Clarification},
    ports::{CaptureRepository, CaptureRepositoryError, Clarifier, ClarifyError},
};
use crate::retry::{ContentionRetry, with_contention_retry};
use chrono::TimeDelta;
use mockable::Clock;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Service-level errors for clarification cycles.
#[derive(Debug, Error)]
pub enum ClarificationError {
    /// A lifecycle transition was rejected.
    #[error(transparent)]
    Domain(#[from] CaptureDomainError),
    /// Repository operation failed.
    #[error(transparent)]
    Repository(#[from] CaptureRepositoryError),
}

/// Result type for clarification operations.
pub type ClarificationResult<T> = Result<T, ClarificationError>;

/// Tuning for the clarification orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClarificationConfig {
    /// Maximum captures claimed per cycle.
    pub batch_size: usize,
    /// Attempt count at which a failure becomes permanent.
    pub max_attempts: u32,
    /// Deadline for one clarifier call.
    pub call_timeout: Duration,
    /// Extra time past `call_timeout` after which an `in_progress` claim is
    /// treated as abandoned and failed by the next cycle.
    pub stale_claim_margin: Duration,
    /// Retry settings for contended store operations.
    pub contention: ContentionRetry,
}

impl ClarificationConfig {
    /// Age at which an `in_progress` claim counts as stale.
    #[must_use]
    pub fn stale_claim_after(&self) -> TimeDelta {
        TimeDelta::from_std(self.call_timeout.saturating_add(self.stale_claim_margin))
            .unwrap_or(TimeDelta::MAX)
    }
}

impl Default for ClarificationConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            max_attempts: 5,
            call_timeout: Duration::from_secs(30),
            stale_claim_margin: Duration::from_secs(5 * 60),
            contention: ContentionRetry::default(),
        }
    }
}

/// Counters describing one clarification cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClarificationReport {
    /// Captures clarified successfully.
    pub completed: usize,
    /// Attempts that failed and remain retryable.
    pub failed: usize,
    /// Captures moved to `permanently_failed`, by a failed attempt or by the
    /// exhausted-schedule sweep.
    pub permanently_failed: usize,
    /// Captures still waiting for their backoff delay.
    pub backing_off: usize,
    /// Captures whose claim was lost to a concurrent writer.
    pub skipped: usize,
    /// Stale `in_progress` claims returned to the retry schedule.
    pub recovered: usize,
}

impl ClarificationReport {
    /// Returns the number of clarifier calls made.
    #[must_use]
    pub const fn attempted(&self) -> usize {
        self.completed + self.failed
    }
}

/// Drives captures through clarification.
#[derive(Clone)]
pub struct ClarificationOrchestrator<R, L, C>
where
    R: CaptureRepository,
    L: Clarifier,
    C: Clock + Send + Sync,
{
    repository: Arc<R>,
    clarifier: Arc<L>,
    clock: Arc<C>,
    policy: ClarifyRetryPolicy,
    config: ClarificationConfig,
}

enum AttemptOutcome {
    Completed,
    Failed,
    PermanentlyFailed,
    Skipped,
}

impl<R, L, C> ClarificationOrchestrator<R, L, C>
where
    R: CaptureRepository,
    L: Clarifier,
    C: Clock + Send + Sync,
{
    /// Creates an orchestrator with the default schedule and settings.
    #[must_use]
    pub fn new(repository: Arc<R>, clarifier: Arc<L>, clock: Arc<C>) -> Self {
        Self {
            repository,
            clarifier,
            clock,
            policy: ClarifyRetryPolicy::default(),
            config: ClarificationConfig::default(),
        }
    }

    /// Replaces the retry schedule.
    #[must_use]
    pub fn with_policy(mut self, policy: ClarifyRetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replaces the orchestrator settings.
    #[must_use]
    pub const fn with_config(mut self, config: ClarificationConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the retry schedule in use.
    #[must_use]
    pub const fn policy(&self) -> &ClarifyRetryPolicy {
        &self.policy
    }

    /// Runs one clarification cycle.
    ///
    /// Stale `in_progress` claims are failed first so a claim whose outcome
    /// was never stored cannot strand its capture. Candidates are then
    /// visited oldest first. Exhausted captures are swept to
    /// `permanently_failed`; eligible ones are claimed and clarified until
    /// the batch is full. Clarifier errors are recorded on the capture and
    /// never returned.
    ///
    /// # Errors
    ///
    /// Returns [`ClarificationError::Repository`] when candidates cannot be
    /// loaded. Failures on individual captures are logged and the cycle
    /// moves on.
    pub async fn run_cycle(&self) -> ClarificationResult<ClarificationReport> {
        let mut report = ClarificationReport {
            recovered: self.recover_stale().await?,
            ..ClarificationReport::default()
        };

        let repository = &*self.repository;
        let candidates = with_contention_retry(self.config.contention, move || {
            repository.find_clarification_candidates()
        })
        .await?;

        let now = self.clock.utc();
        let mut claimed = 0_usize;
        for capture in candidates {
            match self.policy.evaluate_capture(&capture, now) {
                RetryDecision::Ineligible => {}
                RetryDecision::Backoff { .. } => report.backing_off += 1,
                RetryDecision::Exhausted => match self.abandon(capture).await {
                    Ok(true) => report.permanently_failed += 1,
                    Ok(false) => report.skipped += 1,
                    Err(err) => {
                        tracing::error!(error = %err, "failed to retire exhausted capture");
                    }
                },
                RetryDecision::Eligible if claimed >= self.config.batch_size => {}
                RetryDecision::Eligible => {
                    claimed += 1;
                    let capture_id = capture.id();
                    match self.attempt(capture).await {
                        Ok(AttemptOutcome::Completed) => report.completed += 1,
                        Ok(AttemptOutcome::Failed) => report.failed += 1,
                        Ok(AttemptOutcome::PermanentlyFailed) => report.permanently_failed += 1,
                        Ok(AttemptOutcome::Skipped) => report.skipped += 1,
                        Err(err) => {
                            tracing::error!(
                                capture_id = %capture_id,
                                error = %err,
                                "clarification attempt could not be recorded"
                            );
                        }
                    }
                }
            }
        }

        if report != ClarificationReport::default() {
            tracing::info!(
                component = "clarification",
                completed = report.completed,
                failed = report.failed,
                permanently_failed = report.permanently_failed,
                backing_off = report.backing_off,
                skipped = report.skipped,
                recovered = report.recovered,
                "clarification cycle finished"
            );
        }
        Ok(report)
    }

    /// Fails captures left `in_progress` by an interrupted process so they
    /// re-enter the retry schedule. Call once before the first cycle.
    ///
    /// # Errors
    ///
    /// Returns [`ClarificationError`] when the interrupted captures cannot be
    /// loaded. A capture that cannot be updated is logged and left for the
    /// stale-claim sweep of a later cycle.
    pub async fn recover_interrupted(&self) -> ClarificationResult<usize> {
        self.recover_claims(|_| true).await
    }

    async fn recover_stale(&self) -> ClarificationResult<usize> {
        let now = self.clock.utc();
        let after = self.config.stale_claim_after();
        self.recover_claims(|capture| capture.is_clarification_stale(now, after))
            .await
    }

    async fn recover_claims(
        &self,
        select: impl Fn(&Capture) -> bool,
    ) -> ClarificationResult<usize> {
        let repository = &*self.repository;
        let interrupted = with_contention_retry(self.config.contention, move || {
            repository.find_interrupted_clarifications()
        })
        .await?;

        let mut recovered = 0;
        for mut capture in interrupted.into_iter().filter(|capture| select(capture)) {
            let permanently = capture.clarify_attempt_count() >= self.config.max_attempts;
            capture.fail_clarification(
                "clarification interrupted before completion",
                permanently,
                &*self.clock,
            )?;
            match self.persist(&capture).await {
                Ok(_) => {
                    recovered += 1;
                    tracing::warn!(
                        capture_id = %capture.id(),
                        attempt = capture.clarify_attempt_count(),
                        permanently,
                        "recovered interrupted clarification"
                    );
                }
                Err(CaptureRepositoryError::Conflict { .. }) => {}
                Err(err) => {
                    tracing::error!(
                        capture_id = %capture.id(),
                        error = %err,
                        "interrupted clarification could not be recovered"
                    );
                }
            }
        }
        Ok(recovered)
    }

    async fn attempt(&self, mut capture: Capture) -> ClarificationResult<AttemptOutcome> {
        capture.begin_clarification(&*self.clock)?;
        let mut capture = match self.persist(&capture).await {
            Ok(stored) => stored,
            Err(CaptureRepositoryError::Conflict { id, .. }) => {
                tracing::debug!(capture_id = %id, "clarification claim lost");
                return Ok(AttemptOutcome::Skipped);
            }
            Err(err) => return Err(err.into()),
        };
        let capture_id = capture.id();
        let attempt = capture.clarify_attempt_count();

        let outcome = match self.call_clarifier(capture.raw_text()).await {
            Ok(clarification) => {
                capture.complete_clarification(clarification, &*self.clock)?;
                tracing::info!(capture_id = %capture_id, attempt, "capture clarified");
                AttemptOutcome::Completed
            }
            Err(err) => {
                let permanently = attempt >= self.config.max_attempts;
                capture.fail_clarification(err.to_string(), permanently, &*self.clock)?;
                tracing::warn!(
                    capture_id = %capture_id,
                    attempt,
                    error_type = err.kind(),
                    error = %err,
                    permanently,
                    "clarification failed"
                );
                if permanently {
                    AttemptOutcome::PermanentlyFailed
                } else {
                    AttemptOutcome::Failed
                }
            }
        };

        self.persist(&capture).await?;
        Ok(outcome)
    }

    async fn abandon(&self, mut capture: Capture) -> ClarificationResult<bool> {
        let capture_id: CaptureId = capture.id();
        let attempts = capture.clarify_attempt_count();
        let reason = capture.clarify_error().map_or_else(
            || format!("retries exhausted after {attempts} attempts"),
            |last| format!("retries exhausted after {attempts} attempts: {last}"),
        );
        capture.abandon_clarification(reason, &*self.clock)?;
        match self.persist(&capture).await {
            Ok(_) => {
                tracing::warn!(
                    capture_id = %capture_id,
                    attempt = attempts,
                    "clarification permanently failed"
                );
                Ok(true)
            }
            Err(CaptureRepositoryError::Conflict { .. }) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    async fn call_clarifier(
        &self,
        raw_text: &str,
    ) -> Result<Clarification, ClarifyError> {
        let deadline = self.config.call_timeout;
        match tokio::time::timeout(deadline, self.clarifier.clarify(raw_text)).await {
            Ok(result) => result,
            Err(_) => Err(ClarifyError::Timeout(format!(
                "no response within {}s",
                deadline.as_secs()
            ))),
        }
    }

    async fn persist(&self, capture: &Capture) -> Result<Capture, CaptureRepositoryError> {
        let repository = &*self.repository;
        with_contention_retry(self.config.contention, move || repository.update(capture)).await
    }
}
