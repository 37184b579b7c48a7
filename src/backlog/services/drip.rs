//! Daily drip of backlog items into the capture pipeline.
//!
//! Each cycle first resolves items whose derived capture has reached a
//! terminal state, then claims new items while the daily quota allows. The
//! quota is in-memory state owned by the caller and passed in by mutable
//! reference, so one runtime loop owns it.

use crate::backlog::{
    domain::{BacklogDomainError, BacklogItem},
    ports::{BacklogRepository, BacklogRepositoryError, BacklogStatusCounts},
};
use crate::capture::{
    domain::{Capture, CaptureSource, ClarifyStatus, CommitStatus, DecisionStatus},
    ports::{CaptureRepository, CaptureRepositoryError},
    services::{CaptureIntakeService, IntakeError},
};
use crate::retry::{ContentionRetry, with_contention_retry};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use mockable::Clock;
use std::sync::Arc;
use thiserror::Error;

/// Service-level errors for the drip importer.
#[derive(Debug, Error)]
pub enum DripError {
    /// A backlog transition was rejected.
    #[error(transparent)]
    Domain(#[from] BacklogDomainError),
    /// Backlog repository operation failed.
    #[error(transparent)]
    Backlog(#[from] BacklogRepositoryError),
    /// Capture repository operation failed.
    #[error(transparent)]
    Capture(#[from] CaptureRepositoryError),
    /// The derived capture could not be created.
    #[error(transparent)]
    Intake(#[from] IntakeError),
}

/// Result type for drip operations.
pub type DripResult<T> = Result<T, DripError>;

/// Claims allowed per UTC calendar day.
///
/// Not persisted. Seed it from the store at start-up with
/// [`DripImporter::seed_quota`] so a restart does not grant a second
/// allowance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyQuota {
    limit: usize,
    day: Option<NaiveDate>,
    claimed: usize,
}

impl DailyQuota {
    /// Creates a quota allowing `limit` claims per day.
    #[must_use]
    pub const fn new(limit: usize) -> Self {
        Self {
            limit,
            day: None,
            claimed: 0,
        }
    }

    /// Returns the daily limit.
    #[must_use]
    pub const fn limit(&self) -> usize {
        self.limit
    }

    /// Returns the claims counted for the day containing `now`.
    #[must_use]
    pub fn claimed_on(&self, now: DateTime<Utc>) -> usize {
        if self.day == Some(now.date_naive()) {
            self.claimed
        } else {
            0
        }
    }

    /// Returns the claims still allowed on the day containing `now`.
    #[must_use]
    pub fn remaining(&self, now: DateTime<Utc>) -> usize {
        self.limit.saturating_sub(self.claimed_on(now))
    }

    /// Sets the number of claims already made on the day containing `now`.
    pub fn seed(&mut self, now: DateTime<Utc>, claimed: usize) {
        self.day = Some(now.date_naive());
        self.claimed = claimed;
    }

    /// Counts one claim on the day containing `now`.
    pub fn record_claim(&mut self, now: DateTime<Utc>) {
        let today = now.date_naive();
        if self.day != Some(today) {
            self.day = Some(today);
            self.claimed = 0;
        }
        self.claimed += 1;
    }
}

impl Default for DailyQuota {
    fn default() -> Self {
        Self::new(5)
    }
}

/// Tuning for the drip importer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DripConfig {
    /// Commit retry ceiling; a derived capture failed at it is terminal.
    pub commit_retry_ceiling: u32,
    /// Retry settings for contended store operations.
    pub contention: ContentionRetry,
}

impl Default for DripConfig {
    fn default() -> Self {
        Self {
            commit_retry_ceiling: 3,
            contention: ContentionRetry::default(),
        }
    }
}

/// Counters describing one drip cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DripReport {
    /// Pending items claimed.
    pub claimed: usize,
    /// Derived captures created or linked.
    pub captured: usize,
    /// Items resolved as processed.
    pub processed: usize,
    /// Items resolved as failed.
    pub failed: usize,
    /// Items whose update was lost to a concurrent writer.
    pub skipped: usize,
}

/// Backlog progress for operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BacklogSummary {
    /// Items per status.
    pub counts: BacklogStatusCounts,
    /// Claims allowed per day.
    pub daily_limit: usize,
    /// Claims made today.
    pub claimed_today: usize,
}

enum Resolution {
    Processed,
    Failed(String),
}

/// Feeds backlog items into the capture pipeline at a bounded daily rate.
pub struct DripImporter<B, R, C>
where
    B: BacklogRepository,
    R: CaptureRepository,
    C: Clock + Send + Sync,
{
    backlog: Arc<B>,
    captures: Arc<R>,
    intake: CaptureIntakeService<R, C>,
    clock: Arc<C>,
    config: DripConfig,
}

impl<B, R, C> DripImporter<B, R, C>
where
    B: BacklogRepository,
    R: CaptureRepository,
    C: Clock + Send + Sync,
{
    /// Creates a drip importer with default settings.
    #[must_use]
    pub fn new(backlog: Arc<B>, captures: Arc<R>, clock: Arc<C>) -> Self {
        let intake = CaptureIntakeService::new(Arc::clone(&captures), Arc::clone(&clock));
        Self {
            backlog,
            captures,
            intake,
            clock,
            config: DripConfig::default(),
        }
    }

    /// Replaces the importer settings.
    #[must_use]
    pub fn with_config(mut self, config: DripConfig) -> Self {
        self.intake = self.intake.with_contention(config.contention);
        self.config = config;
        self
    }

    /// Seeds `quota` with the claims already made today.
    ///
    /// # Errors
    ///
    /// Returns [`DripError::Backlog`] when the count cannot be read.
    pub async fn seed_quota(&self, quota: &mut DailyQuota) -> DripResult<usize> {
        let now = self.clock.utc();
        let start_of_day = now.date_naive().and_time(NaiveTime::MIN).and_utc();
        let backlog = &*self.backlog;
        let claimed = with_contention_retry(self.config.contention, move || {
            backlog.count_claimed_since(start_of_day)
        })
        .await?;
        quota.seed(now, claimed);
        tracing::info!(claimed, limit = quota.limit(), "backlog quota seeded");
        Ok(claimed)
    }

    /// Runs one drip cycle.
    ///
    /// # Errors
    ///
    /// Returns [`DripError`] when the processing or pending items cannot be
    /// loaded. Failures on individual items are logged and the cycle moves
    /// on.
    pub async fn run_cycle(&self, quota: &mut DailyQuota) -> DripResult<DripReport> {
        let mut report = DripReport::default();
        self.resolve_processing(&mut report).await?;
        self.claim_pending(quota, &mut report).await?;

        if report != DripReport::default() {
            tracing::info!(
                component = "backlog",
                claimed = report.claimed,
                captured = report.captured,
                processed = report.processed,
                failed = report.failed,
                skipped = report.skipped,
                "backlog cycle finished"
            );
        }
        Ok(report)
    }

    /// Returns item counts together with the quota position.
    ///
    /// # Errors
    ///
    /// Returns [`DripError::Backlog`] when the counts cannot be read.
    pub async fn summary(&self, quota: &DailyQuota) -> DripResult<BacklogSummary> {
        let backlog = &*self.backlog;
        let counts =
            with_contention_retry(self.config.contention, move || backlog.status_counts()).await?;
        Ok(BacklogSummary {
            counts,
            daily_limit: quota.limit(),
            claimed_today: quota.claimed_on(self.clock.utc()),
        })
    }

    async fn resolve_processing(&self, report: &mut DripReport) -> DripResult<()> {
        let backlog = &*self.backlog;
        let processing =
            with_contention_retry(self.config.contention, move || backlog.find_processing())
                .await?;

        for item in processing {
            let item_id = item.id();
            if let Err(err) = self.resolve_item(item, report).await {
                tracing::error!(backlog_item_id = %item_id, error = %err, "backlog item not resolved");
            }
        }
        Ok(())
    }

    async fn resolve_item(&self, mut item: BacklogItem, report: &mut DripReport) -> DripResult<()> {
        let Some(capture_id) = item.capture_id() else {
            // Claimed but the capture was never linked: the previous cycle
            // stopped between the two writes.
            if self.attach_capture(item).await? {
                report.captured += 1;
            } else {
                report.skipped += 1;
            }
            return Ok(());
        };

        let captures = &*self.captures;
        let capture = with_contention_retry(self.config.contention, move || {
            captures.find_by_id(capture_id)
        })
        .await?;
        let (resolution, attempts) = match &capture {
            Some(capture) => match terminal_resolution(capture, self.config.commit_retry_ceiling) {
                Some(resolution) => (resolution, capture.clarify_attempt_count()),
                None => return Ok(()),
            },
            None => (
                Resolution::Failed(format!("derived capture {capture_id} no longer exists")),
                0,
            ),
        };

        let processed = matches!(resolution, Resolution::Processed);
        match resolution {
            Resolution::Processed => item.mark_processed(attempts, &*self.clock)?,
            Resolution::Failed(error) => item.mark_failed(error, attempts, &*self.clock)?,
        }
        match self.persist(&item).await {
            Ok(_) if processed => {
                report.processed += 1;
                tracing::info!(backlog_item_id = %item.id(), capture_id = %capture_id, "backlog item processed");
            }
            Ok(_) => {
                report.failed += 1;
                tracing::warn!(
                    backlog_item_id = %item.id(),
                    capture_id = %capture_id,
                    error = item.last_error().unwrap_or_default(),
                    "backlog item failed"
                );
            }
            Err(BacklogRepositoryError::Conflict { .. }) => report.skipped += 1,
            Err(err) => return Err(err.into()),
        }
        Ok(())
    }

    async fn claim_pending(&self, quota: &mut DailyQuota, report: &mut DripReport) -> DripResult<()> {
        let remaining = quota.remaining(self.clock.utc());
        if remaining == 0 {
            tracing::debug!(limit = quota.limit(), "backlog quota used up for today");
            return Ok(());
        }
        let backlog = &*self.backlog;
        let pending = with_contention_retry(self.config.contention, move || {
            backlog.find_pending(remaining)
        })
        .await?;

        for mut item in pending {
            if quota.remaining(self.clock.utc()) == 0 {
                break;
            }
            let item_id = item.id();
            item.claim(&*self.clock)?;
            let claimed = match self.persist(&item).await {
                Ok(claimed) => claimed,
                Err(BacklogRepositoryError::Conflict { .. }) => {
                    report.skipped += 1;
                    continue;
                }
                Err(err) => {
                    tracing::error!(backlog_item_id = %item_id, error = %err, "backlog claim failed");
                    continue;
                }
            };
            quota.record_claim(self.clock.utc());
            report.claimed += 1;

            match self.attach_capture(claimed).await {
                Ok(true) => report.captured += 1,
                Ok(false) => report.skipped += 1,
                Err(err) => {
                    tracing::error!(
                        backlog_item_id = %item_id,
                        error = %err,
                        "derived capture not linked; retrying next cycle"
                    );
                }
            }
        }
        Ok(())
    }

    /// Creates the derived capture (idempotently) and links it. Returns
    /// `false` when the item changed concurrently.
    async fn attach_capture(&self, mut item: BacklogItem) -> DripResult<bool> {
        let source = CaptureSource::new(CaptureSource::BACKLOG)
            .map_err(IntakeError::from)?
            .with_source_id(item.derived_source_id());
        let outcome = self.intake.ingest(item.raw_text(), source).await?;
        let capture_id = outcome.capture().id();
        item.link_capture(capture_id)?;
        match self.persist(&item).await {
            Ok(_) => {
                tracing::info!(
                    backlog_item_id = %item.id(),
                    capture_id = %capture_id,
                    "backlog item entered the pipeline"
                );
                Ok(true)
            }
            Err(BacklogRepositoryError::Conflict { .. }) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    async fn persist(&self, item: &BacklogItem) -> Result<BacklogItem, BacklogRepositoryError> {
        let backlog = &*self.backlog;
        with_contention_retry(self.config.contention, move || backlog.update(item)).await
    }
}

/// Maps a derived capture to the backlog outcome, or `None` while the
/// pipeline may still act on it. Unknown and auth-failed commits wait for an
/// operator.
fn terminal_resolution(capture: &Capture, retry_ceiling: u32) -> Option<Resolution> {
    if capture.commit_status() == CommitStatus::Committed {
        return Some(Resolution::Processed);
    }
    if capture.decision_status() == DecisionStatus::Rejected {
        let reason = capture.decision_notes().map_or_else(
            || "rejected at review".to_owned(),
            |notes| format!("rejected at review: {notes}"),
        );
        return Some(Resolution::Failed(reason));
    }
    if capture.clarify_status() == ClarifyStatus::PermanentlyFailed {
        return Some(Resolution::Failed(
            capture
                .clarify_error()
                .unwrap_or("clarification permanently failed")
                .to_owned(),
        ));
    }
    if capture.is_commit_exhausted(retry_ceiling) {
        return Some(Resolution::Failed(
            capture
                .commit_error_message()
                .unwrap_or("commit retries exhausted")
                .to_owned(),
        ));
    }
    None
}
