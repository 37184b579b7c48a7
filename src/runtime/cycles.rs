//! [`PollCycle`] adapters for each pipeline stage.
//!
//! The adapters own the in-memory state a stage keeps between cycles: the
//! commit circuit breaker and the backlog daily quota live here and nowhere
//! else.

use super::{CycleError, PollCycle};
use crate::backlog::{
    ports::BacklogRepository,
    services::{DailyQuota, DripImporter},
};
use crate::capture::{
    ports::{AnchorRepository, CaptureFeed, CaptureRepository, Clarifier, TaskSyncClient},
    services::{
        ApprovalAnchorService, CaptureIntakeService, CircuitState, ClarificationOrchestrator,
        CommitCircuitBreaker, CommitOrchestrator,
    },
};
use crate::highlight::{
    ports::{HighlightPublisher, RemoteTaskSource, TaskCacheRepository},
    services::{CacheRefreshService, HighlightSuggester},
};
use async_trait::async_trait;
use chrono::{NaiveDate, Timelike};
use mockable::Clock;
use std::sync::Arc;

/// Pulls the capture feed.
pub struct IntakeCycle<R, C, F>
where
    R: CaptureRepository,
    C: Clock + Send + Sync,
    F: CaptureFeed,
{
    service: CaptureIntakeService<R, C>,
    feed: Arc<F>,
}

impl<R, C, F> IntakeCycle<R, C, F>
where
    R: CaptureRepository,
    C: Clock + Send + Sync,
    F: CaptureFeed,
{
    /// Creates the intake cycle.
    #[must_use]
    pub const fn new(service: CaptureIntakeService<R, C>, feed: Arc<F>) -> Self {
        Self { service, feed }
    }
}

#[async_trait]
impl<R, C, F> PollCycle for IntakeCycle<R, C, F>
where
    R: CaptureRepository + 'static,
    C: Clock + Send + Sync + 'static,
    F: CaptureFeed + 'static,
{
    fn name(&self) -> &'static str {
        "intake"
    }

    async fn run(&mut self) -> Result<(), CycleError> {
        let report = self.service.ingest_feed(&*self.feed).await?;
        if report.created > 0 || report.rejected > 0 {
            tracing::info!(
                component = "intake",
                created = report.created,
                duplicates = report.duplicates,
                rejected = report.rejected,
                "intake cycle finished"
            );
        }
        Ok(())
    }
}

/// Clarifies proposed captures. The first run recovers captures left
/// `in_progress` by an interrupted process.
pub struct ClarifyCycle<R, L, C>
where
    R: CaptureRepository,
    L: Clarifier,
    C: Clock + Send + Sync,
{
    orchestrator: ClarificationOrchestrator<R, L, C>,
    recovered: bool,
}

impl<R, L, C> ClarifyCycle<R, L, C>
where
    R: CaptureRepository,
    L: Clarifier,
    C: Clock + Send + Sync,
{
    /// Creates the clarification cycle.
    #[must_use]
    pub const fn new(orchestrator: ClarificationOrchestrator<R, L, C>) -> Self {
        Self {
            orchestrator,
            recovered: false,
        }
    }
}

#[async_trait]
impl<R, L, C> PollCycle for ClarifyCycle<R, L, C>
where
    R: CaptureRepository + 'static,
    L: Clarifier + 'static,
    C: Clock + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        "clarification"
    }

    async fn run(&mut self) -> Result<(), CycleError> {
        if !self.recovered {
            self.orchestrator.recover_interrupted().await?;
            self.recovered = true;
        }
        self.orchestrator.run_cycle().await?;
        Ok(())
    }
}

/// Commits approved captures behind the circuit breaker, then makes sure
/// today's approval reminder exists. The reminder is skipped while the
/// breaker is not closed.
pub struct CommitCycle<R, A, S, C>
where
    R: CaptureRepository,
    A: AnchorRepository,
    S: TaskSyncClient,
    C: Clock + Send + Sync,
{
    orchestrator: CommitOrchestrator<R, S, C>,
    anchors: ApprovalAnchorService<R, A, S, C>,
    breaker: CommitCircuitBreaker,
}

impl<R, A, S, C> CommitCycle<R, A, S, C>
where
    R: CaptureRepository,
    A: AnchorRepository,
    S: TaskSyncClient,
    C: Clock + Send + Sync,
{
    /// Creates the commit cycle.
    #[must_use]
    pub const fn new(
        orchestrator: CommitOrchestrator<R, S, C>,
        anchors: ApprovalAnchorService<R, A, S, C>,
        breaker: CommitCircuitBreaker,
    ) -> Self {
        Self {
            orchestrator,
            anchors,
            breaker,
        }
    }

    /// Returns the breaker.
    #[must_use]
    pub const fn breaker(&self) -> &CommitCircuitBreaker {
        &self.breaker
    }
}

#[async_trait]
impl<R, A, S, C> PollCycle for CommitCycle<R, A, S, C>
where
    R: CaptureRepository + 'static,
    A: AnchorRepository + 'static,
    S: TaskSyncClient + 'static,
    C: Clock + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        "commit"
    }

    async fn run(&mut self) -> Result<(), CycleError> {
        self.orchestrator.run_cycle(&mut self.breaker).await?;
        if matches!(self.breaker.state(), CircuitState::Closed) {
            self.anchors.ensure_anchor().await?;
        }
        Ok(())
    }
}

/// Drips backlog items into the capture pipeline. The first run seeds the
/// daily quota from the store.
pub struct DripCycle<B, R, C>
where
    B: BacklogRepository,
    R: CaptureRepository,
    C: Clock + Send + Sync,
{
    importer: DripImporter<B, R, C>,
    quota: DailyQuota,
    seeded: bool,
}

impl<B, R, C> DripCycle<B, R, C>
where
    B: BacklogRepository,
    R: CaptureRepository,
    C: Clock + Send + Sync,
{
    /// Creates the drip cycle.
    #[must_use]
    pub const fn new(importer: DripImporter<B, R, C>, quota: DailyQuota) -> Self {
        Self {
            importer,
            quota,
            seeded: false,
        }
    }

    /// Returns the quota.
    #[must_use]
    pub const fn quota(&self) -> &DailyQuota {
        &self.quota
    }
}

#[async_trait]
impl<B, R, C> PollCycle for DripCycle<B, R, C>
where
    B: BacklogRepository + 'static,
    R: CaptureRepository + 'static,
    C: Clock + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        "backlog"
    }

    async fn run(&mut self) -> Result<(), CycleError> {
        if !self.seeded {
            self.importer.seed_quota(&mut self.quota).await?;
            self.seeded = true;
        }
        self.importer.run_cycle(&mut self.quota).await?;
        Ok(())
    }
}

/// Refreshes the task cache from the remote task list.
pub struct RefreshCycle<T, S, C>
where
    T: TaskCacheRepository,
    S: RemoteTaskSource,
    C: Clock + Send + Sync,
{
    service: CacheRefreshService<T, S, C>,
}

impl<T, S, C> RefreshCycle<T, S, C>
where
    T: TaskCacheRepository,
    S: RemoteTaskSource,
    C: Clock + Send + Sync,
{
    /// Creates the refresh cycle.
    #[must_use]
    pub const fn new(service: CacheRefreshService<T, S, C>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<T, S, C> PollCycle for RefreshCycle<T, S, C>
where
    T: TaskCacheRepository + 'static,
    S: RemoteTaskSource + 'static,
    C: Clock + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        "cache_refresh"
    }

    async fn run(&mut self) -> Result<(), CycleError> {
        self.service.refresh().await?;
        Ok(())
    }
}

/// Runs the highlight suggester once per UTC day, at or after `run_hour`.
///
/// `run_hour` is a UTC hour, matched against [`Clock::utc`]; the day rolls
/// over at UTC midnight.
///
/// A run that selects nothing, for example before the first cache refresh,
/// does not count; the next poll tries again. Neither does a run whose label
/// clearing failed.
pub struct HighlightCycle<T, S, P, C>
where
    T: TaskCacheRepository,
    S: RemoteTaskSource,
    P: HighlightPublisher,
    C: Clock + Send + Sync,
{
    suggester: HighlightSuggester<T, S, P, C>,
    clock: Arc<C>,
    run_hour: u32,
    last_run: Option<NaiveDate>,
}

impl<T, S, P, C> HighlightCycle<T, S, P, C>
where
    T: TaskCacheRepository,
    S: RemoteTaskSource,
    P: HighlightPublisher,
    C: Clock + Send + Sync,
{
    /// Creates the highlight cycle.
    #[must_use]
    pub const fn new(
        suggester: HighlightSuggester<T, S, P, C>,
        clock: Arc<C>,
        run_hour: u32,
    ) -> Self {
        Self {
            suggester,
            clock,
            run_hour,
            last_run: None,
        }
    }

    /// Returns the day of the last run that selected a task.
    #[must_use]
    pub const fn last_run(&self) -> Option<NaiveDate> {
        self.last_run
    }
}

#[async_trait]
impl<T, S, P, C> PollCycle for HighlightCycle<T, S, P, C>
where
    T: TaskCacheRepository + 'static,
    S: RemoteTaskSource + 'static,
    P: HighlightPublisher + 'static,
    C: Clock + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        "highlight"
    }

    async fn run(&mut self) -> Result<(), CycleError> {
        let now = self.clock.utc();
        let today = now.date_naive();
        if now.hour() < self.run_hour || self.last_run == Some(today) {
            return Ok(());
        }
        let report = self.suggester.suggest().await?;
        if report.selected.is_empty() {
            return Ok(());
        }
        self.last_run = Some(today);
        tracing::info!(
            component = "highlight",
            eligible = report.eligible,
            selected = report.selected.len(),
            published = report.published,
            "daily highlight finished"
        );
        Ok(())
    }
}
