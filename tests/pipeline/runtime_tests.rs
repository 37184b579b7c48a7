//! Every stage running as its own poll loop under one pipeline.

use super::helpers::{World, world};
use eyre::{Result, ensure, eyre};
use inbox_relay::backlog::services::{BacklogImportService, DailyQuota, DripImporter};
use inbox_relay::capture::{
    domain::{CaptureSource, CommitStatus},
    ports::{CaptureRepository, IncomingCapture},
    services::{
        ApprovalAnchorService, CaptureIntakeService, CircuitBreakerConfig,
        ClarificationOrchestrator, CommitCircuitBreaker, CommitOrchestrator, ReviewService,
    },
};
use inbox_relay::highlight::{
    domain::RemoteTaskSnapshot,
    services::{CacheRefreshService, HighlightSuggester},
};
use inbox_relay::runtime::{
    ClarifyCycle, CommitCycle, DripCycle, HighlightCycle, IntakeCycle, Pipeline, PollLoop,
    RefreshCycle,
};
use rstest::rstest;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

const TICK: Duration = Duration::from_millis(20);

fn spawn_all(world: &World) -> Pipeline {
    let mut pipeline = Pipeline::new();
    pipeline.spawn(PollLoop::new(
        IntakeCycle::new(
            CaptureIntakeService::new(Arc::clone(&world.captures), Arc::clone(&world.clock)),
            Arc::clone(&world.feed),
        ),
        TICK,
    ));
    pipeline.spawn(PollLoop::new(
        ClarifyCycle::new(ClarificationOrchestrator::new(
            Arc::clone(&world.captures),
            Arc::clone(&world.clarifier),
            Arc::clone(&world.clock),
        )),
        TICK,
    ));
    pipeline.spawn(PollLoop::new(
        CommitCycle::new(
            CommitOrchestrator::new(
                Arc::clone(&world.captures),
                Arc::clone(&world.sync_client),
                Arc::clone(&world.clock),
            ),
            ApprovalAnchorService::new(
                Arc::clone(&world.captures),
                Arc::clone(&world.anchors),
                Arc::clone(&world.sync_client),
                Arc::clone(&world.clock),
            ),
            CommitCircuitBreaker::new(CircuitBreakerConfig::default()),
        ),
        TICK,
    ));
    pipeline.spawn(PollLoop::new(
        DripCycle::new(
            DripImporter::new(
                Arc::clone(&world.backlog),
                Arc::clone(&world.captures),
                Arc::clone(&world.clock),
            ),
            DailyQuota::default(),
        ),
        TICK,
    ));
    pipeline.spawn(PollLoop::new(
        RefreshCycle::new(CacheRefreshService::new(
            Arc::clone(&world.task_cache),
            Arc::clone(&world.remote_tasks),
            Arc::clone(&world.clock),
        )),
        TICK,
    ));
    pipeline.spawn(PollLoop::new(
        HighlightCycle::new(
            HighlightSuggester::new(
                Arc::clone(&world.task_cache),
                Arc::clone(&world.remote_tasks),
                Arc::clone(&world.publisher),
                Arc::clone(&world.clock),
            ),
            Arc::clone(&world.clock),
            7,
        ),
        TICK,
    ));
    pipeline
}

/// Polls `check` until it returns `true` or two seconds pass.
async fn eventually<F, Fut>(what: &str, mut check: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if check().await? {
            return Ok(());
        }
        tokio::time::sleep(TICK).await;
    }
    Err(eyre!("timed out waiting for {what}"))
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn loops_carry_captures_end_to_end(world: World) -> Result<()> {
    BacklogImportService::new(Arc::clone(&world.backlog), Arc::clone(&world.clock))
        .import_text("tidy the shed", "notes.txt")
        .await?;
    world.feed.deliver(IncomingCapture {
        raw_text: "order printer ink".to_owned(),
        source: CaptureSource::new(CaptureSource::EMAIL)?.with_source_id("msg-42"),
    });
    let now = world.clock.now();
    world.remote_tasks.set(vec![RemoteTaskSnapshot {
        task_id: "t1".to_owned(),
        taskseries_id: "s1".to_owned(),
        list_id: "inbox".to_owned(),
        name: "water plants".to_owned(),
        created_at: now,
        project_id: None,
        completed: false,
        tags: Vec::new(),
    }]);
    let pipeline = spawn_all(&world);
    ensure!(pipeline.len() == 6);

    let review = &ReviewService::new(Arc::clone(&world.captures), Arc::clone(&world.clock), 3);
    eventually("two captures awaiting review", move || async move {
        Ok::<_, eyre::Report>(review.pending_review().await?.len() == 2)
    })
    .await?;
    let sync_client = &*world.sync_client;
    eventually("the approval reminder", move || async move {
        Ok::<_, eyre::Report>(!sync_client.reminders().is_empty())
    })
    .await?;
    for capture in review.pending_review().await? {
        review.approve(capture.id(), None).await?;
    }
    let captures = &*world.captures;
    eventually("the inbox capture to be committed", move || async move {
        let capture = captures
            .find_by_source(CaptureSource::EMAIL, "msg-42")
            .await?;
        Ok::<_, eyre::Report>(
            capture.is_some_and(|capture| capture.commit_status() == CommitStatus::Committed),
        )
    })
    .await?;
    let publisher = &*world.publisher;
    eventually("the daily highlight", move || async move {
        Ok::<_, eyre::Report>(!publisher.published().is_empty())
    })
    .await?;

    let summaries = pipeline.shutdown().await;

    ensure!(summaries.len() == 6);
    ensure!(summaries.iter().all(|summary| summary.cycles.is_some_and(|n| n > 0)));
    ensure!(world.sync_client.requests().len() == 2);
    ensure!(world.sync_client.reminders().len() == 1);
    ensure!(world.anchors.all()?.len() == 1);
    ensure!(world.publisher.published() == [vec!["t1".to_owned()]]);
    Ok(())
}
