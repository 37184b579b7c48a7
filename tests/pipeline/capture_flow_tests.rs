//! Capture lifecycle from inbox to remote task.

use super::helpers::{ScriptedClarifier, ScriptedSyncClient, World, world};
use chrono::Duration;
use eyre::{Result, bail, ensure, eyre};
use inbox_relay::capture::{
    adapters::memory::InMemoryCaptureRepository,
    domain::{
        Capture, CaptureId, CaptureSource, ClarifyStatus, CommitResolution, CommitStatus,
        RemoteTaskRef,
    },
    ports::{CaptureRepository, IncomingCapture, TaskSyncError},
    services::{
        CaptureIntakeService, CircuitBreakerConfig, CircuitState, ClarificationOrchestrator,
        CommitCircuitBreaker, CommitOrchestrator, ReviewService,
    },
};
use inbox_relay::clock::ManualClock;
use inbox_relay::retry::ContentionRetry;
use rstest::rstest;
use std::sync::Arc;

type Clarify = ClarificationOrchestrator<InMemoryCaptureRepository, ScriptedClarifier, ManualClock>;
type Commit = CommitOrchestrator<InMemoryCaptureRepository, ScriptedSyncClient, ManualClock>;
type Review = ReviewService<InMemoryCaptureRepository, ManualClock>;

fn clarify(world: &World) -> Clarify {
    ClarificationOrchestrator::new(
        Arc::clone(&world.captures),
        Arc::clone(&world.clarifier),
        Arc::clone(&world.clock),
    )
}

fn commit(world: &World) -> Commit {
    CommitOrchestrator::new(
        Arc::clone(&world.captures),
        Arc::clone(&world.sync_client),
        Arc::clone(&world.clock),
    )
}

fn review(world: &World) -> Review {
    ReviewService::new(Arc::clone(&world.captures), Arc::clone(&world.clock), 3)
        .with_contention(ContentionRetry::disabled())
}

fn email(message_id: &str, text: &str) -> Result<IncomingCapture> {
    Ok(IncomingCapture {
        raw_text: text.to_owned(),
        source: CaptureSource::new(CaptureSource::EMAIL)?.with_source_id(message_id),
    })
}

async fn load(world: &World, id: CaptureId) -> Result<Capture> {
    world
        .captures
        .find_by_id(id)
        .await?
        .ok_or_else(|| eyre!("capture {id} missing"))
}

/// Ingests, clarifies and approves one capture per text.
async fn approved(world: &World, texts: &[&str]) -> Result<Vec<CaptureId>> {
    let intake = CaptureIntakeService::new(Arc::clone(&world.captures), Arc::clone(&world.clock));
    let source = CaptureSource::new("manual")?;
    let mut ids = Vec::with_capacity(texts.len());
    for text in texts {
        ids.push(intake.ingest(*text, source.clone()).await?.capture().id());
    }
    clarify(world).run_cycle().await?;
    let review = review(world);
    for id in &ids {
        review.approve(*id, None).await?;
    }
    Ok(ids)
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn email_capture_reaches_the_task_manager_once(world: World) -> Result<()> {
    let intake = CaptureIntakeService::new(Arc::clone(&world.captures), Arc::clone(&world.clock));
    world.feed.deliver(email("msg-1", "call the plumber")?);

    let first = intake.ingest_feed(&*world.feed).await?;
    world.feed.deliver(email("msg-1", "call the plumber")?);
    let redelivered = intake.ingest_feed(&*world.feed).await?;

    ensure!(first.created == 1);
    ensure!(redelivered.created == 0 && redelivered.duplicates == 1);
    ensure!(world.feed.unacknowledged() == 0);

    let clarified = clarify(&world).run_cycle().await?;
    ensure!(clarified.completed == 1);

    let review = review(&world);
    let [pending] = review.pending_review().await?.try_into().map_err(
        |pending: Vec<Capture>| eyre!("expected one capture awaiting review, got {}", pending.len()),
    )?;
    review.approve(pending.id(), Some("fine".to_owned())).await?;

    let mut breaker = CommitCircuitBreaker::new(CircuitBreakerConfig::default());
    let committed = commit(&world).run_cycle(&mut breaker).await?;
    let again = commit(&world).run_cycle(&mut breaker).await?;

    ensure!(committed.committed == 1);
    ensure!(again.attempted == 0, "a committed capture is never sent twice");
    ensure!(world.sync_client.requests().len() == 1);
    let stored = load(&world, pending.id()).await?;
    ensure!(stored.commit_status() == CommitStatus::Committed);
    ensure!(stored.remote_task() == Some(&RemoteTaskRef::new("task-1", "series-1", "inbox")));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn clarification_backoff_ends_in_permanent_failure(world: World) -> Result<()> {
    let intake = CaptureIntakeService::new(Arc::clone(&world.captures), Arc::clone(&world.clock));
    let id = intake
        .ingest("something vague", CaptureSource::new("manual")?)
        .await?
        .capture()
        .id();
    world.clarifier.push_timeouts(5);
    let orchestrator = clarify(&world);

    orchestrator.run_cycle().await?;
    for (attempt, backoff) in [
        (2, Duration::minutes(5)),
        (3, Duration::minutes(30)),
        (4, Duration::hours(2)),
    ] {
        world.clock.advance(backoff - Duration::minutes(1));
        orchestrator.run_cycle().await?;
        ensure!(
            world.clarifier.calls() == attempt - 1,
            "attempt {attempt} waits for its backoff"
        );
        world.clock.advance(Duration::minutes(1));
        orchestrator.run_cycle().await?;
        ensure!(world.clarifier.calls() == attempt);
    }
    ensure!(world.clarifier.calls() == 4, "calls: {}", world.clarifier.calls());
    ensure!(load(&world, id).await?.clarify_status() == ClarifyStatus::Failed);

    world.clock.advance(Duration::days(1));
    let sweep = orchestrator.run_cycle().await?;
    orchestrator.run_cycle().await?;

    ensure!(sweep.permanently_failed == 1);
    ensure!(world.clarifier.calls() == 4, "no attempt after exhaustion");
    let capture = load(&world, id).await?;
    ensure!(capture.clarify_status() == ClarifyStatus::PermanentlyFailed);
    ensure!(capture.clarify_attempt_count() == 4);
    let attention = review(&world).attention_required().await?;
    ensure!(attention.iter().any(|listed| listed.id() == id));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn ambiguous_commit_waits_for_an_operator(world: World) -> Result<()> {
    let [id] = approved(&world, &["renew passport"])
        .await?
        .try_into()
        .map_err(|ids: Vec<CaptureId>| eyre!("expected one capture, got {}", ids.len()))?;
    world
        .sync_client
        .push(Err(TaskSyncError::Ambiguous("connection reset".to_owned())));
    let orchestrator = commit(&world);
    let mut breaker = CommitCircuitBreaker::new(CircuitBreakerConfig::default());

    let first = orchestrator.run_cycle(&mut breaker).await?;
    world.clock.advance(Duration::hours(1));
    let second = orchestrator.run_cycle(&mut breaker).await?;

    ensure!(first.unknown == 1);
    ensure!(second.attempted == 0, "unknown commits are never retried automatically");
    ensure!(load(&world, id).await?.commit_status() == CommitStatus::Unknown);

    let review = review(&world);
    ensure!(review.attention_required().await?.iter().any(|c| c.id() == id));
    review.resolve_unknown(id, CommitResolution::Retry).await?;
    let retried = orchestrator.run_cycle(&mut breaker).await?;

    ensure!(retried.committed == 1);
    ensure!(world.sync_client.requests().len() == 2);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn open_breaker_blocks_calls_until_one_probe(world: World) -> Result<()> {
    approved(&world, &["one", "two", "three", "four", "five", "six"]).await?;
    world.sync_client.push_rejections(5);
    let orchestrator = commit(&world);
    let mut breaker = CommitCircuitBreaker::new(CircuitBreakerConfig::default());

    let tripped = orchestrator.run_cycle(&mut breaker).await?;

    ensure!(tripped.failed == 5);
    ensure!(tripped.breaker_blocked, "the sixth capture is skipped");
    ensure!(world.sync_client.requests().len() == 5);
    ensure!(breaker.state() == CircuitState::Open);

    world.clock.advance(Duration::seconds(30));
    let cooling = orchestrator.run_cycle(&mut breaker).await?;
    ensure!(cooling.attempted == 0);
    ensure!(world.sync_client.requests().len() == 5);

    world.clock.advance(Duration::seconds(30));
    let probe = orchestrator.run_cycle(&mut breaker).await?;

    ensure!(probe.attempted == 1, "exactly one probe after the cool-down");
    ensure!(world.sync_client.requests().len() == 6);
    ensure!(breaker.state() == CircuitState::Closed);
    ensure!(breaker.consecutive_failures() == 0);

    let drained = orchestrator.run_cycle(&mut breaker).await?;
    if drained.committed != 5 {
        bail!("expected the remaining five commits, got {drained:?}");
    }
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn auth_failure_is_reset_by_an_operator(world: World) -> Result<()> {
    let ids = approved(&world, &["pay rent", "book dentist"]).await?;
    world
        .sync_client
        .push(Err(TaskSyncError::Unauthorized("token revoked".to_owned())));
    let orchestrator = commit(&world);
    let mut breaker = CommitCircuitBreaker::new(CircuitBreakerConfig::default());

    let refused = orchestrator.run_cycle(&mut breaker).await?;

    ensure!(refused.auth_failed == 1);
    ensure!(refused.attempted == 1, "the cycle ends on refused credentials");
    let review = review(&world);
    let refused_id = review
        .attention_required()
        .await?
        .into_iter()
        .find(|capture| capture.commit_status() == CommitStatus::AuthFailed)
        .map(|capture| capture.id())
        .ok_or_else(|| eyre!("auth failure not surfaced"))?;
    review.reset_auth_failed(refused_id).await?;

    let resumed = orchestrator.run_cycle(&mut breaker).await?;

    ensure!(resumed.committed == 2);
    for id in ids {
        ensure!(load(&world, id).await?.commit_status() == CommitStatus::Committed);
    }
    Ok(())
}
