//! Backlog import and daily drip into the capture pipeline.

use super::helpers::{World, world};
use chrono::Duration;
use eyre::{Result, ensure, eyre};
use inbox_relay::backlog::{
    domain::BacklogStatus,
    ports::BacklogRepository,
    services::{BacklogImportService, DailyQuota, DripImporter},
};
use inbox_relay::capture::{
    domain::CaptureSource,
    ports::CaptureRepository,
    services::{
        CircuitBreakerConfig, ClarificationOrchestrator, CommitCircuitBreaker, CommitOrchestrator,
        ReviewService,
    },
};
use rstest::rstest;
use std::sync::Arc;

const BACKLOG: &str = "
clean the garage
sort old photos

fix the bike light
return library books
renew gym card
plan the garden
call grandma
";

async fn import(world: &World) -> Result<usize> {
    let report = BacklogImportService::new(Arc::clone(&world.backlog), Arc::clone(&world.clock))
        .import_text(BACKLOG, "notes.txt")
        .await?;
    Ok(report.imported)
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn backlog_drips_five_a_day_through_the_pipeline(world: World) -> Result<()> {
    ensure!(import(&world).await? == 7);
    let drip = DripImporter::new(
        Arc::clone(&world.backlog),
        Arc::clone(&world.captures),
        Arc::clone(&world.clock),
    );
    let mut quota = DailyQuota::default();
    drip.seed_quota(&mut quota).await?;

    let first_day = drip.run_cycle(&mut quota).await?;
    let same_day = drip.run_cycle(&mut quota).await?;

    ensure!(first_day.claimed == 5 && first_day.captured == 5);
    ensure!(same_day.claimed == 0, "the quota holds for the rest of the day");
    ensure!(world.backlog.status_counts().await?.pending == 2);

    ClarificationOrchestrator::new(
        Arc::clone(&world.captures),
        Arc::clone(&world.clarifier),
        Arc::clone(&world.clock),
    )
    .run_cycle()
    .await?;
    let review = ReviewService::new(Arc::clone(&world.captures), Arc::clone(&world.clock), 3);
    for capture in review.pending_review().await? {
        ensure!(capture.source().kind() == CaptureSource::BACKLOG);
        review.approve(capture.id(), None).await?;
    }
    let mut breaker = CommitCircuitBreaker::new(CircuitBreakerConfig::default());
    let committed = CommitOrchestrator::new(
        Arc::clone(&world.captures),
        Arc::clone(&world.sync_client),
        Arc::clone(&world.clock),
    )
    .run_cycle(&mut breaker)
    .await?;
    ensure!(committed.committed == 5);

    world.clock.advance(Duration::days(1));
    let next_day = drip.run_cycle(&mut quota).await?;

    ensure!(next_day.processed == 5);
    ensure!(next_day.claimed == 2);
    let counts = world.backlog.status_counts().await?;
    ensure!(counts.processed == 5 && counts.processing == 2 && counts.pending == 0);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn restart_does_not_grant_a_second_allowance(world: World) -> Result<()> {
    import(&world).await?;
    let first_process = DripImporter::new(
        Arc::clone(&world.backlog),
        Arc::clone(&world.captures),
        Arc::clone(&world.clock),
    );
    let mut quota = DailyQuota::new(3);
    first_process.seed_quota(&mut quota).await?;
    first_process.run_cycle(&mut quota).await?;

    world.clock.advance(Duration::hours(2));
    let restarted = DripImporter::new(
        Arc::clone(&world.backlog),
        Arc::clone(&world.captures),
        Arc::clone(&world.clock),
    );
    let mut fresh_quota = DailyQuota::new(3);
    let seeded = restarted.seed_quota(&mut fresh_quota).await?;
    let report = restarted.run_cycle(&mut fresh_quota).await?;

    ensure!(seeded == 3);
    ensure!(report.claimed == 0);
    let summary = restarted.summary(&fresh_quota).await?;
    ensure!(summary.claimed_today == 3 && summary.daily_limit == 3);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn rejected_derived_capture_fails_its_backlog_item(world: World) -> Result<()> {
    import(&world).await?;
    let drip = DripImporter::new(
        Arc::clone(&world.backlog),
        Arc::clone(&world.captures),
        Arc::clone(&world.clock),
    );
    let mut quota = DailyQuota::new(1);
    drip.run_cycle(&mut quota).await?;
    let item = world
        .backlog
        .find_processing()
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| eyre!("no claimed item"))?;
    let capture = world
        .captures
        .find_by_source(CaptureSource::BACKLOG, &item.derived_source_id())
        .await?
        .ok_or_else(|| eyre!("no derived capture"))?;
    ClarificationOrchestrator::new(
        Arc::clone(&world.captures),
        Arc::clone(&world.clarifier),
        Arc::clone(&world.clock),
    )
    .run_cycle()
    .await?;
    ReviewService::new(Arc::clone(&world.captures), Arc::clone(&world.clock), 3)
        .reject(capture.id(), Some("not this year".to_owned()))
        .await?;

    let report = drip.run_cycle(&mut quota).await?;

    ensure!(report.failed == 1);
    let stored = world
        .backlog
        .find_by_id(item.id())
        .await?
        .ok_or_else(|| eyre!("item vanished"))?;
    ensure!(stored.status() == BacklogStatus::Failed);
    ensure!(stored.capture_id() == Some(capture.id()));
    Ok(())
}
