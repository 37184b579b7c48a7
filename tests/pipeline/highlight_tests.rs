//! Task cache refresh feeding the daily highlight.

use super::helpers::{World, world};
use chrono::{DateTime, Duration, Utc};
use eyre::{Result, ensure, eyre};
use inbox_relay::highlight::{
    domain::RemoteTaskSnapshot,
    ports::TaskCacheRepository,
    services::{CacheRefreshService, HighlightSuggester},
};
use rstest::rstest;
use std::sync::Arc;

fn task(task_id: &str, now: DateTime<Utc>, age_days: i64) -> RemoteTaskSnapshot {
    RemoteTaskSnapshot {
        task_id: task_id.to_owned(),
        taskseries_id: format!("series-{task_id}"),
        list_id: "inbox".to_owned(),
        name: format!("task {task_id}"),
        created_at: now - Duration::days(age_days),
        project_id: None,
        completed: false,
        tags: Vec::new(),
    }
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn highlights_rotate_through_lonely_actions(world: World) -> Result<()> {
    let now = world.clock.now();
    let mut in_project = task("in-project", now, 90);
    in_project.project_id = Some("garden".to_owned());
    let mut pinned = task("pinned", now, 80);
    pinned.tags = vec!["highlight".to_owned()];
    world.remote_tasks.set(vec![
        task("oldest", now, 60),
        task("middle", now, 30),
        task("newest", now, 1),
        in_project,
        pinned,
    ]);
    let refresh = CacheRefreshService::new(
        Arc::clone(&world.task_cache),
        Arc::clone(&world.remote_tasks),
        Arc::clone(&world.clock),
    );
    let suggester = HighlightSuggester::new(
        Arc::clone(&world.task_cache),
        Arc::clone(&world.remote_tasks),
        Arc::clone(&world.publisher),
        Arc::clone(&world.clock),
    );

    let mut chosen = Vec::new();
    for _ in 0..4 {
        refresh.refresh().await?;
        let report = suggester.suggest().await?;
        ensure!(report.published);
        chosen.extend(report.selected.iter().map(|entry| entry.task_id().to_owned()));
        world.clock.advance(Duration::days(1));
    }

    ensure!(
        chosen == ["oldest", "middle", "newest", "oldest"],
        "chosen: {chosen:?}"
    );
    ensure!(world.publisher.published().len() == 4);
    ensure!(world.publisher.labelled() == ["oldest"], "only today's label remains");
    let oldest = world
        .task_cache
        .find_by_task_id("oldest")
        .await?
        .ok_or_else(|| eyre!("oldest missing"))?;
    ensure!(oldest.times_suggested() == 2);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn same_day_rerun_finds_nothing_new_to_nag(world: World) -> Result<()> {
    let now = world.clock.now();
    world.remote_tasks.set(vec![task("only", now, 10)]);
    CacheRefreshService::new(
        Arc::clone(&world.task_cache),
        Arc::clone(&world.remote_tasks),
        Arc::clone(&world.clock),
    )
    .refresh()
    .await?;
    let suggester = HighlightSuggester::new(
        Arc::clone(&world.task_cache),
        Arc::clone(&world.remote_tasks),
        Arc::clone(&world.publisher),
        Arc::clone(&world.clock),
    );

    let first = suggester.suggest().await?;
    world.clock.advance(Duration::hours(6));
    let rerun = suggester.suggest().await?;

    ensure!(first.selected.len() == 1);
    ensure!(rerun.selected.is_empty());
    ensure!(world.publisher.published().len() == 1);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn tasks_completed_remotely_leave_the_rotation(world: World) -> Result<()> {
    let now = world.clock.now();
    world
        .remote_tasks
        .set(vec![task("done-soon", now, 50), task("still-open", now, 5)]);
    let refresh = CacheRefreshService::new(
        Arc::clone(&world.task_cache),
        Arc::clone(&world.remote_tasks),
        Arc::clone(&world.clock),
    );
    refresh.refresh().await?;

    world.remote_tasks.set(vec![task("still-open", now, 5)]);
    let report = refresh.refresh().await?;
    let suggestion = HighlightSuggester::new(
        Arc::clone(&world.task_cache),
        Arc::clone(&world.remote_tasks),
        Arc::clone(&world.publisher),
        Arc::clone(&world.clock),
    )
    .suggest()
    .await?;

    ensure!(report.completed == 1);
    let selected: Vec<&str> = suggestion
        .selected
        .iter()
        .map(|entry| entry.task_id())
        .collect();
    ensure!(selected == ["still-open"], "selected: {selected:?}");
    ensure!(world.task_cache.find_all().await?.len() == 2, "entries are never deleted");
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn completion_missed_by_the_cache_is_caught_before_suggesting(world: World) -> Result<()> {
    let now = world.clock.now();
    world
        .remote_tasks
        .set(vec![task("finished", now, 50), task("waiting", now, 5)]);
    CacheRefreshService::new(
        Arc::clone(&world.task_cache),
        Arc::clone(&world.remote_tasks),
        Arc::clone(&world.clock),
    )
    .refresh()
    .await?;
    let mut finished = task("finished", now, 50);
    finished.completed = true;
    world.remote_tasks.set(vec![finished, task("waiting", now, 5)]);

    let report = HighlightSuggester::new(
        Arc::clone(&world.task_cache),
        Arc::clone(&world.remote_tasks),
        Arc::clone(&world.publisher),
        Arc::clone(&world.clock),
    )
    .suggest()
    .await?;

    ensure!(report.closed_remotely == 1);
    ensure!(world.publisher.labelled() == ["waiting"]);
    let cached = world
        .task_cache
        .find_by_task_id("finished")
        .await?
        .ok_or_else(|| eyre!("finished missing"))?;
    ensure!(cached.is_completed());
    ensure!(cached.times_suggested() == 0);
    Ok(())
}
