//! Unit tests for the highlight module.


use crate::highlight::{
    domain::{RemoteTaskSnapshot, RtmTaskCacheEntry},
    ports::MockRemoteTaskSource,
};
use chrono::{DateTime, Duration, Utc};

/// Snapshot of a lonely action created `age_days` before `now`.
pub(super) fn lonely(task_id: &str, now: DateTime<Utc>, age_days: i64) -> RemoteTaskSnapshot {
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

/// Cache entry suggested `times` times, the last one `since` before `now`.
pub(super) fn suggested(
    task_id: &str,
    now: DateTime<Utc>,
    times: u32,
    since: Duration,
) -> RtmTaskCacheEntry {
    let mut entry =
        RtmTaskCacheEntry::from_snapshot(lonely(task_id, now, 30), now).expect("valid snapshot");
    for _ in 0..times {
        entry.record_suggestion(now - since);
    }
    entry
}

/// Remote source reporting every looked-up task as still open.
pub(super) fn all_open() -> MockRemoteTaskSource {
    let mut source = MockRemoteTaskSource::new();
    source
        .expect_fetch_task()
        .returning(|list_id, taskseries_id, task_id| Ok(Some(remote(list_id, taskseries_id, task_id, false))));
    source
}

/// Remote view of a task with the given identifiers.
pub(super) fn remote(
    list_id: &str,
    taskseries_id: &str,
    task_id: &str,
    completed: bool,
) -> RemoteTaskSnapshot {
    RemoteTaskSnapshot {
        task_id: task_id.to_owned(),
        taskseries_id: taskseries_id.to_owned(),
        list_id: list_id.to_owned(),
        name: format!("task {task_id}"),
        created_at: DateTime::<Utc>::UNIX_EPOCH,
        project_id: None,
        completed,
        tags: Vec::new(),
    }
}
