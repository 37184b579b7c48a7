//! Diesel row model for the remote task cache.

use super::schema::rtm_task_cache;
use chrono::{DateTime, Utc};
use diesel::prelude::*;

/// Row shared by reads, inserts and versioned updates.
#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = rtm_task_cache, primary_key(task_id))]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(treat_none_as_null = true)]
pub struct TaskCacheRow {
    /// Remote task identifier.
    pub task_id: String,
    /// Remote task series identifier.
    pub taskseries_id: String,
    /// Remote list identifier.
    pub list_id: String,
    /// Task name.
    pub name: String,
    /// Remote creation timestamp.
    pub task_created_at: DateTime<Utc>,
    /// Owning project.
    pub project_id: Option<String>,
    /// Completion flag.
    pub completed: bool,
    /// Remote tags.
    pub tags: Vec<String>,
    /// Times the task was suggested.
    pub times_suggested: i32,
    /// Latest suggestion.
    pub last_suggested_at: Option<DateTime<Utc>>,
    /// Latest refresh that saw the task.
    pub last_synced_at: DateTime<Utc>,
    /// Optimistic concurrency version.
    pub version: i64,
}
