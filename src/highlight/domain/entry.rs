//! Local cache entry for one remote task.
//!
//! Entries are written by the sync-pull refresh and by the suggester's
//! counter update. They are never deleted; a task that disappears remotely
//! is marked completed.

use super::HighlightDomainError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A remote task as reported by a sync pull.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteTaskSnapshot {
    /// Remote task identifier.
    pub task_id: String,
    /// Remote task series identifier.
    pub taskseries_id: String,
    /// Remote list identifier.
    pub list_id: String,
    /// Task name.
    pub name: String,
    /// When the task was created remotely.
    pub created_at: DateTime<Utc>,
    /// Owning project, `None` for a lonely action.
    pub project_id: Option<String>,
    /// Whether the task is completed remotely.
    pub completed: bool,
    /// Remote tags.
    pub tags: Vec<String>,
}

/// Cached remote task with suggestion counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RtmTaskCacheEntry {
    task_id: String,
    taskseries_id: String,
    list_id: String,
    name: String,
    created_at: DateTime<Utc>,
    project_id: Option<String>,
    completed: bool,
    tags: Vec<String>,
    times_suggested: u32,
    last_suggested_at: Option<DateTime<Utc>>,
    last_synced_at: DateTime<Utc>,
    version: u64,
}

/// Parameter object for reconstructing a persisted cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedCacheEntryData {
    /// Remote task identifier.
    pub task_id: String,
    /// Remote task series identifier.
    pub taskseries_id: String,
    /// Remote list identifier.
    pub list_id: String,
    /// Task name.
    pub name: String,
    /// Remote creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Owning project.
    pub project_id: Option<String>,
    /// Completion flag.
    pub completed: bool,
    /// Remote tags.
    pub tags: Vec<String>,
    /// Times the task was suggested.
    pub times_suggested: u32,
    /// Latest suggestion.
    pub last_suggested_at: Option<DateTime<Utc>>,
    /// Latest refresh that saw the task.
    pub last_synced_at: DateTime<Utc>,
    /// Optimistic concurrency version.
    pub version: u64,
}

impl RtmTaskCacheEntry {
    /// Creates an entry for a task seen for the first time.
    ///
    /// # Errors
    ///
    /// Returns [`HighlightDomainError::EmptyTaskId`] when the snapshot has no
    /// task identifier.
    pub fn from_snapshot(
        snapshot: RemoteTaskSnapshot,
        synced_at: DateTime<Utc>,
    ) -> Result<Self, HighlightDomainError> {
        if snapshot.task_id.trim().is_empty() {
            return Err(HighlightDomainError::EmptyTaskId);
        }
        Ok(Self {
            task_id: snapshot.task_id,
            taskseries_id: snapshot.taskseries_id,
            list_id: snapshot.list_id,
            name: snapshot.name,
            created_at: snapshot.created_at,
            project_id: snapshot.project_id,
            completed: snapshot.completed,
            tags: snapshot.tags,
            times_suggested: 0,
            last_suggested_at: None,
            last_synced_at: synced_at,
            version: 0,
        })
    }

    /// Reconstructs an entry from persisted storage.
    #[must_use]
    pub fn from_persisted(data: PersistedCacheEntryData) -> Self {
        Self {
            task_id: data.task_id,
            taskseries_id: data.taskseries_id,
            list_id: data.list_id,
            name: data.name,
            created_at: data.created_at,
            project_id: data.project_id,
            completed: data.completed,
            tags: data.tags,
            times_suggested: data.times_suggested,
            last_suggested_at: data.last_suggested_at,
            last_synced_at: data.last_synced_at,
            version: data.version,
        }
    }

    /// Returns the remote task identifier.
    #[must_use]
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Returns the remote task series identifier.
    #[must_use]
    pub fn taskseries_id(&self) -> &str {
        &self.taskseries_id
    }

    /// Returns the remote list identifier.
    #[must_use]
    pub fn list_id(&self) -> &str {
        &self.list_id
    }

    /// Returns the task name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the remote creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the owning project.
    #[must_use]
    pub fn project_id(&self) -> Option<&str> {
        self.project_id.as_deref()
    }

    /// Returns `true` when the task is completed.
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        self.completed
    }

    /// Returns the remote tags.
    #[must_use]
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Returns how many times the task was suggested.
    #[must_use]
    pub const fn times_suggested(&self) -> u32 {
        self.times_suggested
    }

    /// Returns the latest suggestion time.
    #[must_use]
    pub const fn last_suggested_at(&self) -> Option<DateTime<Utc>> {
        self.last_suggested_at
    }

    /// Returns the latest refresh that saw the task.
    #[must_use]
    pub const fn last_synced_at(&self) -> DateTime<Utc> {
        self.last_synced_at
    }

    /// Returns the optimistic concurrency version.
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    pub(crate) const fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    /// Returns `true` for an open task outside any project.
    #[must_use]
    pub const fn is_lonely_action(&self) -> bool {
        self.project_id.is_none() && !self.completed
    }

    /// Returns `true` when the task carries `tag`, ignoring case.
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|own| own.eq_ignore_ascii_case(tag))
    }

    /// Overwrites the remote fields from a newer snapshot. Suggestion
    /// counters are kept.
    pub fn apply_snapshot(&mut self, snapshot: RemoteTaskSnapshot, synced_at: DateTime<Utc>) {
        self.taskseries_id = snapshot.taskseries_id;
        self.list_id = snapshot.list_id;
        self.name = snapshot.name;
        self.created_at = snapshot.created_at;
        self.project_id = snapshot.project_id;
        self.completed = snapshot.completed;
        self.tags = snapshot.tags;
        self.last_synced_at = synced_at;
    }

    /// Marks a task that no longer appears remotely.
    pub const fn mark_completed(&mut self, synced_at: DateTime<Utc>) {
        self.completed = true;
        self.last_synced_at = synced_at;
    }

    /// Counts one suggestion made at `now`.
    pub const fn record_suggestion(&mut self, now: DateTime<Utc>) {
        self.times_suggested = self.times_suggested.saturating_add(1);
        self.last_suggested_at = Some(now);
    }
}
