//! Diesel row models for capture persistence.

use super::schema::{anchors, captures};
use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use serde_json::Value;

/// Query result row for capture records.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = captures)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CaptureRow {
    /// Internal capture identifier.
    pub id: uuid::Uuid,
    /// Original capture text.
    pub raw_text: String,
    /// Source kind.
    pub source_kind: String,
    /// Originating message identifier.
    pub source_id: Option<String>,
    /// Link back to the originating message.
    pub source_link: Option<String>,
    /// Clarification status.
    pub clarify_status: String,
    /// Clarification attempts made.
    pub clarify_attempt_count: i32,
    /// Start of the latest clarification attempt.
    pub last_clarify_attempt_at: Option<DateTime<Utc>>,
    /// Structured clarification payload.
    pub clarify_result: Option<Value>,
    /// Latest clarification error.
    pub clarify_error: Option<String>,
    /// Review decision.
    pub decision_status: String,
    /// Decision timestamp.
    pub decided_at: Option<DateTime<Utc>>,
    /// Reviewer notes.
    pub decision_notes: Option<String>,
    /// Commit status.
    pub commit_status: String,
    /// Commit attempts made.
    pub commit_attempt_count: i32,
    /// Start of the latest commit attempt.
    pub last_commit_attempt_at: Option<DateTime<Utc>>,
    /// Latest commit error.
    pub commit_error_message: Option<String>,
    /// Remote task identifier.
    pub rtm_task_id: Option<String>,
    /// Remote task series identifier.
    pub rtm_taskseries_id: Option<String>,
    /// Remote list identifier.
    pub rtm_list_id: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
    /// Optimistic concurrency version.
    pub version: i64,
}

/// Write model for capture records, used for inserts and versioned
/// updates.
///
/// `None` fields are written as `NULL` so cleared errors stay cleared.
#[derive(Debug, Clone, Insertable, AsChangeset)]
#[diesel(table_name = captures)]
#[diesel(treat_none_as_null = true)]
pub struct CaptureRecord {
    /// Internal capture identifier.
    pub id: uuid::Uuid,
    /// Original capture text.
    pub raw_text: String,
    /// Source kind.
    pub source_kind: String,
    /// Originating message identifier.
    pub source_id: Option<String>,
    /// Link back to the originating message.
    pub source_link: Option<String>,
    /// Clarification status.
    pub clarify_status: String,
    /// Clarification attempts made.
    pub clarify_attempt_count: i32,
    /// Start of the latest clarification attempt.
    pub last_clarify_attempt_at: Option<DateTime<Utc>>,
    /// Structured clarification payload.
    pub clarify_result: Option<Value>,
    /// Latest clarification error.
    pub clarify_error: Option<String>,
    /// Review decision.
    pub decision_status: String,
    /// Decision timestamp.
    pub decided_at: Option<DateTime<Utc>>,
    /// Reviewer notes.
    pub decision_notes: Option<String>,
    /// Commit status.
    pub commit_status: String,
    /// Commit attempts made.
    pub commit_attempt_count: i32,
    /// Start of the latest commit attempt.
    pub last_commit_attempt_at: Option<DateTime<Utc>>,
    /// Latest commit error.
    pub commit_error_message: Option<String>,
    /// Remote task identifier.
    pub rtm_task_id: Option<String>,
    /// Remote task series identifier.
    pub rtm_taskseries_id: Option<String>,
    /// Remote list identifier.
    pub rtm_list_id: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
    /// Optimistic concurrency version.
    pub version: i64,
}

/// Row model for anchors, used for reads, inserts and versioned updates.
#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = anchors)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(treat_none_as_null = true)]
pub struct AnchorRow {
    pub id: uuid::Uuid,
    pub kind: String,
    pub status: String,
    pub valid_until: NaiveDate,
    pub external_state: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}
