//! Diesel row models for backlog persistence.

use super::schema::backlog_items;
use chrono::{DateTime, Utc};
use diesel::prelude::*;

/// Query result row for backlog items.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = backlog_items)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct BacklogItemRow {
    /// Internal item identifier.
    pub id: uuid::Uuid,
    /// Line text.
    pub raw_text: String,
    /// Import label.
    pub source: String,
    /// Drip status.
    pub status: String,
    /// Import timestamp.
    pub imported_at: DateTime<Utc>,
    /// Claim timestamp.
    pub claimed_at: Option<DateTime<Utc>>,
    /// Resolution timestamp.
    pub processed_at: Option<DateTime<Utc>>,
    /// Derived capture.
    pub capture_id: Option<uuid::Uuid>,
    /// Clarification attempts recorded at resolution.
    pub clarify_attempts: i32,
    /// Error propagated from the derived capture.
    pub last_error: Option<String>,
    /// Optimistic concurrency version.
    pub version: i64,
}

/// Write model for inserts and versioned updates. `seq` is assigned by the
/// database.
#[derive(Debug, Clone, Insertable, AsChangeset)]
#[diesel(table_name = backlog_items)]
#[diesel(treat_none_as_null = true)]
pub struct BacklogItemRecord {
    /// Internal item identifier.
    pub id: uuid::Uuid,
    /// Line text.
    pub raw_text: String,
    /// Import label.
    pub source: String,
    /// Drip status.
    pub status: String,
    /// Import timestamp.
    pub imported_at: DateTime<Utc>,
    /// Claim timestamp.
    pub claimed_at: Option<DateTime<Utc>>,
    /// Resolution timestamp.
    pub processed_at: Option<DateTime<Utc>>,
    /// Derived capture.
    pub capture_id: Option<uuid::Uuid>,
    /// Clarification attempts recorded at resolution.
    pub clarify_attempts: i32,
    /// Error propagated from the derived capture.
    pub last_error: Option<String>,
    /// Optimistic concurrency version.
    pub version: i64,
}
