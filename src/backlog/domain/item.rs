//! Backlog item aggregate.
//!
//! A backlog item is one line of an imported list. The drip importer claims
//! a few per day, turns each into a capture and resolves the item once that
//! capture reaches a terminal state.

use super::{BacklogDomainError, BacklogItemId, BacklogStatus};
use crate::capture::domain::CaptureId;
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};

/// Prefix of the source identifier carried by captures derived from backlog
/// items.
pub const DERIVED_SOURCE_PREFIX: &str = "backlog-";

/// Backlog item aggregate root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BacklogItem {
    id: BacklogItemId,
    raw_text: String,
    source: String,
    status: BacklogStatus,
    imported_at: DateTime<Utc>,
    claimed_at: Option<DateTime<Utc>>,
    processed_at: Option<DateTime<Utc>>,
    capture_id: Option<CaptureId>,
    clarify_attempts: u32,
    last_error: Option<String>,
    version: u64,
}

/// Parameter object for reconstructing a persisted backlog item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedBacklogItemData {
    /// Persisted identifier.
    pub id: BacklogItemId,
    /// Line text.
    pub raw_text: String,
    /// Import label.
    pub source: String,
    /// Current status.
    pub status: BacklogStatus,
    /// Import timestamp.
    pub imported_at: DateTime<Utc>,
    /// Claim timestamp.
    pub claimed_at: Option<DateTime<Utc>>,
    /// Resolution timestamp.
    pub processed_at: Option<DateTime<Utc>>,
    /// Derived capture.
    pub capture_id: Option<CaptureId>,
    /// Clarification attempts of the derived capture at resolution.
    pub clarify_attempts: u32,
    /// Error propagated from the derived capture.
    pub last_error: Option<String>,
    /// Optimistic concurrency version.
    pub version: u64,
}

impl BacklogItem {
    /// Creates a pending backlog item. The text is stored trimmed.
    ///
    /// # Errors
    ///
    /// Returns [`BacklogDomainError::EmptyRawText`] when the text is blank.
    pub fn new(
        raw_text: &str,
        source: impl Into<String>,
        clock: &impl Clock,
    ) -> Result<Self, BacklogDomainError> {
        let trimmed = raw_text.trim();
        if trimmed.is_empty() {
            return Err(BacklogDomainError::EmptyRawText);
        }
        Ok(Self {
            id: BacklogItemId::new(),
            raw_text: trimmed.to_owned(),
            source: source.into(),
            status: BacklogStatus::Pending,
            imported_at: clock.utc(),
            claimed_at: None,
            processed_at: None,
            capture_id: None,
            clarify_attempts: 0,
            last_error: None,
            version: 0,
        })
    }

    /// Reconstructs an item from persisted storage.
    #[must_use]
    pub fn from_persisted(data: PersistedBacklogItemData) -> Self {
        Self {
            id: data.id,
            raw_text: data.raw_text,
            source: data.source,
            status: data.status,
            imported_at: data.imported_at,
            claimed_at: data.claimed_at,
            processed_at: data.processed_at,
            capture_id: data.capture_id,
            clarify_attempts: data.clarify_attempts,
            last_error: data.last_error,
            version: data.version,
        }
    }

    /// Returns the item identifier.
    #[must_use]
    pub const fn id(&self) -> BacklogItemId {
        self.id
    }

    /// Returns the trimmed line text.
    #[must_use]
    pub fn raw_text(&self) -> &str {
        &self.raw_text
    }

    /// Returns the import label.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Returns the current status.
    #[must_use]
    pub const fn status(&self) -> BacklogStatus {
        self.status
    }

    /// Returns the import timestamp.
    #[must_use]
    pub const fn imported_at(&self) -> DateTime<Utc> {
        self.imported_at
    }

    /// Returns when the drip importer claimed the item.
    #[must_use]
    pub const fn claimed_at(&self) -> Option<DateTime<Utc>> {
        self.claimed_at
    }

    /// Returns when the item was resolved.
    #[must_use]
    pub const fn processed_at(&self) -> Option<DateTime<Utc>> {
        self.processed_at
    }

    /// Returns the derived capture, once created.
    #[must_use]
    pub const fn capture_id(&self) -> Option<CaptureId> {
        self.capture_id
    }

    /// Returns the clarification attempts recorded at resolution.
    #[must_use]
    pub const fn clarify_attempts(&self) -> u32 {
        self.clarify_attempts
    }

    /// Returns the error propagated from the derived capture.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Returns the optimistic concurrency version.
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    pub(crate) const fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    /// Source identifier of the capture derived from this item.
    #[must_use]
    pub fn derived_source_id(&self) -> String {
        format!("{DERIVED_SOURCE_PREFIX}{}", self.id)
    }

    /// Claims a pending item.
    ///
    /// # Errors
    ///
    /// Returns [`BacklogDomainError::InvalidTransition`] unless the item is
    /// pending.
    pub fn claim(&mut self, clock: &impl Clock) -> Result<(), BacklogDomainError> {
        self.ensure_status(BacklogStatus::Pending, "claim")?;
        self.status = BacklogStatus::Processing;
        self.claimed_at = Some(clock.utc());
        Ok(())
    }

    /// Links the derived capture. Linking the same capture twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`BacklogDomainError::InvalidTransition`] unless the item is
    /// processing, or [`BacklogDomainError::CaptureAlreadyLinked`] when a
    /// different capture is linked.
    pub fn link_capture(&mut self, capture_id: CaptureId) -> Result<(), BacklogDomainError> {
        self.ensure_status(BacklogStatus::Processing, "link capture")?;
        match self.capture_id {
            Some(existing) if existing != capture_id => {
                Err(BacklogDomainError::CaptureAlreadyLinked(self.id))
            }
            _ => {
                self.capture_id = Some(capture_id);
                Ok(())
            }
        }
    }

    /// Resolves the item after its derived capture was committed.
    ///
    /// # Errors
    ///
    /// Returns [`BacklogDomainError::InvalidTransition`] unless the item is
    /// processing.
    pub fn mark_processed(
        &mut self,
        clarify_attempts: u32,
        clock: &impl Clock,
    ) -> Result<(), BacklogDomainError> {
        self.ensure_status(BacklogStatus::Processing, "mark processed")?;
        self.status = BacklogStatus::Processed;
        self.clarify_attempts = clarify_attempts;
        self.last_error = None;
        self.processed_at = Some(clock.utc());
        Ok(())
    }

    /// Resolves the item after its derived capture failed terminally.
    ///
    /// # Errors
    ///
    /// Returns [`BacklogDomainError::InvalidTransition`] unless the item is
    /// processing.
    pub fn mark_failed(
        &mut self,
        error: impl Into<String>,
        clarify_attempts: u32,
        clock: &impl Clock,
    ) -> Result<(), BacklogDomainError> {
        self.ensure_status(BacklogStatus::Processing, "mark failed")?;
        self.status = BacklogStatus::Failed;
        self.clarify_attempts = clarify_attempts;
        self.last_error = Some(error.into());
        self.processed_at = Some(clock.utc());
        Ok(())
    }

    fn ensure_status(
        &self,
        expected: BacklogStatus,
        action: &'static str,
    ) -> Result<(), BacklogDomainError> {
        if self.status == expected {
            return Ok(());
        }
        Err(BacklogDomainError::InvalidTransition {
            item_id: self.id,
            status: self.status,
            action,
        })
    }
}
