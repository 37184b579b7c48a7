//! Approval anchor: the one reminder task per day that tells the user
//! captures are waiting for review.
//!
//! The anchor record is written before the remote call, so a crash or an
//! unconfirmed call still leaves the day anchored and no second reminder is
//! created.

use super::{AnchorDomainError, ParseStatusError, RemoteTaskRef};
use chrono::{DateTime, NaiveDate, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Smart-add string of the approval reminder task.
pub const APPROVAL_ANCHOR_SMART_ADD: &str = "Tarkista GTD-hyväksynnät #na";

/// Unique identifier for an anchor record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnchorId(Uuid);

impl AnchorId {
    /// Creates a new random anchor identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an anchor identifier from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the wrapped UUID.
    #[must_use]
    pub const fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for AnchorId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AnchorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What an anchor reminds the user about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnchorKind {
    /// Proposed captures are waiting for a decision.
    Approval,
}

impl AnchorKind {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Approval => "approval_anchor",
        }
    }
}

impl TryFrom<&str> for AnchorKind {
    type Error = ParseStatusError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim() {
            "approval_anchor" => Ok(Self::Approval),
            _ => Err(ParseStatusError::new("anchor kind", value)),
        }
    }
}

/// Whether an anchor still counts for its day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnchorStatus {
    /// Counts until the end of `valid_until`.
    Active,
    /// Superseded by a later day.
    Expired,
}

impl AnchorStatus {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for AnchorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for AnchorStatus {
    type Error = ParseStatusError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim() {
            "active" => Ok(Self::Active),
            "expired" => Ok(Self::Expired),
            _ => Err(ParseStatusError::new("anchor status", value)),
        }
    }
}

/// Progress of the reminder task in the remote task manager, stored as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnchorExternalState {
    /// The creation call was started and has not been confirmed.
    InProgress {
        /// Smart-add string sent.
        smart_add: String,
        /// When the call started.
        started_at: DateTime<Utc>,
    },
    /// The reminder task exists.
    Committed {
        /// Smart-add string sent.
        smart_add: String,
        /// Remote reference of the created task.
        task: RemoteTaskRef,
        /// When the outcome was recorded.
        updated_at: DateTime<Utc>,
    },
    /// The call failed or went unconfirmed; never retried.
    Unknown {
        /// Smart-add string sent.
        smart_add: String,
        /// Error reported by the call.
        last_error: String,
        /// When the outcome was recorded.
        updated_at: DateTime<Utc>,
    },
}

impl AnchorExternalState {
    /// Returns the status tag used in the stored JSON.
    #[must_use]
    pub const fn status(&self) -> &'static str {
        match self {
            Self::InProgress { .. } => "in_progress",
            Self::Committed { .. } => "committed",
            Self::Unknown { .. } => "unknown",
        }
    }
}

/// Anchor fields as stored, for adapters rebuilding the aggregate.
#[derive(Debug, Clone)]
pub struct PersistedAnchorData {
    /// Identifier.
    pub id: AnchorId,
    /// Kind of reminder.
    pub kind: AnchorKind,
    /// Active or expired.
    pub status: AnchorStatus,
    /// Last UTC day the anchor counts for.
    pub valid_until: NaiveDate,
    /// Remote task progress, absent until the call starts.
    pub external_state: Option<AnchorExternalState>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
    /// Optimistic concurrency version.
    pub version: u64,
}

/// A persisted reminder with a one-day validity window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anchor {
    id: AnchorId,
    kind: AnchorKind,
    status: AnchorStatus,
    valid_until: NaiveDate,
    external_state: Option<AnchorExternalState>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: u64,
}

impl Anchor {
    /// Creates an active approval anchor valid through `day`.
    #[must_use]
    pub fn approval(day: NaiveDate, clock: &impl Clock) -> Self {
        let now = clock.utc();
        Self {
            id: AnchorId::new(),
            kind: AnchorKind::Approval,
            status: AnchorStatus::Active,
            valid_until: day,
            external_state: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Rebuilds an anchor from stored fields.
    #[must_use]
    pub fn from_persisted(data: PersistedAnchorData) -> Self {
        Self {
            id: data.id,
            kind: data.kind,
            status: data.status,
            valid_until: data.valid_until,
            external_state: data.external_state,
            created_at: data.created_at,
            updated_at: data.updated_at,
            version: data.version,
        }
    }

    /// Returns the identifier.
    #[must_use]
    pub const fn id(&self) -> AnchorId {
        self.id
    }

    /// Returns the kind.
    #[must_use]
    pub const fn kind(&self) -> AnchorKind {
        self.kind
    }

    /// Returns the status.
    #[must_use]
    pub const fn status(&self) -> AnchorStatus {
        self.status
    }

    /// Returns the last day the anchor counts for.
    #[must_use]
    pub const fn valid_until(&self) -> NaiveDate {
        self.valid_until
    }

    /// Returns the remote task progress.
    #[must_use]
    pub const fn external_state(&self) -> Option<&AnchorExternalState> {
        self.external_state.as_ref()
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the last update timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns the optimistic concurrency version.
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// Returns `true` when the anchor is active and covers `day`.
    #[must_use]
    pub fn is_valid_on(&self, day: NaiveDate) -> bool {
        matches!(self.status, AnchorStatus::Active) && self.valid_until >= day
    }

    /// Retires an active anchor.
    ///
    /// # Errors
    ///
    /// Returns [`AnchorDomainError::InvalidTransition`] when already expired.
    pub fn expire(&mut self, clock: &impl Clock) -> Result<(), AnchorDomainError> {
        if !matches!(self.status, AnchorStatus::Active) {
            return Err(self.transition_error("expire"));
        }
        self.status = AnchorStatus::Expired;
        self.updated_at = clock.utc();
        Ok(())
    }

    /// Marks the reminder task creation as started.
    ///
    /// # Errors
    ///
    /// Returns [`AnchorDomainError::InvalidTransition`] once a call was
    /// started.
    pub fn begin_task(
        &mut self,
        smart_add: impl Into<String>,
        clock: &impl Clock,
    ) -> Result<(), AnchorDomainError> {
        if self.external_state.is_some() {
            return Err(self.transition_error("begin task"));
        }
        let now = clock.utc();
        self.external_state = Some(AnchorExternalState::InProgress {
            smart_add: smart_add.into(),
            started_at: now,
        });
        self.updated_at = now;
        Ok(())
    }

    /// Records the created reminder task.
    ///
    /// # Errors
    ///
    /// Returns [`AnchorDomainError::InvalidTransition`] unless a call is in
    /// progress.
    pub fn record_committed(
        &mut self,
        task: RemoteTaskRef,
        clock: &impl Clock,
    ) -> Result<(), AnchorDomainError> {
        let smart_add = self.take_in_progress("record committed")?;
        let now = clock.utc();
        self.external_state = Some(AnchorExternalState::Committed {
            smart_add,
            task,
            updated_at: now,
        });
        self.updated_at = now;
        Ok(())
    }

    /// Records a failed or unconfirmed call. The anchor stays active, so the
    /// reminder is not attempted again that day.
    ///
    /// # Errors
    ///
    /// Returns [`AnchorDomainError::InvalidTransition`] unless a call is in
    /// progress.
    pub fn record_unknown(
        &mut self,
        error: impl Into<String>,
        clock: &impl Clock,
    ) -> Result<(), AnchorDomainError> {
        let smart_add = self.take_in_progress("record unknown")?;
        let now = clock.utc();
        self.external_state = Some(AnchorExternalState::Unknown {
            smart_add,
            last_error: error.into(),
            updated_at: now,
        });
        self.updated_at = now;
        Ok(())
    }

    pub(crate) const fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    fn take_in_progress(&self, action: &'static str) -> Result<String, AnchorDomainError> {
        match &self.external_state {
            Some(AnchorExternalState::InProgress { smart_add, .. }) => Ok(smart_add.clone()),
            _ => Err(self.transition_error(action)),
        }
    }

    fn transition_error(&self, action: &'static str) -> AnchorDomainError {
        AnchorDomainError::InvalidTransition {
            anchor_id: self.id,
            state: self
                .external_state
                .as_ref()
                .map_or(self.status.as_str(), AnchorExternalState::status),
            action,
        }
    }
}
