//! Capture aggregate root and its lifecycle transitions.
//!
//! A capture moves through three independent status fields: clarification,
//! review decision, and external commit. The transitions below are the only
//! way to change them; persistence adapters reconstruct captures through
//! [`Capture::from_persisted`].

use super::{
    CaptureDomainError, CaptureId, CaptureSource, Clarification, ClarifyStatus, CommitStatus,
    DecisionStatus, RemoteTaskRef,
};
use chrono::{DateTime, TimeDelta, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};

/// Why a commit attempt did not confirm a remote task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitFailureKind {
    /// The task manager definitely did not create the task.
    Rejected,
    /// Credentials were refused.
    Unauthorized,
    /// The request may or may not have been applied.
    Ambiguous,
}

impl CommitFailureKind {
    const fn resulting_status(self) -> CommitStatus {
        match self {
            Self::Rejected => CommitStatus::Failed,
            Self::Unauthorized => CommitStatus::AuthFailed,
            Self::Ambiguous => CommitStatus::Unknown,
        }
    }
}

/// Operator decision for a capture whose commit outcome is unknown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitResolution {
    /// The operator found the remote task.
    Committed(RemoteTaskRef),
    /// The operator verified no remote task exists; commit again.
    Retry,
}

/// Capture aggregate root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capture {
    id: CaptureId,
    raw_text: String,
    source: CaptureSource,
    clarify_status: ClarifyStatus,
    clarify_attempt_count: u32,
    last_clarify_attempt_at: Option<DateTime<Utc>>,
    clarify_result: Option<Clarification>,
    clarify_error: Option<String>,
    decision_status: DecisionStatus,
    decided_at: Option<DateTime<Utc>>,
    decision_notes: Option<String>,
    commit_status: CommitStatus,
    commit_attempt_count: u32,
    last_commit_attempt_at: Option<DateTime<Utc>>,
    commit_error_message: Option<String>,
    remote_task: Option<RemoteTaskRef>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: u64,
}

/// Parameter object for reconstructing a persisted capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedCaptureData {
    /// Persisted capture identifier.
    pub id: CaptureId,
    /// Original capture text.
    pub raw_text: String,
    /// Origin metadata.
    pub source: CaptureSource,
    /// Clarification status.
    pub clarify_status: ClarifyStatus,
    /// Clarification attempts made so far.
    pub clarify_attempt_count: u32,
    /// Start of the latest clarification attempt.
    pub last_clarify_attempt_at: Option<DateTime<Utc>>,
    /// Stored clarification, once completed.
    pub clarify_result: Option<Clarification>,
    /// Latest clarification error.
    pub clarify_error: Option<String>,
    /// Review decision.
    pub decision_status: DecisionStatus,
    /// Decision timestamp.
    pub decided_at: Option<DateTime<Utc>>,
    /// Reviewer notes.
    pub decision_notes: Option<String>,
    /// Commit status.
    pub commit_status: CommitStatus,
    /// Commit attempts made so far.
    pub commit_attempt_count: u32,
    /// Start of the latest commit attempt.
    pub last_commit_attempt_at: Option<DateTime<Utc>>,
    /// Latest commit error.
    pub commit_error_message: Option<String>,
    /// Remote task created by the commit.
    pub remote_task: Option<RemoteTaskRef>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Latest transition timestamp.
    pub updated_at: DateTime<Utc>,
    /// Optimistic concurrency version.
    pub version: u64,
}

impl Capture {
    /// Creates a new capture awaiting clarification.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureDomainError::EmptyRawText`] when the text is blank.
    pub fn new(
        raw_text: impl Into<String>,
        source: CaptureSource,
        clock: &impl Clock,
    ) -> Result<Self, CaptureDomainError> {
        let raw_text = raw_text.into();
        if raw_text.trim().is_empty() {
            return Err(CaptureDomainError::EmptyRawText);
        }
        let timestamp = clock.utc();
        Ok(Self {
            id: CaptureId::new(),
            raw_text,
            source,
            clarify_status: ClarifyStatus::Pending,
            clarify_attempt_count: 0,
            last_clarify_attempt_at: None,
            clarify_result: None,
            clarify_error: None,
            decision_status: DecisionStatus::Proposed,
            decided_at: None,
            decision_notes: None,
            commit_status: CommitStatus::Pending,
            commit_attempt_count: 0,
            last_commit_attempt_at: None,
            commit_error_message: None,
            remote_task: None,
            created_at: timestamp,
            updated_at: timestamp,
            version: 0,
        })
    }

    /// Reconstructs a capture from persisted storage.
    #[must_use]
    pub fn from_persisted(data: PersistedCaptureData) -> Self {
        Self {
            id: data.id,
            raw_text: data.raw_text,
            source: data.source,
            clarify_status: data.clarify_status,
            clarify_attempt_count: data.clarify_attempt_count,
            last_clarify_attempt_at: data.last_clarify_attempt_at,
            clarify_result: data.clarify_result,
            clarify_error: data.clarify_error,
            decision_status: data.decision_status,
            decided_at: data.decided_at,
            decision_notes: data.decision_notes,
            commit_status: data.commit_status,
            commit_attempt_count: data.commit_attempt_count,
            last_commit_attempt_at: data.last_commit_attempt_at,
            commit_error_message: data.commit_error_message,
            remote_task: data.remote_task,
            created_at: data.created_at,
            updated_at: data.updated_at,
            version: data.version,
        }
    }

    /// Returns the capture identifier.
    #[must_use]
    pub const fn id(&self) -> CaptureId {
        self.id
    }

    /// Returns the original capture text.
    #[must_use]
    pub fn raw_text(&self) -> &str {
        &self.raw_text
    }

    /// Returns the capture origin.
    #[must_use]
    pub const fn source(&self) -> &CaptureSource {
        &self.source
    }

    /// Returns the clarification status.
    #[must_use]
    pub const fn clarify_status(&self) -> ClarifyStatus {
        self.clarify_status
    }

    /// Returns the number of clarification attempts made.
    #[must_use]
    pub const fn clarify_attempt_count(&self) -> u32 {
        self.clarify_attempt_count
    }

    /// Returns when the latest clarification attempt started.
    #[must_use]
    pub const fn last_clarify_attempt_at(&self) -> Option<DateTime<Utc>> {
        self.last_clarify_attempt_at
    }

    /// Returns the stored clarification, if any.
    #[must_use]
    pub const fn clarify_result(&self) -> Option<&Clarification> {
        self.clarify_result.as_ref()
    }

    /// Returns the latest clarification error, if any.
    #[must_use]
    pub fn clarify_error(&self) -> Option<&str> {
        self.clarify_error.as_deref()
    }

    /// Returns the review decision.
    #[must_use]
    pub const fn decision_status(&self) -> DecisionStatus {
        self.decision_status
    }

    /// Returns when the review decision was made.
    #[must_use]
    pub const fn decided_at(&self) -> Option<DateTime<Utc>> {
        self.decided_at
    }

    /// Returns the reviewer notes, if any.
    #[must_use]
    pub fn decision_notes(&self) -> Option<&str> {
        self.decision_notes.as_deref()
    }

    /// Returns the commit status.
    #[must_use]
    pub const fn commit_status(&self) -> CommitStatus {
        self.commit_status
    }

    /// Returns the number of commit attempts made.
    #[must_use]
    pub const fn commit_attempt_count(&self) -> u32 {
        self.commit_attempt_count
    }

    /// Returns when the latest commit attempt started.
    #[must_use]
    pub const fn last_commit_attempt_at(&self) -> Option<DateTime<Utc>> {
        self.last_commit_attempt_at
    }

    /// Returns the latest commit error, if any.
    #[must_use]
    pub fn commit_error_message(&self) -> Option<&str> {
        self.commit_error_message.as_deref()
    }

    /// Returns the remote task created for this capture, if any.
    #[must_use]
    pub const fn remote_task(&self) -> Option<&RemoteTaskRef> {
        self.remote_task.as_ref()
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the latest transition timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns the persisted version this value was read at.
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// Stamps the version assigned by the repository on a successful write.
    pub(crate) const fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    /// Returns the most relevant error text for operators.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.commit_error_message
            .as_deref()
            .or(self.clarify_error.as_deref())
    }

    /// Returns `true` when the commit orchestrator may attempt this capture.
    #[must_use]
    pub const fn is_commit_eligible(&self, retry_ceiling: u32) -> bool {
        if !matches!(self.decision_status, DecisionStatus::Approved) {
            return false;
        }
        match self.commit_status {
            CommitStatus::Pending => true,
            CommitStatus::Failed => self.commit_attempt_count < retry_ceiling,
            CommitStatus::Committed | CommitStatus::Unknown | CommitStatus::AuthFailed => false,
        }
    }

    /// Returns `true` when definite commit failures have used up every retry.
    #[must_use]
    pub const fn is_commit_exhausted(&self, retry_ceiling: u32) -> bool {
        matches!(self.commit_status, CommitStatus::Failed)
            && self.commit_attempt_count >= retry_ceiling
    }

    /// Returns `true` when automation has stopped and a human must act.
    #[must_use]
    pub const fn requires_attention(&self, retry_ceiling: u32) -> bool {
        if matches!(self.decision_status, DecisionStatus::Rejected) {
            return false;
        }
        matches!(self.clarify_status, ClarifyStatus::PermanentlyFailed)
            || matches!(
                self.commit_status,
                CommitStatus::Unknown | CommitStatus::AuthFailed
            )
            || self.is_commit_exhausted(retry_ceiling)
    }

    /// Returns `true` for an in-progress clarification claimed at least
    /// `after` before `now`.
    ///
    /// Such a claim outlived any call the claiming cycle could still be making
    /// and would otherwise never be picked up again.
    #[must_use]
    pub fn is_clarification_stale(&self, now: DateTime<Utc>, after: TimeDelta) -> bool {
        if !matches!(self.clarify_status, ClarifyStatus::InProgress) {
            return false;
        }
        self.last_clarify_attempt_at.is_none_or(|claimed| {
            claimed
                .checked_add_signed(after)
                .is_some_and(|deadline| deadline <= now)
        })
    }

    /// Claims the capture for a clarification attempt.
    ///
    /// Increments the attempt count and stamps the attempt time. The caller
    /// must persist the claim before calling the clarifier.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureDomainError::InvalidClarifyTransition`] unless the
    /// capture is proposed and pending or failed.
    pub fn begin_clarification(&mut self, clock: &impl Clock) -> Result<(), CaptureDomainError> {
        if !self.clarify_status.is_claimable()
            || !matches!(self.decision_status, DecisionStatus::Proposed)
        {
            return Err(self.clarify_transition_error("begin clarification"));
        }
        let now = clock.utc();
        self.clarify_status = ClarifyStatus::InProgress;
        self.clarify_attempt_count = self.clarify_attempt_count.saturating_add(1);
        self.last_clarify_attempt_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Stores a successful clarification.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureDomainError::InvalidClarifyTransition`] unless an
    /// attempt is in progress.
    pub fn complete_clarification(
        &mut self,
        result: Clarification,
        clock: &impl Clock,
    ) -> Result<(), CaptureDomainError> {
        self.ensure_clarify_in_progress("complete clarification")?;
        self.clarify_status = ClarifyStatus::Completed;
        self.clarify_result = Some(result);
        self.clarify_error = None;
        self.touch(clock);
        Ok(())
    }

    /// Records a failed clarification attempt.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureDomainError::InvalidClarifyTransition`] unless an
    /// attempt is in progress.
    pub fn fail_clarification(
        &mut self,
        error: impl Into<String>,
        permanently: bool,
        clock: &impl Clock,
    ) -> Result<(), CaptureDomainError> {
        self.ensure_clarify_in_progress("fail clarification")?;
        self.clarify_status = if permanently {
            ClarifyStatus::PermanentlyFailed
        } else {
            ClarifyStatus::Failed
        };
        self.clarify_error = Some(error.into());
        self.touch(clock);
        Ok(())
    }

    /// Gives up on a failed capture whose retries are exhausted.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureDomainError::InvalidClarifyTransition`] unless the
    /// clarification is failed.
    pub fn abandon_clarification(
        &mut self,
        reason: impl Into<String>,
        clock: &impl Clock,
    ) -> Result<(), CaptureDomainError> {
        if !matches!(self.clarify_status, ClarifyStatus::Failed) {
            return Err(self.clarify_transition_error("abandon clarification"));
        }
        self.clarify_status = ClarifyStatus::PermanentlyFailed;
        self.clarify_error = Some(reason.into());
        self.touch(clock);
        Ok(())
    }

    /// Replaces the clarification by hand and marks it completed.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureDomainError::InvalidDecisionTransition`] once a
    /// decision was made, or [`CaptureDomainError::InvalidClarifyTransition`]
    /// while an automatic attempt is in flight.
    pub fn edit_clarification(
        &mut self,
        result: Clarification,
        clock: &impl Clock,
    ) -> Result<(), CaptureDomainError> {
        if !matches!(self.decision_status, DecisionStatus::Proposed) {
            return Err(CaptureDomainError::InvalidDecisionTransition {
                capture_id: self.id,
                status: self.decision_status,
                requested: DecisionStatus::Proposed,
            });
        }
        if matches!(self.clarify_status, ClarifyStatus::InProgress) {
            return Err(self.clarify_transition_error("edit clarification"));
        }
        self.clarify_status = ClarifyStatus::Completed;
        self.clarify_result = Some(result);
        self.clarify_error = None;
        self.touch(clock);
        Ok(())
    }

    /// Approves a clarified capture for commit. Irreversible.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureDomainError::InvalidDecisionTransition`] when already
    /// decided, or [`CaptureDomainError::NotClarified`] without a completed
    /// clarification.
    pub fn approve(
        &mut self,
        notes: Option<String>,
        clock: &impl Clock,
    ) -> Result<(), CaptureDomainError> {
        self.ensure_undecided(DecisionStatus::Approved)?;
        if !matches!(self.clarify_status, ClarifyStatus::Completed) || self.clarify_result.is_none()
        {
            return Err(CaptureDomainError::NotClarified(self.id));
        }
        self.decide(DecisionStatus::Approved, notes, clock);
        Ok(())
    }

    /// Rejects a capture. Irreversible.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureDomainError::InvalidDecisionTransition`] when already
    /// decided, or [`CaptureDomainError::InvalidClarifyTransition`] while an
    /// automatic attempt is in flight.
    pub fn reject(
        &mut self,
        notes: Option<String>,
        clock: &impl Clock,
    ) -> Result<(), CaptureDomainError> {
        self.ensure_undecided(DecisionStatus::Rejected)?;
        if matches!(self.clarify_status, ClarifyStatus::InProgress) {
            return Err(self.clarify_transition_error("reject"));
        }
        self.decide(DecisionStatus::Rejected, notes, clock);
        Ok(())
    }

    /// Claims the capture for a commit attempt.
    ///
    /// The claim sets `commit_status` to [`CommitStatus::Unknown`] so that a
    /// process dying mid-call leaves a state automation never retries. The
    /// caller must persist the claim before calling the sync client and then
    /// record the outcome.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureDomainError::NotApproved`] or
    /// [`CaptureDomainError::InvalidCommitTransition`] unless the capture is
    /// approved and pending or failed.
    pub fn begin_commit(&mut self, clock: &impl Clock) -> Result<(), CaptureDomainError> {
        if !matches!(self.decision_status, DecisionStatus::Approved) {
            return Err(CaptureDomainError::NotApproved(self.id));
        }
        if !matches!(
            self.commit_status,
            CommitStatus::Pending | CommitStatus::Failed
        ) {
            return Err(self.commit_transition_error("begin commit"));
        }
        let now = clock.utc();
        self.commit_attempt_count = self.commit_attempt_count.saturating_add(1);
        self.commit_status = CommitStatus::Unknown;
        self.last_commit_attempt_at = Some(now);
        self.commit_error_message = Some(format!(
            "commit attempt {} in flight since {}",
            self.commit_attempt_count,
            now.to_rfc3339()
        ));
        self.updated_at = now;
        Ok(())
    }

    /// Records a commit attempt that failed before reaching the task
    /// manager, such as a local validation error.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureDomainError::NotApproved`] or
    /// [`CaptureDomainError::InvalidCommitTransition`] under the same
    /// conditions as [`Capture::begin_commit`].
    pub fn fail_commit_locally(
        &mut self,
        message: impl Into<String>,
        clock: &impl Clock,
    ) -> Result<(), CaptureDomainError> {
        self.begin_commit(clock)?;
        self.commit_status = CommitStatus::Failed;
        self.commit_error_message = Some(message.into());
        Ok(())
    }

    /// Records a confirmed remote task.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureDomainError::InvalidCommitTransition`] unless a
    /// commit attempt is in flight.
    pub fn record_commit_success(
        &mut self,
        remote_task: RemoteTaskRef,
        clock: &impl Clock,
    ) -> Result<(), CaptureDomainError> {
        self.ensure_commit_in_flight("record commit success")?;
        self.commit_status = CommitStatus::Committed;
        self.commit_error_message = None;
        self.remote_task = Some(remote_task);
        self.touch(clock);
        Ok(())
    }

    /// Records a failed commit attempt.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureDomainError::InvalidCommitTransition`] unless a
    /// commit attempt is in flight.
    pub fn record_commit_failure(
        &mut self,
        kind: CommitFailureKind,
        message: impl Into<String>,
        clock: &impl Clock,
    ) -> Result<(), CaptureDomainError> {
        self.ensure_commit_in_flight("record commit failure")?;
        self.commit_status = kind.resulting_status();
        self.commit_error_message = Some(message.into());
        self.touch(clock);
        Ok(())
    }

    /// Resolves an unknown commit after manual verification.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureDomainError::InvalidCommitTransition`] unless the
    /// commit status is unknown.
    pub fn resolve_unknown_commit(
        &mut self,
        resolution: CommitResolution,
        clock: &impl Clock,
    ) -> Result<(), CaptureDomainError> {
        if !matches!(self.commit_status, CommitStatus::Unknown) {
            return Err(self.commit_transition_error("resolve unknown commit"));
        }
        match resolution {
            CommitResolution::Committed(remote_task) => {
                self.commit_status = CommitStatus::Committed;
                self.remote_task = Some(remote_task);
                self.commit_error_message = None;
            }
            CommitResolution::Retry => {
                self.commit_status = CommitStatus::Pending;
                self.commit_error_message =
                    Some("operator verified no remote task; commit requeued".to_owned());
            }
        }
        self.touch(clock);
        Ok(())
    }

    /// Requeues a capture whose commit failed on credentials.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureDomainError::InvalidCommitTransition`] unless the
    /// commit status is `auth_failed`.
    pub fn reset_auth_failure(&mut self, clock: &impl Clock) -> Result<(), CaptureDomainError> {
        if !matches!(self.commit_status, CommitStatus::AuthFailed) {
            return Err(self.commit_transition_error("reset auth failure"));
        }
        self.commit_status = CommitStatus::Pending;
        self.touch(clock);
        Ok(())
    }

    /// Requeues a failed commit with a fresh retry budget.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureDomainError::InvalidCommitTransition`] unless the
    /// commit status is failed.
    pub fn requeue_failed_commit(&mut self, clock: &impl Clock) -> Result<(), CaptureDomainError> {
        if !matches!(self.commit_status, CommitStatus::Failed) {
            return Err(self.commit_transition_error("requeue failed commit"));
        }
        self.commit_status = CommitStatus::Pending;
        self.commit_attempt_count = 0;
        self.touch(clock);
        Ok(())
    }

    fn decide(&mut self, decision: DecisionStatus, notes: Option<String>, clock: &impl Clock) {
        let now = clock.utc();
        self.decision_status = decision;
        self.decided_at = Some(now);
        self.decision_notes = notes;
        self.updated_at = now;
    }

    fn ensure_undecided(&self, requested: DecisionStatus) -> Result<(), CaptureDomainError> {
        if matches!(self.decision_status, DecisionStatus::Proposed) {
            return Ok(());
        }
        Err(CaptureDomainError::InvalidDecisionTransition {
            capture_id: self.id,
            status: self.decision_status,
            requested,
        })
    }

    fn ensure_clarify_in_progress(&self, action: &'static str) -> Result<(), CaptureDomainError> {
        if matches!(self.clarify_status, ClarifyStatus::InProgress) {
            return Ok(());
        }
        Err(self.clarify_transition_error(action))
    }

    fn ensure_commit_in_flight(&self, action: &'static str) -> Result<(), CaptureDomainError> {
        if matches!(self.commit_status, CommitStatus::Unknown) {
            return Ok(());
        }
        Err(self.commit_transition_error(action))
    }

    const fn clarify_transition_error(&self, action: &'static str) -> CaptureDomainError {
        CaptureDomainError::InvalidClarifyTransition {
            capture_id: self.id,
            status: self.clarify_status,
            action,
        }
    }

    const fn commit_transition_error(&self, action: &'static str) -> CaptureDomainError {
        CaptureDomainError::InvalidCommitTransition {
            capture_id: self.id,
            status: self.commit_status,
            action,
        }
    }

    /// Updates the `updated_at` timestamp to the current clock time.
    fn touch(&mut self, clock: &impl Clock) {
        self.updated_at = clock.utc();
    }
}
