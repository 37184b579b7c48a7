//! Backoff schedule for failed clarifications.
//!
//! The schedule is a fixed lookup table keyed by the number of the attempt
//! about to be made, not a formula. Attempt numbers past the table are
//! terminal.

use crate::capture::domain::{Capture, ClarifyStatus};
use chrono::{DateTime, Duration, Utc};

/// Delay before attempts 1 to 4, measured from the previous attempt.
const DEFAULT_SCHEDULE: [Duration; 4] = [
    Duration::zero(),
    Duration::minutes(5),
    Duration::minutes(30),
    Duration::hours(2),
];

/// Outcome of evaluating a capture against the retry schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// The capture may be claimed now.
    Eligible,
    /// The capture waits for its backoff delay.
    Backoff {
        /// Earliest time of the next attempt.
        ready_at: DateTime<Utc>,
    },
    /// The schedule has no further attempts; the capture is terminal.
    Exhausted,
    /// The capture is not in a retryable status.
    Ineligible,
}

impl RetryDecision {
    /// Returns `true` when the capture may be claimed now.
    #[must_use]
    pub const fn is_eligible(self) -> bool {
        matches!(self, Self::Eligible)
    }
}

/// Clarification retry schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClarifyRetryPolicy {
    delays: Vec<Duration>,
}

impl Default for ClarifyRetryPolicy {
    fn default() -> Self {
        Self {
            delays: DEFAULT_SCHEDULE.to_vec(),
        }
    }
}

impl ClarifyRetryPolicy {
    /// Creates a policy from explicit per-attempt delays.
    ///
    /// `delays[n]` is the wait before attempt `n + 1`. An empty schedule
    /// allows a single attempt with no retries.
    #[must_use]
    pub fn from_delays(delays: Vec<Duration>) -> Self {
        if delays.is_empty() {
            return Self {
                delays: vec![Duration::zero()],
            };
        }
        Self { delays }
    }

    /// Returns the number of attempts the schedule allows.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        u32::try_from(self.delays.len()).unwrap_or(u32::MAX)
    }

    /// Returns the delay before the given 1-based attempt, or `None` when the
    /// attempt is past the schedule.
    #[must_use]
    pub fn delay_before(&self, attempt: u32) -> Option<Duration> {
        let index = usize::try_from(attempt.checked_sub(1)?).ok()?;
        self.delays.get(index).copied()
    }

    /// Evaluates clarification eligibility from a capture's attempt history.
    #[must_use]
    pub fn evaluate(
        &self,
        status: ClarifyStatus,
        attempt_count: u32,
        last_attempt_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> RetryDecision {
        match status {
            ClarifyStatus::Pending | ClarifyStatus::Failed => {}
            ClarifyStatus::InProgress
            | ClarifyStatus::Completed
            | ClarifyStatus::PermanentlyFailed => return RetryDecision::Ineligible,
        }

        let Some(delay) = self.delay_before(attempt_count.saturating_add(1)) else {
            return RetryDecision::Exhausted;
        };
        let Some(last_attempt_at) = last_attempt_at else {
            return RetryDecision::Eligible;
        };
        let ready_at = last_attempt_at + delay;
        if now >= ready_at {
            RetryDecision::Eligible
        } else {
            RetryDecision::Backoff { ready_at }
        }
    }

    /// Evaluates a capture.
    #[must_use]
    pub fn evaluate_capture(&self, capture: &Capture, now: DateTime<Utc>) -> RetryDecision {
        self.evaluate(
            capture.clarify_status(),
            capture.clarify_attempt_count(),
            capture.last_clarify_attempt_at(),
            now,
        )
    }

    /// Returns `true` when the capture may be claimed now.
    #[must_use]
    pub fn eligible_now(&self, capture: &Capture, now: DateTime<Utc>) -> bool {
        self.evaluate_capture(capture, now).is_eligible()
    }
}
