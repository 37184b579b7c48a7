//! Circuit breaker guarding the external commit call.
//!
//! The breaker is a plain value owned by the commit polling loop and lent to
//! each cycle by `&mut`. It lives only in memory: a restarted process always
//! starts closed with a zero failure count.

use chrono::{DateTime, Duration, Utc};

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Attempts proceed.
    Closed,
    /// Attempts are rejected without calling out.
    Open,
    /// One probe attempt is allowed.
    HalfOpen,
}

/// Thresholds for the commit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the breaker.
    pub failure_threshold: u32,
    /// Time spent open before a probe is allowed.
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::seconds(60),
        }
    }
}

/// Verdict for one prospective call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The breaker is closed.
    Allowed,
    /// The breaker is half-open and this call is its single probe.
    Probe,
    /// The breaker is open, or a probe is already outstanding.
    Rejected {
        /// Earliest time a probe may be admitted, when known.
        retry_at: Option<DateTime<Utc>>,
    },
}

impl Admission {
    /// Returns `true` unless the call was rejected.
    #[must_use]
    pub const fn is_admitted(self) -> bool {
        !matches!(self, Self::Rejected { .. })
    }
}

/// Consecutive-failure circuit breaker.
#[derive(Debug, Clone)]
pub struct CommitCircuitBreaker {
    config: CircuitBreakerConfig,
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<DateTime<Utc>>,
    probe_outstanding: bool,
}

impl CommitCircuitBreaker {
    /// Creates a closed breaker.
    #[must_use]
    pub const fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            probe_outstanding: false,
        }
    }

    /// Returns the current state without advancing it.
    #[must_use]
    pub const fn state(&self) -> CircuitState {
        self.state
    }

    /// Returns the consecutive failure count.
    #[must_use]
    pub const fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Returns `true` when the breaker is open and still cooling down.
    #[must_use]
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.state, CircuitState::Open) && !self.cooldown_elapsed(now)
    }

    /// Decides whether a call may proceed at `now`.
    ///
    /// An open breaker whose cool-down has elapsed moves to half-open and
    /// admits exactly one probe.
    pub fn admit(&mut self, now: DateTime<Utc>) -> Admission {
        match self.state {
            CircuitState::Closed => Admission::Allowed,
            CircuitState::Open if self.cooldown_elapsed(now) => {
                self.state = CircuitState::HalfOpen;
                self.probe_outstanding = true;
                tracing::info!("commit circuit breaker half-open, admitting probe");
                Admission::Probe
            }
            CircuitState::Open => Admission::Rejected {
                retry_at: self.opened_at.map(|opened_at| opened_at + self.config.cooldown),
            },
            CircuitState::HalfOpen if !self.probe_outstanding => {
                self.probe_outstanding = true;
                Admission::Probe
            }
            CircuitState::HalfOpen => Admission::Rejected { retry_at: None },
        }
    }

    /// Returns an unused probe admission, for example when the claim on the
    /// probed capture was lost before any call was made.
    pub fn release_probe(&mut self) {
        if matches!(self.state, CircuitState::HalfOpen) {
            self.probe_outstanding = false;
        }
    }

    /// Records a successful call: closes the breaker and clears the count.
    pub fn record_success(&mut self) {
        if !matches!(self.state, CircuitState::Closed) {
            tracing::info!("commit circuit breaker closed after successful probe");
        }
        self.state = CircuitState::Closed;
        self.consecutive_failures = 0;
        self.opened_at = None;
        self.probe_outstanding = false;
    }

    /// Records a failed call.
    ///
    /// Opens the breaker once the threshold is reached; a failed probe
    /// reopens it and restarts the cool-down.
    pub fn record_failure(&mut self, now: DateTime<Utc>) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        match self.state {
            CircuitState::Closed if self.consecutive_failures >= self.config.failure_threshold => {
                self.open(now);
                tracing::error!(
                    failure_count = self.consecutive_failures,
                    "commit circuit breaker opened"
                );
            }
            CircuitState::Closed => {
                tracing::warn!(
                    failure_count = self.consecutive_failures,
                    failure_threshold = self.config.failure_threshold,
                    "commit failure recorded"
                );
            }
            CircuitState::HalfOpen | CircuitState::Open => {
                self.open(now);
                tracing::error!(
                    failure_count = self.consecutive_failures,
                    "commit circuit breaker reopened after failed probe"
                );
            }
        }
    }

    const fn open(&mut self, now: DateTime<Utc>) {
        self.state = CircuitState::Open;
        self.opened_at = Some(now);
        self.probe_outstanding = false;
    }

    fn cooldown_elapsed(&self, now: DateTime<Utc>) -> bool {
        self.opened_at
            .is_none_or(|opened_at| now >= opened_at + self.config.cooldown)
    }
}

impl Default for CommitCircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}
