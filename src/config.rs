//! Pipeline configuration loaded from environment variables.
//!
//! Durations are whole seconds unless the variable name says otherwise.
//! Unset variables take their defaults; set but malformed values are
//! errors.

use crate::backlog::services::{DailyQuota, DripConfig};
use crate::capture::services::{CircuitBreakerConfig, ClarificationConfig, CommitConfig};
use crate::highlight::services::SuggestionPolicy;
use crate::retry::ContentionRetry;
use crate::telemetry::{LogConfig, LogFormat};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while reading configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A variable is set but cannot be parsed.
    #[error("invalid value `{value}` for {key}: {reason}")]
    Invalid {
        /// Variable name.
        key: &'static str,
        /// Raw value.
        value: String,
        /// Parser message.
        reason: String,
    },
    /// A variable parsed but is outside its allowed range.
    #[error("{key} {reason}")]
    OutOfRange {
        /// Variable name.
        key: &'static str,
        /// What the value must satisfy.
        reason: &'static str,
    },
}

/// Clarification loop settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClarifySection {
    /// Time between cycles.
    pub poll_interval: Duration,
    /// Orchestrator tuning.
    pub orchestrator: ClarificationConfig,
}

/// Commit loop settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitSection {
    /// Time between cycles.
    pub poll_interval: Duration,
    /// Orchestrator tuning.
    pub orchestrator: CommitConfig,
    /// Circuit breaker thresholds.
    pub breaker: CircuitBreakerConfig,
}

/// Backlog drip loop settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BacklogSection {
    /// Time between cycles.
    pub poll_interval: Duration,
    /// Items claimed per UTC day.
    pub daily_limit: usize,
    /// Importer tuning.
    pub drip: DripConfig,
}

impl BacklogSection {
    /// Returns a fresh quota for the configured limit.
    #[must_use]
    pub const fn quota(&self) -> DailyQuota {
        DailyQuota::new(self.daily_limit)
    }
}

/// Task cache refresh and highlight settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighlightSection {
    /// Time between cache refreshes.
    pub refresh_interval: Duration,
    /// Time between checks for the daily highlight run.
    pub poll_interval: Duration,
    /// Hour of the day from which the daily highlight may run, from
    /// `HIGHLIGHT_RUN_HOUR` (0-23).
    ///
    /// The hour and the day boundary are both UTC; the host time zone is
    /// never consulted. A deployment wanting 07:00 in UTC+2 sets 5.
    pub run_hour: u32,
    /// Eligibility and selection rules.
    pub policy: SuggestionPolicy,
}

/// Complete pipeline configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Time between capture feed pulls.
    pub intake_poll_interval: Duration,
    /// Clarification loop.
    pub clarify: ClarifySection,
    /// Commit loop.
    pub commit: CommitSection,
    /// Backlog drip loop.
    pub backlog: BacklogSection,
    /// Cache refresh and highlight loops.
    pub highlight: HighlightSection,
    /// Store contention retry shared by every service.
    pub contention: ContentionRetry,
    /// Logging.
    pub log: LogConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let contention = ContentionRetry::default();
        let commit = CommitConfig::default();
        Self {
            intake_poll_interval: Duration::from_secs(60),
            clarify: ClarifySection {
                poll_interval: Duration::from_secs(30),
                orchestrator: ClarificationConfig::default(),
            },
            commit: CommitSection {
                poll_interval: Duration::from_secs(30),
                orchestrator: commit,
                breaker: CircuitBreakerConfig::default(),
            },
            backlog: BacklogSection {
                poll_interval: Duration::from_secs(3600),
                daily_limit: DailyQuota::default().limit(),
                drip: DripConfig {
                    commit_retry_ceiling: commit.retry_ceiling,
                    contention,
                },
            },
            highlight: HighlightSection {
                refresh_interval: Duration::from_secs(900),
                poll_interval: Duration::from_secs(300),
                run_hour: 7,
                policy: SuggestionPolicy::default(),
            },
            contention,
            log: LogConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Reads the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for malformed or out-of-range values.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration through `lookup`, which returns the raw value of
    /// a variable or `None` when unset.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for malformed or out-of-range values.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };
        let mut config = Self::default();

        let contention_retries = env.parse("STORE_CONTENTION_RETRIES")?;
        if let Some(max_retries) = contention_retries {
            config.contention.max_retries = max_retries;
        }
        let contention = config.contention;

        if let Some(interval) = env.interval("EMAIL_POLL_INTERVAL")? {
            config.intake_poll_interval = interval;
        }

        let clarify = &mut config.clarify;
        if let Some(interval) = env.interval("CLARIFY_POLL_INTERVAL")? {
            clarify.poll_interval = interval;
        }
        if let Some(max_attempts) = env.positive("MAX_CLARIFY_RETRIES")? {
            clarify.orchestrator.max_attempts = max_attempts;
        }
        if let Some(timeout) = env.interval("LLM_API_TIMEOUT")? {
            clarify.orchestrator.call_timeout = timeout;
        }
        clarify.orchestrator.contention = contention;

        let commit = &mut config.commit;
        if let Some(interval) = env.interval("COMMIT_POLL_INTERVAL")? {
            commit.poll_interval = interval;
        }
        if let Some(ceiling) = env.positive("MAX_COMMIT_RETRIES")? {
            commit.orchestrator.retry_ceiling = ceiling;
        }
        if let Some(timeout) = env.interval("RTM_API_TIMEOUT")? {
            commit.orchestrator.call_timeout = timeout;
        }
        if let Some(threshold) = env.positive("CIRCUIT_BREAKER_FAILURE_THRESHOLD")? {
            commit.breaker.failure_threshold = threshold;
        }
        if let Some(cooldown) = env.seconds("CIRCUIT_BREAKER_TIMEOUT")? {
            commit.breaker.cooldown = cooldown;
        }
        commit.orchestrator.contention = contention;

        let backlog = &mut config.backlog;
        if let Some(interval) = env.interval("BACKLOG_POLL_INTERVAL")? {
            backlog.poll_interval = interval;
        }
        if let Some(limit) = env.parse("BACKLOG_DAILY_LIMIT")? {
            backlog.daily_limit = limit;
        }
        backlog.drip = DripConfig {
            commit_retry_ceiling: config.commit.orchestrator.retry_ceiling,
            contention,
        };

        let highlight = &mut config.highlight;
        if let Some(interval) = env.interval("HIGHLIGHT_REFRESH_INTERVAL")? {
            highlight.refresh_interval = interval;
        }
        if let Some(interval) = env.interval("HIGHLIGHT_POLL_INTERVAL")? {
            highlight.poll_interval = interval;
        }
        if let Some(hour) = env.parse::<u32>("HIGHLIGHT_RUN_HOUR")? {
            if hour > 23 {
                return Err(ConfigError::OutOfRange {
                    key: "HIGHLIGHT_RUN_HOUR",
                    reason: "must be between 0 and 23",
                });
            }
            highlight.run_hour = hour;
        }
        let policy = &mut highlight.policy;
        if let Some(hours) = env.parse::<u32>("HIGHLIGHT_COOLDOWN_HOURS")? {
            policy.cooldown = chrono::Duration::hours(i64::from(hours));
        }
        if let Some(cap) = env.positive("HIGHLIGHT_MAX_SUGGESTIONS")? {
            policy.max_suggestions = cap;
        }
        if let Some(days) = env.parse::<u32>("HIGHLIGHT_NAG_WINDOW_DAYS")? {
            policy.nag_window = chrono::Duration::days(i64::from(days));
        }
        if let Some(batch) = env.parse::<usize>("HIGHLIGHT_BATCH_SIZE")? {
            policy.batch_size = batch;
        }
        if let Some(tags) = env.raw("HIGHLIGHT_EXCLUDED_TAGS") {
            policy.excluded_tags = tags
                .split(',')
                .map(str::trim)
                .filter(|tag| !tag.is_empty())
                .map(str::to_owned)
                .collect();
        }

        if let Some(format) = env.raw("LOG_FORMAT") {
            config.log.format =
                LogFormat::from_str(&format).map_err(|err| ConfigError::Invalid {
                    key: "LOG_FORMAT",
                    value: format.clone(),
                    reason: err.to_string(),
                })?;
        }
        if let Some(level) = env.raw("LOG_LEVEL") {
            config.log.level = level;
        }

        Ok(config)
    }
}

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn raw(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
    }

    fn parse<T>(&self, key: &'static str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.raw(key)
            .map(|value| {
                value.parse().map_err(|err: T::Err| ConfigError::Invalid {
                    key,
                    reason: err.to_string(),
                    value,
                })
            })
            .transpose()
    }

    fn positive(&self, key: &'static str) -> Result<Option<u32>, ConfigError> {
        match self.parse::<u32>(key)? {
            Some(0) => Err(ConfigError::OutOfRange {
                key,
                reason: "must be at least 1",
            }),
            other => Ok(other),
        }
    }

    fn interval(&self, key: &'static str) -> Result<Option<Duration>, ConfigError> {
        Ok(self.positive(key)?.map(|secs| Duration::from_secs(u64::from(secs))))
    }

    fn seconds(&self, key: &'static str) -> Result<Option<chrono::Duration>, ConfigError> {
        Ok(self
            .parse::<u32>(key)?
            .map(|secs| chrono::Duration::seconds(i64::from(secs))))
    }
}
