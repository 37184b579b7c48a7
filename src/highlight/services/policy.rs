//! Anti-nag rules deciding which lonely actions may be suggested.

use crate::highlight::domain::RtmTaskCacheEntry;
use chrono::{DateTime, Duration, Utc};

/// Suggestion eligibility and selection rules.
///
/// A task is eligible when it was never suggested, or when the cooldown has
/// passed since its last suggestion and either it was suggested fewer than
/// `max_suggestions` times or the nag window has also passed. Tasks with an
/// excluded tag are never suggested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuggestionPolicy {
    /// Minimum time between two suggestions of the same task.
    pub cooldown: Duration,
    /// Suggestions after which a task rests for the nag window.
    pub max_suggestions: u32,
    /// Rest period for tasks that hit `max_suggestions`.
    pub nag_window: Duration,
    /// Tasks selected per run.
    pub batch_size: usize,
    /// Tags that exclude a task from automatic suggestion.
    pub excluded_tags: Vec<String>,
}

impl Default for SuggestionPolicy {
    fn default() -> Self {
        Self {
            cooldown: Duration::hours(24),
            max_suggestions: 3,
            nag_window: Duration::days(14),
            batch_size: 1,
            excluded_tags: vec!["highlight".to_owned()],
        }
    }
}

impl SuggestionPolicy {
    /// Returns `true` when `entry` may be suggested at `now`.
    #[must_use]
    pub fn is_eligible(&self, entry: &RtmTaskCacheEntry, now: DateTime<Utc>) -> bool {
        if !entry.is_lonely_action() || self.is_excluded(entry) {
            return false;
        }
        let Some(last) = entry.last_suggested_at() else {
            return true;
        };
        let since = now - last;
        since >= self.cooldown
            && (entry.times_suggested() < self.max_suggestions || since >= self.nag_window)
    }

    /// Returns the eligible entries in suggestion order: never suggested
    /// first, then least recently suggested, then oldest task.
    #[must_use]
    pub fn rank(
        &self,
        entries: Vec<RtmTaskCacheEntry>,
        now: DateTime<Utc>,
    ) -> Vec<RtmTaskCacheEntry> {
        let mut eligible: Vec<RtmTaskCacheEntry> = entries
            .into_iter()
            .filter(|entry| self.is_eligible(entry, now))
            .collect();
        eligible.sort_by(|left, right| {
            left.last_suggested_at()
                .cmp(&right.last_suggested_at())
                .then_with(|| left.created_at().cmp(&right.created_at()))
                .then_with(|| left.task_id().cmp(right.task_id()))
        });
        eligible
    }

    fn is_excluded(&self, entry: &RtmTaskCacheEntry) -> bool {
        self.excluded_tags.iter().any(|tag| entry.has_tag(tag))
    }
}
