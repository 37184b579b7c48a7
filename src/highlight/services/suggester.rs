//! Picks today's highlight among lonely actions.
//!
//! A run clears yesterday's system label, then walks the ranked candidates,
//! checks each one is still open remotely, and records the suggestion before
//! labelling the selection.

use super::policy::SuggestionPolicy;
use crate::highlight::{
    domain::RtmTaskCacheEntry,
    ports::{
        HighlightPublisher, RemoteTaskError, RemoteTaskSource, TaskCacheError,
        TaskCacheRepository,
    },
};
use crate::retry::{ContentionRetry, with_contention_retry};
use chrono::{DateTime, Utc};
use mockable::Clock;
use std::sync::Arc;
use thiserror::Error;

/// Service-level errors for highlight suggestion.
#[derive(Debug, Error)]
pub enum SuggestError {
    /// Task cache operation failed.
    #[error(transparent)]
    Cache(#[from] TaskCacheError),
    /// Yesterday's highlight label could not be cleared.
    #[error("highlight label not cleared: {0}")]
    Clear(#[source] RemoteTaskError),
}

/// Result type for suggestion runs.
pub type SuggestResult<T> = Result<T, SuggestError>;

/// Outcome of one suggestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SuggestionReport {
    /// Eligible tasks before selection.
    pub eligible: usize,
    /// Tasks selected, with counters already updated.
    pub selected: Vec<RtmTaskCacheEntry>,
    /// Tasks passed over because another writer changed them first.
    pub contended: usize,
    /// Tasks found completed or deleted remotely and marked completed.
    pub closed_remotely: usize,
    /// Tasks passed over because the remote lookup failed.
    pub unverified: usize,
    /// Tasks the system label was removed from before selecting.
    pub cleared: usize,
    /// `true` when the publisher labelled the selection.
    pub published: bool,
}

enum Verified {
    Open,
    Closed,
    Unknown,
}

/// Selects lonely actions to highlight without nagging.
pub struct HighlightSuggester<T, S, P, C>
where
    T: TaskCacheRepository,
    S: RemoteTaskSource,
    P: HighlightPublisher,
    C: Clock + Send + Sync,
{
    cache: Arc<T>,
    source: Arc<S>,
    publisher: Arc<P>,
    clock: Arc<C>,
    policy: SuggestionPolicy,
    contention: ContentionRetry,
}

impl<T, S, P, C> HighlightSuggester<T, S, P, C>
where
    T: TaskCacheRepository,
    S: RemoteTaskSource,
    P: HighlightPublisher,
    C: Clock + Send + Sync,
{
    /// Creates a suggester with the default policy.
    #[must_use]
    pub fn new(cache: Arc<T>, source: Arc<S>, publisher: Arc<P>, clock: Arc<C>) -> Self {
        Self {
            cache,
            source,
            publisher,
            clock,
            policy: SuggestionPolicy::default(),
            contention: ContentionRetry::default(),
        }
    }

    /// Replaces the suggestion policy.
    #[must_use]
    pub fn with_policy(mut self, policy: SuggestionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replaces the store contention retry settings.
    #[must_use]
    pub const fn with_contention(mut self, contention: ContentionRetry) -> Self {
        self.contention = contention;
        self
    }

    /// Returns the policy in use.
    #[must_use]
    pub const fn policy(&self) -> &SuggestionPolicy {
        &self.policy
    }

    /// Clears yesterday's label, then selects up to `batch_size` eligible
    /// tasks and publishes them.
    ///
    /// Each candidate is looked up remotely first. One that is gone or
    /// completed is marked completed in the cache; one whose lookup fails is
    /// skipped. Each selection is a versioned counter update; a task changed
    /// by a concurrent writer is passed over for the next candidate.
    /// Publishing failures are logged and leave the counters in place.
    ///
    /// # Errors
    ///
    /// Returns [`SuggestError::Clear`] before touching any counter when the
    /// old label cannot be removed, and [`SuggestError::Cache`] when the
    /// cache cannot be read or a counter update fails for a reason other
    /// than a conflict.
    pub async fn suggest(&self) -> SuggestResult<SuggestionReport> {
        let cleared = self.publisher.clear().await.map_err(SuggestError::Clear)?;
        if cleared > 0 {
            tracing::info!(component = "highlight", cleared, "cleared system highlights");
        }

        let cache = &*self.cache;
        let lonely =
            with_contention_retry(self.contention, move || cache.find_lonely_actions()).await?;
        let now = self.clock.utc();
        let ranked = self.policy.rank(lonely, now);

        let mut report = SuggestionReport {
            eligible: ranked.len(),
            cleared,
            ..SuggestionReport::default()
        };
        for mut entry in ranked {
            if report.selected.len() >= self.policy.batch_size {
                break;
            }
            match self.verify(&mut entry, now).await? {
                Verified::Open => {}
                Verified::Closed => {
                    report.closed_remotely += 1;
                    continue;
                }
                Verified::Unknown => {
                    report.unverified += 1;
                    continue;
                }
            }
            entry.record_suggestion(now);
            let update = {
                let entry = &entry;
                with_contention_retry(self.contention, move || cache.update(entry)).await
            };
            match update {
                Ok(stored) => {
                    tracing::info!(
                        component = "highlight",
                        task_id = stored.task_id(),
                        times_suggested = stored.times_suggested(),
                        "task suggested"
                    );
                    report.selected.push(stored);
                }
                Err(TaskCacheError::Conflict { task_id, .. }) => {
                    tracing::debug!(task_id = %task_id, "suggestion lost to a concurrent writer");
                    report.contended += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }

        if report.selected.is_empty() {
            tracing::debug!(eligible = report.eligible, "no task to suggest");
            return Ok(report);
        }
        match self.publisher.publish(&report.selected).await {
            Ok(()) => report.published = true,
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    selected = report.selected.len(),
                    "highlight label not applied"
                );
            }
        }
        Ok(report)
    }

    async fn verify(
        &self,
        entry: &mut RtmTaskCacheEntry,
        now: DateTime<Utc>,
    ) -> SuggestResult<Verified> {
        let lookup = self
            .source
            .fetch_task(entry.list_id(), entry.taskseries_id(), entry.task_id())
            .await;
        match lookup {
            Ok(Some(snapshot)) if !snapshot.completed => Ok(Verified::Open),
            Ok(_) => {
                tracing::debug!(
                    task_id = entry.task_id(),
                    "candidate closed remotely, marking completed"
                );
                entry.mark_completed(now);
                let cache = &*self.cache;
                let entry = &*entry;
                match with_contention_retry(self.contention, move || cache.update(entry)).await {
                    Ok(_) | Err(TaskCacheError::Conflict { .. }) => Ok(Verified::Closed),
                    Err(err) => Err(err.into()),
                }
            }
            Err(err) => {
                tracing::warn!(
                    task_id = entry.task_id(),
                    error = %err,
                    "candidate could not be verified, skipping"
                );
                Ok(Verified::Unknown)
            }
        }
    }
}
