//! Sync pull: mirrors the remote task list into the local cache.

use crate::highlight::{
    domain::{HighlightDomainError, RtmTaskCacheEntry},
    ports::{RemoteTaskError, RemoteTaskSource, TaskCacheError, TaskCacheRepository},
};
use crate::retry::{ContentionRetry, with_contention_retry};
use mockable::Clock;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Service-level errors for cache refresh.
#[derive(Debug, Error)]
pub enum RefreshError {
    /// The remote task list could not be fetched.
    #[error(transparent)]
    Remote(#[from] RemoteTaskError),
    /// Task cache operation failed.
    #[error(transparent)]
    Cache(#[from] TaskCacheError),
    /// A snapshot could not be cached.
    #[error(transparent)]
    Domain(#[from] HighlightDomainError),
}

/// Result type for refresh operations.
pub type RefreshResult<T> = Result<T, RefreshError>;

/// Counters describing one refresh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshReport {
    /// Tasks cached for the first time.
    pub inserted: usize,
    /// Cached tasks overwritten from the snapshot.
    pub updated: usize,
    /// Cached tasks missing from the snapshot, now marked completed.
    pub completed: usize,
    /// Entries skipped because another writer changed them first.
    pub contended: usize,
}

/// Applies full remote snapshots to the task cache.
pub struct CacheRefreshService<T, S, C>
where
    T: TaskCacheRepository,
    S: RemoteTaskSource,
    C: Clock + Send + Sync,
{
    cache: Arc<T>,
    source: Arc<S>,
    clock: Arc<C>,
    contention: ContentionRetry,
}

impl<T, S, C> CacheRefreshService<T, S, C>
where
    T: TaskCacheRepository,
    S: RemoteTaskSource,
    C: Clock + Send + Sync,
{
    /// Creates a refresh service.
    #[must_use]
    pub fn new(cache: Arc<T>, source: Arc<S>, clock: Arc<C>) -> Self {
        Self {
            cache,
            source,
            clock,
            contention: ContentionRetry::default(),
        }
    }

    /// Replaces the store contention retry settings.
    #[must_use]
    pub const fn with_contention(mut self, contention: ContentionRetry) -> Self {
        self.contention = contention;
        self
    }

    /// Fetches a full snapshot and upserts it.
    ///
    /// Suggestion counters survive. Open entries absent from the snapshot
    /// are marked completed; nothing is deleted. An entry that changed
    /// concurrently is left for the next refresh.
    ///
    /// # Errors
    ///
    /// Returns [`RefreshError::Remote`] when the snapshot cannot be fetched,
    /// leaving the cache untouched, and [`RefreshError::Cache`] when the
    /// cache fails.
    pub async fn refresh(&self) -> RefreshResult<RefreshReport> {
        let snapshot = self.source.fetch_all().await?;
        let synced_at = self.clock.utc();
        let cache = &*self.cache;
        let mut cached: HashMap<String, RtmTaskCacheEntry> =
            with_contention_retry(self.contention, move || cache.find_all())
                .await?
                .into_iter()
                .map(|entry| (entry.task_id().to_owned(), entry))
                .collect();

        let mut report = RefreshReport::default();
        for task in snapshot {
            if let Some(mut entry) = cached.remove(&task.task_id) {
                entry.apply_snapshot(task, synced_at);
                self.write(&entry, &mut report, |report| report.updated += 1)
                    .await?;
            } else {
                let entry = RtmTaskCacheEntry::from_snapshot(task, synced_at)?;
                let fresh = &entry;
                match with_contention_retry(self.contention, move || cache.insert(fresh)).await {
                    Ok(()) => report.inserted += 1,
                    Err(TaskCacheError::DuplicateTask(_)) => report.contended += 1,
                    Err(err) => return Err(err.into()),
                }
            }
        }

        for mut entry in cached.into_values().filter(|entry| !entry.is_completed()) {
            entry.mark_completed(synced_at);
            self.write(&entry, &mut report, |report| report.completed += 1)
                .await?;
        }

        tracing::info!(
            component = "cache_refresh",
            inserted = report.inserted,
            updated = report.updated,
            completed = report.completed,
            contended = report.contended,
            "task cache refreshed"
        );
        Ok(report)
    }

    async fn write<F>(
        &self,
        entry: &RtmTaskCacheEntry,
        report: &mut RefreshReport,
        count: F,
    ) -> RefreshResult<()>
    where
        F: FnOnce(&mut RefreshReport),
    {
        let cache = &*self.cache;
        match with_contention_retry(self.contention, move || cache.update(entry)).await {
            Ok(_) => count(report),
            Err(TaskCacheError::Conflict { .. }) => report.contended += 1,
            Err(err) => return Err(err.into()),
        }
        Ok(())
    }
}
