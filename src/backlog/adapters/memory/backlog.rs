//! In-memory backlog repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::backlog::{
    domain::{BacklogItem, BacklogItemId, BacklogStatus},
    ports::{
        BacklogRepository, BacklogRepositoryError, BacklogRepositoryResult, BacklogStatusCounts,
    },
};

/// Thread-safe in-memory backlog repository.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBacklogRepository {
    state: Arc<RwLock<InMemoryBacklogState>>,
}

#[derive(Debug, Default)]
struct InMemoryBacklogState {
    items: HashMap<BacklogItemId, BacklogItem>,
    import_order: Vec<BacklogItemId>,
}

impl InMemoryBacklogState {
    fn in_import_order(&self) -> impl Iterator<Item = &BacklogItem> {
        self.import_order
            .iter()
            .filter_map(|id| self.items.get(id))
    }
}

impl InMemoryBacklogRepository {
    /// Creates an empty in-memory repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> BacklogRepositoryResult<RwLockReadGuard<'_, InMemoryBacklogState>> {
        self.state.read().map_err(|err| {
            BacklogRepositoryError::persistence(std::io::Error::other(err.to_string()))
        })
    }

    fn write(&self) -> BacklogRepositoryResult<RwLockWriteGuard<'_, InMemoryBacklogState>> {
        self.state.write().map_err(|err| {
            BacklogRepositoryError::persistence(std::io::Error::other(err.to_string()))
        })
    }
}

#[async_trait]
impl BacklogRepository for InMemoryBacklogRepository {
    async fn store_all(&self, items: &[BacklogItem]) -> BacklogRepositoryResult<()> {
        let mut state = self.write()?;
        if let Some(duplicate) = items
            .iter()
            .find(|item| state.items.contains_key(&item.id()))
        {
            return Err(BacklogRepositoryError::DuplicateItem(duplicate.id()));
        }
        for item in items {
            state.import_order.push(item.id());
            state.items.insert(item.id(), item.clone());
        }
        Ok(())
    }

    async fn update(&self, item: &BacklogItem) -> BacklogRepositoryResult<BacklogItem> {
        let mut state = self.write()?;
        let stored = state
            .items
            .get_mut(&item.id())
            .ok_or(BacklogRepositoryError::NotFound(item.id()))?;
        if stored.version() != item.version() {
            return Err(BacklogRepositoryError::Conflict {
                id: item.id(),
                expected_version: item.version(),
            });
        }
        let mut updated = item.clone();
        updated.set_version(item.version() + 1);
        *stored = updated.clone();
        Ok(updated)
    }

    async fn find_by_id(&self, id: BacklogItemId) -> BacklogRepositoryResult<Option<BacklogItem>> {
        let state = self.read()?;
        Ok(state.items.get(&id).cloned())
    }

    async fn find_pending(&self, limit: usize) -> BacklogRepositoryResult<Vec<BacklogItem>> {
        let state = self.read()?;
        let mut pending: Vec<BacklogItem> = state
            .in_import_order()
            .filter(|item| item.status() == BacklogStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(BacklogItem::imported_at);
        pending.truncate(limit);
        Ok(pending)
    }

    async fn find_processing(&self) -> BacklogRepositoryResult<Vec<BacklogItem>> {
        let state = self.read()?;
        let mut processing: Vec<BacklogItem> = state
            .in_import_order()
            .filter(|item| item.status() == BacklogStatus::Processing)
            .cloned()
            .collect();
        processing.sort_by_key(BacklogItem::claimed_at);
        Ok(processing)
    }

    async fn count_claimed_since(&self, since: DateTime<Utc>) -> BacklogRepositoryResult<usize> {
        let state = self.read()?;
        Ok(state
            .items
            .values()
            .filter(|item| item.claimed_at().is_some_and(|claimed| claimed >= since))
            .count())
    }

    async fn status_counts(&self) -> BacklogRepositoryResult<BacklogStatusCounts> {
        let state = self.read()?;
        let mut counts = BacklogStatusCounts::default();
        for item in state.items.values() {
            match item.status() {
                BacklogStatus::Pending => counts.pending += 1,
                BacklogStatus::Processing => counts.processing += 1,
                BacklogStatus::Processed => counts.processed += 1,
                BacklogStatus::Failed => counts.failed += 1,
            }
        }
        Ok(counts)
    }
}
