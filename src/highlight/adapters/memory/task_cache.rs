//! In-memory task cache.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::highlight::{
    domain::RtmTaskCacheEntry,
    ports::{TaskCacheError, TaskCacheRepository, TaskCacheResult},
};

/// Thread-safe in-memory task cache keyed by remote task identifier.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTaskCache {
    entries: Arc<RwLock<BTreeMap<String, RtmTaskCacheEntry>>>,
}

type Entries = BTreeMap<String, RtmTaskCacheEntry>;

impl InMemoryTaskCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> TaskCacheResult<RwLockReadGuard<'_, Entries>> {
        self.entries
            .read()
            .map_err(|err| TaskCacheError::persistence(std::io::Error::other(err.to_string())))
    }

    fn write(&self) -> TaskCacheResult<RwLockWriteGuard<'_, Entries>> {
        self.entries
            .write()
            .map_err(|err| TaskCacheError::persistence(std::io::Error::other(err.to_string())))
    }
}

#[async_trait]
impl TaskCacheRepository for InMemoryTaskCache {
    async fn insert(&self, entry: &RtmTaskCacheEntry) -> TaskCacheResult<()> {
        let mut entries = self.write()?;
        if entries.contains_key(entry.task_id()) {
            return Err(TaskCacheError::DuplicateTask(entry.task_id().to_owned()));
        }
        entries.insert(entry.task_id().to_owned(), entry.clone());
        Ok(())
    }

    async fn update(&self, entry: &RtmTaskCacheEntry) -> TaskCacheResult<RtmTaskCacheEntry> {
        let mut entries = self.write()?;
        let stored = entries
            .get_mut(entry.task_id())
            .ok_or_else(|| TaskCacheError::NotFound(entry.task_id().to_owned()))?;
        if stored.version() != entry.version() {
            return Err(TaskCacheError::Conflict {
                task_id: entry.task_id().to_owned(),
                expected_version: entry.version(),
            });
        }
        let mut updated = entry.clone();
        updated.set_version(entry.version() + 1);
        *stored = updated.clone();
        Ok(updated)
    }

    async fn find_by_task_id(&self, task_id: &str) -> TaskCacheResult<Option<RtmTaskCacheEntry>> {
        Ok(self.read()?.get(task_id).cloned())
    }

    async fn find_all(&self) -> TaskCacheResult<Vec<RtmTaskCacheEntry>> {
        Ok(self.read()?.values().cloned().collect())
    }

    async fn find_lonely_actions(&self) -> TaskCacheResult<Vec<RtmTaskCacheEntry>> {
        Ok(self
            .read()?
            .values()
            .filter(|entry| entry.is_lonely_action())
            .cloned()
            .collect())
    }
}
