//! In-memory capture repository.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::capture::{
    domain::{Capture, CaptureId, ClarifyStatus, DecisionStatus},
    ports::{CaptureRepository, CaptureRepositoryError, CaptureRepositoryResult},
};

/// Thread-safe in-memory capture repository.
///
/// Updates are compare-and-set on the capture version, matching the
/// `PostgreSQL` adapter.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCaptureRepository {
    state: Arc<RwLock<InMemoryCaptureState>>,
}

#[derive(Debug, Default)]
struct InMemoryCaptureState {
    captures: HashMap<CaptureId, Capture>,
    source_index: HashMap<(String, String), CaptureId>,
    insertion_order: Vec<CaptureId>,
}

impl InMemoryCaptureState {
    /// Returns matching captures sorted by `key`, insertion order breaking
    /// ties.
    fn select<K, P>(&self, predicate: P, key: K) -> Vec<Capture>
    where
        P: Fn(&Capture) -> bool,
        K: Fn(&Capture) -> chrono::DateTime<chrono::Utc>,
    {
        let mut selected: Vec<Capture> = self
            .insertion_order
            .iter()
            .filter_map(|id| self.captures.get(id))
            .filter(|capture| predicate(capture))
            .cloned()
            .collect();
        selected.sort_by_key(|capture| key(capture));
        selected
    }
}

impl InMemoryCaptureRepository {
    /// Creates an empty in-memory repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> CaptureRepositoryResult<RwLockReadGuard<'_, InMemoryCaptureState>> {
        self.state.read().map_err(|err| {
            CaptureRepositoryError::persistence(std::io::Error::other(err.to_string()))
        })
    }

    fn write(&self) -> CaptureRepositoryResult<RwLockWriteGuard<'_, InMemoryCaptureState>> {
        self.state.write().map_err(|err| {
            CaptureRepositoryError::persistence(std::io::Error::other(err.to_string()))
        })
    }
}

fn source_key(capture: &Capture) -> Option<(String, String)> {
    let source = capture.source();
    source
        .source_id()
        .map(|source_id| (source.kind().to_owned(), source_id.to_owned()))
}

#[async_trait]
impl CaptureRepository for InMemoryCaptureRepository {
    async fn store(&self, capture: &Capture) -> CaptureRepositoryResult<()> {
        let mut state = self.write()?;
        if state.captures.contains_key(&capture.id()) {
            return Err(CaptureRepositoryError::DuplicateCapture(capture.id()));
        }
        let key = source_key(capture);
        if let Some((kind, source_id)) = &key {
            if state
                .source_index
                .contains_key(&(kind.clone(), source_id.clone()))
            {
                return Err(CaptureRepositoryError::DuplicateSource {
                    kind: kind.clone(),
                    source_id: source_id.clone(),
                });
            }
        }

        if let Some(key) = key {
            state.source_index.insert(key, capture.id());
        }
        state.insertion_order.push(capture.id());
        state.captures.insert(capture.id(), capture.clone());
        Ok(())
    }

    async fn update(&self, capture: &Capture) -> CaptureRepositoryResult<Capture> {
        let mut state = self.write()?;
        let stored = state
            .captures
            .get_mut(&capture.id())
            .ok_or(CaptureRepositoryError::NotFound(capture.id()))?;
        if stored.version() != capture.version() {
            return Err(CaptureRepositoryError::Conflict {
                id: capture.id(),
                expected_version: capture.version(),
            });
        }
        let mut updated = capture.clone();
        updated.set_version(capture.version() + 1);
        *stored = updated.clone();
        Ok(updated)
    }

    async fn find_by_id(&self, id: CaptureId) -> CaptureRepositoryResult<Option<Capture>> {
        let state = self.read()?;
        Ok(state.captures.get(&id).cloned())
    }

    async fn find_by_source(
        &self,
        kind: &str,
        source_id: &str,
    ) -> CaptureRepositoryResult<Option<Capture>> {
        let state = self.read()?;
        let capture = state
            .source_index
            .get(&(kind.to_owned(), source_id.to_owned()))
            .and_then(|id| state.captures.get(id))
            .cloned();
        Ok(capture)
    }

    async fn find_clarification_candidates(&self) -> CaptureRepositoryResult<Vec<Capture>> {
        let state = self.read()?;
        Ok(state.select(
            |capture| {
                capture.clarify_status().is_claimable()
                    && matches!(capture.decision_status(), DecisionStatus::Proposed)
            },
            Capture::created_at,
        ))
    }

    async fn find_interrupted_clarifications(&self) -> CaptureRepositoryResult<Vec<Capture>> {
        let state = self.read()?;
        Ok(state.select(
            |capture| matches!(capture.clarify_status(), ClarifyStatus::InProgress),
            Capture::created_at,
        ))
    }

    async fn find_commit_candidates(
        &self,
        retry_ceiling: u32,
        limit: usize,
    ) -> CaptureRepositoryResult<Vec<Capture>> {
        let state = self.read()?;
        let mut candidates = state.select(
            |capture| capture.is_commit_eligible(retry_ceiling),
            Capture::created_at,
        );
        candidates.sort_by_key(|capture| capture.decided_at());
        candidates.truncate(limit);
        Ok(candidates)
    }

    async fn find_pending_review(&self) -> CaptureRepositoryResult<Vec<Capture>> {
        let state = self.read()?;
        Ok(state.select(
            |capture| {
                matches!(capture.decision_status(), DecisionStatus::Proposed)
                    && matches!(capture.clarify_status(), ClarifyStatus::Completed)
            },
            Capture::created_at,
        ))
    }

    async fn has_proposed(&self) -> CaptureRepositoryResult<bool> {
        let state = self.read()?;
        Ok(state
            .captures
            .values()
            .any(|capture| matches!(capture.decision_status(), DecisionStatus::Proposed)))
    }

    async fn find_requiring_attention(
        &self,
        retry_ceiling: u32,
    ) -> CaptureRepositoryResult<Vec<Capture>> {
        let state = self.read()?;
        Ok(state.select(
            |capture| capture.requires_attention(retry_ceiling),
            Capture::created_at,
        ))
    }
}
