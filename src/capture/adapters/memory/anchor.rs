//! In-memory anchor repository.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::capture::{
    domain::{Anchor, AnchorId, AnchorKind, AnchorStatus},
    ports::{AnchorRepository, AnchorRepositoryError, AnchorRepositoryResult},
};

/// Thread-safe in-memory anchor repository enforcing one active anchor per
/// kind.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAnchorRepository {
    anchors: Arc<RwLock<HashMap<AnchorId, Anchor>>>,
}

impl InMemoryAnchorRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every stored anchor, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`AnchorRepositoryError::Persistence`] when the lock is
    /// poisoned.
    pub fn all(&self) -> AnchorRepositoryResult<Vec<Anchor>> {
        let anchors = self.anchors.read().map_err(poisoned)?;
        let mut all: Vec<Anchor> = anchors.values().cloned().collect();
        all.sort_by_key(Anchor::created_at);
        Ok(all)
    }
}

fn poisoned<E: std::fmt::Display>(err: E) -> AnchorRepositoryError {
    AnchorRepositoryError::persistence(std::io::Error::other(err.to_string()))
}

fn is_active_of(anchor: &Anchor, kind: AnchorKind) -> bool {
    anchor.kind() == kind && matches!(anchor.status(), AnchorStatus::Active)
}

#[async_trait]
impl AnchorRepository for InMemoryAnchorRepository {
    async fn store(&self, anchor: &Anchor) -> AnchorRepositoryResult<()> {
        let mut anchors = self.anchors.write().map_err(poisoned)?;
        if matches!(anchor.status(), AnchorStatus::Active)
            && anchors
                .values()
                .any(|stored| is_active_of(stored, anchor.kind()))
        {
            return Err(AnchorRepositoryError::ActiveExists(anchor.kind().as_str()));
        }
        anchors.insert(anchor.id(), anchor.clone());
        Ok(())
    }

    async fn update(&self, anchor: &Anchor) -> AnchorRepositoryResult<Anchor> {
        let mut anchors = self.anchors.write().map_err(poisoned)?;
        let stored = anchors
            .get_mut(&anchor.id())
            .ok_or(AnchorRepositoryError::NotFound(anchor.id()))?;
        if stored.version() != anchor.version() {
            return Err(AnchorRepositoryError::Conflict {
                id: anchor.id(),
                expected_version: anchor.version(),
            });
        }
        let mut updated = anchor.clone();
        updated.set_version(anchor.version() + 1);
        *stored = updated.clone();
        Ok(updated)
    }

    async fn find_active(&self, kind: AnchorKind) -> AnchorRepositoryResult<Vec<Anchor>> {
        let anchors = self.anchors.read().map_err(poisoned)?;
        let mut active: Vec<Anchor> = anchors
            .values()
            .filter(|anchor| is_active_of(anchor, kind))
            .cloned()
            .collect();
        active.sort_by_key(|anchor| std::cmp::Reverse(anchor.created_at()));
        Ok(active)
    }
}
