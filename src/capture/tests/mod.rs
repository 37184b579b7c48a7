//! Unit tests for the capture module.
//!
//! Orchestrator tests drive the in-memory repository with a manual clock and
//! mocked external ports.


use crate::capture::{
    adapters::memory::InMemoryCaptureRepository,
    domain::{Capture, CaptureId, CaptureSource, Clarification, ClarificationKind, RemoteTaskRef},
    ports::{
        CaptureRepository, CaptureRepositoryError, CaptureRepositoryResult, CommitRequest,
        TaskSyncClient, TaskSyncResult,
    },
};
use crate::clock::ManualClock;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

fn email_source(message_id: &str) -> CaptureSource {
    CaptureSource::new(CaptureSource::EMAIL)
        .expect("valid source kind")
        .with_source_id(message_id)
}

fn next_action(title: &str) -> Clarification {
    Clarification::new(ClarificationKind::NextAction, title).expect("valid clarification")
}

async fn seed_capture(
    repository: &InMemoryCaptureRepository,
    clock: &ManualClock,
    raw_text: &str,
) -> Capture {
    let capture = Capture::new(raw_text, CaptureSource::new("email").expect("valid kind"), clock)
        .expect("valid capture");
    repository.store(&capture).await.expect("store succeeds");
    capture
}

async fn seed_approved(
    repository: &InMemoryCaptureRepository,
    clock: &ManualClock,
    clarification: Clarification,
) -> Capture {
    let mut capture = Capture::new(
        clarification.title().to_owned(),
        CaptureSource::new("email").expect("valid kind"),
        clock,
    )
    .expect("valid capture");
    capture.begin_clarification(clock).expect("claimable");
    capture
        .complete_clarification(clarification, clock)
        .expect("in progress");
    capture.approve(None, clock).expect("clarified");
    repository.store(&capture).await.expect("store succeeds");
    capture
}

/// In-memory repository whose `update` can be made to fail.
///
/// Updates of captures in `lost_claims` report a concurrent writer;
/// the update numbered `contended_update` (1-based) reports contention.
#[derive(Clone, Default)]
struct InterferingRepository {
    inner: InMemoryCaptureRepository,
    updates: Arc<AtomicUsize>,
    contended_update: Option<usize>,
    lost_claims: Arc<Mutex<HashSet<CaptureId>>>,
}

impl InterferingRepository {
    fn contending_update(number: usize) -> Self {
        Self {
            contended_update: Some(number),
            ..Self::default()
        }
    }

    fn lose_claim(&self, id: CaptureId) {
        self.lost_claims.lock().expect("lock").insert(id);
    }
}

#[derive(Debug, thiserror::Error)]
#[error("database is locked")]
struct Locked;

#[async_trait]
impl CaptureRepository for InterferingRepository {
    async fn store(&self, capture: &Capture) -> CaptureRepositoryResult<()> {
        self.inner.store(capture).await
    }

    async fn update(&self, capture: &Capture) -> CaptureRepositoryResult<Capture> {
        let number = self.updates.fetch_add(1, Ordering::SeqCst) + 1;
        if self.contended_update == Some(number) {
            return Err(CaptureRepositoryError::contention(Locked));
        }
        if self.lost_claims.lock().expect("lock").contains(&capture.id()) {
            return Err(CaptureRepositoryError::Conflict {
                id: capture.id(),
                expected_version: capture.version(),
            });
        }
        self.inner.update(capture).await
    }

    async fn find_by_id(&self, id: CaptureId) -> CaptureRepositoryResult<Option<Capture>> {
        self.inner.find_by_id(id).await
    }

    async fn find_by_source(
        &self,
        kind: &str,
        source_id: &str,
    ) -> CaptureRepositoryResult<Option<Capture>> {
        self.inner.find_by_source(kind, source_id).await
    }

    async fn find_clarification_candidates(&self) -> CaptureRepositoryResult<Vec<Capture>> {
        self.inner.find_clarification_candidates().await
    }

    async fn find_interrupted_clarifications(&self) -> CaptureRepositoryResult<Vec<Capture>> {
        self.inner.find_interrupted_clarifications().await
    }

    async fn find_commit_candidates(
        &self,
        retry_ceiling: u32,
        limit: usize,
    ) -> CaptureRepositoryResult<Vec<Capture>> {
        self.inner.find_commit_candidates(retry_ceiling, limit).await
    }

    async fn find_pending_review(&self) -> CaptureRepositoryResult<Vec<Capture>> {
        self.inner.find_pending_review().await
    }

    async fn has_proposed(&self) -> CaptureRepositoryResult<bool> {
        self.inner.has_proposed().await
    }

    async fn find_requiring_attention(
        &self,
        retry_ceiling: u32,
    ) -> CaptureRepositoryResult<Vec<Capture>> {
        self.inner.find_requiring_attention(retry_ceiling).await
    }
}

/// Sync client that answers only after two minutes.
struct HangingSyncClient;

#[async_trait]
impl TaskSyncClient for HangingSyncClient {
    async fn create_task(&self, _request: &CommitRequest) -> TaskSyncResult<RemoteTaskRef> {
        tokio::time::sleep(StdDuration::from_secs(120)).await;
        Ok(RemoteTaskRef::new("late", "late", "late"))
    }

    async fn create_reminder(&self, _smart_add: &str) -> TaskSyncResult<RemoteTaskRef> {
        tokio::time::sleep(StdDuration::from_secs(120)).await;
        Ok(RemoteTaskRef::new("late", "late", "late"))
    }
}
