//! Fakes for the external ports and a fixture wiring them to the in-memory
//! stores.

use async_trait::async_trait;
use inbox_relay::backlog::adapters::memory::InMemoryBacklogRepository;
use inbox_relay::capture::{
    adapters::memory::{InMemoryAnchorRepository, InMemoryCaptureRepository},
    domain::{Clarification, ClarificationKind, RemoteTaskRef},
    ports::{
        CaptureFeed, CaptureFeedResult, Clarifier, ClarifierResult, ClarifyError, CommitRequest,
        IncomingCapture, TaskSyncClient, TaskSyncError, TaskSyncResult,
    },
};
use inbox_relay::clock::ManualClock;
use inbox_relay::highlight::{
    adapters::memory::InMemoryTaskCache,
    domain::{RemoteTaskSnapshot, RtmTaskCacheEntry},
    ports::{HighlightPublisher, RemoteTaskResult, RemoteTaskSource},
};
use rstest::fixture;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Clarifier that replays scripted outcomes, then clarifies every capture
/// as a next action titled with its raw text.
#[derive(Default)]
pub struct ScriptedClarifier {
    script: Mutex<VecDeque<ClarifierResult<Clarification>>>,
    calls: AtomicUsize,
}

impl ScriptedClarifier {
    /// Queues `outcome` for the next call.
    pub fn push(&self, outcome: ClarifierResult<Clarification>) {
        lock(&self.script).push_back(outcome);
    }

    /// Queues `count` timeouts.
    pub fn push_timeouts(&self, count: usize) {
        for _ in 0..count {
            self.push(Err(ClarifyError::Timeout("no response".to_owned())));
        }
    }

    /// Returns the number of calls made.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Clarifier for ScriptedClarifier {
    async fn clarify(&self, raw_text: &str) -> ClarifierResult<Clarification> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(outcome) = lock(&self.script).pop_front() {
            return outcome;
        }
        Clarification::new(ClarificationKind::NextAction, raw_text)
            .map(|clarification| clarification.with_next_action(raw_text))
            .map_err(|err| ClarifyError::Malformed(err.to_string()))
    }
}

/// Sync client that replays scripted outcomes, then succeeds.
#[derive(Default)]
pub struct ScriptedSyncClient {
    script: Mutex<VecDeque<TaskSyncResult<RemoteTaskRef>>>,
    requests: Mutex<Vec<CommitRequest>>,
    reminders: Mutex<Vec<String>>,
}

impl ScriptedSyncClient {
    /// Queues `outcome` for the next call.
    pub fn push(&self, outcome: TaskSyncResult<RemoteTaskRef>) {
        lock(&self.script).push_back(outcome);
    }

    /// Queues `count` definite rejections.
    pub fn push_rejections(&self, count: usize) {
        for _ in 0..count {
            self.push(Err(TaskSyncError::Rejected("list is full".to_owned())));
        }
    }

    /// Returns every request received.
    pub fn requests(&self) -> Vec<CommitRequest> {
        lock(&self.requests).clone()
    }

    /// Returns the smart-add text of every reminder created.
    pub fn reminders(&self) -> Vec<String> {
        lock(&self.reminders).clone()
    }
}

#[async_trait]
impl TaskSyncClient for ScriptedSyncClient {
    async fn create_task(&self, request: &CommitRequest) -> TaskSyncResult<RemoteTaskRef> {
        let call = {
            let mut requests = lock(&self.requests);
            requests.push(request.clone());
            requests.len()
        };
        lock(&self.script).pop_front().unwrap_or_else(|| {
            Ok(RemoteTaskRef::new(
                format!("task-{call}"),
                format!("series-{call}"),
                "inbox",
            ))
        })
    }

    async fn create_reminder(&self, smart_add: &str) -> TaskSyncResult<RemoteTaskRef> {
        let call = {
            let mut reminders = lock(&self.reminders);
            reminders.push(smart_add.to_owned());
            reminders.len()
        };
        Ok(RemoteTaskRef::new(
            format!("reminder-{call}"),
            format!("reminder-series-{call}"),
            "inbox",
        ))
    }
}

/// Feed holding items until they are acknowledged.
#[derive(Default)]
pub struct QueueFeed {
    pending: Mutex<Vec<IncomingCapture>>,
}

impl QueueFeed {
    /// Delivers `item` on every pull until acknowledged.
    pub fn deliver(&self, item: IncomingCapture) {
        lock(&self.pending).push(item);
    }

    /// Returns the number of unacknowledged items.
    pub fn unacknowledged(&self) -> usize {
        lock(&self.pending).len()
    }
}

#[async_trait]
impl CaptureFeed for QueueFeed {
    async fn pull(&self) -> CaptureFeedResult<Vec<IncomingCapture>> {
        Ok(lock(&self.pending).clone())
    }

    async fn acknowledge(&self, item: &IncomingCapture) -> CaptureFeedResult<()> {
        lock(&self.pending).retain(|pending| pending != item);
        Ok(())
    }
}

/// Remote task list served to the cache refresh.
#[derive(Default)]
pub struct StaticTaskSource {
    tasks: Mutex<Vec<RemoteTaskSnapshot>>,
}

impl StaticTaskSource {
    /// Replaces the remote task list.
    pub fn set(&self, tasks: Vec<RemoteTaskSnapshot>) {
        *lock(&self.tasks) = tasks;
    }
}

#[async_trait]
impl RemoteTaskSource for StaticTaskSource {
    async fn fetch_all(&self) -> RemoteTaskResult<Vec<RemoteTaskSnapshot>> {
        Ok(lock(&self.tasks).clone())
    }

    async fn fetch_task(
        &self,
        list_id: &str,
        taskseries_id: &str,
        task_id: &str,
    ) -> RemoteTaskResult<Option<RemoteTaskSnapshot>> {
        Ok(lock(&self.tasks)
            .iter()
            .find(|task| {
                task.list_id == list_id
                    && task.taskseries_id == taskseries_id
                    && task.task_id == task_id
            })
            .cloned())
    }
}

/// Publisher recording every published selection and which tasks carry
/// the label now.
#[derive(Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<Vec<String>>>,
    labelled: Mutex<Vec<String>>,
}

impl RecordingPublisher {
    /// Returns the task identifiers of each published selection.
    pub fn published(&self) -> Vec<Vec<String>> {
        lock(&self.published).clone()
    }

    /// Returns the task identifiers currently labelled.
    pub fn labelled(&self) -> Vec<String> {
        lock(&self.labelled).clone()
    }
}

#[async_trait]
impl HighlightPublisher for RecordingPublisher {
    async fn clear(&self) -> RemoteTaskResult<usize> {
        Ok(lock(&self.labelled).drain(..).count())
    }

    async fn publish(&self, entries: &[RtmTaskCacheEntry]) -> RemoteTaskResult<()> {
        let task_ids: Vec<String> = entries
            .iter()
            .map(|entry| entry.task_id().to_owned())
            .collect();
        lock(&self.labelled).extend(task_ids.iter().cloned());
        lock(&self.published).push(task_ids);
        Ok(())
    }
}

/// In-memory stores, fakes and a shared manual clock.
pub struct World {
    pub captures: Arc<InMemoryCaptureRepository>,
    pub anchors: Arc<InMemoryAnchorRepository>,
    pub backlog: Arc<InMemoryBacklogRepository>,
    pub task_cache: Arc<InMemoryTaskCache>,
    pub clarifier: Arc<ScriptedClarifier>,
    pub sync_client: Arc<ScriptedSyncClient>,
    pub feed: Arc<QueueFeed>,
    pub remote_tasks: Arc<StaticTaskSource>,
    pub publisher: Arc<RecordingPublisher>,
    pub clock: Arc<ManualClock>,
}

/// Provides a fresh world for each test.
#[fixture]
pub fn world() -> World {
    World {
        captures: Arc::new(InMemoryCaptureRepository::new()),
        anchors: Arc::new(InMemoryAnchorRepository::new()),
        backlog: Arc::new(InMemoryBacklogRepository::new()),
        task_cache: Arc::new(InMemoryTaskCache::new()),
        clarifier: Arc::new(ScriptedClarifier::default()),
        sync_client: Arc::new(ScriptedSyncClient::default()),
        feed: Arc::new(QueueFeed::default()),
        remote_tasks: Arc::new(StaticTaskSource::default()),
        publisher: Arc::new(RecordingPublisher::default()),
        clock: Arc::new(ManualClock::default()),
    }
}
