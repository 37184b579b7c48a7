//! `PostgreSQL` repository implementation for capture storage.

use super::{
    models::{CaptureRecord, CaptureRow},
    schema::captures,
};
use crate::capture::{
    domain::{
        Capture, CaptureId, CaptureSource, Clarification, ClarifyStatus, CommitStatus,
        DecisionStatus, PersistedCaptureData, RemoteTaskRef,
    },
    ports::{CaptureRepository, CaptureRepositoryError, CaptureRepositoryResult},
};
use async_trait::async_trait;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::result::{DatabaseErrorInformation, DatabaseErrorKind, Error as DieselError};

/// `PostgreSQL` connection pool type used by capture adapters.
pub type CapturePgPool = Pool<ConnectionManager<PgConnection>>;

const SOURCE_UNIQUE_INDEX: &str = "idx_captures_source_unique";

/// `PostgreSQL`-backed capture repository.
#[derive(Debug, Clone)]
pub struct PostgresCaptureRepository {
    pool: CapturePgPool,
}

impl PostgresCaptureRepository {
    /// Creates a new repository from a `PostgreSQL` connection pool.
    #[must_use]
    pub const fn new(pool: CapturePgPool) -> Self {
        Self { pool }
    }

    async fn run_blocking<F, T>(&self, f: F) -> CaptureRepositoryResult<T>
    where
        F: FnOnce(&mut PgConnection) -> CaptureRepositoryResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = pool.get().map_err(CaptureRepositoryError::contention)?;
            f(&mut connection)
        })
        .await
        .map_err(CaptureRepositoryError::persistence)?
    }

    async fn load_where<F>(&self, query: F) -> CaptureRepositoryResult<Vec<Capture>>
    where
        F: FnOnce(&mut PgConnection) -> QueryResult<Vec<CaptureRow>> + Send + 'static,
    {
        self.run_blocking(move |connection| {
            query(connection)
                .map_err(map_diesel_error)?
                .into_iter()
                .map(row_to_capture)
                .collect()
        })
        .await
    }
}

#[async_trait]
impl CaptureRepository for PostgresCaptureRepository {
    async fn store(&self, capture: &Capture) -> CaptureRepositoryResult<()> {
        let capture_id = capture.id();
        let source = capture.source().clone();
        let record = to_record(capture, capture.version())?;

        self.run_blocking(move |connection| {
            diesel::insert_into(captures::table)
                .values(&record)
                .execute(connection)
                .map_err(|err| match err {
                    DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, ref info)
                        if is_source_unique_violation(info.as_ref()) =>
                    {
                        CaptureRepositoryError::DuplicateSource {
                            kind: source.kind().to_owned(),
                            source_id: source.source_id().unwrap_or_default().to_owned(),
                        }
                    }
                    DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                        CaptureRepositoryError::DuplicateCapture(capture_id)
                    }
                    other => map_diesel_error(other),
                })?;
            Ok(())
        })
        .await
    }

    async fn update(&self, capture: &Capture) -> CaptureRepositoryResult<Capture> {
        let capture_id = capture.id();
        let expected_version = capture.version();
        let expected = i64::try_from(expected_version).map_err(CaptureRepositoryError::persistence)?;
        let record = to_record(capture, expected_version.saturating_add(1))?;
        let mut updated = capture.clone();

        self.run_blocking(move |connection| {
            let changed = diesel::update(
                captures::table
                    .filter(captures::id.eq(capture_id.into_inner()))
                    .filter(captures::version.eq(expected)),
            )
            .set(&record)
            .execute(connection)
            .map_err(map_diesel_error)?;

            if changed == 0 {
                let exists = diesel::select(diesel::dsl::exists(
                    captures::table.filter(captures::id.eq(capture_id.into_inner())),
                ))
                .get_result::<bool>(connection)
                .map_err(map_diesel_error)?;
                return Err(if exists {
                    CaptureRepositoryError::Conflict {
                        id: capture_id,
                        expected_version,
                    }
                } else {
                    CaptureRepositoryError::NotFound(capture_id)
                });
            }
            updated.set_version(expected_version.saturating_add(1));
            Ok(updated)
        })
        .await
    }

    async fn find_by_id(&self, id: CaptureId) -> CaptureRepositoryResult<Option<Capture>> {
        self.run_blocking(move |connection| {
            let row = captures::table
                .filter(captures::id.eq(id.into_inner()))
                .select(CaptureRow::as_select())
                .first::<CaptureRow>(connection)
                .optional()
                .map_err(map_diesel_error)?;
            row.map(row_to_capture).transpose()
        })
        .await
    }

    async fn find_by_source(
        &self,
        kind: &str,
        source_id: &str,
    ) -> CaptureRepositoryResult<Option<Capture>> {
        let kind = kind.to_owned();
        let source_id = source_id.to_owned();
        self.run_blocking(move |connection| {
            let row = captures::table
                .filter(captures::source_kind.eq(kind))
                .filter(captures::source_id.eq(source_id))
                .select(CaptureRow::as_select())
                .first::<CaptureRow>(connection)
                .optional()
                .map_err(map_diesel_error)?;
            row.map(row_to_capture).transpose()
        })
        .await
    }

    async fn find_clarification_candidates(&self) -> CaptureRepositoryResult<Vec<Capture>> {
        self.load_where(|connection| {
            captures::table
                .filter(captures::decision_status.eq(DecisionStatus::Proposed.as_str()))
                .filter(captures::clarify_status.eq_any([
                    ClarifyStatus::Pending.as_str(),
                    ClarifyStatus::Failed.as_str(),
                ]))
                .order((captures::created_at.asc(), captures::id.asc()))
                .select(CaptureRow::as_select())
                .load(connection)
        })
        .await
    }

    async fn find_interrupted_clarifications(&self) -> CaptureRepositoryResult<Vec<Capture>> {
        self.load_where(|connection| {
            captures::table
                .filter(captures::clarify_status.eq(ClarifyStatus::InProgress.as_str()))
                .order(captures::created_at.asc())
                .select(CaptureRow::as_select())
                .load(connection)
        })
        .await
    }

    async fn find_commit_candidates(
        &self,
        retry_ceiling: u32,
        limit: usize,
    ) -> CaptureRepositoryResult<Vec<Capture>> {
        let ceiling = i32::try_from(retry_ceiling).unwrap_or(i32::MAX);
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.load_where(move |connection| {
            captures::table
                .filter(captures::decision_status.eq(DecisionStatus::Approved.as_str()))
                .filter(
                    captures::commit_status.eq(CommitStatus::Pending.as_str()).or(
                        captures::commit_status
                            .eq(CommitStatus::Failed.as_str())
                            .and(captures::commit_attempt_count.lt(ceiling)),
                    ),
                )
                .order((captures::decided_at.asc(), captures::created_at.asc()))
                .limit(limit)
                .select(CaptureRow::as_select())
                .load(connection)
        })
        .await
    }

    async fn find_pending_review(&self) -> CaptureRepositoryResult<Vec<Capture>> {
        self.load_where(|connection| {
            captures::table
                .filter(captures::decision_status.eq(DecisionStatus::Proposed.as_str()))
                .filter(captures::clarify_status.eq(ClarifyStatus::Completed.as_str()))
                .order(captures::created_at.asc())
                .select(CaptureRow::as_select())
                .load(connection)
        })
        .await
    }

    async fn has_proposed(&self) -> CaptureRepositoryResult<bool> {
        self.run_blocking(|connection| {
            diesel::select(diesel::dsl::exists(
                captures::table
                    .filter(captures::decision_status.eq(DecisionStatus::Proposed.as_str())),
            ))
            .get_result::<bool>(connection)
            .map_err(map_diesel_error)
        })
        .await
    }

    async fn find_requiring_attention(
        &self,
        retry_ceiling: u32,
    ) -> CaptureRepositoryResult<Vec<Capture>> {
        let ceiling = i32::try_from(retry_ceiling).unwrap_or(i32::MAX);
        self.load_where(move |connection| {
            captures::table
                .filter(captures::decision_status.ne(DecisionStatus::Rejected.as_str()))
                .filter(
                    captures::clarify_status
                        .eq(ClarifyStatus::PermanentlyFailed.as_str())
                        .or(captures::commit_status.eq_any([
                            CommitStatus::Unknown.as_str(),
                            CommitStatus::AuthFailed.as_str(),
                        ]))
                        .or(captures::commit_status
                            .eq(CommitStatus::Failed.as_str())
                            .and(captures::commit_attempt_count.ge(ceiling))),
                )
                .order(captures::created_at.asc())
                .select(CaptureRow::as_select())
                .load(connection)
        })
        .await
    }
}

/// Maps diesel errors, treating serialization failures as contention.
fn map_diesel_error(err: DieselError) -> CaptureRepositoryError {
    match err {
        DieselError::DatabaseError(DatabaseErrorKind::SerializationFailure, _) => {
            CaptureRepositoryError::contention(err)
        }
        other => CaptureRepositoryError::persistence(other),
    }
}

fn is_source_unique_violation(info: &dyn DatabaseErrorInformation) -> bool {
    info.constraint_name()
        .is_some_and(|name| name == SOURCE_UNIQUE_INDEX)
}

fn to_record(capture: &Capture, version: u64) -> CaptureRepositoryResult<CaptureRecord> {
    let clarify_result = capture
        .clarify_result()
        .map(serde_json::to_value)
        .transpose()
        .map_err(CaptureRepositoryError::persistence)?;
    let remote = capture.remote_task();
    let source = capture.source();

    Ok(CaptureRecord {
        id: capture.id().into_inner(),
        raw_text: capture.raw_text().to_owned(),
        source_kind: source.kind().to_owned(),
        source_id: source.source_id().map(str::to_owned),
        source_link: source.link().map(str::to_owned),
        clarify_status: capture.clarify_status().as_str().to_owned(),
        clarify_attempt_count: to_i32(capture.clarify_attempt_count())?,
        last_clarify_attempt_at: capture.last_clarify_attempt_at(),
        clarify_result,
        clarify_error: capture.clarify_error().map(str::to_owned),
        decision_status: capture.decision_status().as_str().to_owned(),
        decided_at: capture.decided_at(),
        decision_notes: capture.decision_notes().map(str::to_owned),
        commit_status: capture.commit_status().as_str().to_owned(),
        commit_attempt_count: to_i32(capture.commit_attempt_count())?,
        last_commit_attempt_at: capture.last_commit_attempt_at(),
        commit_error_message: capture.commit_error_message().map(str::to_owned),
        rtm_task_id: remote.map(|task| task.task_id.clone()),
        rtm_taskseries_id: remote.map(|task| task.taskseries_id.clone()),
        rtm_list_id: remote.map(|task| task.list_id.clone()),
        created_at: capture.created_at(),
        updated_at: capture.updated_at(),
        version: i64::try_from(version).map_err(CaptureRepositoryError::persistence)?,
    })
}

fn row_to_capture(row: CaptureRow) -> CaptureRepositoryResult<Capture> {
    let CaptureRow {
        id,
        raw_text,
        source_kind,
        source_id,
        source_link,
        clarify_status,
        clarify_attempt_count,
        last_clarify_attempt_at,
        clarify_result,
        clarify_error,
        decision_status,
        decided_at,
        decision_notes,
        commit_status,
        commit_attempt_count,
        last_commit_attempt_at,
        commit_error_message,
        rtm_task_id,
        rtm_taskseries_id,
        rtm_list_id,
        created_at,
        updated_at,
        version,
    } = row;

    let mut source = CaptureSource::new(source_kind).map_err(CaptureRepositoryError::persistence)?;
    if let Some(source_id) = source_id {
        source = source.with_source_id(source_id);
    }
    if let Some(link) = source_link {
        source = source.with_link(link);
    }

    let clarify_result = clarify_result
        .map(serde_json::from_value::<Clarification>)
        .transpose()
        .map_err(CaptureRepositoryError::persistence)?;
    let remote_task = match (rtm_task_id, rtm_taskseries_id, rtm_list_id) {
        (Some(task_id), Some(taskseries_id), Some(list_id)) => {
            Some(RemoteTaskRef::new(task_id, taskseries_id, list_id))
        }
        _ => None,
    };

    let data = PersistedCaptureData {
        id: CaptureId::from_uuid(id),
        raw_text,
        source,
        clarify_status: ClarifyStatus::try_from(clarify_status.as_str())
            .map_err(CaptureRepositoryError::persistence)?,
        clarify_attempt_count: from_i32(clarify_attempt_count)?,
        last_clarify_attempt_at,
        clarify_result,
        clarify_error,
        decision_status: DecisionStatus::try_from(decision_status.as_str())
            .map_err(CaptureRepositoryError::persistence)?,
        decided_at,
        decision_notes,
        commit_status: CommitStatus::try_from(commit_status.as_str())
            .map_err(CaptureRepositoryError::persistence)?,
        commit_attempt_count: from_i32(commit_attempt_count)?,
        last_commit_attempt_at,
        commit_error_message,
        remote_task,
        created_at,
        updated_at,
        version: u64::try_from(version).map_err(CaptureRepositoryError::persistence)?,
    };
    Ok(Capture::from_persisted(data))
}

fn to_i32(value: u32) -> CaptureRepositoryResult<i32> {
    i32::try_from(value).map_err(CaptureRepositoryError::persistence)
}

fn from_i32(value: i32) -> CaptureRepositoryResult<u32> {
    u32::try_from(value).map_err(CaptureRepositoryError::persistence)
}
