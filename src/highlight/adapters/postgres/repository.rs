//! `PostgreSQL` repository implementation for the remote task cache.

use super::{models::TaskCacheRow, schema::rtm_task_cache};
use crate::highlight::{
    domain::{PersistedCacheEntryData, RtmTaskCacheEntry},
    ports::{TaskCacheError, TaskCacheRepository, TaskCacheResult},
};
use async_trait::async_trait;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::result::{DatabaseErrorKind, Error as DieselError};

/// `PostgreSQL` connection pool type used by the task cache.
pub type TaskCachePgPool = Pool<ConnectionManager<PgConnection>>;

/// `PostgreSQL`-backed task cache.
#[derive(Debug, Clone)]
pub struct PostgresTaskCache {
    pool: TaskCachePgPool,
}

impl PostgresTaskCache {
    /// Creates a new cache from a `PostgreSQL` connection pool.
    #[must_use]
    pub const fn new(pool: TaskCachePgPool) -> Self {
        Self { pool }
    }

    async fn run_blocking<F, T>(&self, f: F) -> TaskCacheResult<T>
    where
        F: FnOnce(&mut PgConnection) -> TaskCacheResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = pool.get().map_err(TaskCacheError::contention)?;
            f(&mut connection)
        })
        .await
        .map_err(TaskCacheError::persistence)?
    }

    async fn load_where<F>(&self, query: F) -> TaskCacheResult<Vec<RtmTaskCacheEntry>>
    where
        F: FnOnce(&mut PgConnection) -> QueryResult<Vec<TaskCacheRow>> + Send + 'static,
    {
        self.run_blocking(move |connection| {
            query(connection)
                .map_err(map_diesel_error)?
                .into_iter()
                .map(row_to_entry)
                .collect()
        })
        .await
    }
}

#[async_trait]
impl TaskCacheRepository for PostgresTaskCache {
    async fn insert(&self, entry: &RtmTaskCacheEntry) -> TaskCacheResult<()> {
        let row = to_row(entry, entry.version())?;
        self.run_blocking(move |connection| {
            diesel::insert_into(rtm_task_cache::table)
                .values(&row)
                .execute(connection)
                .map_err(|err| match err {
                    DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                        TaskCacheError::DuplicateTask(row.task_id.clone())
                    }
                    other => map_diesel_error(other),
                })?;
            Ok(())
        })
        .await
    }

    async fn update(&self, entry: &RtmTaskCacheEntry) -> TaskCacheResult<RtmTaskCacheEntry> {
        let task_id = entry.task_id().to_owned();
        let expected_version = entry.version();
        let expected = i64::try_from(expected_version).map_err(TaskCacheError::persistence)?;
        let row = to_row(entry, expected_version.saturating_add(1))?;
        let mut updated = entry.clone();

        self.run_blocking(move |connection| {
            let changed = diesel::update(
                rtm_task_cache::table
                    .filter(rtm_task_cache::task_id.eq(&task_id))
                    .filter(rtm_task_cache::version.eq(expected)),
            )
            .set(&row)
            .execute(connection)
            .map_err(map_diesel_error)?;

            if changed == 0 {
                let exists = diesel::select(diesel::dsl::exists(
                    rtm_task_cache::table.filter(rtm_task_cache::task_id.eq(&task_id)),
                ))
                .get_result::<bool>(connection)
                .map_err(map_diesel_error)?;
                return Err(if exists {
                    TaskCacheError::Conflict {
                        task_id,
                        expected_version,
                    }
                } else {
                    TaskCacheError::NotFound(task_id)
                });
            }
            updated.set_version(expected_version.saturating_add(1));
            Ok(updated)
        })
        .await
    }

    async fn find_by_task_id(&self, task_id: &str) -> TaskCacheResult<Option<RtmTaskCacheEntry>> {
        let task_id = task_id.to_owned();
        self.run_blocking(move |connection| {
            let row = rtm_task_cache::table
                .filter(rtm_task_cache::task_id.eq(task_id))
                .select(TaskCacheRow::as_select())
                .first::<TaskCacheRow>(connection)
                .optional()
                .map_err(map_diesel_error)?;
            row.map(row_to_entry).transpose()
        })
        .await
    }

    async fn find_all(&self) -> TaskCacheResult<Vec<RtmTaskCacheEntry>> {
        self.load_where(|connection| {
            rtm_task_cache::table
                .order(rtm_task_cache::task_created_at.asc())
                .select(TaskCacheRow::as_select())
                .load(connection)
        })
        .await
    }

    async fn find_lonely_actions(&self) -> TaskCacheResult<Vec<RtmTaskCacheEntry>> {
        self.load_where(|connection| {
            rtm_task_cache::table
                .filter(rtm_task_cache::project_id.is_null())
                .filter(rtm_task_cache::completed.eq(false))
                .order(rtm_task_cache::task_created_at.asc())
                .select(TaskCacheRow::as_select())
                .load(connection)
        })
        .await
    }
}

/// Maps diesel errors, treating serialization failures as contention.
fn map_diesel_error(err: DieselError) -> TaskCacheError {
    match err {
        DieselError::DatabaseError(DatabaseErrorKind::SerializationFailure, _) => {
            TaskCacheError::contention(err)
        }
        other => TaskCacheError::persistence(other),
    }
}

fn to_row(entry: &RtmTaskCacheEntry, version: u64) -> TaskCacheResult<TaskCacheRow> {
    Ok(TaskCacheRow {
        task_id: entry.task_id().to_owned(),
        taskseries_id: entry.taskseries_id().to_owned(),
        list_id: entry.list_id().to_owned(),
        name: entry.name().to_owned(),
        task_created_at: entry.created_at(),
        project_id: entry.project_id().map(str::to_owned),
        completed: entry.is_completed(),
        tags: entry.tags().to_vec(),
        times_suggested: i32::try_from(entry.times_suggested())
            .map_err(TaskCacheError::persistence)?,
        last_suggested_at: entry.last_suggested_at(),
        last_synced_at: entry.last_synced_at(),
        version: i64::try_from(version).map_err(TaskCacheError::persistence)?,
    })
}

fn row_to_entry(row: TaskCacheRow) -> TaskCacheResult<RtmTaskCacheEntry> {
    Ok(RtmTaskCacheEntry::from_persisted(PersistedCacheEntryData {
        task_id: row.task_id,
        taskseries_id: row.taskseries_id,
        list_id: row.list_id,
        name: row.name,
        created_at: row.task_created_at,
        project_id: row.project_id,
        completed: row.completed,
        tags: row.tags,
        times_suggested: u32::try_from(row.times_suggested).map_err(TaskCacheError::persistence)?,
        last_suggested_at: row.last_suggested_at,
        last_synced_at: row.last_synced_at,
        version: u64::try_from(row.version).map_err(TaskCacheError::persistence)?,
    }))
}
