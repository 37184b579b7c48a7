//! `PostgreSQL` repository implementation for backlog items.

use super::{
    models::{BacklogItemRecord, BacklogItemRow},
    schema::backlog_items,
};
use crate::backlog::{
    domain::{BacklogItem, BacklogItemId, BacklogStatus, PersistedBacklogItemData},
    ports::{
        BacklogRepository, BacklogRepositoryError, BacklogRepositoryResult, BacklogStatusCounts,
    },
};
use crate::capture::domain::CaptureId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::result::{DatabaseErrorKind, Error as DieselError};

/// `PostgreSQL` connection pool type used by backlog adapters.
pub type BacklogPgPool = Pool<ConnectionManager<PgConnection>>;

/// `PostgreSQL`-backed backlog repository.
#[derive(Debug, Clone)]
pub struct PostgresBacklogRepository {
    pool: BacklogPgPool,
}

impl PostgresBacklogRepository {
    /// Creates a new repository from a `PostgreSQL` connection pool.
    #[must_use]
    pub const fn new(pool: BacklogPgPool) -> Self {
        Self { pool }
    }

    async fn run_blocking<F, T>(&self, f: F) -> BacklogRepositoryResult<T>
    where
        F: FnOnce(&mut PgConnection) -> BacklogRepositoryResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = pool.get().map_err(BacklogRepositoryError::contention)?;
            f(&mut connection)
        })
        .await
        .map_err(BacklogRepositoryError::persistence)?
    }
}

#[async_trait]
impl BacklogRepository for PostgresBacklogRepository {
    async fn store_all(&self, items: &[BacklogItem]) -> BacklogRepositoryResult<()> {
        let records = items
            .iter()
            .map(|item| to_record(item, item.version()))
            .collect::<BacklogRepositoryResult<Vec<_>>>()?;
        let ids: Vec<uuid::Uuid> = records.iter().map(|record| record.id).collect();

        self.run_blocking(move |connection| {
            let inserted = diesel::insert_into(backlog_items::table)
                .values(&records)
                .execute(connection);
            match inserted {
                Ok(_) => Ok(()),
                Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
                    let existing = backlog_items::table
                        .filter(backlog_items::id.eq_any(ids.clone()))
                        .select(backlog_items::id)
                        .first::<uuid::Uuid>(connection)
                        .optional()
                        .map_err(map_diesel_error)?;
                    let duplicate = existing.or_else(|| ids.first().copied()).unwrap_or_default();
                    Err(BacklogRepositoryError::DuplicateItem(
                        BacklogItemId::from_uuid(duplicate),
                    ))
                }
                Err(other) => Err(map_diesel_error(other)),
            }
        })
        .await
    }

    async fn update(&self, item: &BacklogItem) -> BacklogRepositoryResult<BacklogItem> {
        let item_id = item.id();
        let expected_version = item.version();
        let expected = i64::try_from(expected_version).map_err(BacklogRepositoryError::persistence)?;
        let record = to_record(item, expected_version.saturating_add(1))?;
        let mut updated = item.clone();

        self.run_blocking(move |connection| {
            let changed = diesel::update(
                backlog_items::table
                    .filter(backlog_items::id.eq(item_id.into_inner()))
                    .filter(backlog_items::version.eq(expected)),
            )
            .set(&record)
            .execute(connection)
            .map_err(map_diesel_error)?;

            if changed == 0 {
                let exists = diesel::select(diesel::dsl::exists(
                    backlog_items::table.filter(backlog_items::id.eq(item_id.into_inner())),
                ))
                .get_result::<bool>(connection)
                .map_err(map_diesel_error)?;
                return Err(if exists {
                    BacklogRepositoryError::Conflict {
                        id: item_id,
                        expected_version,
                    }
                } else {
                    BacklogRepositoryError::NotFound(item_id)
                });
            }
            updated.set_version(expected_version.saturating_add(1));
            Ok(updated)
        })
        .await
    }

    async fn find_by_id(&self, id: BacklogItemId) -> BacklogRepositoryResult<Option<BacklogItem>> {
        self.run_blocking(move |connection| {
            let row = backlog_items::table
                .filter(backlog_items::id.eq(id.into_inner()))
                .select(BacklogItemRow::as_select())
                .first::<BacklogItemRow>(connection)
                .optional()
                .map_err(map_diesel_error)?;
            row.map(row_to_item).transpose()
        })
        .await
    }

    async fn find_pending(&self, limit: usize) -> BacklogRepositoryResult<Vec<BacklogItem>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.run_blocking(move |connection| {
            backlog_items::table
                .filter(backlog_items::status.eq(BacklogStatus::Pending.as_str()))
                .order((backlog_items::imported_at.asc(), backlog_items::seq.asc()))
                .limit(limit)
                .select(BacklogItemRow::as_select())
                .load::<BacklogItemRow>(connection)
                .map_err(map_diesel_error)?
                .into_iter()
                .map(row_to_item)
                .collect()
        })
        .await
    }

    async fn find_processing(&self) -> BacklogRepositoryResult<Vec<BacklogItem>> {
        self.run_blocking(move |connection| {
            backlog_items::table
                .filter(backlog_items::status.eq(BacklogStatus::Processing.as_str()))
                .order((backlog_items::claimed_at.asc(), backlog_items::seq.asc()))
                .select(BacklogItemRow::as_select())
                .load::<BacklogItemRow>(connection)
                .map_err(map_diesel_error)?
                .into_iter()
                .map(row_to_item)
                .collect()
        })
        .await
    }

    async fn count_claimed_since(&self, since: DateTime<Utc>) -> BacklogRepositoryResult<usize> {
        self.run_blocking(move |connection| {
            let count = backlog_items::table
                .filter(backlog_items::claimed_at.ge(since))
                .count()
                .get_result::<i64>(connection)
                .map_err(map_diesel_error)?;
            usize::try_from(count).map_err(BacklogRepositoryError::persistence)
        })
        .await
    }

    async fn status_counts(&self) -> BacklogRepositoryResult<BacklogStatusCounts> {
        self.run_blocking(move |connection| {
            let grouped = backlog_items::table
                .group_by(backlog_items::status)
                .select((backlog_items::status, diesel::dsl::count_star()))
                .load::<(String, i64)>(connection)
                .map_err(map_diesel_error)?;
            let mut counts = BacklogStatusCounts::default();
            for (status, count) in grouped {
                let count = usize::try_from(count).map_err(BacklogRepositoryError::persistence)?;
                match BacklogStatus::try_from(status.as_str())
                    .map_err(BacklogRepositoryError::persistence)?
                {
                    BacklogStatus::Pending => counts.pending = count,
                    BacklogStatus::Processing => counts.processing = count,
                    BacklogStatus::Processed => counts.processed = count,
                    BacklogStatus::Failed => counts.failed = count,
                }
            }
            Ok(counts)
        })
        .await
    }
}

/// Maps diesel errors, treating serialization failures as contention.
fn map_diesel_error(err: DieselError) -> BacklogRepositoryError {
    match err {
        DieselError::DatabaseError(DatabaseErrorKind::SerializationFailure, _) => {
            BacklogRepositoryError::contention(err)
        }
        other => BacklogRepositoryError::persistence(other),
    }
}

fn to_record(item: &BacklogItem, version: u64) -> BacklogRepositoryResult<BacklogItemRecord> {
    Ok(BacklogItemRecord {
        id: item.id().into_inner(),
        raw_text: item.raw_text().to_owned(),
        source: item.source().to_owned(),
        status: item.status().as_str().to_owned(),
        imported_at: item.imported_at(),
        claimed_at: item.claimed_at(),
        processed_at: item.processed_at(),
        capture_id: item.capture_id().map(CaptureId::into_inner),
        clarify_attempts: i32::try_from(item.clarify_attempts())
            .map_err(BacklogRepositoryError::persistence)?,
        last_error: item.last_error().map(str::to_owned),
        version: i64::try_from(version).map_err(BacklogRepositoryError::persistence)?,
    })
}

fn row_to_item(row: BacklogItemRow) -> BacklogRepositoryResult<BacklogItem> {
    let BacklogItemRow {
        id,
        raw_text,
        source,
        status,
        imported_at,
        claimed_at,
        processed_at,
        capture_id,
        clarify_attempts,
        last_error,
        version,
    } = row;

    Ok(BacklogItem::from_persisted(PersistedBacklogItemData {
        id: BacklogItemId::from_uuid(id),
        raw_text,
        source,
        status: BacklogStatus::try_from(status.as_str())
            .map_err(BacklogRepositoryError::persistence)?,
        imported_at,
        claimed_at,
        processed_at,
        capture_id: capture_id.map(CaptureId::from_uuid),
        clarify_attempts: u32::try_from(clarify_attempts)
            .map_err(BacklogRepositoryError::persistence)?,
        last_error,
        version: u64::try_from(version).map_err(BacklogRepositoryError::persistence)?,
    }))
}
