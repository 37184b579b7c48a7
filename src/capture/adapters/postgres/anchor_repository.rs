//! `PostgreSQL` repository for approval anchors.

use super::{models::AnchorRow, repository::CapturePgPool, schema::anchors};
use crate::capture::{
    domain::{
        Anchor, AnchorExternalState, AnchorId, AnchorKind, AnchorStatus, PersistedAnchorData,
    },
    ports::{AnchorRepository, AnchorRepositoryError, AnchorRepositoryResult},
};
use async_trait::async_trait;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};

const ONE_ACTIVE_INDEX: &str = "idx_anchors_one_active";

/// `PostgreSQL`-backed anchor repository sharing the capture pool.
#[derive(Debug, Clone)]
pub struct PostgresAnchorRepository {
    pool: CapturePgPool,
}

impl PostgresAnchorRepository {
    /// Creates a repository from a `PostgreSQL` connection pool.
    #[must_use]
    pub const fn new(pool: CapturePgPool) -> Self {
        Self { pool }
    }

    async fn run_blocking<F, T>(&self, f: F) -> AnchorRepositoryResult<T>
    where
        F: FnOnce(&mut PgConnection) -> AnchorRepositoryResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = pool.get().map_err(AnchorRepositoryError::contention)?;
            f(&mut connection)
        })
        .await
        .map_err(AnchorRepositoryError::persistence)?
    }
}

#[async_trait]
impl AnchorRepository for PostgresAnchorRepository {
    async fn store(&self, anchor: &Anchor) -> AnchorRepositoryResult<()> {
        let kind = anchor.kind().as_str();
        let row = to_row(anchor, anchor.version())?;
        self.run_blocking(move |connection| {
            diesel::insert_into(anchors::table)
                .values(&row)
                .execute(connection)
                .map_err(|err| match err {
                    DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, ref info)
                        if info.constraint_name() == Some(ONE_ACTIVE_INDEX) =>
                    {
                        AnchorRepositoryError::ActiveExists(kind)
                    }
                    other => map_diesel_error(other),
                })?;
            Ok(())
        })
        .await
    }

    async fn update(&self, anchor: &Anchor) -> AnchorRepositoryResult<Anchor> {
        let anchor_id = anchor.id();
        let expected_version = anchor.version();
        let expected =
            i64::try_from(expected_version).map_err(AnchorRepositoryError::persistence)?;
        let row = to_row(anchor, expected_version.saturating_add(1))?;
        let mut updated = anchor.clone();

        self.run_blocking(move |connection| {
            let changed = diesel::update(
                anchors::table
                    .filter(anchors::id.eq(anchor_id.into_inner()))
                    .filter(anchors::version.eq(expected)),
            )
            .set(&row)
            .execute(connection)
            .map_err(map_diesel_error)?;

            if changed == 0 {
                let exists = diesel::select(diesel::dsl::exists(
                    anchors::table.filter(anchors::id.eq(anchor_id.into_inner())),
                ))
                .get_result::<bool>(connection)
                .map_err(map_diesel_error)?;
                return Err(if exists {
                    AnchorRepositoryError::Conflict {
                        id: anchor_id,
                        expected_version,
                    }
                } else {
                    AnchorRepositoryError::NotFound(anchor_id)
                });
            }
            updated.set_version(expected_version.saturating_add(1));
            Ok(updated)
        })
        .await
    }

    async fn find_active(&self, kind: AnchorKind) -> AnchorRepositoryResult<Vec<Anchor>> {
        self.run_blocking(move |connection| {
            anchors::table
                .filter(anchors::kind.eq(kind.as_str()))
                .filter(anchors::status.eq(AnchorStatus::Active.as_str()))
                .order(anchors::created_at.desc())
                .select(AnchorRow::as_select())
                .load::<AnchorRow>(connection)
                .map_err(map_diesel_error)?
                .into_iter()
                .map(row_to_anchor)
                .collect()
        })
        .await
    }
}

fn map_diesel_error(err: DieselError) -> AnchorRepositoryError {
    match err {
        DieselError::DatabaseError(DatabaseErrorKind::SerializationFailure, _) => {
            AnchorRepositoryError::contention(err)
        }
        other => AnchorRepositoryError::persistence(other),
    }
}

fn to_row(anchor: &Anchor, version: u64) -> AnchorRepositoryResult<AnchorRow> {
    let external_state = anchor
        .external_state()
        .map(serde_json::to_value)
        .transpose()
        .map_err(AnchorRepositoryError::persistence)?;
    Ok(AnchorRow {
        id: anchor.id().into_inner(),
        kind: anchor.kind().as_str().to_owned(),
        status: anchor.status().as_str().to_owned(),
        valid_until: anchor.valid_until(),
        external_state,
        created_at: anchor.created_at(),
        updated_at: anchor.updated_at(),
        version: i64::try_from(version).map_err(AnchorRepositoryError::persistence)?,
    })
}

fn row_to_anchor(row: AnchorRow) -> AnchorRepositoryResult<Anchor> {
    let external_state = row
        .external_state
        .map(serde_json::from_value::<AnchorExternalState>)
        .transpose()
        .map_err(AnchorRepositoryError::persistence)?;
    Ok(Anchor::from_persisted(PersistedAnchorData {
        id: AnchorId::from_uuid(row.id),
        kind: AnchorKind::try_from(row.kind.as_str())
            .map_err(AnchorRepositoryError::persistence)?,
        status: AnchorStatus::try_from(row.status.as_str())
            .map_err(AnchorRepositoryError::persistence)?,
        valid_until: row.valid_until,
        external_state,
        created_at: row.created_at,
        updated_at: row.updated_at,
        version: u64::try_from(row.version).map_err(AnchorRepositoryError::persistence)?,
    }))
}
