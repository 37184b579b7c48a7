//! Template database, per-test databases and seed builders.

pub use super::cluster::{BoxError, PostgresCluster, postgres_cluster};
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use inbox_relay::capture::domain::{Capture, CaptureSource, Clarification, ClarificationKind};
use inbox_relay::clock::ManualClock;
use rstest::fixture;
use tokio::runtime::Runtime;
use uuid::Uuid;

/// Migrations in the order they are applied to the template.
const MIGRATIONS: [&str; 4] = [
    include_str!("../../migrations/2026-01-15-000000_create_captures/up.sql"),
    include_str!("../../migrations/2026-01-15-000001_create_backlog_items/up.sql"),
    include_str!("../../migrations/2026-01-15-000002_create_rtm_task_cache/up.sql"),
    include_str!("../../migrations/2026-01-15-000003_create_anchors/up.sql"),
];

/// Pre-migrated database every test database is copied from.
pub const TEMPLATE_DB: &str = "inbox_relay_test_template";

pub type PgPool = Pool<ConnectionManager<PgConnection>>;

#[fixture]
pub fn clock() -> ManualClock {
    ManualClock::default()
}

/// Drops its database when dropped.
pub struct CleanupGuard {
    cluster: PostgresCluster,
    db_name: String,
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        drop(self.cluster.drop_database(&self.db_name));
    }
}

/// A fresh migrated database, a pool onto it and a runtime to drive the
/// async repositories.
pub struct TestDatabase {
    pub pool: PgPool,
    pub runtime: Runtime,
    _guard: CleanupGuard,
}

/// Creates a migrated database for one test, or `None` without a cluster.
#[fixture]
pub fn test_database(postgres_cluster: Option<PostgresCluster>) -> Option<TestDatabase> {
    let cluster = postgres_cluster?;
    let database = prepare(cluster).expect("test database setup");
    Some(database)
}

fn prepare(cluster: PostgresCluster) -> Result<TestDatabase, BoxError> {
    cluster.ensure_template_exists(TEMPLATE_DB, apply_migrations)?;
    let db_name = format!("test_{}", Uuid::new_v4().simple());
    cluster.create_database_from_template(&db_name, TEMPLATE_DB)?;
    let guard = CleanupGuard {
        cluster,
        db_name: db_name.clone(),
    };
    let pool = Pool::builder()
        .max_size(2)
        .build(ConnectionManager::<PgConnection>::new(
            cluster.database_url(&db_name),
        ))?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()?;
    Ok(TestDatabase {
        pool,
        runtime,
        _guard: guard,
    })
}

fn apply_migrations(url: &str) -> Result<(), BoxError> {
    let mut conn = PgConnection::establish(url)?;
    for migration in MIGRATIONS {
        conn.batch_execute(migration)?;
    }
    Ok(())
}

pub fn email(message_id: &str) -> CaptureSource {
    CaptureSource::new(CaptureSource::EMAIL)
        .expect("valid source kind")
        .with_source_id(message_id)
}

/// Builds an approved capture decided at the clock's current time.
pub fn approved(clock: &ManualClock, title: &str) -> Capture {
    let mut capture =
        Capture::new(title, email(&format!("msg-{title}")), clock).expect("valid capture");
    capture.begin_clarification(clock).expect("claimable");
    capture
        .complete_clarification(
            Clarification::new(ClarificationKind::NextAction, title).expect("valid clarification"),
            clock,
        )
        .expect("in progress");
    capture.approve(None, clock).expect("clarified");
    capture
}
