//! Backlog store behaviour against a real database.

use crate::postgres::helpers::{TestDatabase, clock, test_database};
use chrono::{TimeZone, Utc};
use inbox_relay::backlog::{
    adapters::postgres::PostgresBacklogRepository,
    domain::BacklogItem,
    ports::{BacklogRepository, BacklogRepositoryError},
};
use inbox_relay::clock::ManualClock;
use rstest::rstest;

fn item(clock: &ManualClock, text: &str) -> BacklogItem {
    BacklogItem::new(text, "notes.txt", clock).expect("valid item")
}

#[rstest]
fn claims_are_counted_from_the_given_instant_whatever_the_status(
    test_database: Option<TestDatabase>,
    clock: ManualClock,
) {
    let Some(db) = test_database else { return };
    let repo = PostgresBacklogRepository::new(db.pool.clone());

    clock.set(Utc.with_ymd_and_hms(2025, 12, 31, 23, 0, 0).unwrap());
    let mut yesterday = item(&clock, "claimed yesterday");
    yesterday.claim(&clock).expect("pending");
    clock.set(Utc.with_ymd_and_hms(2026, 1, 1, 8, 0, 0).unwrap());
    let mut failed = item(&clock, "claimed then failed");
    failed.claim(&clock).expect("pending");
    failed.mark_failed("clarifier gave up", 3, &clock).expect("processing");
    let later = item(&clock, "claimed after storing");
    let untouched = item(&clock, "never claimed");
    db.runtime
        .block_on(repo.store_all(&[yesterday, failed, later.clone(), untouched]))
        .expect("store succeeds");

    clock.set(Utc.with_ymd_and_hms(2026, 1, 1, 10, 0, 0).unwrap());
    let mut claimed = later;
    claimed.claim(&clock).expect("pending");
    db.runtime
        .block_on(repo.update(&claimed))
        .expect("update succeeds");

    let today = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
    let since_today = db
        .runtime
        .block_on(repo.count_claimed_since(today))
        .expect("count succeeds");
    let since_yesterday = db
        .runtime
        .block_on(repo.count_claimed_since(today - chrono::Duration::days(1)))
        .expect("count succeeds");
    let since_claim = db
        .runtime
        .block_on(repo.count_claimed_since(clock.now()))
        .expect("count succeeds");

    assert_eq!(since_today, 2);
    assert_eq!(since_yesterday, 3);
    assert_eq!(since_claim, 1);
}

#[rstest]
fn update_from_a_stale_version_conflicts(
    test_database: Option<TestDatabase>,
    clock: ManualClock,
) {
    let Some(db) = test_database else { return };
    let repo = PostgresBacklogRepository::new(db.pool.clone());
    let stored = item(&clock, "contested line");
    db.runtime
        .block_on(repo.store_all(std::slice::from_ref(&stored)))
        .expect("store succeeds");

    let mut first = stored.clone();
    first.claim(&clock).expect("pending");
    let mut second = stored.clone();
    second.claim(&clock).expect("pending");
    db.runtime
        .block_on(repo.update(&first))
        .expect("first claim wins");
    let lost = db.runtime.block_on(repo.update(&second));

    assert!(
        matches!(
            lost,
            Err(BacklogRepositoryError::Conflict { id, expected_version: 0 }) if id == stored.id()
        ),
        "expected a conflict, got {lost:?}"
    );
}
