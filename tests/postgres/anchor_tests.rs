//! Anchor store behaviour against a real database.

use crate::postgres::helpers::{TestDatabase, clock, test_database};
use chrono::Duration;
use inbox_relay::capture::{
    adapters::postgres::PostgresAnchorRepository,
    domain::{APPROVAL_ANCHOR_SMART_ADD, Anchor, AnchorExternalState, AnchorKind, RemoteTaskRef},
    ports::{AnchorRepository, AnchorRepositoryError},
};
use inbox_relay::clock::ManualClock;
use rstest::rstest;

#[rstest]
fn only_one_approval_anchor_can_be_active(
    test_database: Option<TestDatabase>,
    clock: ManualClock,
) {
    let Some(db) = test_database else { return };
    let repo = PostgresAnchorRepository::new(db.pool.clone());
    let today = clock.now().date_naive();
    let mut first = Anchor::approval(today, &clock);
    db.runtime
        .block_on(repo.store(&first))
        .expect("first store succeeds");

    let rival = db
        .runtime
        .block_on(repo.store(&Anchor::approval(today, &clock)));
    assert!(
        matches!(rival, Err(AnchorRepositoryError::ActiveExists("approval_anchor"))),
        "expected the active anchor to block, got {rival:?}"
    );

    first.expire(&clock).expect("active");
    db.runtime
        .block_on(repo.update(&first))
        .expect("expire succeeds");
    clock.advance(Duration::days(1));
    let next = Anchor::approval(clock.now().date_naive(), &clock);
    db.runtime
        .block_on(repo.store(&next))
        .expect("store after expiry succeeds");

    let active = db
        .runtime
        .block_on(repo.find_active(AnchorKind::Approval))
        .expect("query succeeds");
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id(), next.id());
}

#[rstest]
fn reminder_outcome_survives_a_reload(test_database: Option<TestDatabase>, clock: ManualClock) {
    let Some(db) = test_database else { return };
    let repo = PostgresAnchorRepository::new(db.pool.clone());
    let mut anchor = Anchor::approval(clock.now().date_naive(), &clock);
    anchor
        .begin_task(APPROVAL_ANCHOR_SMART_ADD, &clock)
        .expect("not started");
    db.runtime
        .block_on(repo.store(&anchor))
        .expect("store succeeds");
    let stale = anchor.clone();

    anchor
        .record_committed(RemoteTaskRef::new("t-1", "s-1", "inbox"), &clock)
        .expect("in progress");
    db.runtime
        .block_on(repo.update(&anchor))
        .expect("update succeeds");
    let lost = db.runtime.block_on(repo.update(&stale));

    assert!(matches!(lost, Err(AnchorRepositoryError::Conflict { .. })));
    let reloaded = db
        .runtime
        .block_on(repo.find_active(AnchorKind::Approval))
        .expect("query succeeds");
    assert!(matches!(
        reloaded[0].external_state(),
        Some(AnchorExternalState::Committed { task, smart_add, .. })
            if task.task_id == "t-1" && smart_add == APPROVAL_ANCHOR_SMART_ADD
    ));
    assert_eq!(reloaded[0].version(), 1);
}
