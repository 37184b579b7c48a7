//! Capture store behaviour against a real database.

use crate::postgres::helpers::{TestDatabase, approved, clock, email, test_database};
use chrono::Duration;
use inbox_relay::capture::{
    adapters::postgres::PostgresCaptureRepository,
    domain::{Capture, CommitFailureKind},
    ports::{CaptureRepository, CaptureRepositoryError},
};
use inbox_relay::clock::ManualClock;
use rstest::rstest;

fn fail_commit(capture: &mut Capture, clock: &ManualClock) {
    capture.begin_commit(clock).expect("committable");
    capture
        .record_commit_failure(CommitFailureKind::Rejected, "list is full", clock)
        .expect("in flight");
}

#[rstest]
fn update_from_a_stale_version_conflicts(
    test_database: Option<TestDatabase>,
    clock: ManualClock,
) {
    let Some(db) = test_database else { return };
    let repo = PostgresCaptureRepository::new(db.pool.clone());
    let capture = Capture::new("call the plumber", email("m-1"), &clock).expect("valid capture");
    db.runtime
        .block_on(repo.store(&capture))
        .expect("store succeeds");

    let mut first = capture.clone();
    first.begin_clarification(&clock).expect("claimable");
    let mut second = capture.clone();
    second.begin_clarification(&clock).expect("claimable");

    let won = db.runtime.block_on(repo.update(&first)).expect("first claim wins");
    let lost = db.runtime.block_on(repo.update(&second));

    assert_eq!(won.version(), 1);
    assert!(
        matches!(
            lost,
            Err(CaptureRepositoryError::Conflict { id, expected_version: 0 }) if id == capture.id()
        ),
        "expected a conflict, got {lost:?}"
    );
    let stored = db
        .runtime
        .block_on(repo.find_by_id(capture.id()))
        .expect("lookup succeeds")
        .expect("capture exists");
    assert_eq!(stored.version(), 1);
    assert_eq!(stored.clarify_attempt_count(), 1);
}

#[rstest]
fn update_of_a_missing_capture_is_not_found(
    test_database: Option<TestDatabase>,
    clock: ManualClock,
) {
    let Some(db) = test_database else { return };
    let repo = PostgresCaptureRepository::new(db.pool.clone());
    let capture = Capture::new("never stored", email("m-2"), &clock).expect("valid capture");

    let result = db.runtime.block_on(repo.update(&capture));

    assert!(matches!(result, Err(CaptureRepositoryError::NotFound(id)) if id == capture.id()));
}

#[rstest]
fn second_capture_from_one_source_is_a_duplicate_source(
    test_database: Option<TestDatabase>,
    clock: ManualClock,
) {
    let Some(db) = test_database else { return };
    let repo = PostgresCaptureRepository::new(db.pool.clone());
    let original = Capture::new("pay rent", email("msg-7"), &clock).expect("valid capture");
    let redelivered = Capture::new("pay rent", email("msg-7"), &clock).expect("valid capture");
    db.runtime
        .block_on(repo.store(&original))
        .expect("first store succeeds");

    let duplicate = db.runtime.block_on(repo.store(&redelivered));

    assert!(
        matches!(
            &duplicate,
            Err(CaptureRepositoryError::DuplicateSource { kind, source_id })
                if kind == "email" && source_id == "msg-7"
        ),
        "expected a duplicate source, got {duplicate:?}"
    );
}

#[rstest]
fn commit_queue_skips_unknown_and_exhausted_captures_in_decision_order(
    test_database: Option<TestDatabase>,
    clock: ManualClock,
) {
    let Some(db) = test_database else { return };
    let repo = PostgresCaptureRepository::new(db.pool.clone());

    let first = approved(&clock, "first decided");
    clock.advance(Duration::minutes(1));
    let mut retryable = approved(&clock, "failed once");
    fail_commit(&mut retryable, &clock);
    clock.advance(Duration::minutes(1));
    let mut exhausted = approved(&clock, "failed three times");
    for _ in 0..3 {
        fail_commit(&mut exhausted, &clock);
    }
    clock.advance(Duration::minutes(1));
    let mut unknown = approved(&clock, "outcome unknown");
    unknown.begin_commit(&clock).expect("committable");
    clock.advance(Duration::minutes(1));
    let last = approved(&clock, "last decided");
    let undecided = Capture::new("still proposed", email("m-9"), &clock).expect("valid capture");

    for capture in [&last, &unknown, &exhausted, &undecided, &retryable, &first] {
        db.runtime
            .block_on(repo.store(capture))
            .expect("store succeeds");
    }

    let candidates = db
        .runtime
        .block_on(repo.find_commit_candidates(3, 10))
        .expect("query succeeds");
    let limited = db
        .runtime
        .block_on(repo.find_commit_candidates(3, 2))
        .expect("query succeeds");

    let ids: Vec<_> = candidates.iter().map(Capture::id).collect();
    assert_eq!(ids, [first.id(), retryable.id(), last.id()]);
    let limited_ids: Vec<_> = limited.iter().map(Capture::id).collect();
    assert_eq!(limited_ids, [first.id(), retryable.id()]);
}

#[rstest]
fn pending_decisions_are_detected(test_database: Option<TestDatabase>, clock: ManualClock) {
    let Some(db) = test_database else { return };
    let repo = PostgresCaptureRepository::new(db.pool.clone());
    db.runtime
        .block_on(repo.store(&approved(&clock, "decided")))
        .expect("store succeeds");

    let before = db.runtime.block_on(repo.has_proposed()).expect("query succeeds");
    db.runtime
        .block_on(repo.store(
            &Capture::new("undecided", email("m-3"), &clock).expect("valid capture"),
        ))
        .expect("store succeeds");
    let after = db.runtime.block_on(repo.has_proposed()).expect("query succeeds");

    assert!(!before);
    assert!(after);
}
