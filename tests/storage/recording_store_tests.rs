//! RecordingStore interface tests.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::json;

use periscope::interfaces::{RecordingEvent, RecordingStore, TeamId};
use periscope::replay::{DurationFilter, DurationOperator};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
}

fn secs(n: i64) -> DateTime<Utc> {
    t0() + Duration::seconds(n)
}

/// Recording event whose snapshot `type` is `kind` (2 is a full snapshot).
pub fn make_event(team_id: TeamId, session: &str, user: &str, at: DateTime<Utc>, kind: i64) -> RecordingEvent {
    RecordingEvent {
        team_id,
        distinct_id: user.to_string(),
        session_id: session.to_string(),
        timestamp: at,
        snapshot_data: json!({"type": kind, "data": {"at": at.timestamp()}}),
    }
}

pub async fn test_keyframe_required<S: RecordingStore>(store: &S) {
    let team = 301;
    store
        .add_recording_events(&[
            make_event(team, "with_keyframe", "u1", secs(0), 2),
            make_event(team, "with_keyframe", "u1", secs(90), 3),
            make_event(team, "increments_only", "u1", secs(10), 3),
        ])
        .await
        .expect("add should succeed");

    let candidates = store
        .recordings_in_range(team, secs(-60), secs(3600), None)
        .await
        .expect("query should succeed");

    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].session_id, "with_keyframe");
    assert_eq!(candidates[0].distinct_id, "u1");
    assert_eq!(candidates[0].start_time, secs(0));
    assert_eq!(candidates[0].end_time, secs(90));
    assert_eq!(candidates[0].full_snapshots, 1);
}

pub async fn test_duration_filters<S: RecordingStore>(store: &S) {
    let team = 302;
    store
        .add_recording_events(&[
            make_event(team, "short", "u1", secs(0), 2),
            make_event(team, "short", "u1", secs(30), 3),
            make_event(team, "long", "u1", secs(0), 2),
            make_event(team, "long", "u1", secs(300), 3),
        ])
        .await
        .expect("add should succeed");

    for (operator, expected) in [(DurationOperator::Gt, "long"), (DurationOperator::Lt, "short")] {
        let filter = DurationFilter {
            operator,
            value_seconds: 60,
        };
        let ids: Vec<String> = store
            .recordings_in_range(team, secs(0), secs(3600), Some(&filter))
            .await
            .expect("query should succeed")
            .into_iter()
            .map(|c| c.session_id)
            .collect();
        assert_eq!(ids, vec![expected.to_string()], "operator {operator:?}");
    }
}

pub async fn test_window_is_inclusive<S: RecordingStore>(store: &S) {
    let team = 303;
    store
        .add_recording_events(&[make_event(team, "s1", "u1", secs(0), 2)])
        .await
        .expect("add should succeed");

    let at_end = store
        .recordings_in_range(team, secs(-60), secs(0), None)
        .await
        .expect("query should succeed");
    assert_eq!(at_end.len(), 1, "end bound is inclusive");

    let at_start = store
        .recordings_in_range(team, secs(0), secs(60), None)
        .await
        .expect("query should succeed");
    assert_eq!(at_start.len(), 1, "start bound is inclusive");

    let after = store
        .recordings_in_range(team, secs(1), secs(60), None)
        .await
        .expect("query should succeed");
    assert!(after.is_empty());

    let inverted = store
        .recordings_in_range(team, secs(60), secs(-60), None)
        .await
        .expect("query should succeed");
    assert!(inverted.is_empty());
}

pub async fn test_candidates_ordered_by_start<S: RecordingStore>(store: &S) {
    let team = 304;
    store
        .add_recording_events(&[
            make_event(team, "s_b", "u1", secs(0), 2),
            make_event(team, "s_a", "u2", secs(0), 2),
            make_event(team, "s_c", "u3", secs(-10), 2),
        ])
        .await
        .expect("add should succeed");

    let ids: Vec<String> = store
        .recordings_in_range(team, secs(-60), secs(60), None)
        .await
        .expect("query should succeed")
        .into_iter()
        .map(|c| c.session_id)
        .collect();
    assert_eq!(ids, vec!["s_c", "s_a", "s_b"]);
}

pub async fn test_snapshot_events_ordered<S: RecordingStore>(store: &S) {
    let team = 305;
    let late = make_event(team, "s1", "u1", secs(5), 3);
    let early = make_event(team, "s1", "u1", secs(0), 2);
    store
        .add_recording_events(&[late.clone(), early.clone(), make_event(team, "s2", "u1", secs(1), 2)])
        .await
        .expect("add should succeed");

    let events = store.snapshot_events(team, "s1").await.expect("load should succeed");
    assert_eq!(events, vec![early, late]);

    let other_team = store.snapshot_events(306, "s1").await.expect("load should succeed");
    assert!(other_team.is_empty());
}

/// Run all RecordingStore interface tests against a store implementation.
#[macro_export]
macro_rules! run_recording_store_tests {
    ($store:expr) => {
        use $crate::storage::recording_store_tests::*;

        test_keyframe_required($store).await;
        println!("  test_keyframe_required: PASSED");

        test_duration_filters($store).await;
        println!("  test_duration_filters: PASSED");

        test_window_is_inclusive($store).await;
        println!("  test_window_is_inclusive: PASSED");

        test_candidates_ordered_by_start($store).await;
        println!("  test_candidates_ordered_by_start: PASSED");

        test_snapshot_events_ordered($store).await;
        println!("  test_snapshot_events_ordered: PASSED");
    };
}
