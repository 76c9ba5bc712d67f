use std::collections::HashMap;

use chrono::Duration as ChronoDuration;
use serde_json::json;

use super::*;
use crate::replay::DurationOperator;
use crate::retention::{CohortConditionBuilder, EntityRef, Period, Predicate};

fn t0() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

fn day(n: i64, hour: i64) -> DateTime<Utc> {
    t0() + ChronoDuration::days(n) + ChronoDuration::hours(hour)
}

fn query(mode: RetentionMode, target: &str, returning: &str, days: i64) -> RetentionQuery {
    let conditions = CohortConditionBuilder::new(
        mode,
        Some(EntityRef::Event(target.into())),
        Some(EntityRef::Event(returning.into())),
    )
    .build(&HashMap::new())
    .unwrap();
    RetentionQuery {
        team_id: 1,
        period: Period::Day,
        mode,
        buckets: (0..=days).map(|i| day(i, 0)).collect(),
        target: conditions.target,
        returning: conditions.returning,
        properties: Predicate::always(),
    }
}

fn count(rows: &[CohortCount], first: usize, seen: usize) -> u64 {
    rows.iter()
        .find(|r| r.first_bucket == first && r.seen_bucket == seen)
        .map(|r| r.count)
        .unwrap_or(0)
}

#[tokio::test]
async fn test_recurring_counts_every_active_bucket() {
    let store = MockEventStore::new();
    store
        .add_events(&[
            EventRecord::new(1, "$pageview", "alice", day(0, 1)),
            EventRecord::new(1, "$pageview", "alice", day(0, 5)),
            EventRecord::new(1, "$pageview", "alice", day(2, 1)),
            EventRecord::new(1, "$pageview", "bob", day(1, 1)),
            EventRecord::new(1, "$pageview", "bob", day(2, 1)),
            EventRecord::new(2, "$pageview", "carol", day(0, 1)),
        ])
        .await
        .unwrap();

    let rows = store
        .cohort_counts(&query(RetentionMode::Recurring, "$pageview", "$pageview", 3))
        .await
        .unwrap();

    assert_eq!(count(&rows, 0, 0), 1);
    assert_eq!(count(&rows, 0, 2), 1);
    assert_eq!(count(&rows, 1, 1), 1);
    assert_eq!(count(&rows, 1, 2), 1);
    assert_eq!(count(&rows, 2, 2), 2);
    assert_eq!(count(&rows, 0, 1), 0);
}

#[tokio::test]
async fn test_first_time_uses_earliest_target_bucket() {
    let store = MockEventStore::new();
    store
        .add_events(&[
            EventRecord::new(1, "signup", "alice", day(0, 1)),
            EventRecord::new(1, "signup", "alice", day(1, 1)),
            EventRecord::new(1, "purchase", "alice", day(2, 1)),
            EventRecord::new(1, "signup", "bob", day(1, 3)),
            EventRecord::new(1, "purchase", "bob", day(1, 4)),
        ])
        .await
        .unwrap();

    let rows = store
        .cohort_counts(&query(RetentionMode::FirstTime, "signup", "purchase", 3))
        .await
        .unwrap();

    // Day-zero signup counts as the anchor return.
    assert_eq!(count(&rows, 0, 0), 1);
    assert_eq!(count(&rows, 0, 2), 1);
    assert_eq!(count(&rows, 1, 1), 1);
    // alice only belongs to her first cohort
    assert_eq!(count(&rows, 1, 2), 0);
}

#[tokio::test]
async fn test_events_outside_range_are_ignored() {
    let store = MockEventStore::new();
    store
        .add_events(&[
            EventRecord::new(1, "$pageview", "alice", day(-1, 0)),
            EventRecord::new(1, "$pageview", "alice", day(3, 0)),
        ])
        .await
        .unwrap();

    let rows = store
        .cohort_counts(&query(RetentionMode::Recurring, "$pageview", "$pageview", 3))
        .await
        .unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn test_property_filter_applies_to_both_sides() {
    let store = MockEventStore::new();
    store
        .add_events(&[
            EventRecord::new(1, "$pageview", "alice", day(0, 1)).with_properties(json!({"plan": "pro"})),
            EventRecord::new(1, "$pageview", "bob", day(0, 1)).with_properties(json!({"plan": "free"})),
        ])
        .await
        .unwrap();

    let mut q = query(RetentionMode::Recurring, "$pageview", "$pageview", 2);
    q.properties = Predicate::from_property_filters(&[crate::retention::PropertyFilter::exact("plan", "pro")]);

    let rows = store.cohort_counts(&q).await.unwrap();
    assert_eq!(count(&rows, 0, 0), 1);
}

#[tokio::test]
async fn test_duplicate_uuid_is_ignored() {
    let store = MockEventStore::new();
    let event = EventRecord::new(1, "$pageview", "alice", day(0, 1));
    store.add_events(&[event.clone()]).await.unwrap();
    store.add_events(&[event]).await.unwrap();
    assert_eq!(store.events.read().await.len(), 1);
}

#[tokio::test]
async fn test_event_store_fail_flag() {
    let store = MockEventStore::new();
    store.set_fail_on_query(true).await;
    let result = store
        .cohort_counts(&query(RetentionMode::Recurring, "a", "a", 1))
        .await;
    assert!(matches!(result, Err(StorageError::Unavailable(_))));
    assert_eq!(store.queries().await.len(), 1);
}

#[tokio::test]
async fn test_action_store_roundtrip_and_fail_flag() {
    let store = MockActionStore::new();
    let action = Action {
        id: 4,
        team_id: 1,
        name: "Signed up".into(),
        steps: vec![],
    };
    store.put_action(&action).await.unwrap();

    assert_eq!(store.get_action(1, 4).await.unwrap(), Some(action));
    assert_eq!(store.get_action(2, 4).await.unwrap(), None);

    store.set_fail_on_get(true).await;
    assert!(store.get_action(1, 4).await.is_err());
}

fn recording_event(session: &str, user: &str, at: DateTime<Utc>, kind: i64) -> RecordingEvent {
    RecordingEvent {
        team_id: 1,
        distinct_id: user.into(),
        session_id: session.into(),
        timestamp: at,
        snapshot_data: json!({"type": kind}),
    }
}

#[tokio::test]
async fn test_recordings_require_full_snapshot() {
    let store = MockRecordingStore::new();
    store
        .add_recording_events(&[
            recording_event("s1", "u1", t0(), 2),
            recording_event("s1", "u1", t0() + ChronoDuration::seconds(90), 3),
            recording_event("s2", "u1", t0() + ChronoDuration::seconds(10), 3),
        ])
        .await
        .unwrap();

    let candidates = store
        .recordings_in_range(1, t0(), t0() + ChronoDuration::hours(1), None)
        .await
        .unwrap();

    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].session_id, "s1");
    assert_eq!(candidates[0].duration(), ChronoDuration::seconds(90));
    assert_eq!(candidates[0].full_snapshots, 1);
}

#[tokio::test]
async fn test_recordings_duration_filter() {
    let store = MockRecordingStore::new();
    store
        .add_recording_events(&[
            recording_event("short", "u1", t0(), 2),
            recording_event("short", "u1", t0() + ChronoDuration::seconds(30), 3),
            recording_event("long", "u1", t0(), 2),
            recording_event("long", "u1", t0() + ChronoDuration::seconds(300), 3),
        ])
        .await
        .unwrap();

    let longer = DurationFilter {
        operator: DurationOperator::Gt,
        value_seconds: 60,
    };
    let ids: Vec<_> = store
        .recordings_in_range(1, t0(), t0() + ChronoDuration::hours(1), Some(&longer))
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.session_id)
        .collect();
    assert_eq!(ids, vec!["long"]);
}

#[tokio::test]
async fn test_snapshot_events_sorted_by_timestamp() {
    let store = MockRecordingStore::new();
    store
        .add_recording_events(&[
            recording_event("s1", "u1", t0() + ChronoDuration::seconds(5), 3),
            recording_event("s1", "u1", t0(), 2),
            recording_event("s2", "u1", t0(), 2),
        ])
        .await
        .unwrap();

    let events = store.snapshot_events(1, "s1").await.unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].timestamp, t0());
    assert!(store.snapshot_events(2, "s1").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_recording_store_records_windows() {
    let store = MockRecordingStore::new();
    store
        .recordings_in_range(1, t0(), day(1, 0), None)
        .await
        .unwrap();
    assert_eq!(store.range_queries().await, vec![(t0(), day(1, 0))]);
}
