//! EventStore interface tests.
//!
//! These tests verify the contract of the EventStore trait.
//! Each storage implementation should run these tests.

use std::collections::HashMap;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::json;

use periscope::interfaces::{EventRecord, EventStore, TeamId};
use periscope::retention::{
    Action, ActionStep, CohortConditionBuilder, CohortCount, EntityRef, Period, PeriodResolver,
    Predicate, PropertyFilter, PropertyOperator, RetentionMode, RetentionQuery, UrlMatching,
};

/// Midnight of day `n` plus `hour` hours, counted from 2024-01-01.
pub fn day(n: i64, hour: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(n) + Duration::hours(hour)
}

/// Daily query over `days` buckets starting at day 0.
pub fn make_query(
    team_id: TeamId,
    mode: RetentionMode,
    target: EntityRef,
    returning: EntityRef,
    days: i64,
    actions: &HashMap<i64, Action>,
) -> RetentionQuery {
    let conditions = CohortConditionBuilder::new(mode, Some(target), Some(returning))
        .build(actions)
        .expect("conditions should build");
    RetentionQuery {
        team_id,
        period: Period::Day,
        mode,
        buckets: (0..=days).map(|i| day(i, 0)).collect(),
        target: conditions.target,
        returning: conditions.returning,
        properties: Predicate::always(),
    }
}

fn event(name: &str) -> EntityRef {
    EntityRef::Event(name.to_string())
}

/// Count at `(first, seen)`, zero when the row is absent.
pub fn count(rows: &[CohortCount], first: usize, seen: usize) -> u64 {
    rows.iter()
        .find(|r| r.first_bucket == first && r.seen_bucket == seen)
        .map(|r| r.count)
        .unwrap_or(0)
}

// =============================================================================
// EventStore::cohort_counts tests
// =============================================================================

pub async fn test_recurring_cohorts<S: EventStore>(store: &S) {
    let team = 101;
    store
        .add_events(&[
            EventRecord::new(team, "$pageview", "alice", day(0, 1)),
            EventRecord::new(team, "$pageview", "alice", day(0, 5)),
            EventRecord::new(team, "$pageview", "alice", day(2, 1)),
            EventRecord::new(team, "$pageview", "bob", day(1, 1)),
            EventRecord::new(team, "$pageview", "bob", day(2, 1)),
            EventRecord::new(team, "$autocapture", "carol", day(0, 1)),
        ])
        .await
        .expect("add should succeed");

    let query = make_query(
        team,
        RetentionMode::Recurring,
        event("$pageview"),
        event("$pageview"),
        3,
        &HashMap::new(),
    );
    let rows = store.cohort_counts(&query).await.expect("query should succeed");

    assert_eq!(count(&rows, 0, 0), 1, "alice on day 0");
    assert_eq!(count(&rows, 0, 1), 0);
    assert_eq!(count(&rows, 0, 2), 1);
    assert_eq!(count(&rows, 1, 1), 1, "bob on day 1");
    assert_eq!(count(&rows, 1, 2), 1);
    assert_eq!(count(&rows, 2, 2), 2, "both active on day 2");
    assert!(rows.iter().all(|r| r.seen_bucket >= r.first_bucket));
}

pub async fn test_first_time_cohorts<S: EventStore>(store: &S) {
    let team = 102;
    store
        .add_events(&[
            EventRecord::new(team, "signup", "alice", day(0, 1)),
            EventRecord::new(team, "signup", "alice", day(1, 1)),
            EventRecord::new(team, "purchase", "alice", day(2, 1)),
            EventRecord::new(team, "signup", "bob", day(1, 3)),
            EventRecord::new(team, "purchase", "bob", day(1, 4)),
        ])
        .await
        .expect("add should succeed");

    let query = make_query(
        team,
        RetentionMode::FirstTime,
        event("signup"),
        event("purchase"),
        3,
        &HashMap::new(),
    );
    let rows = store.cohort_counts(&query).await.expect("query should succeed");

    assert_eq!(count(&rows, 0, 0), 1, "day-zero target counts as a return");
    assert_eq!(count(&rows, 0, 2), 1);
    assert_eq!(count(&rows, 1, 1), 1);
    assert_eq!(count(&rows, 1, 2), 0, "alice only belongs to her first cohort");
}

pub async fn test_range_is_half_open<S: EventStore>(store: &S) {
    let team = 103;
    store
        .add_events(&[
            EventRecord::new(team, "$pageview", "early", day(-1, 0)),
            EventRecord::new(team, "$pageview", "alice", day(0, 0)),
            EventRecord::new(team, "$pageview", "bob", day(1, 0)),
            EventRecord::new(team, "$pageview", "late", day(3, 0)),
        ])
        .await
        .expect("add should succeed");

    let query = make_query(
        team,
        RetentionMode::Recurring,
        event("$pageview"),
        event("$pageview"),
        3,
        &HashMap::new(),
    );
    let rows = store.cohort_counts(&query).await.expect("query should succeed");

    assert_eq!(rows.len(), 2, "rows: {rows:?}");
    assert_eq!(count(&rows, 0, 0), 1);
    assert_eq!(count(&rows, 1, 1), 1, "boundary timestamp opens the next bucket");
}

pub async fn test_team_isolation<S: EventStore>(store: &S) {
    store
        .add_events(&[
            EventRecord::new(104, "$pageview", "alice", day(0, 1)),
            EventRecord::new(105, "$pageview", "bob", day(0, 1)),
            EventRecord::new(105, "$pageview", "carol", day(0, 1)),
        ])
        .await
        .expect("add should succeed");

    let query = make_query(
        104,
        RetentionMode::Recurring,
        event("$pageview"),
        event("$pageview"),
        1,
        &HashMap::new(),
    );
    let rows = store.cohort_counts(&query).await.expect("query should succeed");
    assert_eq!(count(&rows, 0, 0), 1);
}

pub async fn test_property_filters<S: EventStore>(store: &S) {
    let team = 106;
    store
        .add_events(&[
            EventRecord::new(team, "$pageview", "u1", day(0, 1)).with_properties(json!({
                "plan": "pro",
                "beta": true,
                "$current_url": "https://example.com/Pricing"
            })),
            EventRecord::new(team, "$pageview", "u2", day(0, 1))
                .with_properties(json!({"plan": "free"})),
            EventRecord::new(team, "$pageview", "u3", day(0, 1)),
        ])
        .await
        .expect("add should succeed");

    let cases = [
        (PropertyFilter::exact("plan", "pro"), 1),
        (PropertyFilter::exact("plan", json!(["pro", "free"])), 2),
        (
            PropertyFilter::exact("plan", "pro").with_operator(PropertyOperator::IsNot),
            2,
        ),
        (
            PropertyFilter::exact("$current_url", "PRICING")
                .with_operator(PropertyOperator::Icontains),
            1,
        ),
        (
            PropertyFilter::exact("plan", json!(null)).with_operator(PropertyOperator::IsSet),
            2,
        ),
        (
            PropertyFilter::exact("plan", json!(null)).with_operator(PropertyOperator::IsNotSet),
            1,
        ),
        (PropertyFilter::exact("beta", true), 1),
    ];

    for (filter, expected) in cases {
        let mut query = make_query(
            team,
            RetentionMode::Recurring,
            event("$pageview"),
            event("$pageview"),
            1,
            &HashMap::new(),
        );
        query.properties = Predicate::from_property_filters(std::slice::from_ref(&filter));
        let rows = store.cohort_counts(&query).await.expect("query should succeed");
        assert_eq!(count(&rows, 0, 0), expected, "filter: {filter:?}");
    }
}

pub async fn test_action_target<S: EventStore>(store: &S) {
    let team = 107;
    let action = Action {
        id: 7001,
        team_id: team,
        name: "Activated".to_string(),
        steps: vec![
            ActionStep::event("signup"),
            ActionStep::event("$pageview").with_url("/welcome", UrlMatching::Contains),
        ],
    };
    store
        .add_events(&[
            EventRecord::new(team, "signup", "u1", day(0, 1)),
            EventRecord::new(team, "$pageview", "u2", day(0, 1))
                .with_properties(json!({"$current_url": "https://example.com/welcome?ref=1"})),
            EventRecord::new(team, "$pageview", "u3", day(0, 1))
                .with_properties(json!({"$current_url": "https://example.com/home"})),
        ])
        .await
        .expect("add should succeed");

    let actions = HashMap::from([(action.id, action)]);
    let query = make_query(
        team,
        RetentionMode::Recurring,
        EntityRef::Action(7001),
        EntityRef::Action(7001),
        1,
        &actions,
    );
    let rows = store.cohort_counts(&query).await.expect("query should succeed");
    assert_eq!(count(&rows, 0, 0), 2);
}

pub async fn test_calendar_month_buckets<S: EventStore>(store: &S) {
    let team = 109;
    let at = |m: u32, d: u32, h: u32| Utc.with_ymd_and_hms(2024, m, d, h, 0, 0).unwrap();
    store
        .add_events(&[
            EventRecord::new(team, "$pageview", "alice", at(2, 10, 0)),
            EventRecord::new(team, "$pageview", "alice", at(2, 20, 0)),
            EventRecord::new(team, "$pageview", "bob", at(1, 31, 23)),
            EventRecord::new(team, "$pageview", "bob", at(2, 1, 0)),
        ])
        .await
        .expect("add should succeed");

    let resolver = PeriodResolver::new(Period::Month, 3).expect("resolver should build");
    let range = resolver
        .resolve_range(None, Some(at(3, 15, 8)), at(6, 1, 0))
        .expect("range should resolve");
    let mut query = make_query(
        team,
        RetentionMode::Recurring,
        event("$pageview"),
        event("$pageview"),
        3,
        &HashMap::new(),
    );
    query.period = Period::Month;
    query.buckets = resolver
        .boundaries(range.date_from)
        .expect("boundaries should resolve");

    let rows = store.cohort_counts(&query).await.expect("query should succeed");

    // Both February visits share one bucket.
    assert_eq!(count(&rows, 2, 2), 2);
    assert_eq!(count(&rows, 1, 1), 1);
    assert_eq!(count(&rows, 1, 2), 1);
    assert_eq!(count(&rows, 0, 0), 0);
}

pub async fn test_duplicate_uuid_is_ignored<S: EventStore>(store: &S) {
    let team = 108;
    let record = EventRecord::new(team, "$pageview", "alice", day(0, 1));

    store.add_events(&[record.clone()]).await.expect("first add should succeed");
    store.add_events(&[record]).await.expect("duplicate add should succeed");
    store.add_events(&[]).await.expect("empty add should succeed");

    let query = make_query(
        team,
        RetentionMode::Recurring,
        event("$pageview"),
        event("$pageview"),
        1,
        &HashMap::new(),
    );
    let rows = store.cohort_counts(&query).await.expect("query should succeed");
    assert_eq!(count(&rows, 0, 0), 1);
}

// =============================================================================
// Test runner macro
// =============================================================================

/// Run all EventStore interface tests against a store implementation.
#[macro_export]
macro_rules! run_event_store_tests {
    ($store:expr) => {
        use $crate::storage::event_store_tests::*;

        test_recurring_cohorts($store).await;
        println!("  test_recurring_cohorts: PASSED");

        test_first_time_cohorts($store).await;
        println!("  test_first_time_cohorts: PASSED");

        test_range_is_half_open($store).await;
        println!("  test_range_is_half_open: PASSED");

        test_team_isolation($store).await;
        println!("  test_team_isolation: PASSED");

        test_property_filters($store).await;
        println!("  test_property_filters: PASSED");

        test_action_target($store).await;
        println!("  test_action_target: PASSED");

        test_calendar_month_buckets($store).await;
        println!("  test_calendar_month_buckets: PASSED");

        test_duplicate_uuid_is_ignored($store).await;
        println!("  test_duplicate_uuid_is_ignored: PASSED");
    };
}
