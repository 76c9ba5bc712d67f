//! Mock storage implementations for testing.
//!
//! The mock event store evaluates the cohort predicates in memory with the
//! same semantics as the SQL aggregate.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::interfaces::{
    ActionStore, EventRecord, EventStore, RecordingEvent, RecordingStore, Result, StorageError,
    TeamId,
};
use crate::replay::{is_full_snapshot, DurationFilter, RecordingCandidate};
use crate::retention::{Action, CohortCount, RetentionMode, RetentionQuery};

/// Sleep for the injected latency, if any.
async fn simulate_latency(latency: &RwLock<Option<Duration>>) {
    if let Some(delay) = *latency.read().await {
        tokio::time::sleep(delay).await;
    }
}

/// Mock event store that keeps events in memory.
#[derive(Default)]
pub struct MockEventStore {
    events: RwLock<Vec<EventRecord>>,
    fail_on_query: RwLock<bool>,
    latency: RwLock<Option<Duration>>,
    queries: RwLock<Vec<RetentionQuery>>,
}

impl MockEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_query(&self, fail: bool) {
        *self.fail_on_query.write().await = fail;
    }

    /// Delay every query by `latency`.
    pub async fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.write().await = latency;
    }

    /// Queries received so far.
    pub async fn queries(&self) -> Vec<RetentionQuery> {
        self.queries.read().await.clone()
    }
}

/// Evaluate a cohort query over in-memory events.
pub fn evaluate_cohorts(events: &[EventRecord], query: &RetentionQuery) -> Vec<CohortCount> {
    let mut cohort: HashMap<&str, BTreeSet<usize>> = HashMap::new();
    let mut activity: HashMap<&str, BTreeSet<usize>> = HashMap::new();

    for event in events.iter().filter(|e| e.team_id == query.team_id) {
        let Some(bucket) = query.bucket_of(event.timestamp) else {
            continue;
        };
        if !query.properties.matches(event, &query.buckets) {
            continue;
        }
        if query.target.predicate.matches(event, &query.buckets) {
            cohort.entry(event.distinct_id.as_str()).or_default().insert(bucket);
        }
        if query.returning.predicate.matches(event, &query.buckets) {
            activity.entry(event.distinct_id.as_str()).or_default().insert(bucket);
        }
    }

    let mut counts: BTreeMap<(usize, usize), u64> = BTreeMap::new();
    for (user, first_buckets) in &cohort {
        let Some(seen_buckets) = activity.get(user) else {
            continue;
        };
        let first_buckets: Vec<usize> = match query.mode {
            RetentionMode::FirstTime => first_buckets.first().copied().into_iter().collect(),
            RetentionMode::Recurring => first_buckets.iter().copied().collect(),
        };
        for first in first_buckets {
            for seen in seen_buckets.range(first..) {
                *counts.entry((first, *seen)).or_default() += 1;
            }
        }
    }

    counts
        .into_iter()
        .map(|((first_bucket, seen_bucket), count)| CohortCount {
            first_bucket,
            seen_bucket,
            count,
        })
        .collect()
}

#[async_trait]
impl EventStore for MockEventStore {
    async fn add_events(&self, events: &[EventRecord]) -> Result<()> {
        let mut store = self.events.write().await;
        for event in events {
            if !store.iter().any(|e| e.uuid == event.uuid) {
                store.push(event.clone());
            }
        }
        Ok(())
    }

    async fn cohort_counts(&self, query: &RetentionQuery) -> Result<Vec<CohortCount>> {
        self.queries.write().await.push(query.clone());
        simulate_latency(&self.latency).await;
        if *self.fail_on_query.read().await {
            return Err(StorageError::Unavailable("mock event store".to_string()));
        }
        let events = self.events.read().await;
        Ok(evaluate_cohorts(&events, query))
    }
}

/// Mock action store keyed by `(team_id, action_id)`.
#[derive(Default)]
pub struct MockActionStore {
    actions: RwLock<HashMap<(TeamId, i64), Action>>,
    fail_on_get: RwLock<bool>,
}

impl MockActionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_get(&self, fail: bool) {
        *self.fail_on_get.write().await = fail;
    }
}

#[async_trait]
impl ActionStore for MockActionStore {
    async fn put_action(&self, action: &Action) -> Result<()> {
        let mut actions = self.actions.write().await;
        actions.retain(|(_, id), _| *id != action.id);
        actions.insert((action.team_id, action.id), action.clone());
        Ok(())
    }

    async fn get_action(&self, team_id: TeamId, action_id: i64) -> Result<Option<Action>> {
        if *self.fail_on_get.read().await {
            return Err(StorageError::Unavailable("mock action store".to_string()));
        }
        Ok(self.actions.read().await.get(&(team_id, action_id)).cloned())
    }
}

/// Mock recording store that keeps recording events in memory.
#[derive(Default)]
pub struct MockRecordingStore {
    events: RwLock<Vec<RecordingEvent>>,
    fail_on_query: RwLock<bool>,
    latency: RwLock<Option<Duration>>,
    range_queries: RwLock<Vec<(DateTime<Utc>, DateTime<Utc>)>>,
}

impl MockRecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_query(&self, fail: bool) {
        *self.fail_on_query.write().await = fail;
    }

    pub async fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.write().await = latency;
    }

    /// Windows passed to `recordings_in_range` so far.
    pub async fn range_queries(&self) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
        self.range_queries.read().await.clone()
    }

    async fn check(&self) -> Result<()> {
        simulate_latency(&self.latency).await;
        if *self.fail_on_query.read().await {
            return Err(StorageError::Unavailable("mock recording store".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordingStore for MockRecordingStore {
    async fn add_recording_events(&self, events: &[RecordingEvent]) -> Result<()> {
        self.events.write().await.extend_from_slice(events);
        Ok(())
    }

    async fn recordings_in_range(
        &self,
        team_id: TeamId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        duration: Option<&DurationFilter>,
    ) -> Result<Vec<RecordingCandidate>> {
        self.range_queries.write().await.push((start, end));
        self.check().await?;

        let events = self.events.read().await;
        let mut groups: HashMap<(&str, &str), RecordingCandidate> = HashMap::new();
        for event in events
            .iter()
            .filter(|e| e.team_id == team_id && e.timestamp >= start && e.timestamp <= end)
        {
            let full = u64::from(is_full_snapshot(&event.snapshot_data));
            groups
                .entry((event.distinct_id.as_str(), event.session_id.as_str()))
                .and_modify(|c| {
                    c.start_time = c.start_time.min(event.timestamp);
                    c.end_time = c.end_time.max(event.timestamp);
                    c.full_snapshots += full;
                })
                .or_insert_with(|| RecordingCandidate {
                    session_id: event.session_id.clone(),
                    distinct_id: event.distinct_id.clone(),
                    start_time: event.timestamp,
                    end_time: event.timestamp,
                    full_snapshots: full,
                });
        }

        let mut candidates: Vec<RecordingCandidate> = groups
            .into_values()
            .filter(RecordingCandidate::has_full_keyframe)
            .filter(|c| duration.map_or(true, |f| f.matches(c.duration())))
            .collect();
        candidates.sort_by(|a, b| {
            a.start_time
                .cmp(&b.start_time)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        Ok(candidates)
    }

    async fn snapshot_events(&self, team_id: TeamId, session_id: &str) -> Result<Vec<RecordingEvent>> {
        self.check().await?;
        let mut events: Vec<RecordingEvent> = self
            .events
            .read()
            .await
            .iter()
            .filter(|e| e.team_id == team_id && e.session_id == session_id)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.timestamp);
        Ok(events)
    }
}

#[cfg(test)]
mod tests;
