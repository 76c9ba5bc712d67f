//! Session recording storage interface.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Result, TeamId};
use crate::replay::{DurationFilter, RecordingCandidate};

/// One stored session recording event (a snapshot or a snapshot chunk).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingEvent {
    pub team_id: TeamId,
    pub distinct_id: String,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub snapshot_data: serde_json::Value,
}

/// Interface for session recording persistence.
#[async_trait]
pub trait RecordingStore: Send + Sync {
    /// Append recording events.
    async fn add_recording_events(&self, events: &[RecordingEvent]) -> Result<()>;

    /// Aggregate recording events in `[start, end]` per `(distinct_id, session_id)`.
    ///
    /// Only recordings with at least one full snapshot are returned. When a
    /// duration filter is given it is applied to `end_time - start_time`.
    async fn recordings_in_range(
        &self,
        team_id: TeamId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        duration: Option<&DurationFilter>,
    ) -> Result<Vec<RecordingCandidate>>;

    /// Load every event of one recording, ordered by timestamp.
    async fn snapshot_events(&self, team_id: TeamId, session_id: &str)
        -> Result<Vec<RecordingEvent>>;
}
