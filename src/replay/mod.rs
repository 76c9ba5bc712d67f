//! Session replay: snapshot reassembly and session correlation.

pub mod chunks;
pub mod correlate;

use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::interfaces::StorageError;

pub use chunks::{ChunkFailure, ChunkFailureKind, ChunkReassembler, Reassembly, SnapshotChunk};
pub use correlate::{correlate, query_window};

/// `snapshot_data.type` of a full (keyframe) snapshot.
pub const FULL_SNAPSHOT_TYPE: i64 = 2;

/// Errors that abort a replay invocation.
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Query timed out after {0:?}")]
    Timeout(StdDuration),
}

/// Whether a snapshot payload is a full keyframe.
pub fn is_full_snapshot(snapshot_data: &Value) -> bool {
    match snapshot_data.get("type") {
        Some(Value::Number(n)) => n.as_i64() == Some(FULL_SNAPSHOT_TYPE),
        Some(Value::String(s)) => s == "2",
        _ => false,
    }
}

/// Abstract session window supplied by the caller.
///
/// Fields other than the three used for correlation are carried through
/// untouched in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSpan {
    pub distinct_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl SessionSpan {
    pub fn new(distinct_id: impl Into<String>, start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> Self {
        Self {
            distinct_id: distinct_id.into(),
            start_time,
            end_time,
            extra: serde_json::Map::new(),
        }
    }
}

/// Aggregate of the events of one recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingCandidate {
    pub session_id: String,
    pub distinct_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub full_snapshots: u64,
}

impl RecordingCandidate {
    pub fn duration(&self) -> Duration {
        self.end_time - self.start_time
    }

    pub fn has_full_keyframe(&self) -> bool {
        self.full_snapshots > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurationOperator {
    Gt,
    Lt,
}

/// Recording duration predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurationFilter {
    pub operator: DurationOperator,
    pub value_seconds: i64,
}

impl DurationFilter {
    pub fn matches(&self, duration: Duration) -> bool {
        let threshold = Duration::seconds(self.value_seconds);
        match self.operator {
            DurationOperator::Gt => duration > threshold,
            DurationOperator::Lt => duration < threshold,
        }
    }
}

/// Filters applied when correlating sessions with recordings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingFilter {
    pub duration_filter: Option<DurationFilter>,
    /// Exclude recordings in the viewed set.
    pub unseen_only: bool,
    /// Drop sessions with no matching recording.
    pub require_match: bool,
}

/// A recording attached to a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelatedRecording {
    pub id: String,
    pub viewed: bool,
}

/// A session with its correlated recordings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedSession {
    #[serde(flatten)]
    pub session: SessionSpan,
    pub session_recordings: Vec<CorrelatedRecording>,
}

/// A reconstructed recording.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionRecording {
    pub session_id: String,
    /// `None` when no events exist for the session.
    pub distinct_id: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub snapshots: Vec<Value>,
    pub failures: Vec<ChunkFailure>,
}
