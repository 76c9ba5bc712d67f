//! Session recording service: recording load and session correlation.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use super::bounded;
use crate::config::QueryConfig;
use crate::interfaces::{RecordingStore, TeamId};
use crate::replay::{
    correlate, query_window, AnnotatedSession, ChunkReassembler, RecordingFilter, ReplayError,
    SessionRecording, SessionSpan,
};

pub struct SessionRecordingService {
    recordings: Arc<dyn RecordingStore>,
    timeout: Option<Duration>,
}

impl SessionRecordingService {
    pub fn new(recordings: Arc<dyn RecordingStore>) -> Self {
        Self::with_config(recordings, &QueryConfig::default())
    }

    pub fn with_config(recordings: Arc<dyn RecordingStore>, query: &QueryConfig) -> Self {
        Self {
            recordings,
            timeout: query.timeout(),
        }
    }

    /// Load one recording and reassemble its chunked snapshots.
    ///
    /// An unknown session yields an empty recording rather than an error.
    pub async fn load_recording(
        &self,
        team_id: TeamId,
        session_id: &str,
    ) -> Result<SessionRecording, ReplayError> {
        let events = bounded(
            self.timeout,
            "snapshot_events",
            self.recordings.snapshot_events(team_id, session_id),
        )
        .await
        .map_err(ReplayError::Timeout)??;

        let distinct_id = events.first().map(|e| e.distinct_id.clone());
        let start_time = events.first().map(|e| e.timestamp);
        let reassembly = ChunkReassembler::reassemble(events.into_iter().map(|e| e.snapshot_data));

        info!(
            team_id,
            session_id,
            snapshots = reassembly.snapshots.len(),
            failures = reassembly.failures.len(),
            "Recording loaded"
        );

        Ok(SessionRecording {
            session_id: session_id.to_string(),
            distinct_id,
            start_time,
            snapshots: reassembly.snapshots,
            failures: reassembly.failures,
        })
    }

    /// Annotate sessions with the recordings that overlap them.
    ///
    /// Issues a single range query spanning every session; an empty batch
    /// issues none.
    pub async fn filter_sessions_by_recordings(
        &self,
        team_id: TeamId,
        sessions: &[SessionSpan],
        filter: &RecordingFilter,
        viewed: &HashSet<String>,
    ) -> Result<Vec<AnnotatedSession>, ReplayError> {
        let Some((start, end)) = query_window(sessions) else {
            return Ok(Vec::new());
        };

        let candidates = bounded(
            self.timeout,
            "recordings_in_range",
            self.recordings
                .recordings_in_range(team_id, start, end, filter.duration_filter.as_ref()),
        )
        .await
        .map_err(ReplayError::Timeout)??;

        let annotated = correlate(sessions, &candidates, filter, viewed);

        info!(
            team_id,
            sessions = sessions.len(),
            candidates = candidates.len(),
            matched = annotated
                .iter()
                .filter(|s| !s.session_recordings.is_empty())
                .count(),
            "Sessions correlated"
        );

        Ok(annotated)
    }
}
