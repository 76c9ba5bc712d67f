//! Correlating abstract sessions with stored recordings.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use super::{AnnotatedSession, CorrelatedRecording, RecordingCandidate, RecordingFilter, SessionSpan};

/// Window covering every session: earliest start to latest end.
pub fn query_window(sessions: &[SessionSpan]) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let start = sessions.iter().map(|s| s.start_time).min()?;
    let end = sessions.iter().map(|s| s.end_time).max()?;
    Some((start, end))
}

/// Closed-interval overlap on the same user.
pub fn overlaps(session: &SessionSpan, recording: &RecordingCandidate) -> bool {
    session.distinct_id == recording.distinct_id
        && session.start_time <= recording.end_time
        && session.end_time >= recording.start_time
}

pub fn matches(
    session: &SessionSpan,
    recording: &RecordingCandidate,
    filter: &RecordingFilter,
    viewed: &HashSet<String>,
) -> bool {
    recording.has_full_keyframe()
        && overlaps(session, recording)
        && !(filter.unseen_only && viewed.contains(&recording.session_id))
}

/// Recordings matching one session, in candidate order, without duplicates.
pub fn collect_matching(
    session: &SessionSpan,
    recordings: &[RecordingCandidate],
    filter: &RecordingFilter,
    viewed: &HashSet<String>,
) -> Vec<CorrelatedRecording> {
    let mut seen = HashSet::new();
    recordings
        .iter()
        .filter(|r| matches(session, r, filter, viewed))
        .filter(|r| seen.insert(r.session_id.as_str()))
        .map(|r| CorrelatedRecording {
            id: r.session_id.clone(),
            viewed: viewed.contains(&r.session_id),
        })
        .collect()
}

/// Annotate each session with its recordings.
///
/// Returns new values; the input sessions are not modified. With
/// `require_match` set, sessions without recordings are dropped.
pub fn correlate(
    sessions: &[SessionSpan],
    recordings: &[RecordingCandidate],
    filter: &RecordingFilter,
    viewed: &HashSet<String>,
) -> Vec<AnnotatedSession> {
    sessions
        .iter()
        .map(|session| AnnotatedSession {
            session: session.clone(),
            session_recordings: collect_matching(session, recordings, filter, viewed),
        })
        .filter(|annotated| !filter.require_match || !annotated.session_recordings.is_empty())
        .collect()
}
