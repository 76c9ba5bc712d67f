//! Database schema definitions using sea-query.
//!
//! These define the table and column identifiers for type-safe query building.

use sea_query::Iden;

/// Analytics events table schema.
#[derive(Iden)]
pub enum Events {
    Table,
    #[iden = "uuid"]
    Uuid,
    #[iden = "team_id"]
    TeamId,
    #[iden = "event"]
    Event,
    #[iden = "distinct_id"]
    DistinctId,
    #[iden = "properties"]
    Properties,
    #[iden = "timestamp"]
    Timestamp,
}

/// Actions table schema.
#[derive(Iden)]
pub enum Actions {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "team_id"]
    TeamId,
    #[iden = "name"]
    Name,
    #[iden = "deleted"]
    Deleted,
}

/// Action steps table schema.
#[derive(Iden)]
pub enum ActionSteps {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "action_id"]
    ActionId,
    #[iden = "event"]
    Event,
    #[iden = "url"]
    Url,
    #[iden = "url_matching"]
    UrlMatching,
    #[iden = "properties"]
    Properties,
}

/// Session recording events table schema.
#[derive(Iden)]
pub enum SessionRecordingEvents {
    Table,
    #[iden = "team_id"]
    TeamId,
    #[iden = "distinct_id"]
    DistinctId,
    #[iden = "session_id"]
    SessionId,
    #[iden = "timestamp"]
    Timestamp,
    #[iden = "snapshot_data"]
    SnapshotData,
}

/// Table creation statements, one statement per entry.
///
/// Portable between SQLite and PostgreSQL: timestamps and JSON are stored as
/// text (see [`super::helpers::TIMESTAMP_FORMAT`]).
pub const CREATE_TABLES: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS events (
    uuid TEXT PRIMARY KEY,
    team_id BIGINT NOT NULL,
    event TEXT NOT NULL,
    distinct_id TEXT NOT NULL,
    properties TEXT,
    timestamp TEXT NOT NULL
)"#,
    "CREATE INDEX IF NOT EXISTS idx_events_team_timestamp ON events(team_id, timestamp)",
    r#"CREATE TABLE IF NOT EXISTS actions (
    id BIGINT PRIMARY KEY,
    team_id BIGINT NOT NULL,
    name TEXT NOT NULL,
    deleted BOOLEAN NOT NULL DEFAULT FALSE
)"#,
    r#"CREATE TABLE IF NOT EXISTS action_steps (
    id BIGINT NOT NULL,
    action_id BIGINT NOT NULL,
    event TEXT,
    url TEXT,
    url_matching TEXT NOT NULL DEFAULT 'contains',
    properties TEXT,
    PRIMARY KEY (action_id, id)
)"#,
    r#"CREATE TABLE IF NOT EXISTS session_recording_events (
    team_id BIGINT NOT NULL,
    distinct_id TEXT NOT NULL,
    session_id TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    snapshot_data TEXT NOT NULL
)"#,
    "CREATE INDEX IF NOT EXISTS idx_recordings_team_session ON session_recording_events(team_id, session_id)",
    "CREATE INDEX IF NOT EXISTS idx_recordings_team_timestamp ON session_recording_events(team_id, timestamp)",
];
