//! Shared storage helper functions.
//!
//! Timestamp and JSON column conversion used by the SQL backends.

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::interfaces::{Result, StorageError};

/// Stored timestamp format. Fixed width, so text order is time order.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Render a timestamp for storage or comparison in SQL.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a stored timestamp.
///
/// Accepts the storage format and RFC 3339 for rows written by other tools.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT) {
        return Ok(naive.and_utc());
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| StorageError::InvalidTimestamp(raw.to_string()))
}

/// Decode a JSON text column, treating NULL as an empty object.
pub fn parse_json_column(column: &'static str, raw: Option<String>) -> Result<serde_json::Value> {
    match raw {
        None => Ok(serde_json::Value::Object(Default::default())),
        Some(text) => serde_json::from_str(&text).map_err(|e| StorageError::InvalidColumn {
            column,
            message: e.to_string(),
        }),
    }
}

/// JSON path selecting one top-level key, quoted so any key is addressable.
pub fn json_key_path(key: &str) -> String {
    format!("$.\"{}\"", key.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Escape character for `LIKE` patterns built by [`escape_like`].
pub const LIKE_ESCAPE: char = '!';

/// Escape `LIKE` wildcards (and the escape character itself) in `text`.
pub fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | LIKE_ESCAPE) {
            escaped.push(LIKE_ESCAPE);
        }
        escaped.push(c);
    }
    escaped
}
