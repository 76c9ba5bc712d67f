//! Event storage interface.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::TeamId;
use crate::retention::{CohortCount, RetentionQuery};

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Invalid stored value in {column}: {message}")]
    InvalidColumn { column: &'static str, message: String },

    #[cfg(any(feature = "sqlite", feature = "postgres"))]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// One stored analytics event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub uuid: Uuid,
    pub team_id: TeamId,
    pub event: String,
    pub distinct_id: String,
    #[serde(default)]
    pub properties: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl EventRecord {
    /// Create an event with no properties.
    pub fn new(
        team_id: TeamId,
        event: impl Into<String>,
        distinct_id: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            team_id,
            event: event.into(),
            distinct_id: distinct_id.into(),
            properties: serde_json::Value::Object(Default::default()),
            timestamp,
        }
    }

    /// Replace the event properties.
    pub fn with_properties(mut self, properties: serde_json::Value) -> Self {
        self.properties = properties;
        self
    }
}

/// Interface for the analytical event store.
///
/// Implementations:
/// - `SqlEventStore`: SQLite / PostgreSQL storage
/// - `MockEventStore`: in-memory evaluation for tests
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Store events. Existing events with the same uuid are left untouched.
    async fn add_events(&self, events: &[EventRecord]) -> Result<()>;

    /// Run the cohort aggregate described by `query`.
    ///
    /// Returns one row per `(first_bucket, seen_bucket)` pair with the number
    /// of distinct users in it. Pairs with no users are omitted.
    async fn cohort_counts(&self, query: &RetentionQuery) -> Result<Vec<CohortCount>>;
}
