//! Retention cohort matrices.
//!
//! A retention request is resolved into bucket boundaries
//! ([`PeriodResolver`]), a target / returning condition pair
//! ([`CohortConditionBuilder`]) and a single aggregate [`RetentionQuery`].
//! The store answers with sparse [`CohortCount`] rows which
//! [`matrix::build_matrix`] materialises into a triangular
//! [`RetentionMatrix`].

mod action;
mod condition;
pub mod matrix;
mod period;
mod property;

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::interfaces::{StorageError, TeamId};

pub use action::{Action, ActionStep, UrlMatching, CURRENT_URL_PROPERTY};
pub use condition::{
    CohortCondition, CohortConditionBuilder, CohortConditions, EntityRef, Leaf, ParamNamespace,
    Predicate, RetentionMode, PAGEVIEW_EVENT,
};
pub use period::{DateRange, Period, PeriodResolver, Span, Truncation};
pub use property::{value_text, PropertyFilter, PropertyOperator};

/// Errors that can occur while computing retention.
#[derive(Debug, thiserror::Error)]
pub enum RetentionError {
    #[error("Period {0} is unsupported")]
    UnsupportedPeriod(String),

    #[error("total_intervals out of range: {0}")]
    InvalidIntervals(usize),

    #[error("total_intervals {requested} exceeds the limit of {max}")]
    TooManyIntervals { requested: usize, max: usize },

    #[error("Date range is out of bounds")]
    InvalidDateRange,

    #[error("Action not found: {0}")]
    ActionNotFound(i64),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Query timed out after {0:?}")]
    Timeout(Duration),
}

/// Retention request parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionFilter {
    pub period: Option<Period>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub target_entity: Option<EntityRef>,
    /// Only the first entry is used, as the returning entity in first-time mode.
    pub returning_entities: Vec<EntityRef>,
    pub retention_mode: RetentionMode,
    pub properties: Vec<PropertyFilter>,
    pub total_intervals: Option<usize>,
}

/// A fully resolved cohort aggregate, ready for a store to execute.
#[derive(Debug, Clone, PartialEq)]
pub struct RetentionQuery {
    pub team_id: TeamId,
    pub period: Period,
    pub mode: RetentionMode,
    /// Bucket boundaries; `total_intervals + 1` entries.
    pub buckets: Vec<DateTime<Utc>>,
    pub target: CohortCondition,
    pub returning: CohortCondition,
    /// Applied to both the target and the returning side.
    pub properties: Predicate,
}

impl RetentionQuery {
    pub fn total_intervals(&self) -> usize {
        self.buckets.len().saturating_sub(1)
    }

    /// Half-open `[start, end)` range of the whole query.
    pub fn range(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        Some((*self.buckets.first()?, *self.buckets.last()?))
    }

    /// Bucket index of `ts`, if it falls inside the range.
    pub fn bucket_of(&self, ts: DateTime<Utc>) -> Option<usize> {
        let (start, end) = self.range()?;
        if ts < start || ts >= end {
            return None;
        }
        Some(self.buckets.partition_point(|b| *b <= ts) - 1)
    }

    /// Every bound parameter, keyed by namespaced name.
    pub fn params(&self) -> BTreeMap<String, serde_json::Value> {
        let mut params = self.target.predicate.params();
        params.extend(self.returning.predicate.params());
        params.extend(self.properties.params());
        params
    }
}

/// One aggregate row: distinct users first seen in `first_bucket` and
/// active again in `seen_bucket`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CohortCount {
    pub first_bucket: usize,
    pub seen_bucket: usize,
    pub count: u64,
}

/// One matrix entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CohortCell {
    #[serde(skip)]
    pub start_bucket: usize,
    #[serde(skip)]
    pub seen_bucket: usize,
    pub count: u64,
    /// Member lookup is done by callers; always empty here.
    pub members: Vec<String>,
}

/// One cohort row of the matrix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetentionRow {
    pub label: String,
    pub anchor_date: DateTime<Utc>,
    pub values: Vec<CohortCell>,
}

/// Triangular retention matrix: row `i` holds `total_intervals - i` cells.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RetentionMatrix {
    pub rows: Vec<RetentionRow>,
}

impl RetentionMatrix {
    pub fn total_intervals(&self) -> usize {
        self.rows.len()
    }

    /// Count at `(start_bucket, seen_bucket)`, if that cell exists.
    pub fn count(&self, start_bucket: usize, seen_bucket: usize) -> Option<u64> {
        let row = self.rows.get(start_bucket)?;
        let offset = seen_bucket.checked_sub(start_bucket)?;
        row.values.get(offset).map(|cell| cell.count)
    }
}
