//! Retention matrix service.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::bounded;
use crate::config::{QueryConfig, RetentionDefaults};
use crate::interfaces::{ActionStore, EventStore, TeamId};
use crate::retention::matrix::{build_matrix, fold_counts};
use crate::retention::{
    CohortConditionBuilder, PeriodResolver, Predicate, RetentionError, RetentionFilter,
    RetentionMatrix, RetentionQuery,
};

/// Builds retention matrices from the event store.
///
/// One invocation issues at most one action lookup per referenced action and
/// exactly one cohort aggregate. Any failure aborts the whole invocation.
pub struct RetentionService {
    events: Arc<dyn EventStore>,
    actions: Arc<dyn ActionStore>,
    defaults: RetentionDefaults,
    timeout: Option<Duration>,
}

impl RetentionService {
    /// Create a service with default intervals, period and timeout.
    pub fn new(events: Arc<dyn EventStore>, actions: Arc<dyn ActionStore>) -> Self {
        Self::with_config(
            events,
            actions,
            RetentionDefaults::default(),
            &QueryConfig::default(),
        )
    }

    pub fn with_config(
        events: Arc<dyn EventStore>,
        actions: Arc<dyn ActionStore>,
        defaults: RetentionDefaults,
        query: &QueryConfig,
    ) -> Self {
        Self {
            events,
            actions,
            defaults,
            timeout: query.timeout(),
        }
    }

    /// Compute the matrix for a request, relative to the current time.
    pub async fn calculate(
        &self,
        team_id: TeamId,
        filter: &RetentionFilter,
    ) -> Result<RetentionMatrix, RetentionError> {
        self.calculate_at(team_id, filter, Utc::now()).await
    }

    /// Compute the matrix for a request, with `now` standing in for the
    /// current time when the request has no dates.
    pub async fn calculate_at(
        &self,
        team_id: TeamId,
        filter: &RetentionFilter,
        now: DateTime<Utc>,
    ) -> Result<RetentionMatrix, RetentionError> {
        let query = self.build_query(team_id, filter, now).await?;
        let total_intervals = query.total_intervals();

        let rows = bounded(self.timeout, "cohort_counts", self.events.cohort_counts(&query))
            .await
            .map_err(RetentionError::Timeout)??;

        info!(
            team_id,
            period = %query.period,
            total_intervals,
            rows = rows.len(),
            "Retention computed"
        );

        let counts = fold_counts(rows);
        Ok(build_matrix(
            query.period,
            &counts,
            &query.buckets[..total_intervals],
        ))
    }

    /// Resolve a request into the aggregate the event store executes.
    pub async fn build_query(
        &self,
        team_id: TeamId,
        filter: &RetentionFilter,
        now: DateTime<Utc>,
    ) -> Result<RetentionQuery, RetentionError> {
        let period = filter.period.unwrap_or(self.defaults.period);
        let total_intervals = filter
            .total_intervals
            .unwrap_or(self.defaults.total_intervals);
        if total_intervals > self.defaults.max_intervals {
            return Err(RetentionError::TooManyIntervals {
                requested: total_intervals,
                max: self.defaults.max_intervals,
            });
        }
        let resolver = PeriodResolver::new(period, total_intervals)?;
        let range = resolver.resolve_range(filter.date_from, filter.date_to, now)?;

        let builder = CohortConditionBuilder::new(
            filter.retention_mode,
            filter.target_entity.clone(),
            filter.returning_entities.first().cloned(),
        );

        let mut actions = HashMap::new();
        for action_id in builder.action_ids() {
            let action = bounded(
                self.timeout,
                "get_action",
                self.actions.get_action(team_id, action_id),
            )
            .await
            .map_err(RetentionError::Timeout)??
            .ok_or(RetentionError::ActionNotFound(action_id))?;
            actions.insert(action_id, action);
        }

        let conditions = builder.build(&actions)?;
        let buckets = resolver.boundaries(range.date_from)?;

        debug!(
            team_id,
            date_from = %range.date_from,
            date_to = %range.date_to,
            "Retention range resolved"
        );

        Ok(RetentionQuery {
            team_id,
            period,
            mode: filter.retention_mode,
            buckets,
            target: conditions.target,
            returning: conditions.returning,
            properties: Predicate::from_property_filters(&filter.properties),
        })
    }
}
