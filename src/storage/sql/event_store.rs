//! Unified SQL EventStore implementation.
//!
//! Uses a macro to generate implementations for each SQL backend,
//! eliminating code duplication while maintaining type safety.

use std::marker::PhantomData;

use sea_query::{Alias, Expr, Func, JoinType, Order, Query, SelectStatement};

use super::predicate::{bucket_index, render};
use super::SqlDatabase;
use crate::retention::{RetentionMode, RetentionQuery};
use crate::storage::helpers::format_timestamp;
use crate::storage::schema::Events;

/// SQL-based implementation of EventStore.
///
/// This generic implementation works with any SQL database that implements
/// the `SqlDatabase` trait (PostgreSQL, SQLite).
pub struct SqlEventStore<DB: SqlDatabase> {
    pool: DB::Pool,
    _marker: PhantomData<DB>,
}

impl<DB: SqlDatabase> SqlEventStore<DB> {
    /// Create a new SQL event store with the given pool.
    pub fn new(pool: DB::Pool) -> Self {
        Self {
            pool,
            _marker: PhantomData,
        }
    }

    /// Get the underlying pool.
    pub fn pool(&self) -> &DB::Pool {
        &self.pool
    }
}

const COHORT: &str = "cohort";
const ACTIVITY: &str = "activity";
const FIRST_BUCKET: &str = "first_bucket";
const SEEN_BUCKET: &str = "seen_bucket";
const USERS: &str = "users";

/// Events of the team inside the query range, with the shared property filters.
fn scoped_events<DB: SqlDatabase>(query: &RetentionQuery) -> Option<SelectStatement> {
    let (start, end) = query.range()?;
    Some(
        Query::select()
            .from(Events::Table)
            .and_where(Expr::col(Events::TeamId).eq(query.team_id))
            .and_where(Expr::col(Events::Timestamp).gte(format_timestamp(start)))
            .and_where(Expr::col(Events::Timestamp).lt(format_timestamp(end)))
            .cond_where(render::<DB>(&query.properties, &query.buckets))
            .to_owned(),
    )
}

/// Build the cohort aggregate.
///
/// The cohort side yields `(distinct_id, first_bucket)`: the earliest target
/// bucket per user in first-time mode, every target bucket in recurring mode.
/// The activity side yields every `(distinct_id, seen_bucket)` matching the
/// returning condition. Joined per user and grouped by both buckets.
pub(crate) fn cohort_statement<DB: SqlDatabase>(query: &RetentionQuery) -> Option<SelectStatement> {
    let bucket = || bucket_index(Expr::col(Events::Timestamp).into(), &query.buckets);

    let mut cohort = scoped_events::<DB>(query)?;
    cohort
        .column(Events::DistinctId)
        .cond_where(render::<DB>(&query.target.predicate, &query.buckets));
    match query.mode {
        RetentionMode::FirstTime => {
            cohort
                .expr_as(Func::min(bucket()), Alias::new(FIRST_BUCKET))
                .group_by_col(Events::DistinctId);
        }
        RetentionMode::Recurring => {
            cohort.distinct().expr_as(bucket(), Alias::new(FIRST_BUCKET));
        }
    }

    let mut activity = scoped_events::<DB>(query)?;
    activity
        .distinct()
        .column(Events::DistinctId)
        .expr_as(bucket(), Alias::new(SEEN_BUCKET))
        .cond_where(render::<DB>(&query.returning.predicate, &query.buckets));

    let first = (Alias::new(COHORT), Alias::new(FIRST_BUCKET));
    let seen = (Alias::new(ACTIVITY), Alias::new(SEEN_BUCKET));

    Some(
        Query::select()
            .column(first.clone())
            .column(seen.clone())
            .expr_as(
                Expr::cust(format!(
                    "CAST(COUNT(DISTINCT \"{COHORT}\".\"distinct_id\") AS BIGINT)"
                )),
                Alias::new(USERS),
            )
            .from_subquery(cohort, Alias::new(COHORT))
            .join_subquery(
                JoinType::InnerJoin,
                activity,
                Alias::new(ACTIVITY),
                Expr::col((Alias::new(COHORT), Events::DistinctId))
                    .equals((Alias::new(ACTIVITY), Events::DistinctId)),
            )
            .and_where(Expr::col(seen.clone()).gte(Expr::col(first.clone())))
            .group_by_col(first.clone())
            .group_by_col(seen.clone())
            .order_by(first, Order::Asc)
            .order_by(seen, Order::Asc)
            .to_owned(),
    )
}

/// Macro to implement EventStore for a specific SQL backend.
macro_rules! impl_event_store {
    ($db_type:ty, $feature:literal) => {
        #[cfg(feature = $feature)]
        #[async_trait::async_trait]
        impl crate::interfaces::EventStore for SqlEventStore<$db_type> {
            async fn add_events(
                &self,
                events: &[crate::interfaces::EventRecord],
            ) -> crate::interfaces::Result<()> {
                use sea_query::{OnConflict, Query};

                use crate::storage::schema::Events;

                if events.is_empty() {
                    return Ok(());
                }

                let sql = {
                    let mut stmt = Query::insert();
                    stmt.into_table(Events::Table).columns([
                        Events::Uuid,
                        Events::TeamId,
                        Events::Event,
                        Events::DistinctId,
                        Events::Properties,
                        Events::Timestamp,
                    ]);
                    for event in events {
                        stmt.values_panic([
                            event.uuid.to_string().into(),
                            event.team_id.into(),
                            event.event.clone().into(),
                            event.distinct_id.clone().into(),
                            serde_json::to_string(&event.properties)?.into(),
                            format_timestamp(event.timestamp).into(),
                        ]);
                    }
                    stmt.on_conflict(OnConflict::column(Events::Uuid).do_nothing().to_owned());
                    <$db_type>::build_insert(stmt)
                };
                sqlx::query(&sql).execute(&self.pool).await?;

                Ok(())
            }

            async fn cohort_counts(
                &self,
                query: &RetentionQuery,
            ) -> crate::interfaces::Result<Vec<crate::retention::CohortCount>> {
                use sqlx::Row;

                use crate::interfaces::StorageError;
                use crate::retention::CohortCount;

                let Some(stmt) = cohort_statement::<$db_type>(query) else {
                    return Ok(Vec::new());
                };
                let sql = <$db_type>::build_select(stmt);
                let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

                let index = |column: &'static str, raw: i64| {
                    usize::try_from(raw).map_err(|e| StorageError::InvalidColumn {
                        column,
                        message: e.to_string(),
                    })
                };

                rows.iter()
                    .map(|row| -> crate::interfaces::Result<CohortCount> {
                        let users: i64 = row.try_get(USERS)?;
                        Ok(CohortCount {
                            first_bucket: index(FIRST_BUCKET, row.try_get(FIRST_BUCKET)?)?,
                            seen_bucket: index(SEEN_BUCKET, row.try_get(SEEN_BUCKET)?)?,
                            count: u64::try_from(users).map_err(|e| {
                                StorageError::InvalidColumn {
                                    column: USERS,
                                    message: e.to_string(),
                                }
                            })?,
                        })
                    })
                    .collect()
            }
        }
    };
}

// Generate implementations for each SQL backend
impl_event_store!(super::postgres::Postgres, "postgres");
impl_event_store!(super::sqlite::Sqlite, "sqlite");
