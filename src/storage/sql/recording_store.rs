//! Unified SQL RecordingStore implementation.

use std::marker::PhantomData;

use chrono::{DateTime, Utc};
use sea_query::{Alias, Expr, Func, Order, Query, SelectStatement, SimpleExpr};

use super::SqlDatabase;
use crate::interfaces::TeamId;
use crate::replay::{DurationFilter, DurationOperator, FULL_SNAPSHOT_TYPE};
use crate::storage::helpers::format_timestamp;
use crate::storage::schema::SessionRecordingEvents;

/// SQL-based implementation of RecordingStore.
pub struct SqlRecordingStore<DB: SqlDatabase> {
    pool: DB::Pool,
    _marker: PhantomData<DB>,
}

impl<DB: SqlDatabase> SqlRecordingStore<DB> {
    /// Create a new SQL recording store with the given pool.
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

/// Per-recording aggregate over `[start, end]`.
///
/// Keeps only recordings with at least one full snapshot, then applies the
/// duration filter to `MAX(timestamp) - MIN(timestamp)`.
pub(crate) fn candidates_statement<DB: SqlDatabase>(
    team_id: TeamId,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    duration: Option<&DurationFilter>,
) -> SelectStatement {
    let timestamp = || Expr::col(SessionRecordingEvents::Timestamp);
    let full_snapshots: SimpleExpr = Func::cast_as(
        Func::sum(
            Expr::case(
                Expr::expr(DB::json_text(
                    Expr::col(SessionRecordingEvents::SnapshotData).into(),
                    "type",
                ))
                .eq(FULL_SNAPSHOT_TYPE.to_string()),
                Expr::val(1i64),
            )
            .finally(Expr::val(0i64)),
        ),
        Alias::new("BIGINT"),
    )
    .into();

    let mut stmt = Query::select()
        .column(SessionRecordingEvents::DistinctId)
        .column(SessionRecordingEvents::SessionId)
        .expr_as(Func::min(timestamp()), Alias::new("start_time"))
        .expr_as(Func::max(timestamp()), Alias::new("end_time"))
        .expr_as(full_snapshots.clone(), Alias::new("full_snapshots"))
        .from(SessionRecordingEvents::Table)
        .and_where(Expr::col(SessionRecordingEvents::TeamId).eq(team_id))
        .and_where(timestamp().gte(format_timestamp(start)))
        .and_where(timestamp().lte(format_timestamp(end)))
        .group_by_col(SessionRecordingEvents::DistinctId)
        .group_by_col(SessionRecordingEvents::SessionId)
        .and_having(Expr::expr(full_snapshots).gt(0))
        .order_by_expr(Func::min(timestamp()).into(), Order::Asc)
        .order_by(SessionRecordingEvents::SessionId, Order::Asc)
        .to_owned();

    if let Some(filter) = duration {
        let seconds = Expr::expr(DB::seconds_between(
            Func::min(timestamp()).into(),
            Func::max(timestamp()).into(),
        ));
        stmt.and_having(match filter.operator {
            DurationOperator::Gt => seconds.gt(filter.value_seconds),
            DurationOperator::Lt => seconds.lt(filter.value_seconds),
        });
    }

    stmt
}

/// Macro to implement RecordingStore for a specific SQL backend.
macro_rules! impl_recording_store {
    ($db_type:ty, $feature:literal) => {
        #[cfg(feature = $feature)]
        #[async_trait::async_trait]
        impl crate::interfaces::RecordingStore for SqlRecordingStore<$db_type> {
            async fn add_recording_events(
                &self,
                events: &[crate::interfaces::RecordingEvent],
            ) -> crate::interfaces::Result<()> {
                if events.is_empty() {
                    return Ok(());
                }

                let sql = {
                    let mut stmt = Query::insert();
                    stmt.into_table(SessionRecordingEvents::Table).columns([
                        SessionRecordingEvents::TeamId,
                        SessionRecordingEvents::DistinctId,
                        SessionRecordingEvents::SessionId,
                        SessionRecordingEvents::Timestamp,
                        SessionRecordingEvents::SnapshotData,
                    ]);
                    for event in events {
                        stmt.values_panic([
                            event.team_id.into(),
                            event.distinct_id.clone().into(),
                            event.session_id.clone().into(),
                            format_timestamp(event.timestamp).into(),
                            serde_json::to_string(&event.snapshot_data)?.into(),
                        ]);
                    }
                    <$db_type>::build_insert(stmt)
                };
                sqlx::query(&sql).execute(&self.pool).await?;

                Ok(())
            }

            async fn recordings_in_range(
                &self,
                team_id: TeamId,
                start: DateTime<Utc>,
                end: DateTime<Utc>,
                duration: Option<&DurationFilter>,
            ) -> crate::interfaces::Result<Vec<crate::replay::RecordingCandidate>> {
                use sqlx::Row;

                use crate::interfaces::StorageError;
                use crate::replay::RecordingCandidate;
                use crate::storage::helpers::parse_timestamp;

                if start > end {
                    return Ok(Vec::new());
                }

                let stmt = candidates_statement::<$db_type>(team_id, start, end, duration);
                let sql = <$db_type>::build_select(stmt);
                let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

                rows.iter()
                    .map(|row| -> crate::interfaces::Result<RecordingCandidate> {
                        let start_time: String = row.try_get("start_time")?;
                        let end_time: String = row.try_get("end_time")?;
                        let full_snapshots: i64 = row.try_get("full_snapshots")?;
                        Ok(RecordingCandidate {
                            distinct_id: row.try_get("distinct_id")?,
                            session_id: row.try_get("session_id")?,
                            start_time: parse_timestamp(&start_time)?,
                            end_time: parse_timestamp(&end_time)?,
                            full_snapshots: u64::try_from(full_snapshots).map_err(|e| {
                                StorageError::InvalidColumn {
                                    column: "full_snapshots",
                                    message: e.to_string(),
                                }
                            })?,
                        })
                    })
                    .collect()
            }

            async fn snapshot_events(
                &self,
                team_id: TeamId,
                session_id: &str,
            ) -> crate::interfaces::Result<Vec<crate::interfaces::RecordingEvent>> {
                use sqlx::Row;

                use crate::interfaces::RecordingEvent;
                use crate::storage::helpers::{parse_json_column, parse_timestamp};

                let stmt = Query::select()
                    .columns([
                        SessionRecordingEvents::DistinctId,
                        SessionRecordingEvents::SessionId,
                        SessionRecordingEvents::Timestamp,
                        SessionRecordingEvents::SnapshotData,
                    ])
                    .from(SessionRecordingEvents::Table)
                    .and_where(Expr::col(SessionRecordingEvents::TeamId).eq(team_id))
                    .and_where(Expr::col(SessionRecordingEvents::SessionId).eq(session_id))
                    .order_by(SessionRecordingEvents::Timestamp, Order::Asc)
                    .to_owned();

                let sql = <$db_type>::build_select(stmt);
                let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

                rows.iter()
                    .map(|row| -> crate::interfaces::Result<RecordingEvent> {
                        let timestamp: String = row.try_get("timestamp")?;
                        Ok(RecordingEvent {
                            team_id,
                            distinct_id: row.try_get("distinct_id")?,
                            session_id: row.try_get("session_id")?,
                            timestamp: parse_timestamp(&timestamp)?,
                            snapshot_data: parse_json_column(
                                "snapshot_data",
                                row.try_get("snapshot_data")?,
                            )?,
                        })
                    })
                    .collect()
            }
        }
    };
}

// Generate implementations for each SQL backend
impl_recording_store!(super::postgres::Postgres, "postgres");
impl_recording_store!(super::sqlite::Sqlite, "sqlite");
