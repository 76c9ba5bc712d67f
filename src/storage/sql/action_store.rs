//! Unified SQL ActionStore implementation.

use std::marker::PhantomData;

use super::SqlDatabase;
use crate::retention::UrlMatching;

/// SQL-based implementation of ActionStore.
pub struct SqlActionStore<DB: SqlDatabase> {
    pool: DB::Pool,
    _marker: PhantomData<DB>,
}

impl<DB: SqlDatabase> SqlActionStore<DB> {
    /// Create a new SQL action store with the given pool.
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

/// Stored `url_matching` value. Unknown values fall back to `contains`.
fn parse_url_matching(raw: &str) -> UrlMatching {
    match raw {
        "exact" => UrlMatching::Exact,
        _ => UrlMatching::Contains,
    }
}

/// Macro to implement ActionStore for a specific SQL backend.
macro_rules! impl_action_store {
    ($db_type:ty, $feature:literal) => {
        #[cfg(feature = $feature)]
        #[async_trait::async_trait]
        impl crate::interfaces::ActionStore for SqlActionStore<$db_type> {
            async fn put_action(
                &self,
                action: &crate::retention::Action,
            ) -> crate::interfaces::Result<()> {
                use sea_query::{Expr, Query};

                use crate::storage::schema::{ActionSteps, Actions};

                let mut statements = vec![
                    <$db_type>::build_delete(
                        Query::delete()
                            .from_table(ActionSteps::Table)
                            .and_where(Expr::col(ActionSteps::ActionId).eq(action.id))
                            .to_owned(),
                    ),
                    <$db_type>::build_delete(
                        Query::delete()
                            .from_table(Actions::Table)
                            .and_where(Expr::col(Actions::Id).eq(action.id))
                            .to_owned(),
                    ),
                    <$db_type>::build_insert(
                        Query::insert()
                            .into_table(Actions::Table)
                            .columns([Actions::Id, Actions::TeamId, Actions::Name, Actions::Deleted])
                            .values_panic([
                                action.id.into(),
                                action.team_id.into(),
                                action.name.clone().into(),
                                false.into(),
                            ])
                            .to_owned(),
                    ),
                ];

                if !action.steps.is_empty() {
                    let mut insert = Query::insert();
                    insert.into_table(ActionSteps::Table).columns([
                        ActionSteps::Id,
                        ActionSteps::ActionId,
                        ActionSteps::Event,
                        ActionSteps::Url,
                        ActionSteps::UrlMatching,
                        ActionSteps::Properties,
                    ]);
                    for (index, step) in action.steps.iter().enumerate() {
                        insert.values_panic([
                            (index as i64).into(),
                            action.id.into(),
                            step.event.clone().into(),
                            step.url.clone().into(),
                            step.url_matching.as_str().into(),
                            serde_json::to_string(&step.properties)?.into(),
                        ]);
                    }
                    statements.push(<$db_type>::build_insert(insert));
                }

                let mut tx = self.pool.begin().await?;
                for sql in &statements {
                    sqlx::query(sql).execute(&mut *tx).await?;
                }
                tx.commit().await?;

                Ok(())
            }

            async fn get_action(
                &self,
                team_id: crate::interfaces::TeamId,
                action_id: i64,
            ) -> crate::interfaces::Result<Option<crate::retention::Action>> {
                use sea_query::{Expr, Order, Query};
                use sqlx::Row;

                use crate::retention::{Action, ActionStep, PropertyFilter};
                use crate::storage::schema::{ActionSteps, Actions};

                let stmt = Query::select()
                    .columns([Actions::Id, Actions::TeamId, Actions::Name])
                    .from(Actions::Table)
                    .and_where(Expr::col(Actions::Id).eq(action_id))
                    .and_where(Expr::col(Actions::TeamId).eq(team_id))
                    .and_where(Expr::col(Actions::Deleted).eq(false))
                    .to_owned();

                let sql = <$db_type>::build_select(stmt);
                let Some(row) = sqlx::query(&sql).fetch_optional(&self.pool).await? else {
                    return Ok(None);
                };
                let name: String = row.try_get("name")?;

                let stmt = Query::select()
                    .columns([
                        ActionSteps::Event,
                        ActionSteps::Url,
                        ActionSteps::UrlMatching,
                        ActionSteps::Properties,
                    ])
                    .from(ActionSteps::Table)
                    .and_where(Expr::col(ActionSteps::ActionId).eq(action_id))
                    .order_by(ActionSteps::Id, Order::Asc)
                    .to_owned();

                let sql = <$db_type>::build_select(stmt);
                let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

                let mut steps = Vec::with_capacity(rows.len());
                for row in rows {
                    let url_matching: String = row.try_get("url_matching")?;
                    let properties: Option<String> = row.try_get("properties")?;
                    let properties: Vec<PropertyFilter> = match properties {
                        Some(text) => serde_json::from_str(&text)?,
                        None => Vec::new(),
                    };
                    steps.push(ActionStep {
                        event: row.try_get("event")?,
                        url: row.try_get("url")?,
                        url_matching: parse_url_matching(&url_matching),
                        properties,
                    });
                }

                Ok(Some(Action {
                    id: action_id,
                    team_id,
                    name,
                    steps,
                }))
            }
        }
    };
}

// Generate implementations for each SQL backend
impl_action_store!(super::postgres::Postgres, "postgres");
impl_action_store!(super::sqlite::Sqlite, "sqlite");
