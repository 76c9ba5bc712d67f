//! Unified SQL storage implementations.
//!
//! This module provides shared implementations for SQL-based storage backends
//! (PostgreSQL, SQLite). The implementations are parameterized by database type
//! using the `SqlDatabase` trait.

mod action_store;
mod event_store;
pub mod predicate;
mod query;
mod recording_store;

pub use action_store::SqlActionStore;
pub use event_store::SqlEventStore;
pub use query::SqlDatabase;
pub use recording_store::SqlRecordingStore;

#[cfg(feature = "postgres")]
pub mod postgres {
    //! PostgreSQL database backend.

    use sea_query::{Expr, PostgresQueryBuilder, SimpleExpr};
    use sqlx::PgPool;

    use crate::interfaces::Result;
    use crate::storage::schema::CREATE_TABLES;

    /// PostgreSQL database marker type.
    pub struct Postgres;

    impl super::SqlDatabase for Postgres {
        type Pool = PgPool;

        fn build_select(stmt: sea_query::SelectStatement) -> String {
            stmt.to_string(PostgresQueryBuilder)
        }

        fn build_insert(stmt: sea_query::InsertStatement) -> String {
            stmt.to_string(PostgresQueryBuilder)
        }

        fn build_delete(stmt: sea_query::DeleteStatement) -> String {
            stmt.to_string(PostgresQueryBuilder)
        }

        fn json_text(json: SimpleExpr, key: &str) -> SimpleExpr {
            Expr::cust_with_exprs("(CAST($1 AS JSONB) ->> $2)", [json, Expr::val(key).into()])
        }

        fn seconds_between(start: SimpleExpr, end: SimpleExpr) -> SimpleExpr {
            Expr::cust_with_exprs(
                "EXTRACT(EPOCH FROM (CAST($2 AS TIMESTAMP) - CAST($1 AS TIMESTAMP)))",
                [start, end],
            )
        }
    }

    /// Create tables and indexes if missing.
    pub async fn init_schema(pool: &PgPool) -> Result<()> {
        for statement in CREATE_TABLES {
            sqlx::query(*statement).execute(pool).await?;
        }
        Ok(())
    }

    /// PostgreSQL event store.
    pub type PostgresEventStore = super::SqlEventStore<Postgres>;

    /// PostgreSQL action store.
    pub type PostgresActionStore = super::SqlActionStore<Postgres>;

    /// PostgreSQL recording store.
    pub type PostgresRecordingStore = super::SqlRecordingStore<Postgres>;
}

#[cfg(feature = "sqlite")]
pub mod sqlite {
    //! SQLite database backend.

    use sea_query::{Expr, SimpleExpr, SqliteQueryBuilder};
    use sqlx::SqlitePool;

    use crate::interfaces::Result;
    use crate::storage::helpers::json_key_path;
    use crate::storage::schema::CREATE_TABLES;

    /// SQLite database marker type.
    pub struct Sqlite;

    impl super::SqlDatabase for Sqlite {
        type Pool = SqlitePool;

        fn build_select(stmt: sea_query::SelectStatement) -> String {
            stmt.to_string(SqliteQueryBuilder)
        }

        fn build_insert(stmt: sea_query::InsertStatement) -> String {
            stmt.to_string(SqliteQueryBuilder)
        }

        fn build_delete(stmt: sea_query::DeleteStatement) -> String {
            stmt.to_string(SqliteQueryBuilder)
        }

        fn json_text(json: SimpleExpr, key: &str) -> SimpleExpr {
            // json_extract yields 1 / 0 for booleans; keep their JSON spelling.
            let path: SimpleExpr = Expr::val(json_key_path(key)).into();
            Expr::cust_with_exprs(
                "(CASE json_type(?, ?) WHEN 'true' THEN 'true' WHEN 'false' THEN 'false' \
                 ELSE CAST(json_extract(?, ?) AS TEXT) END)",
                [json.clone(), path.clone(), json, path],
            )
        }

        fn seconds_between(start: SimpleExpr, end: SimpleExpr) -> SimpleExpr {
            Expr::cust_with_exprs("((julianday(?) - julianday(?)) * 86400.0)", [end, start])
        }
    }

    /// Create tables and indexes if missing.
    pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
        for statement in CREATE_TABLES {
            sqlx::query(*statement).execute(pool).await?;
        }
        Ok(())
    }

    /// SQLite event store.
    pub type SqliteEventStore = super::SqlEventStore<Sqlite>;

    /// SQLite action store.
    pub type SqliteActionStore = super::SqlActionStore<Sqlite>;

    /// SQLite recording store.
    pub type SqliteRecordingStore = super::SqlRecordingStore<Sqlite>;
}
