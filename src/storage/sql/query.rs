//! SQL database abstraction trait.

use sea_query::SimpleExpr;

/// Trait for SQL database backends.
///
/// This trait abstracts over different SQL databases (PostgreSQL, SQLite)
/// by providing the pool type, statement rendering and the few expressions
/// whose syntax differs between dialects.
pub trait SqlDatabase: Send + Sync + 'static {
    /// The connection pool type for this database.
    type Pool: Clone + Send + Sync;

    /// Build a SQL query string from a sea-query SELECT statement.
    fn build_select(stmt: sea_query::SelectStatement) -> String;

    /// Build a SQL query string from a sea-query INSERT statement.
    fn build_insert(stmt: sea_query::InsertStatement) -> String;

    /// Build a SQL query string from a sea-query DELETE statement.
    fn build_delete(stmt: sea_query::DeleteStatement) -> String;

    /// Text of the top-level `key` of a JSON text expression.
    ///
    /// NULL when the key is absent or JSON `null`; booleans render as
    /// `true` / `false`.
    fn json_text(json: SimpleExpr, key: &str) -> SimpleExpr;

    /// Seconds elapsed from `start` to `end`, both stored timestamps.
    fn seconds_between(start: SimpleExpr, end: SimpleExpr) -> SimpleExpr;
}
