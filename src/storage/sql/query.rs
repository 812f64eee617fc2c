//! SQL database abstraction trait.

/// Trait for SQL database backends.
///
/// Abstracts over PostgreSQL and SQLite by providing the pool type, the
/// dialect-specific query builders and the table DDL.
pub trait SqlDatabase: Send + Sync + 'static {
    /// The connection pool type for this database.
    type Pool: Clone + Send + Sync;

    /// Statements creating the outbox table, run in order.
    const OUTBOX_DDL: &'static [&'static str];

    /// Statements creating the conflict log table, run in order.
    const CONFLICT_LOG_DDL: &'static [&'static str];

    fn build_select(stmt: sea_query::SelectStatement) -> String;

    fn build_insert(stmt: sea_query::InsertStatement) -> String;

    fn build_update(stmt: sea_query::UpdateStatement) -> String;

    fn build_table_create(stmt: sea_query::TableCreateStatement) -> String;
}
