//! Unified SQL storage implementations.
//!
//! Shared implementations for the SQL backends (PostgreSQL, SQLite),
//! parameterized by database type through the `SqlDatabase` trait.

mod entity_store;
mod outbox_store;
mod query;

pub use entity_store::SqlEntityStore;
pub use outbox_store::SqlOutboxStore;
pub use query::SqlDatabase;

#[cfg(feature = "postgres")]
pub mod postgres {
    //! PostgreSQL database backend.

    use sea_query::PostgresQueryBuilder;
    use sqlx::PgPool;

    use crate::storage::schema::{POSTGRES_CONFLICT_LOG_DDL, POSTGRES_OUTBOX_DDL};

    /// PostgreSQL database marker type.
    pub struct Postgres;

    impl super::SqlDatabase for Postgres {
        type Pool = PgPool;

        const OUTBOX_DDL: &'static [&'static str] = POSTGRES_OUTBOX_DDL;
        const CONFLICT_LOG_DDL: &'static [&'static str] = POSTGRES_CONFLICT_LOG_DDL;

        fn build_select(stmt: sea_query::SelectStatement) -> String {
            stmt.to_string(PostgresQueryBuilder)
        }

        fn build_insert(stmt: sea_query::InsertStatement) -> String {
            stmt.to_string(PostgresQueryBuilder)
        }

        fn build_update(stmt: sea_query::UpdateStatement) -> String {
            stmt.to_string(PostgresQueryBuilder)
        }

        fn build_table_create(stmt: sea_query::TableCreateStatement) -> String {
            stmt.to_string(PostgresQueryBuilder)
        }
    }

    /// PostgreSQL outbox store.
    pub type PostgresOutboxStore = super::SqlOutboxStore<Postgres>;

    /// PostgreSQL entity store.
    pub type PostgresEntityStore = super::SqlEntityStore<Postgres>;
}

#[cfg(feature = "sqlite")]
pub mod sqlite {
    //! SQLite database backend.

    use sea_query::SqliteQueryBuilder;
    use sqlx::SqlitePool;

    use crate::storage::schema::{SQLITE_CONFLICT_LOG_DDL, SQLITE_OUTBOX_DDL};

    /// SQLite database marker type.
    pub struct Sqlite;

    impl super::SqlDatabase for Sqlite {
        type Pool = SqlitePool;

        const OUTBOX_DDL: &'static [&'static str] = SQLITE_OUTBOX_DDL;
        const CONFLICT_LOG_DDL: &'static [&'static str] = SQLITE_CONFLICT_LOG_DDL;

        fn build_select(stmt: sea_query::SelectStatement) -> String {
            stmt.to_string(SqliteQueryBuilder)
        }

        fn build_insert(stmt: sea_query::InsertStatement) -> String {
            stmt.to_string(SqliteQueryBuilder)
        }

        fn build_update(stmt: sea_query::UpdateStatement) -> String {
            stmt.to_string(SqliteQueryBuilder)
        }

        fn build_table_create(stmt: sea_query::TableCreateStatement) -> String {
            stmt.to_string(SqliteQueryBuilder)
        }
    }

    /// SQLite outbox store.
    pub type SqliteOutboxStore = super::SqlOutboxStore<Sqlite>;

    /// SQLite entity store.
    pub type SqliteEntityStore = super::SqlEntityStore<Sqlite>;
}
