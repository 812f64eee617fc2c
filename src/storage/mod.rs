//! Storage interfaces and initialization.
//!
//! Two stores: the outbox (`queue_publish_history`) read by the producer and
//! the dead-letter consumer, and the entity tables written by the sync
//! consumer. They usually live in different databases. Both are SQL-backed,
//! with the dialect chosen by the `storage.type` setting.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};

use crate::config::{StorageConfig, StorageType};
use crate::entity::{ConflictLog, CreateOutcome, EntityRow, EntitySchema};
use crate::outbox::{NewOutboxRecord, OutboxRecord};

pub mod schema;
pub mod sql;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid outbox status '{0}'")]
    InvalidStatus(String),

    #[error("Failed to serialize message body: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage backend '{0}' not enabled in this build")]
    BackendDisabled(&'static str),
}

/// Durable outbox of messages waiting to be relayed.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Create the outbox table if missing.
    async fn init(&self) -> Result<()>;

    /// Insert a `pending` row. Returns the store-assigned id.
    async fn enqueue(&self, record: NewOutboxRecord) -> Result<i64>;

    /// Rows in a publishable status, oldest first.
    async fn fetch_publishable(&self) -> Result<Vec<OutboxRecord>>;

    async fn mark_published(&self, id: i64) -> Result<()>;

    async fn mark_error(&self, id: i64, error_msg: &str) -> Result<()>;

    /// Set `expired` on the row with this message id, whatever its status.
    ///
    /// Returns the number of rows updated (0 when the id is unknown).
    async fn mark_expired(&self, message_id: &str) -> Result<u64>;

    /// Distinct dead-letter queue names ever used, sorted.
    async fn deadletter_queue_names(&self) -> Result<Vec<String>>;

    async fn find_by_message_id(&self, message_id: &str) -> Result<Option<OutboxRecord>>;
}

/// Target store for inbound entity changes.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Create the entity and conflict log tables if missing.
    async fn init(&self) -> Result<()>;

    /// Insert the row unless its natural key exists, in which case write
    /// `conflict` instead. Both happen in one transaction.
    async fn create_or_log_conflict(
        &self,
        row: &EntityRow,
        conflict: &ConflictLog,
    ) -> Result<CreateOutcome>;

    /// Apply the row's values (natural key excluded) to the matching entity.
    ///
    /// Returns the number of rows updated; 0 means no entity has that key.
    async fn update(&self, row: &EntityRow) -> Result<u64>;

    async fn find(&self, natural_key: &str) -> Result<Option<EntityRow>>;

    /// Conflict log entries recorded for a message id.
    async fn conflicts_for(&self, message_id: &str) -> Result<Vec<ConflictLog>>;
}

/// An open connection pool for the configured backend.
enum Pool {
    #[cfg(feature = "postgres")]
    Postgres(sqlx::PgPool),
    #[cfg(feature = "sqlite")]
    Sqlite(sqlx::SqlitePool),
}

async fn open(config: &StorageConfig) -> Result<Pool> {
    match config.storage_type {
        #[cfg(feature = "postgres")]
        StorageType::Postgres => {
            use sqlx::postgres::PgPoolOptions;

            info!(endpoint = %config.endpoint(), "Connecting to PostgreSQL");
            let pool = PgPoolOptions::new()
                .max_connections(config.postgres.max_connections)
                .connect(&config.postgres.connection_url())
                .await?;
            Ok(Pool::Postgres(pool))
        }
        #[cfg(feature = "sqlite")]
        StorageType::Sqlite => {
            use sqlx::sqlite::SqlitePoolOptions;

            info!(endpoint = %config.endpoint(), "Opening SQLite database");
            let pool = SqlitePoolOptions::new()
                .max_connections(1)
                .connect(&config.sqlite.connection_url())
                .await?;
            Ok(Pool::Sqlite(pool))
        }
        #[allow(unreachable_patterns)]
        ref other => {
            let name = match other {
                StorageType::Postgres => "postgres",
                StorageType::Sqlite => "sqlite",
            };
            error!(backend = name, "Storage backend requested but feature is not enabled");
            Err(StoreError::BackendDisabled(name))
        }
    }
}

/// Connect to the outbox database and create the outbox table if missing.
pub async fn connect_outbox(config: &StorageConfig) -> Result<Arc<dyn OutboxStore>> {
    let store: Arc<dyn OutboxStore> = match open(config).await? {
        #[cfg(feature = "postgres")]
        Pool::Postgres(pool) => Arc::new(sql::postgres::PostgresOutboxStore::new(pool)),
        #[cfg(feature = "sqlite")]
        Pool::Sqlite(pool) => Arc::new(sql::sqlite::SqliteOutboxStore::new(pool)),
    };
    store.init().await?;
    Ok(store)
}

/// Connect to the entity database and create the entity and conflict log
/// tables if missing.
pub async fn connect_entity(
    config: &StorageConfig,
    schema: &'static EntitySchema,
) -> Result<Arc<dyn EntityStore>> {
    let store: Arc<dyn EntityStore> = match open(config).await? {
        #[cfg(feature = "postgres")]
        Pool::Postgres(pool) => Arc::new(sql::postgres::PostgresEntityStore::new(pool, schema)),
        #[cfg(feature = "sqlite")]
        Pool::Sqlite(pool) => Arc::new(sql::sqlite::SqliteEntityStore::new(pool, schema)),
    };
    store.init().await?;
    Ok(store)
}
