//! Database schema definitions using sea-query.
//!
//! Column names follow the tables the emitting application already owns, so
//! the relay can run against an existing database.

use sea_query::Iden;

/// Outbox table schema.
#[derive(Iden)]
pub enum QueuePublishHistory {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "queue_name"]
    QueueName,
    #[iden = "exchange_name"]
    ExchangeName,
    #[iden = "deadletter_queue_name"]
    DeadletterQueueName,
    #[iden = "deadletter_exchange_name"]
    DeadletterExchangeName,
    #[iden = "message_body_json"]
    MessageBodyJson,
    #[iden = "delivery_mode"]
    DeliveryMode,
    #[iden = "expiration_secs"]
    ExpirationSecs,
    #[iden = "message_id"]
    MessageId,
    #[iden = "status"]
    Status,
    #[iden = "error_msg"]
    ErrorMsg,
    #[iden = "timestamp"]
    Timestamp,
}

/// Conflict log table schema.
#[derive(Iden)]
pub enum ConflictingUserSyncLog {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "raw_message_body_json"]
    RawMessageBodyJson,
    #[iden = "comment"]
    Comment,
    #[iden = "exchange_name"]
    ExchangeName,
    #[iden = "message_id"]
    MessageId,
    #[iden = "timestamp"]
    Timestamp,
}

/// PostgreSQL DDL for the outbox table.
pub const POSTGRES_OUTBOX_DDL: &[&str] = &[
    r#"
CREATE TABLE IF NOT EXISTS queue_publish_history (
    id BIGSERIAL PRIMARY KEY,
    queue_name TEXT NOT NULL,
    exchange_name TEXT NOT NULL,
    deadletter_queue_name TEXT NOT NULL,
    deadletter_exchange_name TEXT NOT NULL,
    message_body_json TEXT NOT NULL,
    delivery_mode BIGINT NOT NULL DEFAULT 2,
    expiration_secs BIGINT NOT NULL DEFAULT 604800,
    message_id TEXT NOT NULL UNIQUE,
    status TEXT NOT NULL DEFAULT 'pending',
    error_msg TEXT NOT NULL DEFAULT '',
    timestamp TEXT NOT NULL
)"#,
    "CREATE INDEX IF NOT EXISTS idx_queue_publish_history_status ON queue_publish_history(status)",
];

/// SQLite DDL for the outbox table.
pub const SQLITE_OUTBOX_DDL: &[&str] = &[
    r#"
CREATE TABLE IF NOT EXISTS queue_publish_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    queue_name TEXT NOT NULL,
    exchange_name TEXT NOT NULL,
    deadletter_queue_name TEXT NOT NULL,
    deadletter_exchange_name TEXT NOT NULL,
    message_body_json TEXT NOT NULL,
    delivery_mode INTEGER NOT NULL DEFAULT 2,
    expiration_secs INTEGER NOT NULL DEFAULT 604800,
    message_id TEXT NOT NULL UNIQUE,
    status TEXT NOT NULL DEFAULT 'pending',
    error_msg TEXT NOT NULL DEFAULT '',
    timestamp TEXT NOT NULL
)"#,
    "CREATE INDEX IF NOT EXISTS idx_queue_publish_history_status ON queue_publish_history(status)",
];

/// PostgreSQL DDL for the conflict log table.
pub const POSTGRES_CONFLICT_LOG_DDL: &[&str] = &[
    r#"
CREATE TABLE IF NOT EXISTS conflicting_user_sync_log (
    id BIGSERIAL PRIMARY KEY,
    raw_message_body_json TEXT NOT NULL,
    comment TEXT NOT NULL,
    exchange_name TEXT NOT NULL,
    message_id TEXT,
    timestamp TEXT NOT NULL
)"#,
];

/// SQLite DDL for the conflict log table.
pub const SQLITE_CONFLICT_LOG_DDL: &[&str] = &[
    r#"
CREATE TABLE IF NOT EXISTS conflicting_user_sync_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    raw_message_body_json TEXT NOT NULL,
    comment TEXT NOT NULL,
    exchange_name TEXT NOT NULL,
    message_id TEXT,
    timestamp TEXT NOT NULL
)"#,
];
