//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use serde_json::Value;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use outbox_relay::broker::InboundMessage;
use outbox_relay::entity::USER_DETAIL;
use outbox_relay::storage::sql::sqlite::{SqliteEntityStore, SqliteOutboxStore};
use outbox_relay::storage::{EntityStore, OutboxStore};

/// In-memory SQLite pool.
///
/// A single connection keeps every query on the same in-memory database.
pub async fn memory_pool() -> SqlitePool {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory SQLite")
}

pub async fn outbox_store(pool: &SqlitePool) -> Arc<SqliteOutboxStore> {
    let store = SqliteOutboxStore::new(pool.clone());
    store.init().await.expect("Failed to create outbox table");
    Arc::new(store)
}

pub async fn entity_store(pool: &SqlitePool) -> Arc<SqliteEntityStore> {
    let store = SqliteEntityStore::new(pool.clone(), &USER_DETAIL);
    store.init().await.expect("Failed to create entity tables");
    Arc::new(store)
}

/// Inbound delivery as the broker would hand it to a consumer.
pub fn delivery(body: Vec<u8>, exchange: &str, message_id: Option<&str>) -> InboundMessage {
    InboundMessage {
        message_id: message_id.map(str::to_string),
        exchange: exchange.to_string(),
        routing_key: String::new(),
        body,
        redelivered: false,
    }
}

/// Wire body for a JSON payload.
pub fn wire(payload: &Value) -> Vec<u8> {
    outbox_relay::outbox::codec::encode_body(&payload.to_string()).expect("encode")
}

pub async fn count(pool: &SqlitePool, table: &str) -> i64 {
    let row: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await
        .expect("count query");
    row.0
}
