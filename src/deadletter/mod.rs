//! Dead-letter consumer.
//!
//! When the broker dead-letters a relayed message (TTL expiry or rejection)
//! it lands in the route's dead-letter queue. This consumer listens on every
//! dead-letter queue the outbox has ever used and marks the matching outbox
//! row `expired` by `message_id`, which makes the producer publish it again.
//!
//! The queue set is read from the outbox once at startup. Failing to read it
//! is fatal: the process must be restarted once the database is back.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::broker::{consume, BrokerGateway, DeliveryHandler, Disposition, InboundMessage, QueueBinding};
use crate::config::DeadLetterConfig;
use crate::error::{RelayError, Result};
use crate::storage::OutboxStore;
use crate::utils::retry::supervise;

/// Consumer tag prefix; the queue name is appended per subscription.
pub const CONSUMER_TAG: &str = "relay-deadletter";

pub struct DeadLetterConsumer {
    store: Arc<dyn OutboxStore>,
}

impl DeadLetterConsumer {
    pub fn new(store: Arc<dyn OutboxStore>) -> Self {
        Self { store }
    }

    /// Dead-letter queues to consume, read from the outbox.
    ///
    /// Errors if the store is unreachable or no dead-letter queue is known.
    pub async fn discover_queues(&self) -> Result<Vec<QueueBinding>> {
        let names = self.store.deadletter_queue_names().await?;
        if names.is_empty() {
            return Err(RelayError::NoQueues("dead-letter"));
        }

        info!(queues = ?names, "Discovered dead-letter queues");
        Ok(names.into_iter().map(QueueBinding::plain).collect())
    }

    /// Consume the given queues forever, reconnecting at a fixed interval.
    pub async fn run(
        self: Arc<Self>,
        gateway: BrokerGateway,
        queues: Vec<QueueBinding>,
        config: DeadLetterConfig,
    ) {
        supervise(CONSUMER_TAG, config.reconnect_interval(), || {
            consume(
                &gateway,
                &queues,
                config.prefetch_count,
                CONSUMER_TAG,
                self.as_ref(),
            )
        })
        .await
    }
}

#[async_trait]
impl DeliveryHandler for DeadLetterConsumer {
    async fn handle(&self, message: &InboundMessage) -> Result<Disposition> {
        let Some(message_id) = message.message_id.as_deref() else {
            warn!(
                exchange = %message.exchange,
                "Dead-lettered message has no message_id, dropping"
            );
            return Ok(Disposition::Ack);
        };

        info!(message_id, "Marking message as expired");
        let updated = self.store.mark_expired(message_id).await?;
        if updated == 0 {
            warn!(message_id, "No outbox record for dead-lettered message");
        }

        Ok(Disposition::Ack)
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use serde_json::json;
    use sqlx::sqlite::SqlitePoolOptions;

    use crate::outbox::{NewOutboxRecord, OutboxStatus, Route};
    use crate::storage::sql::sqlite::SqliteOutboxStore;

    async fn store() -> Arc<SqliteOutboxStore> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = SqliteOutboxStore::new(pool);
        store.init().await.unwrap();
        Arc::new(store)
    }

    fn delivery(message_id: Option<&str>) -> InboundMessage {
        InboundMessage {
            message_id: message_id.map(str::to_string),
            exchange: "E1_DLX".to_string(),
            routing_key: String::new(),
            body: b"\"{}\"".to_vec(),
            redelivered: false,
        }
    }

    #[tokio::test]
    async fn test_handle_marks_record_expired() {
        let store = store().await;
        let record = NewOutboxRecord::new(Route::with_default_deadletter("Q1", "E1"), json!({"a": 1}));
        let message_id = record.message_id.to_string();
        let id = store.enqueue(record).await.unwrap();
        store.mark_published(id).await.unwrap();

        let consumer = DeadLetterConsumer::new(store.clone());
        let disposition = consumer.handle(&delivery(Some(message_id.as_str()))).await.unwrap();

        assert_eq!(disposition, Disposition::Ack);
        let record = store.find_by_message_id(&message_id).await.unwrap().unwrap();
        assert_eq!(record.status, OutboxStatus::Expired);
    }

    #[tokio::test]
    async fn test_handle_acks_unknown_and_missing_ids() {
        let consumer = DeadLetterConsumer::new(store().await);

        assert_eq!(
            consumer.handle(&delivery(Some("unknown"))).await.unwrap(),
            Disposition::Ack
        );
        assert_eq!(consumer.handle(&delivery(None)).await.unwrap(), Disposition::Ack);
    }

    #[tokio::test]
    async fn test_discover_queues() {
        let store = store().await;
        let consumer = DeadLetterConsumer::new(store.clone());
        assert!(matches!(
            consumer.discover_queues().await,
            Err(RelayError::NoQueues(_))
        ));

        for (queue, exchange) in [("Q1", "E1"), ("Q2", "E2"), ("Q1", "E1")] {
            store
                .enqueue(NewOutboxRecord::new(
                    Route::with_default_deadletter(queue, exchange),
                    json!({}),
                ))
                .await
                .unwrap();
        }

        let queues = consumer.discover_queues().await.unwrap();
        assert_eq!(
            queues,
            vec![QueueBinding::plain("Q1_DLQ"), QueueBinding::plain("Q2_DLQ")]
        );
    }
}
