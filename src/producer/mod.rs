//! Outbox producer.
//!
//! Polls the outbox for publishable rows and relays them to the broker one at
//! a time. A row is marked `published` only after the broker transaction
//! committed; any failure inside the transaction marks it `error` with the
//! failure text, and it is retried on the next poll. There is no attempt
//! limit.
//!
//! If the broker cannot be reached at all, the cycle stops and the current
//! row is left untouched; the next cycle picks it up again.

use std::sync::Arc;
use std::time::Duration;

use backon::BackoffBuilder;
use tracing::{debug, error, info, warn};

use crate::broker::{BrokerError, MessagePublisher, OutboundMessage};
use crate::error::{RelayError, Result};
use crate::storage::OutboxStore;
use crate::utils::retry::fixed_interval;

/// Counts from one poll cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub fetched: usize,
    pub published: usize,
    pub failed: usize,
}

pub struct Producer {
    store: Arc<dyn OutboxStore>,
    publisher: Arc<dyn MessagePublisher>,
    poll_interval: Duration,
}

impl Producer {
    pub fn new(
        store: Arc<dyn OutboxStore>,
        publisher: Arc<dyn MessagePublisher>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            store,
            publisher,
            poll_interval,
        }
    }

    /// Relay every publishable row once, in id order.
    ///
    /// Returns an error when the store fails or the broker is unreachable;
    /// rows already handled keep their new status.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let records = self.store.fetch_publishable().await?;
        let mut report = CycleReport {
            fetched: records.len(),
            ..Default::default()
        };

        if records.is_empty() {
            debug!("No publishable records");
            return Ok(report);
        }

        for (i, record) in records.iter().enumerate() {
            info!(
                id = record.id,
                queue = %record.route.queue_name,
                exchange = %record.route.exchange_name,
                message_id = %record.message_id,
                "Publishing {}/{}",
                i + 1,
                records.len()
            );

            let outcome = match OutboundMessage::from_record(record) {
                Ok(message) => self.publisher.publish(&message).await,
                Err(e) => Err(BrokerError::Publish(format!("Failed to encode body: {}", e))),
            };

            match outcome {
                Ok(()) => {
                    self.store.mark_published(record.id).await?;
                    report.published += 1;
                }
                Err(BrokerError::Publish(msg)) => {
                    warn!(id = record.id, error = %msg, "Marking record as error");
                    self.store.mark_error(record.id, &msg).await?;
                    report.failed += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }

        info!(
            fetched = report.fetched,
            published = report.published,
            failed = report.failed,
            "Poll cycle complete"
        );
        Ok(report)
    }

    /// Poll forever at the configured interval.
    ///
    /// A failed cycle is logged and the loop continues after the same fixed
    /// interval, so outages of either the broker or the database never stop
    /// the process.
    pub async fn run(&self) {
        let mut delays = fixed_interval(self.poll_interval).build();

        loop {
            if let Err(e) = self.run_cycle().await {
                log_cycle_error(&e);
            }
            let delay = delays.next().unwrap_or(self.poll_interval);
            tokio::time::sleep(delay).await;
        }
    }
}

fn log_cycle_error(e: &RelayError) {
    if e.is_connection() {
        warn!(error = %e, "Broker unreachable, retrying next cycle");
    } else {
        error!(error = %e, "Poll cycle failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use crate::broker::{MockFailure, MockPublisher};
    use crate::outbox::{DeliveryMode, NewOutboxRecord, OutboxRecord, OutboxStatus, Route};
    use crate::storage::{Result as StoreResult, StoreError};

    /// In-memory outbox for unit tests.
    #[derive(Default)]
    struct MemoryOutbox {
        rows: Mutex<Vec<OutboxRecord>>,
        fail_fetch: bool,
    }

    impl MemoryOutbox {
        async fn insert(&self, id: i64, status: OutboxStatus) {
            self.rows.lock().await.push(OutboxRecord {
                id,
                route: Route::new("Q1", "E1", "Q1_DLQ", "E1_DLX"),
                message_body: r#"{"a":1}"#.to_string(),
                delivery_mode: DeliveryMode::Persistent,
                expiration_secs: 604_800,
                message_id: format!("m-{}", id),
                status,
                error_msg: String::new(),
                timestamp: String::new(),
            });
        }

        async fn status(&self, id: i64) -> (OutboxStatus, String) {
            let rows = self.rows.lock().await;
            let row = rows.iter().find(|r| r.id == id).unwrap();
            (row.status, row.error_msg.clone())
        }

        async fn set(&self, id: i64, status: OutboxStatus, error_msg: &str) {
            let mut rows = self.rows.lock().await;
            if let Some(row) = rows.iter_mut().find(|r| r.id == id) {
                row.status = status;
                row.error_msg = error_msg.to_string();
            }
        }
    }

    #[async_trait]
    impl OutboxStore for MemoryOutbox {
        async fn init(&self) -> StoreResult<()> {
            Ok(())
        }

        async fn enqueue(&self, _record: NewOutboxRecord) -> StoreResult<i64> {
            unimplemented!()
        }

        async fn fetch_publishable(&self) -> StoreResult<Vec<OutboxRecord>> {
            if self.fail_fetch {
                return Err(StoreError::InvalidStatus("boom".to_string()));
            }
            let rows = self.rows.lock().await;
            Ok(rows
                .iter()
                .filter(|r| r.status.is_publishable())
                .cloned()
                .collect())
        }

        async fn mark_published(&self, id: i64) -> StoreResult<()> {
            self.set(id, OutboxStatus::Published, "").await;
            Ok(())
        }

        async fn mark_error(&self, id: i64, error_msg: &str) -> StoreResult<()> {
            self.set(id, OutboxStatus::Error, error_msg).await;
            Ok(())
        }

        async fn mark_expired(&self, _message_id: &str) -> StoreResult<u64> {
            unimplemented!()
        }

        async fn deadletter_queue_names(&self) -> StoreResult<Vec<String>> {
            unimplemented!()
        }

        async fn find_by_message_id(&self, _message_id: &str) -> StoreResult<Option<OutboxRecord>> {
            unimplemented!()
        }
    }

    fn producer(store: Arc<MemoryOutbox>, publisher: Arc<MockPublisher>) -> Producer {
        Producer::new(store, publisher, Duration::from_secs(10))
    }

    #[tokio::test]
    async fn test_cycle_publishes_pending_error_and_expired() {
        let store = Arc::new(MemoryOutbox::default());
        store.insert(1, OutboxStatus::Pending).await;
        store.insert(2, OutboxStatus::Error).await;
        store.insert(3, OutboxStatus::Expired).await;
        store.insert(4, OutboxStatus::Published).await;
        let publisher = Arc::new(MockPublisher::new());

        let report = producer(store.clone(), publisher.clone())
            .run_cycle()
            .await
            .unwrap();

        assert_eq!(report.fetched, 3);
        assert_eq!(report.published, 3);
        let ids: Vec<_> = publisher
            .take_published()
            .await
            .into_iter()
            .map(|m| m.message_id)
            .collect();
        assert_eq!(ids, vec!["m-1", "m-2", "m-3"]);
        for id in 1..=3 {
            assert_eq!(store.status(id).await.0, OutboxStatus::Published);
        }
    }

    #[tokio::test]
    async fn test_publish_failure_marks_error_then_recovers() {
        let store = Arc::new(MemoryOutbox::default());
        store.insert(1, OutboxStatus::Pending).await;
        let publisher = Arc::new(MockPublisher::new());
        let producer = producer(store.clone(), publisher.clone());

        publisher.set_failure(Some(MockFailure::Publish)).await;
        let report = producer.run_cycle().await.unwrap();
        assert_eq!(report.failed, 1);
        let (status, error_msg) = store.status(1).await;
        assert_eq!(status, OutboxStatus::Error);
        assert!(error_msg.contains("Mock publish failure"));

        publisher.set_failure(None).await;
        producer.run_cycle().await.unwrap();
        let (status, error_msg) = store.status(1).await;
        assert_eq!(status, OutboxStatus::Published);
        assert!(error_msg.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_broker_leaves_record_untouched() {
        let store = Arc::new(MemoryOutbox::default());
        store.insert(1, OutboxStatus::Pending).await;
        store.insert(2, OutboxStatus::Pending).await;
        let publisher = Arc::new(MockPublisher::new());
        publisher.set_failure(Some(MockFailure::Connection)).await;

        let result = producer(store.clone(), publisher).run_cycle().await;

        assert!(result.unwrap_err().is_connection());
        assert_eq!(store.status(1).await.0, OutboxStatus::Pending);
        assert_eq!(store.status(2).await.0, OutboxStatus::Pending);
    }

    #[tokio::test]
    async fn test_store_failure_aborts_cycle() {
        let store = Arc::new(MemoryOutbox {
            fail_fetch: true,
            ..Default::default()
        });
        let publisher = Arc::new(MockPublisher::new());

        let result = producer(store, publisher.clone()).run_cycle().await;

        assert!(matches!(result, Err(RelayError::Storage(_))));
        assert_eq!(publisher.published_count().await, 0);
    }

    #[tokio::test]
    async fn test_empty_outbox() {
        let store = Arc::new(MemoryOutbox::default());
        let publisher = Arc::new(MockPublisher::new());

        let report = producer(store, publisher).run_cycle().await.unwrap();
        assert_eq!(report, CycleReport::default());
    }
}
