//! Sync consumer.
//!
//! Applies entity change events from the sync queues to the entity store.
//! Each event is a flat object of entity fields plus an `is_created` marker:
//!
//! - created, key unknown: insert the entity
//! - created, key exists: keep the stored entity and write a conflict log row
//! - updated: partial update by natural key; no match is a silent no-op
//!
//! Redelivering a create event is therefore harmless and visible in the
//! conflict log. Payloads that cannot be decoded are rejected without
//! requeue, which routes them to the queue's dead-letter exchange.
//!
//! A rejected message that came from the outbox lands in its `{queue}_DLQ`,
//! where the dead-letter consumer marks it `expired` and the producer
//! publishes it again, so a poison event cycles until its row is fixed.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::broker::{consume, BrokerGateway, DeliveryHandler, Disposition, InboundMessage, QueueBinding};
use crate::config::SyncConfig;
use crate::entity::{flag, ConflictLog, CreateOutcome, EntityRow, EntitySchema};
use crate::error::{RelayError, Result};
use crate::outbox::codec::{decode_body, PayloadError};
use crate::storage::EntityStore;
use crate::utils::retry::supervise;

/// Consumer tag prefix; the queue name is appended per subscription.
pub const CONSUMER_TAG: &str = "relay-sync";

/// Payload key distinguishing create events from updates.
pub const CREATED_MARKER: &str = "is_created";

/// Build a change event payload from entity fields.
pub fn change_event(fields: Map<String, Value>, is_created: bool) -> Value {
    let mut event = fields;
    event.insert(CREATED_MARKER.to_string(), Value::Bool(is_created));
    Value::Object(event)
}

/// A decoded change event.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncCommand {
    pub is_created: bool,
    pub row: EntityRow,
    /// JSON text of the payload without the marker and stripped fields.
    pub raw_payload: String,
    /// Payload keys the schema has no column for.
    pub dropped: Vec<String>,
}

/// What applying a command did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Created,
    Conflict,
    Updated,
    Unmatched,
}

pub struct SyncConsumer {
    store: Arc<dyn EntityStore>,
    schema: &'static EntitySchema,
    strip_fields: Vec<String>,
}

impl SyncConsumer {
    pub fn new(
        store: Arc<dyn EntityStore>,
        schema: &'static EntitySchema,
        strip_fields: Vec<String>,
    ) -> Self {
        Self {
            store,
            schema,
            strip_fields,
        }
    }

    /// Sync queues with their dead-letter exchanges.
    pub fn queue_bindings(config: &SyncConfig) -> Result<Vec<QueueBinding>> {
        if config.queues.is_empty() {
            return Err(RelayError::NoQueues("sync"));
        }
        Ok(config
            .queues
            .iter()
            .map(|q| QueueBinding::with_deadletter(&q.queue, &q.deadletter_exchange))
            .collect())
    }

    /// Decode a wire body into a command.
    pub fn parse(&self, body: &[u8]) -> std::result::Result<SyncCommand, PayloadError> {
        let mut payload = decode_body(body)?;

        let is_created = match payload.remove(CREATED_MARKER) {
            None | Some(Value::Null) => false,
            Some(value) => flag(&value).ok_or_else(|| PayloadError::InvalidField {
                field: CREATED_MARKER.to_string(),
                value: value.to_string(),
            })?,
        };
        for field in &self.strip_fields {
            payload.remove(field);
        }

        let mapped = self.schema.map_payload(&payload)?;
        let raw_payload = Value::Object(payload).to_string();

        Ok(SyncCommand {
            is_created,
            row: mapped.row,
            raw_payload,
            dropped: mapped.dropped,
        })
    }

    /// Apply a command to the entity store.
    pub async fn apply(
        &self,
        command: &SyncCommand,
        exchange: &str,
        message_id: Option<&str>,
    ) -> Result<SyncOutcome> {
        let key = command.row.natural_key.as_str();

        if command.is_created {
            let conflict = ConflictLog::new(
                command.raw_payload.as_str(),
                exchange,
                message_id.map(str::to_string),
            );
            match self.store.create_or_log_conflict(&command.row, &conflict).await? {
                CreateOutcome::Created => {
                    info!(key, "Created entity");
                    Ok(SyncOutcome::Created)
                }
                CreateOutcome::Conflict => {
                    warn!(key, "Entity already exists, conflict logged");
                    Ok(SyncOutcome::Conflict)
                }
            }
        } else if self.store.update(&command.row).await? > 0 {
            info!(key, "Updated entity");
            Ok(SyncOutcome::Updated)
        } else {
            debug!(key, "No entity to update");
            Ok(SyncOutcome::Unmatched)
        }
    }

    /// Consume the sync queues forever, reconnecting at a fixed interval.
    pub async fn run(self: Arc<Self>, gateway: BrokerGateway, config: SyncConfig) -> Result<()> {
        let queues = Self::queue_bindings(&config)?;

        supervise(CONSUMER_TAG, config.reconnect_interval(), || {
            consume(
                &gateway,
                &queues,
                config.prefetch_count,
                CONSUMER_TAG,
                self.as_ref(),
            )
        })
        .await;
        Ok(())
    }
}

#[async_trait]
impl DeliveryHandler for SyncConsumer {
    async fn handle(&self, message: &InboundMessage) -> Result<Disposition> {
        let command = match self.parse(&message.body) {
            Ok(command) => command,
            Err(e) => {
                warn!(
                    error = %e,
                    exchange = %message.exchange,
                    "Rejecting malformed sync message; it will cycle through the dead-letter queue until its outbox row is fixed"
                );
                return Ok(Disposition::Reject);
            }
        };

        if !command.dropped.is_empty() {
            debug!(fields = ?command.dropped, "Ignoring fields outside the entity schema");
        }

        self.apply(&command, &message.exchange, message.message_id.as_deref())
            .await?;
        Ok(Disposition::Ack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::config::SyncQueue;
    use crate::entity::{ColumnValue, USER_DETAIL};
    use crate::outbox::codec::encode_body;

    struct NoStore;

    #[async_trait]
    impl EntityStore for NoStore {
        async fn init(&self) -> crate::storage::Result<()> {
            Ok(())
        }

        async fn create_or_log_conflict(
            &self,
            _row: &EntityRow,
            _conflict: &ConflictLog,
        ) -> crate::storage::Result<CreateOutcome> {
            unimplemented!()
        }

        async fn update(&self, _row: &EntityRow) -> crate::storage::Result<u64> {
            unimplemented!()
        }

        async fn find(&self, _natural_key: &str) -> crate::storage::Result<Option<EntityRow>> {
            unimplemented!()
        }

        async fn conflicts_for(&self, _message_id: &str) -> crate::storage::Result<Vec<ConflictLog>> {
            unimplemented!()
        }
    }

    fn consumer() -> SyncConsumer {
        let config = SyncConfig::default();
        SyncConsumer::new(Arc::new(NoStore), &USER_DETAIL, config.strip_fields)
    }

    fn wire(payload: Value) -> Vec<u8> {
        encode_body(&payload.to_string()).unwrap()
    }

    #[test]
    fn test_parse_create_event_strips_fields() {
        let body = wire(json!({
            "username": "alice",
            "email": "alice@example.com",
            "is_created": true,
            "college_id": 3,
            "user_code": "A-1",
        }));

        let command = consumer().parse(&body).unwrap();
        assert!(command.is_created);
        assert_eq!(command.row.natural_key, "alice");
        assert!(command.dropped.is_empty());

        let raw: Value = serde_json::from_str(&command.raw_payload).unwrap();
        assert_eq!(raw, json!({"username": "alice", "email": "alice@example.com"}));
    }

    #[test]
    fn test_parse_marker_truthiness() {
        let consumer = consumer();
        for (marker, expected) in [
            (json!(true), true),
            (json!(1), true),
            (json!("True"), true),
            (json!(false), false),
            (json!(0), false),
            (json!(null), false),
        ] {
            let body = wire(json!({"username": "bob", "is_created": marker}));
            assert_eq!(consumer.parse(&body).unwrap().is_created, expected);
        }

        let missing = wire(json!({"username": "bob"}));
        assert!(!consumer.parse(&missing).unwrap().is_created);

        let ambiguous = wire(json!({"username": "bob", "is_created": "sometimes"}));
        assert!(consumer.parse(&ambiguous).is_err());
    }

    #[test]
    fn test_parse_reports_unknown_fields() {
        let body = wire(json!({"username": "bob", "is_created": false, "id": 9, "is_staff": "1"}));
        let command = consumer().parse(&body).unwrap();
        assert_eq!(command.dropped, vec!["id"]);
        assert_eq!(
            command.row.get("is_staff"),
            Some(&ColumnValue::Boolean(Some(true)))
        );
    }

    #[tokio::test]
    async fn test_malformed_message_is_rejected() {
        let consumer = consumer();
        for body in [
            b"not json".to_vec(),
            br#"{"username": "alice"}"#.to_vec(),
            wire(json!({"email": "no-key@example.com"})),
        ] {
            let message = InboundMessage {
                message_id: Some("m-1".to_string()),
                exchange: "drf_exchange".to_string(),
                routing_key: String::new(),
                body,
                redelivered: false,
            };
            assert_eq!(consumer.handle(&message).await.unwrap(), Disposition::Reject);
        }
    }

    #[test]
    fn test_change_event() {
        let mut fields = Map::new();
        fields.insert("username".to_string(), json!("carol"));

        let event = change_event(fields, true);
        assert_eq!(event, json!({"username": "carol", "is_created": true}));
    }

    #[test]
    fn test_queue_bindings() {
        let bindings = SyncConsumer::queue_bindings(&SyncConfig::default()).unwrap();
        assert_eq!(
            bindings,
            vec![QueueBinding::with_deadletter("drf_queue", "drf_exchange_DLX")]
        );

        let mixed = SyncConfig {
            queues: vec![SyncQueue::new("Users_Queue", "Users_Exchange_DLX")],
            ..Default::default()
        };
        assert_eq!(
            SyncConsumer::queue_bindings(&mixed).unwrap(),
            vec![QueueBinding::with_deadletter("Users_Queue", "Users_Exchange_DLX")]
        );

        let empty = SyncConfig {
            queues: Vec::new(),
            ..Default::default()
        };
        assert!(SyncConsumer::queue_bindings(&empty).is_err());
    }
}
