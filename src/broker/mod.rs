//! Message broker access.
//!
//! This module contains:
//! - `BrokerGateway`: pooled AMQP connections and topology declaration
//! - `MessagePublisher` trait: transactional publish of one outbox record
//! - `DeliveryHandler` trait: per-message callback for consumers
//! - `consume`: one consumer session over a set of queues
//! - Implementations: AMQP (RabbitMQ), Mock

use async_trait::async_trait;
use lapin::BasicProperties;

use crate::error::RelayError;
use crate::outbox::codec::{encode_body, PayloadError};
use crate::outbox::{DeliveryMode, OutboxRecord, Route};

pub mod consumer;
pub mod gateway;
pub mod mock;
pub mod publisher;

pub use consumer::consume;
pub use gateway::{BrokerGateway, QueueBinding};
pub use mock::{MockFailure, MockPublisher};
pub use publisher::AmqpPublisher;

/// Content type of every relayed message.
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Result type for broker operations.
pub type Result<T> = std::result::Result<T, BrokerError>;

/// Errors that can occur during broker operations.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// No usable connection or channel. Nothing was sent.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Failure inside the broker transaction, which was rolled back.
    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Subscribe failed: {0}")]
    Subscribe(String),
}

/// A message ready to publish, derived from an outbox record.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub route: Route,
    /// Wire body (double-encoded JSON).
    pub body: Vec<u8>,
    pub delivery_mode: DeliveryMode,
    pub message_id: String,
    /// Time-to-live in milliseconds, as a decimal string.
    pub expiration: String,
}

impl OutboundMessage {
    pub fn from_record(record: &OutboxRecord) -> std::result::Result<Self, PayloadError> {
        Ok(Self {
            route: record.route.clone(),
            body: encode_body(&record.message_body)?,
            delivery_mode: record.delivery_mode,
            message_id: record.message_id.clone(),
            expiration: record.expiration_ms(),
        })
    }

    /// AMQP message properties.
    pub fn properties(&self) -> BasicProperties {
        BasicProperties::default()
            .with_content_type(CONTENT_TYPE_JSON.into())
            .with_delivery_mode(self.delivery_mode.code())
            .with_message_id(self.message_id.as_str().into())
            .with_expiration(self.expiration.as_str().into())
    }
}

/// A delivery handed to a [`DeliveryHandler`].
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// The `message_id` property, if the publisher set one.
    pub message_id: Option<String>,
    /// Exchange the message was last routed through.
    pub exchange: String,
    pub routing_key: String,
    pub body: Vec<u8>,
    pub redelivered: bool,
}

impl InboundMessage {
    pub fn from_delivery(delivery: &lapin::message::Delivery) -> Self {
        Self {
            message_id: delivery
                .properties
                .message_id()
                .as_ref()
                .map(|id| id.as_str().to_string()),
            exchange: delivery.exchange.as_str().to_string(),
            routing_key: delivery.routing_key.as_str().to_string(),
            body: delivery.data.clone(),
            redelivered: delivery.redelivered,
        }
    }
}

/// How a handled delivery is settled with the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Processed; remove from the queue.
    Ack,
    /// Poison message; reject without requeue so the queue's dead-letter
    /// exchange takes it.
    Reject,
}

/// Publishes one outbound message inside a broker transaction.
///
/// Implementations:
/// - `AmqpPublisher`: RabbitMQ via AMQP
/// - `MockPublisher`: In-memory mock for testing
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    /// Declare the message's route and publish it.
    ///
    /// Returns only after the broker transaction committed. On
    /// `BrokerError::Publish` it was rolled back.
    async fn publish(&self, message: &OutboundMessage) -> Result<()>;
}

/// Processes one delivery at a time for a consumer session.
///
/// An `Err` aborts the session without settling the delivery, so the broker
/// redelivers it after reconnect.
#[async_trait]
pub trait DeliveryHandler: Send + Sync {
    async fn handle(&self, message: &InboundMessage) -> std::result::Result<Disposition, RelayError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbox::OutboxStatus;

    fn record() -> OutboxRecord {
        OutboxRecord {
            id: 7,
            route: Route::new("Q1", "E1", "Q1_DLQ", "E1_DLX"),
            message_body: r#"{"a":1}"#.to_string(),
            delivery_mode: DeliveryMode::Persistent,
            expiration_secs: 1,
            message_id: "4f1c7a52-0000-4000-8000-000000000001".to_string(),
            status: OutboxStatus::Pending,
            error_msg: String::new(),
            timestamp: String::new(),
        }
    }

    #[test]
    fn test_outbound_message_from_record() {
        let message = OutboundMessage::from_record(&record()).unwrap();
        assert_eq!(message.body, br#""{\"a\":1}""#.to_vec());
        assert_eq!(message.expiration, "1000");
        assert_eq!(message.route.exchange_name, "E1");
    }

    #[test]
    fn test_outbound_message_properties() {
        let message = OutboundMessage::from_record(&record()).unwrap();
        let properties = message.properties();

        assert_eq!(
            properties.content_type().as_ref().map(|s| s.as_str()),
            Some("application/json")
        );
        assert_eq!(*properties.delivery_mode(), Some(2));
        assert_eq!(
            properties.message_id().as_ref().map(|s| s.as_str()),
            Some("4f1c7a52-0000-4000-8000-000000000001")
        );
        assert_eq!(
            properties.expiration().as_ref().map(|s| s.as_str()),
            Some("1000")
        );
    }
}
