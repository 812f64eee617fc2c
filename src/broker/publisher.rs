//! Transactional AMQP publisher.

use async_trait::async_trait;
use lapin::{options::BasicPublishOptions, Channel};
use tracing::{debug, error, warn};

use super::{BrokerError, BrokerGateway, MessagePublisher, OutboundMessage, Result};

/// Publishes each message on its own channel inside an AMQP transaction.
///
/// The channel is closed afterwards whatever the outcome.
pub struct AmqpPublisher {
    gateway: BrokerGateway,
}

impl AmqpPublisher {
    pub fn new(gateway: BrokerGateway) -> Self {
        Self { gateway }
    }

    async fn publish_in_tx(channel: &Channel, message: &OutboundMessage) -> lapin::Result<()> {
        channel.tx_select().await?;
        BrokerGateway::declare_route(channel, &message.route).await?;

        channel
            .basic_publish(
                &message.route.exchange_name,
                "",
                BasicPublishOptions::default(),
                &message.body,
                message.properties(),
            )
            .await?
            .await?;

        channel.tx_commit().await
    }
}

#[async_trait]
impl MessagePublisher for AmqpPublisher {
    #[tracing::instrument(name = "broker.publish", skip_all, fields(message_id = %message.message_id))]
    async fn publish(&self, message: &OutboundMessage) -> Result<()> {
        let channel = self.gateway.channel().await?;

        let outcome = Self::publish_in_tx(&channel, message).await;
        if let Err(e) = &outcome {
            if let Err(rollback) = channel.tx_rollback().await {
                warn!(error = %rollback, "Transaction rollback failed");
            }
            error!(error = %e, "Publish failed, transaction rolled back");
        } else {
            debug!(
                exchange = %message.route.exchange_name,
                queue = %message.route.queue_name,
                "Published message"
            );
        }

        if let Err(e) = channel.close(200, "OK").await {
            debug!(error = %e, "Channel close failed");
        }

        outcome.map_err(|e| BrokerError::Publish(e.to_string()))
    }
}
