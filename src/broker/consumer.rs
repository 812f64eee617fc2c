//! Consumer sessions.
//!
//! A session owns one channel: it declares the queues, sets the prefetch
//! window, subscribes to every queue and feeds deliveries to the handler one
//! at a time. It only returns on failure; the caller decides when to start
//! another.

use futures::StreamExt;
use lapin::{
    options::{BasicAckOptions, BasicConsumeOptions, BasicQosOptions, BasicRejectOptions},
    types::FieldTable,
};
use tracing::{debug, error, info, warn, Instrument};

use super::{BrokerError, BrokerGateway, DeliveryHandler, Disposition, InboundMessage, QueueBinding};
use crate::error::RelayError;

/// Run one consumer session until the connection drops or the handler fails.
///
/// Deliveries are settled exactly once, after the handler returns. A handler
/// error closes the channel with the delivery unsettled, so the broker
/// requeues it.
pub async fn consume(
    gateway: &BrokerGateway,
    bindings: &[QueueBinding],
    prefetch_count: u16,
    consumer_tag: &str,
    handler: &dyn DeliveryHandler,
) -> Result<(), RelayError> {
    if bindings.is_empty() {
        return Err(BrokerError::Subscribe("No queues to consume".to_string()).into());
    }

    let channel = gateway.channel().await?;

    for binding in bindings {
        BrokerGateway::declare_queue(&channel, binding)
            .await
            .map_err(|e| {
                BrokerError::Subscribe(format!(
                    "Failed to declare queue '{}': {}",
                    binding.queue, e
                ))
            })?;
    }

    channel
        .basic_qos(prefetch_count, BasicQosOptions::default())
        .await
        .map_err(|e| BrokerError::Subscribe(format!("Failed to set prefetch: {}", e)))?;

    let mut consumers = Vec::with_capacity(bindings.len());
    for binding in bindings {
        let consumer = channel
            .basic_consume(
                &binding.queue,
                &format!("{}-{}", consumer_tag, binding.queue),
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                BrokerError::Subscribe(format!(
                    "Failed to consume from '{}': {}",
                    binding.queue, e
                ))
            })?;
        consumers.push(consumer);
    }

    info!(
        endpoint = %gateway.endpoint(),
        queues = ?bindings.iter().map(|b| b.queue.as_str()).collect::<Vec<_>>(),
        prefetch_count,
        "Waiting for messages"
    );

    let mut deliveries = futures::stream::select_all(consumers);
    while let Some(delivery) = deliveries.next().await {
        let delivery = delivery
            .map_err(|e| BrokerError::Connection(format!("Consumer delivery error: {}", e)))?;
        let message = InboundMessage::from_delivery(&delivery);

        let span = tracing::info_span!(
            "broker.consume",
            routing_key = %message.routing_key,
            message_id = message.message_id.as_deref().unwrap_or(""),
        );

        let disposition = match handler.handle(&message).instrument(span).await {
            Ok(disposition) => disposition,
            Err(e) => {
                error!(error = %e, "Handler failed, closing channel for redelivery");
                if let Err(close) = channel.close(200, "handler failed").await {
                    warn!(error = %close, "Channel close failed");
                }
                return Err(e);
            }
        };

        match disposition {
            Disposition::Ack => delivery.ack(BasicAckOptions::default()).await,
            Disposition::Reject => {
                delivery
                    .reject(BasicRejectOptions { requeue: false })
                    .await
            }
        }
        .map_err(|e| BrokerError::Connection(format!("Failed to settle delivery: {}", e)))?;

        debug!(?disposition, "Delivery settled");
    }

    Err(BrokerError::Connection("Consumer stream ended".to_string()).into())
}
