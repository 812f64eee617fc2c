//! Pooled AMQP connections and topology declaration.

use deadpool_lapin::{Manager, Pool, PoolError};
use lapin::{
    options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions},
    types::{AMQPValue, FieldTable},
    Channel, ExchangeKind,
};
use tracing::debug;

use super::{BrokerError, Result};
use crate::config::BrokerConfig;
use crate::outbox::Route;

/// Queue argument naming the exchange that receives expired or rejected messages.
pub const DEAD_LETTER_EXCHANGE_ARG: &str = "x-dead-letter-exchange";

/// A durable queue to declare, optionally dead-lettering to an exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueBinding {
    pub queue: String,
    pub deadletter_exchange: Option<String>,
}

impl QueueBinding {
    pub fn plain(queue: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            deadletter_exchange: None,
        }
    }

    pub fn with_deadletter(queue: impl Into<String>, exchange: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            deadletter_exchange: Some(exchange.into()),
        }
    }

    fn arguments(&self) -> FieldTable {
        let mut arguments = FieldTable::default();
        if let Some(exchange) = &self.deadletter_exchange {
            arguments.insert(
                DEAD_LETTER_EXCHANGE_ARG.into(),
                AMQPValue::LongString(exchange.as_str().into()),
            );
        }
        arguments
    }
}

/// Thin wrapper over a lapin connection pool.
///
/// Building the gateway does not connect; connections are opened on first
/// use and re-opened by the pool after they drop.
#[derive(Clone)]
pub struct BrokerGateway {
    pool: Pool,
    endpoint: String,
}

impl BrokerGateway {
    pub fn new(config: &BrokerConfig) -> Result<Self> {
        let manager = Manager::new(config.amqp_url(), Default::default());
        let pool = Pool::builder(manager)
            .max_size(config.pool_size.max(1))
            .build()
            .map_err(|e| BrokerError::Connection(format!("Failed to create pool: {}", e)))?;

        Ok(Self {
            pool,
            endpoint: config.endpoint(),
        })
    }

    /// Broker address without credentials, for logs.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Open a fresh channel on a pooled connection.
    pub async fn channel(&self) -> Result<Channel> {
        let conn = self.pool.get().await.map_err(|e: PoolError| {
            BrokerError::Connection(format!("Failed to get connection from pool: {}", e))
        })?;

        conn.create_channel()
            .await
            .map_err(|e| BrokerError::Connection(format!("Failed to create channel: {}", e)))
    }

    /// Declare a durable queue with its dead-letter argument.
    pub async fn declare_queue(channel: &Channel, binding: &QueueBinding) -> lapin::Result<()> {
        channel
            .queue_declare(
                &binding.queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                binding.arguments(),
            )
            .await?;
        Ok(())
    }

    /// Declare the full topology of a route.
    ///
    /// Order: dead-letter queue, dead-letter exchange and their binding, then
    /// the target queue (dead-lettering to the DLX), target exchange and their
    /// binding. Both bindings use the empty routing key. Every declaration is
    /// idempotent as long as the existing entities have the same arguments.
    pub async fn declare_route(channel: &Channel, route: &Route) -> lapin::Result<()> {
        Self::declare_queue(channel, &QueueBinding::plain(&route.deadletter_queue_name)).await?;
        Self::declare_direct_exchange(channel, &route.deadletter_exchange_name).await?;
        channel
            .queue_bind(
                &route.deadletter_queue_name,
                &route.deadletter_exchange_name,
                "",
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;

        Self::declare_queue(
            channel,
            &QueueBinding::with_deadletter(&route.queue_name, &route.deadletter_exchange_name),
        )
        .await?;
        Self::declare_direct_exchange(channel, &route.exchange_name).await?;
        channel
            .queue_bind(
                &route.queue_name,
                &route.exchange_name,
                "",
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;

        debug!(
            queue = %route.queue_name,
            exchange = %route.exchange_name,
            dlq = %route.deadletter_queue_name,
            dlx = %route.deadletter_exchange_name,
            "Declared route"
        );
        Ok(())
    }

    /// Exchanges are declared non-durable, matching the emitting application.
    async fn declare_direct_exchange(channel: &Channel, exchange: &str) -> lapin::Result<()> {
        channel
            .exchange_declare(
                exchange,
                ExchangeKind::Direct,
                ExchangeDeclareOptions::default(),
                FieldTable::default(),
            )
            .await
    }
}
