//! relay-producer: Outbox producer daemon
//!
//! Polls `queue_publish_history` for `pending`, `error` and `expired` rows and
//! publishes each one to its exchange inside an AMQP transaction.
//!
//! ## Configuration
//! - `storage.*`: outbox database
//! - `broker.*`: RabbitMQ connection
//! - `producer.poll_interval_secs`: poll and reconnect interval (default 10)
//!
//! Database and broker outages are retried at the poll interval, forever.

use std::sync::Arc;

use tracing::{error, info};

use outbox_relay::broker::{AmqpPublisher, BrokerGateway};
use outbox_relay::config::Config;
use outbox_relay::producer::Producer;
use outbox_relay::storage::connect_outbox;
use outbox_relay::utils::bootstrap::{connect_with_retry, init_tracing, parse_config_path};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config_path = parse_config_path();
    let config = Config::load(config_path.as_deref()).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!("Starting relay-producer");

    let interval = config.producer.poll_interval();
    let store = connect_with_retry("database", &config.storage.endpoint(), interval, || {
        connect_outbox(&config.storage)
    })
    .await;

    let gateway = BrokerGateway::new(&config.broker)?;
    info!(endpoint = %gateway.endpoint(), "Publishing to broker");

    let producer = Producer::new(store, Arc::new(AmqpPublisher::new(gateway)), interval);

    tokio::select! {
        _ = producer.run() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
        }
    }

    Ok(())
}
