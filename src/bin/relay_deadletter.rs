//! relay-deadletter: Dead-letter consumer daemon
//!
//! Consumes every dead-letter queue recorded in the outbox and marks the
//! matching outbox rows `expired`.
//!
//! ## Configuration
//! - `storage.*`: outbox database
//! - `broker.*`: RabbitMQ connection
//! - `deadletter.prefetch_count`: unacknowledged deliveries (default 1)
//! - `deadletter.reconnect_interval_secs`: reconnect delay (default 10)
//!
//! The queue set is read once at startup. If the database is unreachable then,
//! the process exits and must be restarted after the database recovers.

use std::sync::Arc;

use tracing::{error, info};

use outbox_relay::broker::BrokerGateway;
use outbox_relay::config::Config;
use outbox_relay::deadletter::DeadLetterConsumer;
use outbox_relay::storage::connect_outbox;
use outbox_relay::utils::bootstrap::{init_tracing, parse_config_path};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config_path = parse_config_path();
    let config = Config::load(config_path.as_deref()).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!("Starting relay-deadletter");

    let store = connect_outbox(&config.storage).await.map_err(|e| {
        error!(error = %e, "Outbox database unavailable at startup");
        e
    })?;

    let consumer = Arc::new(DeadLetterConsumer::new(store));
    let queues = consumer.discover_queues().await.map_err(|e| {
        error!(error = %e, "Failed to discover dead-letter queues");
        e
    })?;

    let gateway = BrokerGateway::new(&config.broker)?;

    tokio::select! {
        _ = consumer.run(gateway, queues, config.deadletter.clone()) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
        }
    }

    Ok(())
}
