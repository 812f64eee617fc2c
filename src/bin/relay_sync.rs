//! relay-sync: Sync consumer daemon
//!
//! Consumes the configured sync queues and applies entity change events to
//! the `user_detail` table, logging create conflicts to
//! `conflicting_user_sync_log`.
//!
//! ## Configuration
//! - `storage.*`: entity database
//! - `broker.*`: RabbitMQ connection
//! - `sync.queues`: list of `{queue, deadletter_exchange}` entries
//! - `sync.strip_fields`: payload keys dropped before persistence
//! - `sync.prefetch_count`, `sync.reconnect_interval_secs`

use std::sync::Arc;

use tracing::{error, info};

use outbox_relay::broker::BrokerGateway;
use outbox_relay::config::Config;
use outbox_relay::entity::USER_DETAIL;
use outbox_relay::storage::connect_entity;
use outbox_relay::sync::SyncConsumer;
use outbox_relay::utils::bootstrap::{connect_with_retry, init_tracing, parse_config_path};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config_path = parse_config_path();
    let config = Config::load(config_path.as_deref()).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!("Starting relay-sync");

    let interval = config.sync.reconnect_interval();
    let store = connect_with_retry("database", &config.storage.endpoint(), interval, || {
        connect_entity(&config.storage, &USER_DETAIL)
    })
    .await;

    let gateway = BrokerGateway::new(&config.broker)?;
    let consumer = Arc::new(SyncConsumer::new(
        store,
        &USER_DETAIL,
        config.sync.strip_fields.clone(),
    ));

    tokio::select! {
        result = consumer.run(gateway, config.sync.clone()) => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
        }
    }

    Ok(())
}
