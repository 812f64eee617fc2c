//! Per-component settings for the producer and the two consumers.

use std::time::Duration;

use serde::Deserialize;

/// Fixed interval shared by polling and every reconnect loop.
pub const DEFAULT_INTERVAL_SECS: u64 = 10;

/// Producer poll loop configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProducerConfig {
    /// Seconds between outbox polls, also used as the reconnect delay.
    pub poll_interval_secs: u64,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: DEFAULT_INTERVAL_SECS,
        }
    }
}

impl ProducerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Dead-letter consumer configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeadLetterConfig {
    /// Maximum unacknowledged deliveries per consumer.
    pub prefetch_count: u16,
    /// Seconds to wait before reconnecting after the consume loop exits.
    pub reconnect_interval_secs: u64,
}

impl Default for DeadLetterConfig {
    fn default() -> Self {
        Self {
            prefetch_count: 1,
            reconnect_interval_secs: DEFAULT_INTERVAL_SECS,
        }
    }
}

impl DeadLetterConfig {
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_secs(self.reconnect_interval_secs)
    }
}

/// A sync queue and the exchange its rejected messages dead-letter to.
///
/// Listed as entries rather than a map: configuration map keys are
/// lowercased on load, and queue names are case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SyncQueue {
    pub queue: String,
    pub deadletter_exchange: String,
}

impl SyncQueue {
    pub fn new(queue: impl Into<String>, deadletter_exchange: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            deadletter_exchange: deadletter_exchange.into(),
        }
    }
}

/// Sync consumer configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Maximum unacknowledged deliveries per consumer.
    pub prefetch_count: u16,
    /// Seconds to wait before reconnecting after the consume loop exits.
    pub reconnect_interval_secs: u64,
    /// Sync queues to consume.
    pub queues: Vec<SyncQueue>,
    /// Payload keys removed before persistence.
    pub strip_fields: Vec<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            prefetch_count: 1,
            reconnect_interval_secs: DEFAULT_INTERVAL_SECS,
            queues: vec![SyncQueue::new("drf_queue", "drf_exchange_DLX")],
            strip_fields: vec!["college_id".to_string(), "user_code".to_string()],
        }
    }
}

impl SyncConfig {
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_secs(self.reconnect_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_config_default() {
        let config = SyncConfig::default();
        assert_eq!(
            config.queues,
            vec![SyncQueue::new("drf_queue", "drf_exchange_DLX")]
        );
        assert_eq!(config.strip_fields, vec!["college_id", "user_code"]);
        assert_eq!(config.reconnect_interval(), Duration::from_secs(10));
    }
}
