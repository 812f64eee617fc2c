//! Crate-level error type.

use crate::broker::BrokerError;
use crate::outbox::codec::PayloadError;
use crate::storage::StoreError;

/// Result type for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;

/// Errors surfaced by the producer and consumers.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("Payload error: {0}")]
    Payload(#[from] PayloadError),

    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),

    #[error("No {0} queues to consume")]
    NoQueues(&'static str),
}

impl RelayError {
    /// Whether the error means the broker could not be reached at all.
    pub fn is_connection(&self) -> bool {
        matches!(self, RelayError::Broker(BrokerError::Connection(_)))
    }
}
