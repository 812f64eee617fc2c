//! Mock publisher for testing.

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{BrokerError, MessagePublisher, OutboundMessage, Result};

/// How the mock fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    /// Broker unreachable; nothing is attempted.
    Connection,
    /// Error inside the broker transaction.
    Publish,
}

/// Mock publisher recording every committed message.
#[derive(Default)]
pub struct MockPublisher {
    published: RwLock<Vec<OutboundMessage>>,
    failure: RwLock<Option<MockFailure>>,
}

impl MockPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_failure(&self, failure: Option<MockFailure>) {
        *self.failure.write().await = failure;
    }

    pub async fn published_count(&self) -> usize {
        self.published.read().await.len()
    }

    pub async fn take_published(&self) -> Vec<OutboundMessage> {
        std::mem::take(&mut *self.published.write().await)
    }
}

#[async_trait]
impl MessagePublisher for MockPublisher {
    async fn publish(&self, message: &OutboundMessage) -> Result<()> {
        match *self.failure.read().await {
            Some(MockFailure::Connection) => {
                Err(BrokerError::Connection("Mock broker unreachable".to_string()))
            }
            Some(MockFailure::Publish) => {
                Err(BrokerError::Publish("Mock publish failure".to_string()))
            }
            None => {
                self.published.write().await.push(message.clone());
                Ok(())
            }
        }
    }
}
