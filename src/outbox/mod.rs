//! Outbox record model.
//!
//! An outbox row is the durable intent to publish one message. The
//! originating business transaction inserts it as `pending`; afterwards only
//! the producer (status, error text) and the dead-letter consumer (status)
//! touch it. Rows are never deleted here.
//!
//! ```text
//! pending ──► published
//!    │            ▲
//!    ▼            │
//!  error ─────────┘   (retried every poll cycle)
//!
//! any ──► expired     (dead-letter consumer, by message_id)
//! ```

pub mod codec;

use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

/// Default time-to-live before the broker dead-letters an unconsumed message (7 days).
pub const DEFAULT_EXPIRATION_SECS: i64 = 7 * 24 * 60 * 60;

/// Suffix of the conventional dead-letter queue name.
pub const DEADLETTER_QUEUE_SUFFIX: &str = "_DLQ";

/// Suffix of the conventional dead-letter exchange name.
pub const DEADLETTER_EXCHANGE_SUFFIX: &str = "_DLX";

/// Publication state of an outbox row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboxStatus {
    Pending,
    Published,
    Error,
    Expired,
}

impl OutboxStatus {
    /// Statuses the producer picks up on every poll.
    pub const PUBLISHABLE: [OutboxStatus; 3] = [
        OutboxStatus::Pending,
        OutboxStatus::Error,
        OutboxStatus::Expired,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "pending",
            OutboxStatus::Published => "published",
            OutboxStatus::Error => "error",
            OutboxStatus::Expired => "expired",
        }
    }

    pub fn is_publishable(&self) -> bool {
        !matches!(self, OutboxStatus::Published)
    }
}

impl fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutboxStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OutboxStatus::Pending),
            "published" => Ok(OutboxStatus::Published),
            "error" => Ok(OutboxStatus::Error),
            "expired" => Ok(OutboxStatus::Expired),
            other => Err(format!("unknown outbox status '{}'", other)),
        }
    }
}

/// AMQP delivery mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeliveryMode {
    Transient,
    #[default]
    Persistent,
}

impl DeliveryMode {
    /// Wire value of the `delivery_mode` property.
    pub fn code(&self) -> u8 {
        match self {
            DeliveryMode::Transient => 1,
            DeliveryMode::Persistent => 2,
        }
    }

    /// Decode a stored value. Anything other than 1 is persistent.
    pub fn from_code(code: i64) -> Self {
        if code == 1 {
            DeliveryMode::Transient
        } else {
            DeliveryMode::Persistent
        }
    }
}

/// Routing targets of a message and its dead-letter path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub queue_name: String,
    pub exchange_name: String,
    pub deadletter_queue_name: String,
    pub deadletter_exchange_name: String,
}

impl Route {
    pub fn new(
        queue_name: impl Into<String>,
        exchange_name: impl Into<String>,
        deadletter_queue_name: impl Into<String>,
        deadletter_exchange_name: impl Into<String>,
    ) -> Self {
        Self {
            queue_name: queue_name.into(),
            exchange_name: exchange_name.into(),
            deadletter_queue_name: deadletter_queue_name.into(),
            deadletter_exchange_name: deadletter_exchange_name.into(),
        }
    }

    /// Route whose dead-letter names follow the `{queue}_DLQ` / `{exchange}_DLX` convention.
    pub fn with_default_deadletter(
        queue_name: impl Into<String>,
        exchange_name: impl Into<String>,
    ) -> Self {
        let queue_name = queue_name.into();
        let exchange_name = exchange_name.into();
        Self {
            deadletter_queue_name: format!("{}{}", queue_name, DEADLETTER_QUEUE_SUFFIX),
            deadletter_exchange_name: format!("{}{}", exchange_name, DEADLETTER_EXCHANGE_SUFFIX),
            queue_name,
            exchange_name,
        }
    }
}

/// A stored outbox row.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboxRecord {
    pub id: i64,
    pub route: Route,
    /// JSON text of the message body, as stored.
    pub message_body: String,
    pub delivery_mode: DeliveryMode,
    pub expiration_secs: i64,
    pub message_id: String,
    pub status: OutboxStatus,
    pub error_msg: String,
    /// Creation time (RFC 3339), assigned by the store.
    pub timestamp: String,
}

impl OutboxRecord {
    /// Broker `expiration` property: milliseconds as a decimal string.
    pub fn expiration_ms(&self) -> String {
        (self.expiration_secs.max(0).saturating_mul(1000)).to_string()
    }
}

/// Outbox row to be inserted by the application.
#[derive(Debug, Clone)]
pub struct NewOutboxRecord {
    pub route: Route,
    pub message_body: serde_json::Value,
    pub delivery_mode: DeliveryMode,
    pub expiration_secs: i64,
    /// Correlation key, fixed at creation.
    pub message_id: Uuid,
}

impl NewOutboxRecord {
    /// Persistent message with the default 7-day TTL and a fresh message id.
    pub fn new(route: Route, message_body: serde_json::Value) -> Self {
        Self {
            route,
            message_body,
            delivery_mode: DeliveryMode::default(),
            expiration_secs: DEFAULT_EXPIRATION_SECS,
            message_id: Uuid::new_v4(),
        }
    }

    pub fn with_delivery_mode(mut self, delivery_mode: DeliveryMode) -> Self {
        self.delivery_mode = delivery_mode;
        self
    }

    pub fn with_expiration_secs(mut self, expiration_secs: i64) -> Self {
        self.expiration_secs = expiration_secs;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_parse() {
        for status in [
            OutboxStatus::Pending,
            OutboxStatus::Published,
            OutboxStatus::Error,
            OutboxStatus::Expired,
        ] {
            assert_eq!(status.as_str().parse::<OutboxStatus>(), Ok(status));
        }
        assert!("sent".parse::<OutboxStatus>().is_err());
    }

    #[test]
    fn test_publishable_statuses() {
        assert!(OutboxStatus::Pending.is_publishable());
        assert!(OutboxStatus::Error.is_publishable());
        assert!(OutboxStatus::Expired.is_publishable());
        assert!(!OutboxStatus::Published.is_publishable());
        assert!(!OutboxStatus::PUBLISHABLE.contains(&OutboxStatus::Published));
    }

    #[test]
    fn test_delivery_mode_codes() {
        assert_eq!(DeliveryMode::default(), DeliveryMode::Persistent);
        assert_eq!(DeliveryMode::Persistent.code(), 2);
        assert_eq!(DeliveryMode::from_code(1), DeliveryMode::Transient);
        assert_eq!(DeliveryMode::from_code(2), DeliveryMode::Persistent);
        assert_eq!(DeliveryMode::from_code(0), DeliveryMode::Persistent);
    }

    #[test]
    fn test_route_with_default_deadletter() {
        let route = Route::with_default_deadletter("user_sync", "user_exchange");
        assert_eq!(route.deadletter_queue_name, "user_sync_DLQ");
        assert_eq!(route.deadletter_exchange_name, "user_exchange_DLX");
    }

    #[test]
    fn test_new_record_defaults() {
        let record = NewOutboxRecord::new(Route::new("Q1", "E1", "Q1_DLQ", "E1_DLX"), json!({"a": 1}));
        assert_eq!(record.delivery_mode, DeliveryMode::Persistent);
        assert_eq!(record.expiration_secs, 604_800);

        let other = NewOutboxRecord::new(record.route.clone(), json!({"a": 1}));
        assert_ne!(record.message_id, other.message_id);
    }

    #[test]
    fn test_expiration_ms() {
        let record = OutboxRecord {
            id: 1,
            route: Route::new("Q1", "E1", "Q1_DLQ", "E1_DLX"),
            message_body: "{}".to_string(),
            delivery_mode: DeliveryMode::Persistent,
            expiration_secs: 604_800,
            message_id: "m".to_string(),
            status: OutboxStatus::Pending,
            error_msg: String::new(),
            timestamp: String::new(),
        };
        assert_eq!(record.expiration_ms(), "604800000");

        let negative = OutboxRecord {
            expiration_secs: -5,
            ..record
        };
        assert_eq!(negative.expiration_ms(), "0");
    }
}
