//! Outbox Relay
//!
//! Durable handoff between a relational outbox table and an AMQP broker.
//! Three daemons share this library:
//!
//! - `relay-producer`: drains `pending`/`error`/`expired` outbox rows and
//!   publishes each one inside a broker transaction.
//! - `relay-deadletter`: marks outbox rows `expired` when their message comes
//!   back through a dead-letter queue.
//! - `relay-sync`: applies inbound entity change events to the entity store,
//!   logging conflicts instead of overwriting.

pub mod broker;
pub mod config;
pub mod deadletter;
pub mod entity;
pub mod error;
pub mod outbox;
pub mod producer;
pub mod storage;
pub mod sync;
pub mod utils;

pub use error::{RelayError, Result};
