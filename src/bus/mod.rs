//! Event Bus Adapter
//!
//! Typed publish/subscribe glue between the saga, the payment engine and
//! downstream consumers. The adapter guarantees at-least-once delivery
//! and per-partition FIFO; consumer groups have independent cursors; a
//! message that cannot be processed is parked in a dead-letter queue
//! without blocking its partition.
//!
//! Producers go through [`publisher::RetryingPublisher`] (bounded
//! exponential backoff on transport errors) or the durable outbox.

pub mod memory;
pub mod publisher;

pub use memory::{BusConfig, DeadLetter, MemoryBus};
pub use publisher::RetryingPublisher;

use async_trait::async_trait;
use thiserror::Error;

use crate::events::Topic;

/// Bus error types
#[derive(Error, Debug, Clone)]
pub enum BusError {
    #[error("Bus unavailable: {0}")]
    Unavailable(String),

    #[error("Payload encoding failed: {0}")]
    Encode(String),
}

/// Consumer-side disposition for one message
#[derive(Error, Debug, Clone)]
pub enum ConsumeError {
    /// Redeliver with backoff; parked in the DLQ after the attempt cap.
    #[error("Transient consume failure: {0}")]
    Transient(String),

    /// Park immediately (e.g. a payload that will never deserialise).
    #[error("Fatal consume failure: {0}")]
    Fatal(String),
}

/// One message as delivered to a consumer
#[derive(Debug, Clone)]
pub struct Envelope {
    pub topic: Topic,
    /// Partition key; `bookingId` for every core topic.
    pub key: String,
    /// Raw JSON payload.
    pub payload: String,
}

/// Producer side of the bus
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, topic: Topic, key: &str, payload: String) -> Result<(), BusError>;
}

/// Consumer callback
///
/// Implementations must be idempotent: redelivery of an already-applied
/// message has to be observable as a no-op.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, envelope: &Envelope) -> Result<(), ConsumeError>;
}
