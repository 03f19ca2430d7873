pub mod memory;
pub mod message;
pub mod pool;

pub use memory::MemoryBroker;
pub use message::{DeadLetter, JobMessage};
pub use pool::RedisBroker;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Broker connection failed: {0}")]
    Connection(String),
    #[error("Broker command `{op}` failed: {message}")]
    Command { op: &'static str, message: String },
    #[error("Failed to encode job: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("Unknown delivery {0}")]
    UnknownDelivery(u64),
}

/// Result of a publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Published,
    /// The message id was already published inside the dedup window; nothing
    /// new was enqueued.
    Duplicate,
}

/// One message handed to a consumer and not yet settled.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub queue: String,
    pub consumer: String,
    pub body: String,
    pub tag: u64,
}

impl Delivery {
    pub fn job(&self) -> Result<JobMessage, serde_json::Error> {
        JobMessage::from_body(&self.body)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueDepth {
    pub ready: u64,
    pub dead: u64,
}

/// Durable, at-least-once job queue with manual acknowledgment.
///
/// Every delivery returned by [`Broker::receive`] must be settled exactly
/// once with `ack`, `nack`, `retry` or `dead_letter`. Unsettled deliveries
/// survive a crash and are put back by [`Broker::recover_unacked`].
#[async_trait]
pub trait Broker: Send + Sync + 'static {
    /// Enqueues a job. A transport failure triggers exactly one
    /// reconnect-and-retry; the message id keeps the retry from enqueueing
    /// a second copy when the first attempt actually landed.
    async fn publish(&self, queue: &str, job: &JobMessage) -> Result<PublishOutcome, BrokerError>;

    /// Waits up to `timeout` for the next message on `queue`.
    async fn receive(
        &self,
        queue: &str,
        consumer: &str,
        timeout: Duration,
    ) -> Result<Option<Delivery>, BrokerError>;

    async fn ack(&self, delivery: &Delivery) -> Result<(), BrokerError>;

    /// Negative acknowledgment. With `requeue` the message goes back to the
    /// front of the queue, otherwise it is discarded.
    async fn nack(&self, delivery: &Delivery, requeue: bool) -> Result<(), BrokerError>;

    /// Settles `delivery` and enqueues `job` (normally its next attempt) at
    /// the back of the same queue, atomically.
    async fn retry(&self, delivery: &Delivery, job: &JobMessage) -> Result<(), BrokerError>;

    /// Settles `delivery` and parks it on the queue's dead-letter list.
    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> Result<(), BrokerError>;

    /// Returns a consumer's unsettled deliveries to the front of the queue.
    async fn recover_unacked(&self, queue: &str, consumer: &str) -> Result<usize, BrokerError>;

    /// Moves every dead letter of `queue` back onto it with a fresh retry budget.
    async fn requeue_dead(&self, queue: &str) -> Result<usize, BrokerError>;

    async fn depth(&self, queue: &str) -> Result<QueueDepth, BrokerError>;

    async fn health_check(&self) -> Result<(), BrokerError>;

    async fn close(&self);
}
