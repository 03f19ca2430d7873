use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::{Broker, BrokerError, DeadLetter, Delivery, JobMessage, PublishOutcome, QueueDepth};

/// In-process broker with the same settlement contract as [`crate::RedisBroker`].
///
/// Used by the integration tests and by `vuko-worker run --in-memory` for local
/// runs without Redis. Publish faults can be injected to exercise the
/// reconnect-and-retry path, and depth faults to exercise health reporting.
#[derive(Default)]
pub struct MemoryBroker {
    state: Mutex<State>,
    notify: Notify,
}

#[derive(Default)]
struct State {
    ready: HashMap<String, VecDeque<String>>,
    unacked: HashMap<u64, Delivery>,
    dead: HashMap<String, Vec<DeadLetter>>,
    published_ids: HashSet<String>,
    next_tag: u64,
    faults: Faults,
    stats: BrokerStats,
}

#[derive(Default)]
struct Faults {
    /// Publishes that fail before anything is enqueued.
    fail_before: u32,
    /// Publishes that enqueue and then report a transport error.
    fail_after: u32,
    /// Depth queries that fail.
    fail_depth: u32,
}

/// Counters exposed for assertions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BrokerStats {
    pub publish_attempts: u32,
    pub reconnects: u32,
    pub acks: u32,
    pub nacks: u32,
    pub retries: u32,
    pub dead_letters: u32,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `n` publish attempts fail without enqueueing.
    pub fn fail_next_publishes(&self, n: u32) {
        self.state.lock().faults.fail_before = n;
    }

    /// The next `n` publish attempts enqueue and then report failure, as
    /// when the reply is lost on a dropped connection.
    pub fn fail_after_apply(&self, n: u32) {
        self.state.lock().faults.fail_after = n;
    }

    /// The next `n` depth queries fail.
    pub fn fail_next_depths(&self, n: u32) {
        self.state.lock().faults.fail_depth = n;
    }

    pub fn stats(&self) -> BrokerStats {
        self.state.lock().stats
    }

    /// Jobs waiting on `queue`, oldest first.
    pub fn ready_jobs(&self, queue: &str) -> Vec<JobMessage> {
        let state = self.state.lock();
        state
            .ready
            .get(queue)
            .map(|q| q.iter().rev().filter_map(|b| JobMessage::from_body(b).ok()).collect())
            .unwrap_or_default()
    }

    pub fn dead_letters(&self, queue: &str) -> Vec<DeadLetter> {
        self.state.lock().dead.get(queue).cloned().unwrap_or_default()
    }

    pub fn in_flight(&self) -> usize {
        self.state.lock().unacked.len()
    }

    /// Pushes a raw body, bypassing encoding and dedup.
    pub fn push_raw(&self, queue: &str, body: &str) {
        self.state
            .lock()
            .ready
            .entry(queue.to_string())
            .or_default()
            .push_front(body.to_string());
        self.notify.notify_waiters();
    }

    fn publish_attempt(&self, queue: &str, job: &JobMessage, body: &str) -> Result<PublishOutcome, BrokerError> {
        let mut state = self.state.lock();
        state.stats.publish_attempts += 1;

        if state.faults.fail_before > 0 {
            state.faults.fail_before -= 1;
            return Err(BrokerError::Connection("connection reset".to_string()));
        }

        let outcome = if state.published_ids.insert(job.message_id.clone()) {
            state
                .ready
                .entry(queue.to_string())
                .or_default()
                .push_front(body.to_string());
            PublishOutcome::Published
        } else {
            PublishOutcome::Duplicate
        };

        if state.faults.fail_after > 0 {
            state.faults.fail_after -= 1;
            return Err(BrokerError::Connection("connection reset after write".to_string()));
        }
        Ok(outcome)
    }

    fn settle(&self, delivery: &Delivery) -> Result<Delivery, BrokerError> {
        self.state
            .lock()
            .unacked
            .remove(&delivery.tag)
            .ok_or(BrokerError::UnknownDelivery(delivery.tag))
    }

    fn try_pop(&self, queue: &str, consumer: &str) -> Option<Delivery> {
        let mut state = self.state.lock();
        let body = state.ready.get_mut(queue)?.pop_back()?;
        state.next_tag += 1;
        let delivery = Delivery {
            queue: queue.to_string(),
            consumer: consumer.to_string(),
            body,
            tag: state.next_tag,
        };
        state.unacked.insert(delivery.tag, delivery.clone());
        Some(delivery)
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn publish(&self, queue: &str, job: &JobMessage) -> Result<PublishOutcome, BrokerError> {
        let body = job.to_body()?;
        let outcome = match self.publish_attempt(queue, job, &body) {
            Ok(outcome) => outcome,
            Err(error) => {
                warn!(queue, answer_id = job.answer_id, %error, "Publish failed, reconnecting and retrying once");
                self.state.lock().stats.reconnects += 1;
                self.publish_attempt(queue, job, &body)?
            }
        };
        self.notify.notify_waiters();
        debug!(queue, answer_id = job.answer_id, ?outcome, "Publish settled");
        Ok(outcome)
    }

    async fn receive(
        &self,
        queue: &str,
        consumer: &str,
        timeout: Duration,
    ) -> Result<Option<Delivery>, BrokerError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(delivery) = self.try_pop(queue, consumer) {
                return Ok(Some(delivery));
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), BrokerError> {
        self.settle(delivery)?;
        self.state.lock().stats.acks += 1;
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery, requeue: bool) -> Result<(), BrokerError> {
        let delivery = self.settle(delivery)?;
        let mut state = self.state.lock();
        state.stats.nacks += 1;
        if requeue {
            state
                .ready
                .entry(delivery.queue.clone())
                .or_default()
                .push_back(delivery.body);
            drop(state);
            self.notify.notify_waiters();
        }
        Ok(())
    }

    async fn retry(&self, delivery: &Delivery, job: &JobMessage) -> Result<(), BrokerError> {
        let body = job.to_body()?;
        let delivery = self.settle(delivery)?;
        {
            let mut state = self.state.lock();
            state.stats.retries += 1;
            state.ready.entry(delivery.queue).or_default().push_front(body);
        }
        self.notify.notify_waiters();
        Ok(())
    }

    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> Result<(), BrokerError> {
        let delivery = self.settle(delivery)?;
        let mut state = self.state.lock();
        state.stats.dead_letters += 1;
        state
            .dead
            .entry(delivery.queue.clone())
            .or_default()
            .push(DeadLetter::new(&delivery.queue, &delivery.body, reason));
        Ok(())
    }

    async fn recover_unacked(&self, queue: &str, consumer: &str) -> Result<usize, BrokerError> {
        let mut state = self.state.lock();
        let mut tags: Vec<u64> = state
            .unacked
            .values()
            .filter(|d| d.queue == queue && d.consumer == consumer)
            .map(|d| d.tag)
            .collect();
        // Newest first so the oldest ends up at the front.
        tags.sort_unstable_by(|a, b| b.cmp(a));
        for tag in &tags {
            if let Some(delivery) = state.unacked.remove(tag) {
                state.ready.entry(delivery.queue).or_default().push_back(delivery.body);
            }
        }
        drop(state);
        if !tags.is_empty() {
            warn!(queue, consumer, recovered = tags.len(), "Recovered unacknowledged deliveries");
            self.notify.notify_waiters();
        }
        Ok(tags.len())
    }

    async fn requeue_dead(&self, queue: &str) -> Result<usize, BrokerError> {
        let mut state = self.state.lock();
        let letters = state.dead.remove(queue).unwrap_or_default();
        let count = letters.len();
        let ready = state.ready.entry(queue.to_string()).or_default();
        for letter in letters {
            ready.push_front(letter.revived_body());
        }
        drop(state);
        self.notify.notify_waiters();
        info!(queue, requeued = count, "Dead letters requeued");
        Ok(count)
    }

    async fn depth(&self, queue: &str) -> Result<QueueDepth, BrokerError> {
        let mut state = self.state.lock();
        if state.faults.fail_depth > 0 {
            state.faults.fail_depth -= 1;
            return Err(BrokerError::Command {
                op: "depth",
                message: "injected depth failure".to_string(),
            });
        }
        Ok(QueueDepth {
            ready: state.ready.get(queue).map_or(0, |q| q.len() as u64),
            dead: state.dead.get(queue).map_or(0, |d| d.len() as u64),
        })
    }

    async fn health_check(&self) -> Result<(), BrokerError> {
        Ok(())
    }

    async fn close(&self) {
        self.notify.notify_waiters();
    }
}
