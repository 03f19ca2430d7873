use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use vuko_broker::{Broker, BrokerError, Delivery};
use vuko_config::BrokerSettings;

use super::{JobError, JobHandler, JobOutcome};

const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// How a delivery was settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    Acked,
    /// Permanently invalid job, acknowledged without processing.
    Dropped,
    /// Re-enqueued as attempt `attempt`.
    Retried { attempt: u32 },
    DeadLettered,
    /// The broker refused the settlement; the delivery stays in flight and
    /// is recovered on the next start.
    Unsettled,
}

/// Pulls deliveries for one handler and settles each of them.
#[derive(Clone)]
pub struct Consumer {
    broker: Arc<dyn Broker>,
    handler: Arc<dyn JobHandler>,
    name: String,
    prefetch: usize,
    max_retries: u32,
    receive_timeout: Duration,
    drain_timeout: Duration,
}

impl Consumer {
    pub fn new(broker: Arc<dyn Broker>, handler: Arc<dyn JobHandler>, settings: &BrokerSettings) -> Self {
        Self {
            broker,
            handler,
            name: settings.consumer_name.clone(),
            prefetch: settings.prefetch.max(1),
            max_retries: settings.max_retries,
            receive_timeout: Duration::from_secs(settings.receive_timeout_secs),
            drain_timeout: Duration::from_secs(settings.drain_timeout_secs),
        }
    }

    pub fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = timeout;
        self
    }

    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    pub fn queue(&self) -> &str {
        self.handler.queue()
    }

    /// Consumes until `shutdown` flips to true, then waits up to the drain
    /// timeout for in-flight jobs to settle. Jobs still running after that
    /// are aborted and their deliveries requeued.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<(), BrokerError> {
        let queue = self.queue().to_string();
        let recovered = self.broker.recover_unacked(&queue, &self.name).await?;
        if recovered > 0 {
            warn!(queue = %queue, recovered, "Recovered unacknowledged deliveries");
        }
        info!(queue = %queue, consumer = %self.name, prefetch = self.prefetch, "Consumer started");

        let permits = Arc::new(Semaphore::new(self.prefetch));
        let mut in_flight = JoinSet::new();
        let unsettled: Arc<DashMap<u64, Delivery>> = Arc::new(DashMap::new());

        while !*shutdown.borrow() {
            let permit = tokio::select! {
                permit = permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                _ = shutdown.changed() => break,
            };

            let received = tokio::select! {
                received = self.broker.receive(&queue, &self.name, self.receive_timeout) => received,
                _ = shutdown.changed() => break,
            };

            match received {
                Ok(Some(delivery)) => {
                    unsettled.insert(delivery.tag, delivery.clone());
                    let consumer = self.clone();
                    let unsettled = unsettled.clone();
                    in_flight.spawn(async move {
                        let tag = delivery.tag;
                        consumer.settle(delivery).await;
                        unsettled.remove(&tag);
                        drop(permit);
                    });
                }
                Ok(None) => {}
                Err(e) => {
                    error!(queue = %queue, error = %e, "Receive failed");
                    tokio::select! {
                        _ = tokio::time::sleep(RECEIVE_ERROR_BACKOFF) => {}
                        _ = shutdown.changed() => break,
                    }
                }
            }

            while in_flight.try_join_next().is_some() {}
        }

        debug!(queue = %queue, pending = in_flight.len(), "Consumer draining");
        let drained = tokio::time::timeout(self.drain_timeout, async {
            while in_flight.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            in_flight.abort_all();
            while in_flight.join_next().await.is_some() {}
            self.requeue_unfinished(&unsettled).await;
        }
        info!(queue = %queue, "Consumer stopped");
        Ok(())
    }

    /// Hands deliveries whose jobs were aborted back to the ready queue.
    async fn requeue_unfinished(&self, unsettled: &DashMap<u64, Delivery>) {
        let deliveries: Vec<Delivery> = unsettled.iter().map(|entry| entry.value().clone()).collect();
        unsettled.clear();
        for delivery in deliveries {
            match self.broker.nack(&delivery, true).await {
                Ok(()) => warn!(queue = %delivery.queue, tag = delivery.tag, "Requeued job cut off by shutdown"),
                Err(e) => {
                    self.unsettled(&delivery, e);
                }
            }
        }
    }

    /// Receives and settles at most one delivery.
    pub async fn run_once(&self) -> Result<Option<Settlement>, BrokerError> {
        let queue = self.queue().to_string();
        match self.broker.receive(&queue, &self.name, self.receive_timeout).await? {
            Some(delivery) => Ok(Some(self.settle(delivery).await)),
            None => Ok(None),
        }
    }

    /// Runs the handler for one delivery and settles it.
    pub async fn settle(&self, delivery: Delivery) -> Settlement {
        let job = match delivery.job() {
            Ok(job) => job,
            Err(e) => {
                error!(queue = %delivery.queue, error = %e, "Malformed job body");
                return self.dead_letter(&delivery, &format!("malformed body: {e}")).await;
            }
        };

        let answer_id = job.answer_id;
        match self.handler.handle(&job).await {
            Ok(outcome) => {
                if outcome == JobOutcome::AlreadyDone {
                    debug!(answer_id, queue = %delivery.queue, "Job already done");
                }
                match self.broker.ack(&delivery).await {
                    Ok(()) => Settlement::Acked,
                    Err(e) => self.unsettled(&delivery, e),
                }
            }
            Err(JobError::Invalid(reason)) => {
                warn!(answer_id, queue = %delivery.queue, reason = %reason, "Dropping invalid job");
                match self.broker.ack(&delivery).await {
                    Ok(()) => Settlement::Dropped,
                    Err(e) => self.unsettled(&delivery, e),
                }
            }
            Err(err) if err.is_retryable() && job.attempt < self.max_retries => {
                let next = job.next_attempt(err.to_string());
                warn!(
                    answer_id,
                    queue = %delivery.queue,
                    attempt = next.attempt,
                    max_retries = self.max_retries,
                    error = %err,
                    "Job failed, retrying"
                );
                match self.broker.retry(&delivery, &next).await {
                    Ok(()) => Settlement::Retried {
                        attempt: next.attempt,
                    },
                    Err(e) => self.unsettled(&delivery, e),
                }
            }
            Err(err) => {
                error!(answer_id, queue = %delivery.queue, attempts = job.attempt + 1, error = %err, "Job exhausted retries");
                self.handler.on_exhausted(&job, &err).await;
                self.dead_letter(&delivery, &err.to_string()).await
            }
        }
    }

    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> Settlement {
        match self.broker.dead_letter(delivery, reason).await {
            Ok(()) => Settlement::DeadLettered,
            Err(e) => self.unsettled(delivery, e),
        }
    }

    fn unsettled(&self, delivery: &Delivery, e: BrokerError) -> Settlement {
        error!(queue = %delivery.queue, tag = delivery.tag, error = %e, "Failed to settle delivery");
        Settlement::Unsettled
    }
}
