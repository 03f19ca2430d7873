use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use redis::aio::MultiplexedConnection;
use redis::{RedisResult, Script};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use vuko_config::BrokerSettings;

use crate::{Broker, BrokerError, DeadLetter, Delivery, JobMessage, PublishOutcome, QueueDepth};

/// Records the message id and pushes the body only when the id is new.
/// KEYS[1] = ready list, KEYS[2] = dedup marker; ARGV[1] = body, ARGV[2] = ttl.
const PUBLISH_ONCE: &str = r#"
if redis.call('SET', KEYS[2], '1', 'NX', 'EX', ARGV[2]) then
  redis.call('LPUSH', KEYS[1], ARGV[1])
  return 1
end
return 0
"#;

/// Redis key names for one broker namespace.
#[derive(Debug, Clone)]
struct KeyLayout {
    prefix: String,
}

impl KeyLayout {
    fn ready(&self, queue: &str) -> String {
        format!("{}:{}", self.prefix, queue)
    }

    fn unacked(&self, queue: &str, consumer: &str) -> String {
        format!("{}:{}:unacked:{}", self.prefix, queue, consumer)
    }

    fn dead(&self, queue: &str) -> String {
        format!("{}:{}:dead", self.prefix, queue)
    }

    fn dedup(&self, message_id: &str) -> String {
        format!("{}:published:{}", self.prefix, message_id)
    }
}

/// Redis-backed broker owning one shared connection plus one dedicated
/// blocking connection per consumer.
///
/// Queue layout per `queue` (all under `key_prefix`):
/// - `{prefix}:{queue}` ready list, pushed on the left, consumed from the right
/// - `{prefix}:{queue}:unacked:{consumer}` deliveries in flight
/// - `{prefix}:{queue}:dead` dead letters
///
/// The broker is created once by the process root and shared via `Arc`;
/// [`RedisBroker::close`] drops every connection.
pub struct RedisBroker {
    client: redis::Client,
    shared: Mutex<Option<MultiplexedConnection>>,
    consumers: DashMap<String, MultiplexedConnection>,
    keys: KeyLayout,
    dedup_ttl_secs: u64,
    publish_script: Script,
    next_tag: AtomicU64,
}

impl RedisBroker {
    /// Opens the pool and verifies connectivity.
    pub async fn open(settings: &BrokerSettings) -> Result<Self, BrokerError> {
        let client = redis::Client::open(settings.url.as_str())
            .map_err(|e| BrokerError::Connection(format!("invalid broker url: {e}")))?;

        let broker = Self {
            client,
            shared: Mutex::new(None),
            consumers: DashMap::new(),
            keys: KeyLayout {
                prefix: settings.key_prefix.clone(),
            },
            dedup_ttl_secs: settings.publish_dedup_ttl_secs,
            publish_script: Script::new(PUBLISH_ONCE),
            next_tag: AtomicU64::new(1),
        };

        broker.connection().await?;
        info!(prefix = %broker.keys.prefix, "Broker connection established");
        Ok(broker)
    }

    async fn connect(&self) -> Result<MultiplexedConnection, BrokerError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))
    }

    /// Shared connection, opened lazily.
    async fn connection(&self) -> Result<MultiplexedConnection, BrokerError> {
        let mut guard = self.shared.lock().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }
        let conn = self.connect().await?;
        *guard = Some(conn.clone());
        Ok(conn)
    }

    /// Replaces the shared connection with a fresh one.
    async fn reconnect(&self) -> Result<MultiplexedConnection, BrokerError> {
        let mut guard = self.shared.lock().await;
        guard.take();
        let conn = self.connect().await?;
        *guard = Some(conn.clone());
        info!("Broker reconnected");
        Ok(conn)
    }

    async fn invalidate(&self) {
        self.shared.lock().await.take();
    }

    /// Runs a single command on the shared connection. A failure drops the
    /// connection so the next call reconnects.
    async fn run<T, F, Fut>(&self, op: &'static str, f: F) -> Result<T, BrokerError>
    where
        F: FnOnce(MultiplexedConnection) -> Fut,
        Fut: Future<Output = RedisResult<T>>,
    {
        let conn = self.connection().await?;
        match f(conn).await {
            Ok(value) => Ok(value),
            Err(e) => {
                self.invalidate().await;
                Err(BrokerError::Command {
                    op,
                    message: e.to_string(),
                })
            }
        }
    }

    async fn publish_once(
        &self,
        mut conn: MultiplexedConnection,
        ready: &str,
        dedup: &str,
        body: &str,
    ) -> RedisResult<i64> {
        self.publish_script
            .key(ready)
            .key(dedup)
            .arg(body)
            .arg(self.dedup_ttl_secs)
            .invoke_async(&mut conn)
            .await
    }

    async fn consumer_connection(&self, consumer_key: &str) -> Result<MultiplexedConnection, BrokerError> {
        if let Some(conn) = self.consumers.get(consumer_key) {
            return Ok(conn.clone());
        }
        let conn = self.connect().await?;
        self.consumers.insert(consumer_key.to_string(), conn.clone());
        Ok(conn)
    }
}

#[async_trait]
impl Broker for RedisBroker {
    async fn publish(&self, queue: &str, job: &JobMessage) -> Result<PublishOutcome, BrokerError> {
        let body = job.to_body()?;
        let ready = self.keys.ready(queue);
        let dedup = self.keys.dedup(&job.message_id);

        let first = match self.connection().await {
            Ok(conn) => self
                .publish_once(conn, &ready, &dedup, &body)
                .await
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };

        let pushed = match first {
            Ok(pushed) => pushed,
            Err(error) => {
                warn!(queue, answer_id = job.answer_id, %error, "Publish failed, reconnecting and retrying once");
                let conn = self.reconnect().await?;
                self.publish_once(conn, &ready, &dedup, &body)
                    .await
                    .map_err(|e| BrokerError::Command {
                        op: "publish",
                        message: e.to_string(),
                    })?
            }
        };

        if pushed == 1 {
            debug!(queue, answer_id = job.answer_id, message_id = %job.message_id, "Message published");
            Ok(PublishOutcome::Published)
        } else {
            info!(queue, answer_id = job.answer_id, message_id = %job.message_id, "Duplicate publish suppressed");
            Ok(PublishOutcome::Duplicate)
        }
    }

    async fn receive(
        &self,
        queue: &str,
        consumer: &str,
        timeout: Duration,
    ) -> Result<Option<Delivery>, BrokerError> {
        let ready = self.keys.ready(queue);
        let unacked = self.keys.unacked(queue, consumer);
        let mut conn = self.consumer_connection(&unacked).await?;

        let moved: RedisResult<Option<String>> = redis::cmd("BLMOVE")
            .arg(&ready)
            .arg(&unacked)
            .arg("RIGHT")
            .arg("LEFT")
            .arg(timeout.as_secs_f64())
            .query_async(&mut conn)
            .await;

        match moved {
            Ok(Some(body)) => Ok(Some(Delivery {
                queue: queue.to_string(),
                consumer: consumer.to_string(),
                body,
                tag: self.next_tag.fetch_add(1, Ordering::Relaxed),
            })),
            Ok(None) => Ok(None),
            Err(e) => {
                self.consumers.remove(&unacked);
                Err(BrokerError::Command {
                    op: "receive",
                    message: e.to_string(),
                })
            }
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), BrokerError> {
        let unacked = self.keys.unacked(&delivery.queue, &delivery.consumer);
        let body = delivery.body.clone();
        self.run("ack", |mut conn| async move {
            redis::cmd("LREM")
                .arg(&unacked)
                .arg(1)
                .arg(&body)
                .query_async(&mut conn)
                .await
                .map(|_: i64| ())
        })
        .await
    }

    async fn nack(&self, delivery: &Delivery, requeue: bool) -> Result<(), BrokerError> {
        if !requeue {
            return self.ack(delivery).await;
        }
        let unacked = self.keys.unacked(&delivery.queue, &delivery.consumer);
        let ready = self.keys.ready(&delivery.queue);
        let body = delivery.body.clone();
        self.run("nack", |mut conn| async move {
            redis::pipe()
                .atomic()
                .cmd("LREM")
                .arg(&unacked)
                .arg(1)
                .arg(&body)
                .ignore()
                .cmd("RPUSH")
                .arg(&ready)
                .arg(&body)
                .ignore()
                .query_async(&mut conn)
                .await
                .map(|()| ())
        })
        .await
    }

    async fn retry(&self, delivery: &Delivery, job: &JobMessage) -> Result<(), BrokerError> {
        let unacked = self.keys.unacked(&delivery.queue, &delivery.consumer);
        let ready = self.keys.ready(&delivery.queue);
        let old_body = delivery.body.clone();
        let new_body = job.to_body()?;
        self.run("retry", |mut conn| async move {
            redis::pipe()
                .atomic()
                .cmd("LREM")
                .arg(&unacked)
                .arg(1)
                .arg(&old_body)
                .ignore()
                .cmd("LPUSH")
                .arg(&ready)
                .arg(&new_body)
                .ignore()
                .query_async(&mut conn)
                .await
                .map(|()| ())
        })
        .await
    }

    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> Result<(), BrokerError> {
        let unacked = self.keys.unacked(&delivery.queue, &delivery.consumer);
        let dead = self.keys.dead(&delivery.queue);
        let body = delivery.body.clone();
        let record = serde_json::to_string(&DeadLetter::new(&delivery.queue, &delivery.body, reason))?;
        self.run("dead_letter", |mut conn| async move {
            redis::pipe()
                .atomic()
                .cmd("LREM")
                .arg(&unacked)
                .arg(1)
                .arg(&body)
                .ignore()
                .cmd("LPUSH")
                .arg(&dead)
                .arg(&record)
                .ignore()
                .query_async(&mut conn)
                .await
                .map(|()| ())
        })
        .await
    }

    async fn recover_unacked(&self, queue: &str, consumer: &str) -> Result<usize, BrokerError> {
        let unacked = self.keys.unacked(queue, consumer);
        let ready = self.keys.ready(queue);
        let mut recovered = 0;
        loop {
            let (src, dst) = (unacked.clone(), ready.clone());
            let moved: Option<String> = self
                .run("recover_unacked", |mut conn| async move {
                    redis::cmd("LMOVE")
                        .arg(&src)
                        .arg(&dst)
                        .arg("LEFT")
                        .arg("RIGHT")
                        .query_async(&mut conn)
                        .await
                })
                .await?;
            if moved.is_none() {
                break;
            }
            recovered += 1;
        }
        if recovered > 0 {
            warn!(queue, consumer, recovered, "Recovered unacknowledged deliveries");
        }
        Ok(recovered)
    }

    async fn requeue_dead(&self, queue: &str) -> Result<usize, BrokerError> {
        let dead = self.keys.dead(queue);
        let ready = self.keys.ready(queue);
        let mut requeued = 0;
        loop {
            let key = dead.clone();
            let record: Option<String> = self
                .run("requeue_dead", |mut conn| async move {
                    redis::cmd("RPOP").arg(&key).query_async(&mut conn).await
                })
                .await?;
            let Some(record) = record else { break };

            let body = match serde_json::from_str::<DeadLetter>(&record) {
                Ok(letter) => letter.revived_body(),
                Err(e) => {
                    warn!(queue, error = %e, "Unreadable dead letter, requeueing raw record");
                    record
                }
            };
            let key = ready.clone();
            self.run("requeue_dead", |mut conn| async move {
                redis::cmd("LPUSH")
                    .arg(&key)
                    .arg(&body)
                    .query_async(&mut conn)
                    .await
                    .map(|_: i64| ())
            })
            .await?;
            requeued += 1;
        }
        info!(queue, requeued, "Dead letters requeued");
        Ok(requeued)
    }

    async fn depth(&self, queue: &str) -> Result<QueueDepth, BrokerError> {
        let ready = self.keys.ready(queue);
        let dead = self.keys.dead(queue);
        let (ready, dead): (u64, u64) = self
            .run("depth", |mut conn| async move {
                redis::pipe()
                    .cmd("LLEN")
                    .arg(&ready)
                    .cmd("LLEN")
                    .arg(&dead)
                    .query_async(&mut conn)
                    .await
            })
            .await?;
        Ok(QueueDepth { ready, dead })
    }

    async fn health_check(&self) -> Result<(), BrokerError> {
        let pong: String = self
            .run("ping", |mut conn| async move {
                redis::cmd("PING").query_async(&mut conn).await
            })
            .await?;
        if pong == "PONG" {
            Ok(())
        } else {
            Err(BrokerError::Command {
                op: "ping",
                message: format!("unexpected reply: {pong}"),
            })
        }
    }

    async fn close(&self) {
        self.shared.lock().await.take();
        self.consumers.clear();
        info!("Broker connections closed");
    }
}
