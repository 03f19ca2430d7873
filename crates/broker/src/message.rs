use serde::{Deserialize, Serialize};

/// Envelope exchanged over both pipeline queues.
///
/// The wire shape stays `{answer_id, timestamp}` compatible: `message_id`
/// and `attempt` are optional on decode, so bodies produced by older
/// publishers are still accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobMessage {
    pub answer_id: i64,
    /// Unix seconds at publish time.
    pub timestamp: i64,
    /// Duplicate-suppression key for publishes.
    #[serde(default = "new_message_id")]
    pub message_id: String,
    /// Processing attempts already made (0 on first delivery).
    #[serde(default)]
    pub attempt: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

fn new_message_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl JobMessage {
    pub fn new(answer_id: i64) -> Self {
        Self::with_id(answer_id, new_message_id())
    }

    /// A job with a caller-chosen message id. Publishing the same id twice
    /// within the dedup window enqueues it once.
    pub fn with_id(answer_id: i64, message_id: impl Into<String>) -> Self {
        Self {
            answer_id,
            timestamp: chrono::Utc::now().timestamp(),
            message_id: message_id.into(),
            attempt: 0,
            last_error: None,
        }
    }

    /// The job to re-enqueue after a failed attempt.
    pub fn next_attempt(&self, error: impl Into<String>) -> Self {
        Self {
            answer_id: self.answer_id,
            timestamp: chrono::Utc::now().timestamp(),
            message_id: self.message_id.clone(),
            attempt: self.attempt + 1,
            last_error: Some(error.into()),
        }
    }

    /// Resets retry bookkeeping, used when a dead letter is put back in play.
    pub fn reset(mut self) -> Self {
        self.attempt = 0;
        self.last_error = None;
        self
    }

    pub fn to_body(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_body(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }
}

/// A message parked on a queue's dead-letter list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetter {
    pub queue: String,
    pub body: String,
    pub reason: String,
    /// Unix seconds.
    pub dead_at: i64,
}

impl DeadLetter {
    pub fn new(queue: &str, body: &str, reason: &str) -> Self {
        Self {
            queue: queue.to_string(),
            body: body.to_string(),
            reason: reason.to_string(),
            dead_at: chrono::Utc::now().timestamp(),
        }
    }

    /// The body to re-enqueue, with retry bookkeeping cleared when it
    /// decodes as a job.
    pub fn revived_body(&self) -> String {
        JobMessage::from_body(&self.body)
            .ok()
            .and_then(|job| job.reset().to_body().ok())
            .unwrap_or_else(|| self.body.clone())
    }
}
