use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};
use vuko_broker::{Broker, JobMessage, PublishOutcome};
use vuko_db::models::{Answer, AnswerStatus};
use vuko_llm::TranscriptCleaner;
use vuko_transcription::{SttBackend, SttRequest, is_hallucination};

use super::{JobError, JobHandler, JobOutcome};
use crate::media::MediaStorage;
use crate::store::InterviewStore;

/// Message id of the feedback job chained from an answer. Fixed per answer
/// so a redelivered transcription job does not queue a second one.
pub fn feedback_message_id(answer_id: i64) -> String {
    format!("feedback:{answer_id}")
}

/// Consumes the transcription queue: media → transcript → feedback job.
pub struct TranscriptionJobHandler {
    store: Arc<dyn InterviewStore>,
    broker: Arc<dyn Broker>,
    media: Arc<MediaStorage>,
    stt: Arc<dyn SttBackend>,
    cleaner: Option<Arc<dyn TranscriptCleaner>>,
    queue: String,
    feedback_queue: String,
    language: Option<String>,
}

impl TranscriptionJobHandler {
    pub fn new(
        store: Arc<dyn InterviewStore>,
        broker: Arc<dyn Broker>,
        media: Arc<MediaStorage>,
        stt: Arc<dyn SttBackend>,
        queue: impl Into<String>,
        feedback_queue: impl Into<String>,
    ) -> Self {
        Self {
            store,
            broker,
            media,
            stt,
            cleaner: None,
            queue: queue.into(),
            feedback_queue: feedback_queue.into(),
            language: None,
        }
    }

    pub fn with_cleaner(mut self, cleaner: Arc<dyn TranscriptCleaner>) -> Self {
        self.cleaner = Some(cleaner);
        self
    }

    pub fn with_language(mut self, language: Option<String>) -> Self {
        self.language = language;
        self
    }

    /// Marks the answer failed and returns the matching permanent error.
    async fn reject(&self, answer_id: i64, reason: String) -> JobError {
        if let Err(e) = self.store.mark_failed(answer_id, &reason).await {
            warn!(answer_id, error = %e, "Failed to mark answer as failed");
        }
        JobError::Invalid(reason)
    }

    async fn transcribe(&self, answer: &Answer) -> Result<String, JobError> {
        let media = match self.media.read(&answer.media_path).await {
            Ok(media) => media,
            Err(e) if e.is_permanent() => {
                return Err(self.reject(answer.id, format!("media unusable: {e}")).await);
            }
            Err(e) => return Err(JobError::Transient(format!("media: {e}"))),
        };

        let file_name = std::path::Path::new(&answer.media_path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "answer.webm".to_string());

        let result = self
            .stt
            .transcribe(SttRequest {
                media,
                file_name,
                language_hint: self.language.clone(),
            })
            .await
            .map_err(|e| JobError::Transient(format!("{} transcription failed: {e:#}", self.stt.name())))?;

        let text = result.text.trim();
        if text.is_empty() || is_hallucination(text) {
            return Err(self.reject(answer.id, "no speech recognized".to_string()).await);
        }

        let Some(cleaner) = &self.cleaner else {
            return Ok(text.to_string());
        };
        match cleaner.clean(text).await {
            Ok(cleaned) => Ok(cleaned),
            Err(e) => {
                warn!(answer_id = answer.id, error = %e, "Transcript cleanup failed, keeping raw text");
                Ok(text.to_string())
            }
        }
    }

    async fn chain_feedback(&self, answer_id: i64) -> Result<(), JobError> {
        let job = JobMessage::with_id(answer_id, feedback_message_id(answer_id));
        match self.broker.publish(&self.feedback_queue, &job).await? {
            PublishOutcome::Published => {
                info!(answer_id, queue = %self.feedback_queue, "Feedback job queued");
            }
            PublishOutcome::Duplicate => {
                debug!(answer_id, "Feedback job already queued");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl JobHandler for TranscriptionJobHandler {
    fn queue(&self) -> &str {
        &self.queue
    }

    async fn handle(&self, job: &JobMessage) -> Result<JobOutcome, JobError> {
        let answer_id = job.answer_id;
        let answer = self
            .store
            .find_answer(answer_id)
            .await?
            .ok_or_else(|| JobError::Invalid(format!("answer {answer_id} not found")))?;

        if answer.status == AnswerStatus::Analyzed {
            return Ok(JobOutcome::AlreadyDone);
        }

        if answer.transcript().is_some() {
            debug!(answer_id, "Transcript already stored, re-chaining feedback");
        } else {
            let transcript = self.transcribe(&answer).await?;
            if !self.store.save_transcript(answer_id, &transcript).await? {
                return Err(JobError::Invalid(format!("answer {answer_id} disappeared")));
            }
            info!(
                answer_id,
                chars = transcript.len(),
                backend = %self.stt.name(),
                "Transcript stored"
            );
        }

        self.chain_feedback(answer_id).await?;
        Ok(JobOutcome::Completed)
    }

    async fn on_exhausted(&self, job: &JobMessage, error: &JobError) {
        if let Err(e) = self.store.mark_failed(job.answer_id, &error.to_string()).await {
            warn!(answer_id = job.answer_id, error = %e, "Failed to mark answer as failed");
        }
    }
}
