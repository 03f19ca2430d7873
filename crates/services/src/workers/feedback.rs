use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};
use vuko_broker::JobMessage;
use vuko_config::{LlmSettings, ResponseFormat};
use vuko_db::models::AnswerStatus;
use vuko_llm::feedback::{FeedbackPrompt, parse_structured, parse_template};
use vuko_llm::{ParsedFeedback, TextGenerator};

use super::{JobError, JobHandler, JobOutcome};
use crate::dao::FeedbackUpdate;
use crate::store::InterviewStore;

/// Consumes the feedback queue: transcript → model reply → scores.
pub struct FeedbackJobHandler {
    store: Arc<dyn InterviewStore>,
    generator: Arc<dyn TextGenerator>,
    settings: LlmSettings,
    queue: String,
}

impl FeedbackJobHandler {
    pub fn new(
        store: Arc<dyn InterviewStore>,
        generator: Arc<dyn TextGenerator>,
        settings: LlmSettings,
        queue: impl Into<String>,
    ) -> Self {
        Self {
            store,
            generator,
            settings,
            queue: queue.into(),
        }
    }

    fn parse(&self, answer_id: i64, reply: &str) -> Result<ParsedFeedback, JobError> {
        match self.settings.response_format {
            ResponseFormat::Structured => Ok(parse_structured(reply)?),
            ResponseFormat::Template => {
                let parsed = parse_template(reply);
                if !parsed.is_fully_parsed() {
                    warn!(answer_id, defaulted = ?parsed.defaulted, "Feedback fields fell back to defaults");
                }
                Ok(parsed)
            }
        }
    }
}

#[async_trait]
impl JobHandler for FeedbackJobHandler {
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

        let transcript = answer
            .transcript()
            .ok_or_else(|| JobError::Invalid(format!("answer {answer_id} has no transcript")))?;

        let question = self
            .store
            .find_question(answer.question_id)
            .await?
            .ok_or_else(|| JobError::Invalid(format!("question {} not found", answer.question_id)))?;

        let request = FeedbackPrompt::new(&question.question_text, transcript, self.settings.response_format)
            .build(&self.settings);
        let generation = self
            .generator
            .generate(&request)
            .await
            .map_err(|e| JobError::Transient(format!("{} generation failed: {e:#}", self.generator.name())))?;
        if generation.is_truncated() {
            warn!(answer_id, max_tokens = request.max_tokens, "Feedback reply hit the token limit");
        }

        let parsed = self.parse(answer_id, &generation.content)?;
        let update = FeedbackUpdate {
            summary: parsed.summary,
            feedback: generation.content,
            suggestion: parsed.suggestion,
            clarity_score: parsed.clarity,
            confidence_score: parsed.confidence,
            structure_score: parsed.structure,
        };
        if !self.store.save_feedback(answer_id, &update).await? {
            return Err(JobError::Invalid(format!("answer {answer_id} disappeared")));
        }

        info!(
            answer_id,
            clarity = update.clarity_score,
            structure = update.structure_score,
            confidence = update.confidence_score,
            tokens = generation.tokens_used,
            latency_ms = generation.latency_ms,
            "Feedback stored"
        );
        Ok(JobOutcome::Completed)
    }

    async fn on_exhausted(&self, job: &JobMessage, error: &JobError) {
        if let Err(e) = self.store.mark_failed(job.answer_id, &error.to_string()).await {
            warn!(answer_id = job.answer_id, error = %e, "Failed to mark answer as failed");
        }
    }
}
