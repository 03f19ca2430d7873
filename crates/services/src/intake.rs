use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info, warn};
use vuko_broker::{Broker, BrokerError, JobMessage, PublishOutcome};

use crate::dao::DaoError;
use crate::media::{MediaError, MediaStorage};
use crate::store::InterviewStore;

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("Session {0} not found")]
    SessionNotFound(i64),
    #[error("Session {0} is no longer active")]
    SessionClosed(i64),
    #[error("Question {0} not found")]
    QuestionNotFound(i64),
    #[error("Question {question_id} does not belong to role {role_id}")]
    QuestionNotInRole { question_id: i64, role_id: i64 },
    #[error(transparent)]
    Media(#[from] MediaError),
    #[error(transparent)]
    Store(#[from] DaoError),
    /// The answer was stored but its transcription job could not be queued.
    #[error("Answer {answer_id} stored but not queued: {source}")]
    Publish {
        answer_id: i64,
        #[source]
        source: BrokerError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub answer_id: i64,
    pub media_path: String,
}

/// Accepts an uploaded answer and starts its processing.
pub struct AnswerIntake {
    store: Arc<dyn InterviewStore>,
    broker: Arc<dyn Broker>,
    media: Arc<MediaStorage>,
    stt_queue: String,
}

impl AnswerIntake {
    pub fn new(
        store: Arc<dyn InterviewStore>,
        broker: Arc<dyn Broker>,
        media: Arc<MediaStorage>,
        stt_queue: impl Into<String>,
    ) -> Self {
        Self {
            store,
            broker,
            media,
            stt_queue: stt_queue.into(),
        }
    }

    /// Stores the media, creates the answer and enqueues exactly one
    /// transcription job for it.
    ///
    /// Uploads are not deduplicated: submitting the same media twice yields
    /// two answers and two jobs.
    pub async fn submit(
        &self,
        user_id: i64,
        session_id: i64,
        question_id: i64,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<Submission, IntakeError> {
        let session = self
            .store
            .find_session(session_id)
            .await?
            .filter(|s| s.user_id == user_id)
            .ok_or(IntakeError::SessionNotFound(session_id))?;
        if !session.is_active() {
            return Err(IntakeError::SessionClosed(session_id));
        }

        let question = self
            .store
            .find_question(question_id)
            .await?
            .ok_or(IntakeError::QuestionNotFound(question_id))?;
        if question.role_id != session.role_id {
            return Err(IntakeError::QuestionNotInRole {
                question_id,
                role_id: session.role_id,
            });
        }

        let media_path = self.media.save(file_name, bytes).await?;

        let answer = match self
            .store
            .create_answer(session_id, question_id, &media_path)
            .await
        {
            Ok(answer) => answer,
            Err(e) => {
                if let Err(cleanup) = self.media.remove(&media_path).await {
                    warn!(path = %media_path, error = %cleanup, "Failed to remove orphaned media");
                }
                return Err(e.into());
            }
        };

        let job = JobMessage::new(answer.id);
        match self.broker.publish(&self.stt_queue, &job).await {
            Ok(PublishOutcome::Published) => {
                info!(answer_id = answer.id, session_id, queue = %self.stt_queue, "Answer queued for transcription");
            }
            Ok(PublishOutcome::Duplicate) => {
                warn!(answer_id = answer.id, message_id = %job.message_id, "Transcription job already queued");
            }
            Err(source) => {
                error!(answer_id = answer.id, error = %source, "Failed to queue transcription job");
                return Err(IntakeError::Publish {
                    answer_id: answer.id,
                    source,
                });
            }
        }

        Ok(Submission {
            answer_id: answer.id,
            media_path,
        })
    }
}
