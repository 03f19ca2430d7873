use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use vuko_db::models::{Answer, AnswerStatus, InterviewSession, Question, Role, SessionStatus};

use crate::dao::DaoError;
use crate::media::MediaStorage;
use crate::store::InterviewStore;

#[derive(Debug, Error)]
pub enum InterviewError {
    #[error("Role {0} not found")]
    RoleNotFound(i64),
    #[error("Session {0} not found")]
    SessionNotFound(i64),
    #[error("Session {session_id} is {status}")]
    SessionClosed { session_id: i64, status: &'static str },
    #[error("Answer {0} not found")]
    AnswerNotFound(i64),
    #[error(transparent)]
    Store(#[from] DaoError),
}

/// One row of a user's answer history, newest first.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub answer_id: i64,
    pub session_id: i64,
    pub created_at: String,
    pub question_text: String,
    pub status: AnswerStatus,
    pub clarity_score: Option<i32>,
    pub structure_score: Option<i32>,
    pub confidence_score: Option<i32>,
    pub transcript_text: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnswerDetails {
    pub answer_id: i64,
    pub created_at: String,
    pub question_text: String,
    pub status: AnswerStatus,
    pub clarity_score: Option<i32>,
    pub structure_score: Option<i32>,
    pub confidence_score: Option<i32>,
    pub transcript_text: Option<String>,
    pub summary: Option<String>,
    pub feedback: Option<String>,
    pub suggestion: Option<String>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelSummary {
    pub answers_deleted: u64,
    pub media_removed: usize,
}

/// Session lifecycle and read-side queries for the interview flow.
pub struct InterviewService {
    store: Arc<dyn InterviewStore>,
    media: Arc<MediaStorage>,
}

impl InterviewService {
    pub fn new(store: Arc<dyn InterviewStore>, media: Arc<MediaStorage>) -> Self {
        Self { store, media }
    }

    pub async fn list_roles(&self) -> Result<Vec<Role>, InterviewError> {
        Ok(self.store.list_roles().await?)
    }

    pub async fn start_session(
        &self,
        user_id: i64,
        role_id: i64,
    ) -> Result<InterviewSession, InterviewError> {
        self.store
            .find_role(role_id)
            .await?
            .ok_or(InterviewError::RoleNotFound(role_id))?;
        let session = self.store.create_session(user_id, role_id).await?;
        info!(session_id = session.id, user_id, role_id, "Interview session started");
        Ok(session)
    }

    async fn owned_session(
        &self,
        user_id: i64,
        session_id: i64,
    ) -> Result<InterviewSession, InterviewError> {
        self.store
            .find_session(session_id)
            .await?
            .filter(|s| s.user_id == user_id)
            .ok_or(InterviewError::SessionNotFound(session_id))
    }

    pub async fn questions_for_session(
        &self,
        user_id: i64,
        session_id: i64,
    ) -> Result<Vec<Question>, InterviewError> {
        let session = self.owned_session(user_id, session_id).await?;
        Ok(self.store.questions_for_role(session.role_id).await?)
    }

    async fn close(
        &self,
        user_id: i64,
        session_id: i64,
        status: SessionStatus,
    ) -> Result<InterviewSession, InterviewError> {
        let session = self.owned_session(user_id, session_id).await?;
        if !self.store.close_session(session.id, status).await? {
            let current = self
                .store
                .find_session(session_id)
                .await?
                .map(|s| s.status)
                .unwrap_or(session.status);
            return Err(InterviewError::SessionClosed {
                session_id,
                status: current.as_str(),
            });
        }
        self.store
            .find_session(session_id)
            .await?
            .ok_or(InterviewError::SessionNotFound(session_id))
    }

    pub async fn complete_session(
        &self,
        user_id: i64,
        session_id: i64,
    ) -> Result<InterviewSession, InterviewError> {
        let session = self.close(user_id, session_id, SessionStatus::Completed).await?;
        info!(session_id, "Interview session completed");
        Ok(session)
    }

    /// Cancels an active session and deletes its answers and their media.
    pub async fn cancel_session(
        &self,
        user_id: i64,
        session_id: i64,
    ) -> Result<CancelSummary, InterviewError> {
        self.close(user_id, session_id, SessionStatus::Cancelled).await?;

        let answers = self.store.answers_for_sessions(&[session_id]).await?;
        let answers_deleted = self.store.delete_answers_for_session(session_id).await?;

        let mut media_removed = 0;
        for answer in &answers {
            match self.media.remove(&answer.media_path).await {
                Ok(true) => media_removed += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(answer_id = answer.id, path = %answer.media_path, error = %e, "Failed to remove media");
                }
            }
        }

        info!(session_id, answers_deleted, media_removed, "Interview session cancelled");
        Ok(CancelSummary {
            answers_deleted,
            media_removed,
        })
    }

    async fn question_texts(&self, answers: &[Answer]) -> Result<HashMap<i64, String>, DaoError> {
        let mut texts = HashMap::new();
        for answer in answers {
            if texts.contains_key(&answer.question_id) {
                continue;
            }
            let text = self
                .store
                .find_question(answer.question_id)
                .await?
                .map(|q| q.question_text)
                .unwrap_or_default();
            texts.insert(answer.question_id, text);
        }
        Ok(texts)
    }

    /// Every answer the user has submitted, newest first.
    pub async fn history(&self, user_id: i64) -> Result<Vec<HistoryEntry>, InterviewError> {
        let session_ids: Vec<i64> = self
            .store
            .sessions_for_user(user_id)
            .await?
            .into_iter()
            .map(|s| s.id)
            .collect();
        let answers = self.store.answers_for_sessions(&session_ids).await?;
        let questions = self.question_texts(&answers).await?;

        Ok(answers
            .into_iter()
            .map(|a| HistoryEntry {
                answer_id: a.id,
                session_id: a.session_id,
                created_at: format_time(a.created_at),
                question_text: questions.get(&a.question_id).cloned().unwrap_or_default(),
                status: a.status,
                clarity_score: a.clarity_score,
                structure_score: a.structure_score,
                confidence_score: a.confidence_score,
                transcript_text: a.transcript_text,
            })
            .collect())
    }

    pub async fn answer_details(
        &self,
        user_id: i64,
        answer_id: i64,
    ) -> Result<AnswerDetails, InterviewError> {
        let answer = self
            .store
            .find_answer(answer_id)
            .await?
            .ok_or(InterviewError::AnswerNotFound(answer_id))?;
        match self.owned_session(user_id, answer.session_id).await {
            Ok(_) => {}
            Err(InterviewError::SessionNotFound(_)) => {
                return Err(InterviewError::AnswerNotFound(answer_id));
            }
            Err(e) => return Err(e),
        }
        let question_text = self
            .store
            .find_question(answer.question_id)
            .await?
            .map(|q| q.question_text)
            .unwrap_or_default();

        Ok(AnswerDetails {
            answer_id: answer.id,
            created_at: format_time(answer.created_at),
            question_text,
            status: answer.status,
            clarity_score: answer.clarity_score,
            structure_score: answer.structure_score,
            confidence_score: answer.confidence_score,
            transcript_text: answer.transcript_text,
            summary: answer.summary,
            feedback: answer.feedback,
            suggestion: answer.suggestion,
            last_error: answer.last_error,
        })
    }
}

fn format_time(dt: bson::DateTime) -> String {
    dt.try_to_rfc3339_string()
        .unwrap_or_else(|_| dt.timestamp_millis().to_string())
}
