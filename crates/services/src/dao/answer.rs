use bson::{DateTime, doc};
use mongodb::Database;
use vuko_db::models::{Answer, AnswerStatus};

use super::base::{BaseDao, DaoResult};

/// Result of the feedback step, written onto an answer in one update.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackUpdate {
    pub summary: String,
    /// Raw model reply.
    pub feedback: String,
    pub suggestion: Option<String>,
    pub clarity_score: i32,
    pub confidence_score: i32,
    pub structure_score: i32,
}

pub struct AnswerDao {
    pub base: BaseDao<Answer>,
}

impl AnswerDao {
    pub fn new(db: &Database) -> Self {
        Self {
            base: BaseDao::new(db, Answer::COLLECTION),
        }
    }

    pub async fn create(
        &self,
        id: i64,
        session_id: i64,
        question_id: i64,
        media_path: String,
    ) -> DaoResult<Answer> {
        let answer = Answer::new(id, session_id, question_id, media_path);
        self.base.insert_one(&answer).await?;
        Ok(answer)
    }

    pub async fn find(&self, id: i64) -> DaoResult<Option<Answer>> {
        self.base.find_optional(doc! { "_id": id }).await
    }

    pub async fn find_for_sessions(&self, session_ids: &[i64]) -> DaoResult<Vec<Answer>> {
        if session_ids.is_empty() {
            return Ok(Vec::new());
        }
        self.base
            .find_many(
                doc! { "session_id": { "$in": session_ids.to_vec() } },
                Some(doc! { "created_at": -1, "_id": -1 }),
            )
            .await
    }

    pub async fn save_transcript(&self, id: i64, transcript: &str) -> DaoResult<bool> {
        self.base
            .update_one(
                doc! { "_id": id },
                doc! { "$set": {
                    "transcript_text": transcript,
                    "status": AnswerStatus::Transcribed.as_str(),
                    "last_error": null,
                    "updated_at": DateTime::now(),
                } },
            )
            .await
    }

    pub async fn save_feedback(&self, id: i64, update: &FeedbackUpdate) -> DaoResult<bool> {
        self.base
            .update_one(
                doc! { "_id": id },
                doc! { "$set": {
                    "summary": update.summary.as_str(),
                    "feedback": update.feedback.as_str(),
                    "suggestion": update.suggestion.clone(),
                    "clarity_score": update.clarity_score,
                    "confidence_score": update.confidence_score,
                    "structure_score": update.structure_score,
                    "status": AnswerStatus::Analyzed.as_str(),
                    "last_error": null,
                    "updated_at": DateTime::now(),
                } },
            )
            .await
    }

    pub async fn mark_failed(&self, id: i64, error: &str) -> DaoResult<bool> {
        self.base
            .update_one(
                doc! { "_id": id },
                doc! { "$set": {
                    "status": AnswerStatus::Failed.as_str(),
                    "last_error": error,
                    "updated_at": DateTime::now(),
                } },
            )
            .await
    }

    pub async fn delete_for_session(&self, session_id: i64) -> DaoResult<u64> {
        self.base.delete_many(doc! { "session_id": session_id }).await
    }
}
