use bson::DateTime;
use serde::{Deserialize, Serialize};

/// One recorded response to one question within one session.
///
/// Created by intake with every analysis field unset, then filled in by the
/// transcription worker (`transcript_text`) and the feedback worker
/// (`summary`, `feedback`, scores).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    #[serde(rename = "_id")]
    pub id: i64,
    pub session_id: i64,
    pub question_id: i64,
    pub media_path: String,
    pub transcript_text: Option<String>,
    pub summary: Option<String>,
    /// Raw text returned by the feedback model.
    pub feedback: Option<String>,
    pub suggestion: Option<String>,
    /// 1-10
    pub clarity_score: Option<i32>,
    /// 1-10, scored from keyword coverage.
    pub confidence_score: Option<i32>,
    /// 1-10
    pub structure_score: Option<i32>,
    #[serde(default)]
    pub status: AnswerStatus,
    pub last_error: Option<String>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl Answer {
    pub const COLLECTION: &'static str = "answers";

    pub fn new(id: i64, session_id: i64, question_id: i64, media_path: String) -> Self {
        let now = DateTime::now();
        Self {
            id,
            session_id,
            question_id,
            media_path,
            transcript_text: None,
            summary: None,
            feedback: None,
            suggestion: None,
            clarity_score: None,
            confidence_score: None,
            structure_score: None,
            status: AnswerStatus::Pending,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Transcript text, if present and not blank.
    pub fn transcript(&self) -> Option<&str> {
        self.transcript_text
            .as_deref()
            .filter(|t| !t.trim().is_empty())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerStatus {
    #[default]
    Pending,
    Transcribed,
    Analyzed,
    Failed,
}

impl AnswerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerStatus::Pending => "pending",
            AnswerStatus::Transcribed => "transcribed",
            AnswerStatus::Analyzed => "analyzed",
            AnswerStatus::Failed => "failed",
        }
    }
}
