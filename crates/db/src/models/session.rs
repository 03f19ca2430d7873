use bson::DateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterviewSession {
    #[serde(rename = "_id")]
    pub id: i64,
    pub user_id: i64,
    pub role_id: i64,
    #[serde(default)]
    pub status: SessionStatus,
    pub started_at: DateTime,
    pub completed_at: Option<DateTime>,
}

impl InterviewSession {
    pub const COLLECTION: &'static str = "interview_sessions";

    pub fn new(id: i64, user_id: i64, role_id: i64) -> Self {
        Self {
            id,
            user_id,
            role_id,
            status: SessionStatus::Active,
            started_at: DateTime::now(),
            completed_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Active,
    Completed,
    Cancelled,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
            SessionStatus::Cancelled => "cancelled",
        }
    }
}
