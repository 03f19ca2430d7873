use bson::DateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    #[serde(rename = "_id")]
    pub id: i64,
    pub role_id: i64,
    pub question_text: String,
    #[serde(default)]
    pub difficulty: Difficulty,
    /// e.g. "technical", "behavioral".
    pub category: Option<String>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl Question {
    pub const COLLECTION: &'static str = "questions";
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}
