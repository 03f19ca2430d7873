use serde::{Deserialize, Serialize};

/// A job role that interview questions are grouped under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    #[serde(rename = "_id")]
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
}

impl Role {
    pub const COLLECTION: &'static str = "roles";
}
