use serde::{Deserialize, Serialize};

/// Monotonic integer sequence, one document per collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Counter {
    #[serde(rename = "_id")]
    pub id: String,
    pub seq: i64,
}

impl Counter {
    pub const COLLECTION: &'static str = "counters";
}
