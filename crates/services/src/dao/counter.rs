use bson::doc;
use mongodb::options::ReturnDocument;
use mongodb::{Collection, Database};
use vuko_db::models::Counter;

use super::base::{DaoError, DaoResult};

/// Allocates integer ids, one sequence per collection name.
pub struct CounterDao {
    collection: Collection<Counter>,
}

impl CounterDao {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection(Counter::COLLECTION),
        }
    }

    pub async fn next(&self, sequence: &str) -> DaoResult<i64> {
        let counter = self
            .collection
            .find_one_and_update(doc! { "_id": sequence }, doc! { "$inc": { "seq": 1_i64 } })
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await?
            .ok_or_else(|| DaoError::NotFound(format!("counter {sequence}")))?;
        Ok(counter.seq)
    }
}
