use bson::Document;
use futures::TryStreamExt;
use mongodb::{Collection, Database};
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaoError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Database error: {0}")]
    Mongo(#[from] mongodb::error::Error),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

pub type DaoResult<T> = Result<T, DaoError>;

/// Typed access to one collection. Documents carry pre-allocated integer ids.
pub struct BaseDao<T>
where
    T: Send + Sync,
{
    collection: Collection<T>,
}

impl<T> BaseDao<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync,
{
    pub fn new(db: &Database, name: &str) -> Self {
        Self {
            collection: db.collection::<T>(name),
        }
    }

    pub async fn insert_one(&self, doc: &T) -> DaoResult<()> {
        self.collection.insert_one(doc).await?;
        Ok(())
    }

    pub async fn find_optional(&self, filter: Document) -> DaoResult<Option<T>> {
        Ok(self.collection.find_one(filter).await?)
    }

    pub async fn find_many(&self, filter: Document, sort: Option<Document>) -> DaoResult<Vec<T>> {
        let mut find = self.collection.find(filter);
        if let Some(sort) = sort {
            find = find.sort(sort);
        }
        let cursor = find.await?;
        Ok(cursor.try_collect().await?)
    }

    /// Returns whether a document matched.
    pub async fn update_one(&self, filter: Document, update: Document) -> DaoResult<bool> {
        let result = self.collection.update_one(filter, update).await?;
        Ok(result.matched_count > 0)
    }

    pub async fn delete_many(&self, filter: Document) -> DaoResult<u64> {
        let result = self.collection.delete_many(filter).await?;
        Ok(result.deleted_count)
    }
}
