use bson::{DateTime, doc};
use mongodb::Database;
use vuko_db::models::{InterviewSession, SessionStatus};

use super::base::{BaseDao, DaoResult};

pub struct SessionDao {
    pub base: BaseDao<InterviewSession>,
}

impl SessionDao {
    pub fn new(db: &Database) -> Self {
        Self {
            base: BaseDao::new(db, InterviewSession::COLLECTION),
        }
    }

    pub async fn create(&self, id: i64, user_id: i64, role_id: i64) -> DaoResult<InterviewSession> {
        let session = InterviewSession::new(id, user_id, role_id);
        self.base.insert_one(&session).await?;
        Ok(session)
    }

    pub async fn find(&self, id: i64) -> DaoResult<Option<InterviewSession>> {
        self.base.find_optional(doc! { "_id": id }).await
    }

    pub async fn find_for_user(&self, user_id: i64) -> DaoResult<Vec<InterviewSession>> {
        self.base
            .find_many(doc! { "user_id": user_id }, Some(doc! { "started_at": -1 }))
            .await
    }

    /// Moves an active session to `status`. Returns false if the session is
    /// missing or no longer active.
    pub async fn close(&self, id: i64, status: SessionStatus) -> DaoResult<bool> {
        self.base
            .update_one(
                doc! { "_id": id, "status": SessionStatus::Active.as_str() },
                doc! { "$set": {
                    "status": status.as_str(),
                    "completed_at": DateTime::now(),
                } },
            )
            .await
    }
}
