use bson::{DateTime, doc};
use mongodb::Database;
use vuko_db::models::{Difficulty, Question};

use super::base::{BaseDao, DaoResult};

pub struct QuestionDao {
    pub base: BaseDao<Question>,
}

impl QuestionDao {
    pub fn new(db: &Database) -> Self {
        Self {
            base: BaseDao::new(db, Question::COLLECTION),
        }
    }

    pub async fn create(
        &self,
        id: i64,
        role_id: i64,
        question_text: String,
        difficulty: Difficulty,
        category: Option<String>,
    ) -> DaoResult<Question> {
        let now = DateTime::now();
        let question = Question {
            id,
            role_id,
            question_text,
            difficulty,
            category,
            created_at: now,
            updated_at: now,
        };
        self.base.insert_one(&question).await?;
        Ok(question)
    }

    pub async fn find(&self, id: i64) -> DaoResult<Option<Question>> {
        self.base.find_optional(doc! { "_id": id }).await
    }

    pub async fn find_for_role(&self, role_id: i64) -> DaoResult<Vec<Question>> {
        self.base
            .find_many(doc! { "role_id": role_id }, Some(doc! { "_id": 1 }))
            .await
    }
}
