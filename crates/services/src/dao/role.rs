use bson::doc;
use mongodb::Database;
use vuko_db::models::Role;

use super::base::{BaseDao, DaoResult};

pub struct RoleDao {
    pub base: BaseDao<Role>,
}

impl RoleDao {
    pub fn new(db: &Database) -> Self {
        Self {
            base: BaseDao::new(db, Role::COLLECTION),
        }
    }

    pub async fn create(&self, id: i64, name: String, description: Option<String>) -> DaoResult<Role> {
        let role = Role {
            id,
            name,
            description,
        };
        self.base.insert_one(&role).await?;
        Ok(role)
    }

    pub async fn find(&self, id: i64) -> DaoResult<Option<Role>> {
        self.base.find_optional(doc! { "_id": id }).await
    }

    pub async fn list(&self) -> DaoResult<Vec<Role>> {
        self.base.find_many(doc! {}, Some(doc! { "name": 1 })).await
    }
}
