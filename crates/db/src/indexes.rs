use mongodb::{Database, IndexModel};
use tracing::info;

use crate::models::{Answer, InterviewSession, Question};

pub async fn ensure_indexes(db: &Database) -> Result<(), mongodb::error::Error> {
    create_indexes(
        db,
        Question::COLLECTION,
        vec![index(bson::doc! { "role_id": 1 })],
    )
    .await?;

    // History lists a user's sessions newest first.
    create_indexes(
        db,
        InterviewSession::COLLECTION,
        vec![
            index(bson::doc! { "user_id": 1, "started_at": -1 }),
            index(bson::doc! { "user_id": 1, "status": 1 }),
        ],
    )
    .await?;

    create_indexes(
        db,
        Answer::COLLECTION,
        vec![
            index(bson::doc! { "session_id": 1, "created_at": -1 }),
            index(bson::doc! { "question_id": 1 }),
            index(bson::doc! { "status": 1, "updated_at": -1 }),
        ],
    )
    .await?;

    info!("All indexes ensured");
    Ok(())
}

fn index(keys: bson::Document) -> IndexModel {
    IndexModel::builder().keys(keys).build()
}

async fn create_indexes(
    db: &Database,
    collection: &str,
    indexes: Vec<IndexModel>,
) -> Result<(), mongodb::error::Error> {
    let coll = db.collection::<bson::Document>(collection);
    match coll.create_indexes(indexes.clone()).await {
        Ok(_) => {
            info!(collection, "Indexes created");
            Ok(())
        }
        Err(e) => {
            // IndexKeySpecsConflict (code 86): an index with the same name exists
            // with different options. Drop and recreate.
            if let mongodb::error::ErrorKind::Command(ref cmd_err) = *e.kind
                && cmd_err.code == 86
            {
                tracing::warn!(
                    collection,
                    "Index conflict detected, dropping conflicting indexes and retrying"
                );
                coll.drop_indexes().await?;
                coll.create_indexes(indexes).await?;
                info!(collection, "Indexes recreated after conflict resolution");
                return Ok(());
            }
            Err(e)
        }
    }
}
