//! Upload batch records.

use crate::error::DatabaseError;
use crate::store::BatchStore;
use crate::types::{BatchId, CollectionId, DocumentId, UploadBatch};
use crate::{Error, Result};
use async_trait::async_trait;
use sqlx::FromRow;

use super::{Database, from_unix};

#[derive(Debug, FromRow)]
struct BatchRow {
    id: i64,
    user_id: String,
    collection_id: i64,
    created_at: i64,
}

#[async_trait]
impl BatchStore for Database {
    async fn create_batch(&self, user_id: &str, collection_id: CollectionId) -> Result<BatchId> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            "INSERT INTO batches (user_id, collection_id, created_at) VALUES (?, ?, ?)",
        )
        .bind(user_id)
        .bind(collection_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert batch: {}",
                e
            )))
        })?;

        Ok(BatchId(result.last_insert_rowid()))
    }

    async fn get_batch(&self, id: BatchId) -> Result<Option<UploadBatch>> {
        let row = sqlx::query_as::<_, BatchRow>(
            "SELECT id, user_id, collection_id, created_at FROM batches WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get batch: {}",
                e
            )))
        })?;

        let Some(row) = row else {
            return Ok(None);
        };

        let document_ids: Vec<DocumentId> = sqlx::query_scalar(
            "SELECT id FROM documents WHERE batch_id = ? ORDER BY position ASC",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list batch documents: {}",
                e
            )))
        })?;

        Ok(Some(UploadBatch {
            id: BatchId(row.id),
            user_id: row.user_id,
            collection_id: CollectionId(row.collection_id),
            document_ids,
            created_at: from_unix(row.created_at),
        }))
    }
}
