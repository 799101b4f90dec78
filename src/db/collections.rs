//! Collection (deck) records.

use crate::error::DatabaseError;
use crate::store::CollectionStore;
use crate::types::{Collection, CollectionId};
use crate::{Error, Result};
use async_trait::async_trait;

use super::{CollectionRow, Database};

#[async_trait]
impl CollectionStore for Database {
    async fn create_collection(&self, user_id: &str, title: &str) -> Result<CollectionId> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO collections (user_id, title, card_count, created_at, updated_at)
            VALUES (?, ?, 0, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(title)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert collection: {}",
                e
            )))
        })?;

        Ok(CollectionId(result.last_insert_rowid()))
    }

    async fn get_collection(&self, id: CollectionId) -> Result<Option<Collection>> {
        let row = sqlx::query_as::<_, CollectionRow>(
            r#"
            SELECT id, user_id, title, card_count, created_at, updated_at
            FROM collections
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get collection: {}",
                e
            )))
        })?;

        Ok(row.map(Collection::from))
    }

    async fn set_card_count(&self, id: CollectionId, count: i64) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query("UPDATE collections SET card_count = ?, updated_at = ? WHERE id = ?")
            .bind(count)
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to update card count: {}",
                    e
                )))
            })?;

        if result.rows_affected() == 0 {
            return Err(Error::Database(DatabaseError::NotFound(format!(
                "collection {id}"
            ))));
        }

        Ok(())
    }
}
