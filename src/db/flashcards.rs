//! Flashcard persistence.

use crate::error::DatabaseError;
use crate::store::FlashcardStore;
use crate::types::{AcceptedDraft, CollectionId, DocumentId, Flashcard};
use crate::{Error, Result};
use async_trait::async_trait;

use super::{Database, FlashcardRow};

#[async_trait]
impl FlashcardStore for Database {
    async fn create_flashcards(
        &self,
        document_id: DocumentId,
        drafts: &[AcceptedDraft],
    ) -> Result<usize> {
        if drafts.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to begin transaction: {}",
                e
            )))
        })?;

        let collection_id: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT b.collection_id
            FROM documents d
            JOIN batches b ON b.id = d.batch_id
            WHERE d.id = ?
            "#,
        )
        .bind(document_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to resolve collection for document: {}",
                e
            )))
        })?;

        let collection_id = collection_id.ok_or_else(|| {
            Error::Database(DatabaseError::NotFound(format!("document {document_id}")))
        })?;

        let now = chrono::Utc::now().timestamp();
        for draft in drafts {
            sqlx::query(
                r#"
                INSERT INTO flashcards (
                    collection_id, document_id, question, answer, source, difficulty, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(collection_id)
            .bind(document_id)
            .bind(&draft.question)
            .bind(&draft.answer)
            .bind(&draft.source)
            .bind(draft.difficulty.map(|d| d.as_str()))
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to insert flashcard: {}",
                    e
                )))
            })?;
        }

        tx.commit().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to commit flashcards: {}",
                e
            )))
        })?;

        Ok(drafts.len())
    }

    async fn count_flashcards_for_document(&self, document_id: DocumentId) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM flashcards WHERE document_id = ?")
            .bind(document_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to count flashcards: {}",
                    e
                )))
            })?;

        Ok(count)
    }

    async fn count_flashcards_for_collection(&self, collection_id: CollectionId) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM flashcards WHERE collection_id = ?")
                .bind(collection_id)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to count flashcards: {}",
                        e
                    )))
                })?;

        Ok(count)
    }

    async fn list_flashcards_by_document(&self, document_id: DocumentId) -> Result<Vec<Flashcard>> {
        let rows = sqlx::query_as::<_, FlashcardRow>(
            r#"
            SELECT id, collection_id, document_id, question, answer, source, difficulty, created_at
            FROM flashcards
            WHERE document_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list flashcards: {}",
                e
            )))
        })?;

        Ok(rows.into_iter().map(Flashcard::from).collect())
    }
}
