//! Document lifecycle records.

use crate::error::{DatabaseError, TransitionError};
use crate::status::check_transition;
use crate::store::{DocumentStore, NewDocument};
use crate::types::{BatchId, DocumentId, DocumentRecord, DocumentStatus};
use crate::{Error, Result};
use async_trait::async_trait;

use super::{Database, DocumentRow};

const DOCUMENT_COLUMNS: &str = "id, batch_id, filename, storage_ref, status, error_message, \
                                processed_at, created_at, updated_at";

#[async_trait]
impl DocumentStore for Database {
    async fn create_document(&self, document: &NewDocument) -> Result<DocumentId> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO documents (
                batch_id, position, filename, storage_ref, status,
                created_at, updated_at
            ) VALUES (
                ?,
                (SELECT COALESCE(MAX(position), -1) + 1 FROM documents WHERE batch_id = ?),
                ?, ?, ?, ?, ?
            )
            "#,
        )
        .bind(document.batch_id)
        .bind(document.batch_id)
        .bind(&document.filename)
        .bind(&document.storage_ref)
        .bind(DocumentStatus::Uploaded.to_i32())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert document: {}",
                e
            )))
        })?;

        Ok(DocumentId(result.last_insert_rowid()))
    }

    async fn get_document(&self, id: DocumentId) -> Result<Option<DocumentRecord>> {
        let row = sqlx::query_as::<_, DocumentRow>(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get document: {}",
                e
            )))
        })?;

        Ok(row.map(DocumentRecord::from))
    }

    async fn list_documents_by_batch(&self, batch_id: BatchId) -> Result<Vec<DocumentRecord>> {
        let rows = sqlx::query_as::<_, DocumentRow>(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE batch_id = ? ORDER BY position ASC"
        ))
        .bind(batch_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list documents: {}",
                e
            )))
        })?;

        Ok(rows.into_iter().map(DocumentRecord::from).collect())
    }

    /// The write is a compare-and-set on the status read just before, so two
    /// writers racing on one document cannot both apply an edge from the same
    /// source state.
    async fn update_document_status(
        &self,
        id: DocumentId,
        status: DocumentStatus,
        error_message: Option<&str>,
    ) -> Result<DocumentRecord> {
        let current = self
            .get_document(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("document {id}")))?;

        check_transition(current.status, status)?;

        let now = chrono::Utc::now().timestamp();
        let processed_at = status.is_terminal().then_some(now);

        let result = sqlx::query(
            r#"
            UPDATE documents
            SET status = ?, error_message = ?, processed_at = COALESCE(?, processed_at), updated_at = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(status.to_i32())
        .bind(error_message)
        .bind(processed_at)
        .bind(now)
        .bind(id)
        .bind(current.status.to_i32())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to update document status: {}",
                e
            )))
        })?;

        if result.rows_affected() == 0 {
            // Lost the race; report against whatever status won
            let latest = self
                .get_document(id)
                .await?
                .ok_or_else(|| Error::NotFound(format!("document {id}")))?;
            return Err(TransitionError {
                from: latest.status,
                to: status,
            }
            .into());
        }

        self.get_document(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("document {id}")))
    }
}
