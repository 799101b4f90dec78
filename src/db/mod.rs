//! Database layer for opendeck-pipeline
//!
//! Handles SQLite persistence for collections, batches, documents, flashcards
//! and batch tasks.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain, each implementing one of
//! the repository traits in [`crate::store`]:
//! - [`migrations`] - Database lifecycle, schema migrations
//! - [`collections`] - [`CollectionStore`](crate::store::CollectionStore)
//! - [`batches`] - [`BatchStore`](crate::store::BatchStore)
//! - [`documents`] - [`DocumentStore`](crate::store::DocumentStore)
//! - [`flashcards`] - [`FlashcardStore`](crate::store::FlashcardStore)
//! - [`tasks`] - [`TaskStore`](crate::store::TaskStore)

use crate::types::{
    BatchId, BatchTaskStatus, Collection, CollectionId, Difficulty, DocumentId, DocumentRecord,
    DocumentStatus, Flashcard, FlashcardId, ProcessingResult, TaskId, TaskState,
};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, sqlite::SqlitePool};

mod batches;
mod collections;
mod documents;
mod flashcards;
mod migrations;
mod tasks;

/// Document row as stored
#[derive(Debug, Clone, FromRow)]
struct DocumentRow {
    id: i64,
    batch_id: i64,
    filename: String,
    storage_ref: String,
    status: i32,
    error_message: Option<String>,
    processed_at: Option<i64>,
    created_at: i64,
    updated_at: i64,
}

impl From<DocumentRow> for DocumentRecord {
    fn from(row: DocumentRow) -> Self {
        Self {
            id: DocumentId(row.id),
            batch_id: BatchId(row.batch_id),
            filename: row.filename,
            storage_ref: row.storage_ref,
            status: DocumentStatus::from_i32(row.status),
            error_message: row.error_message,
            processed_at: row.processed_at.map(from_unix),
            created_at: from_unix(row.created_at),
            updated_at: from_unix(row.updated_at),
        }
    }
}

/// Flashcard row as stored
#[derive(Debug, Clone, FromRow)]
struct FlashcardRow {
    id: i64,
    collection_id: i64,
    document_id: i64,
    question: String,
    answer: String,
    source: String,
    difficulty: Option<String>,
    created_at: i64,
}

impl From<FlashcardRow> for Flashcard {
    fn from(row: FlashcardRow) -> Self {
        Self {
            id: FlashcardId(row.id),
            collection_id: CollectionId(row.collection_id),
            document_id: DocumentId(row.document_id),
            question: row.question,
            answer: row.answer,
            source: row.source,
            difficulty: row.difficulty.as_deref().and_then(Difficulty::parse_loose),
            created_at: from_unix(row.created_at),
        }
    }
}

/// Collection row as stored
#[derive(Debug, Clone, FromRow)]
struct CollectionRow {
    id: i64,
    user_id: String,
    title: String,
    card_count: i64,
    created_at: i64,
    updated_at: i64,
}

impl From<CollectionRow> for Collection {
    fn from(row: CollectionRow) -> Self {
        Self {
            id: CollectionId(row.id),
            user_id: row.user_id,
            title: row.title,
            card_count: row.card_count,
            created_at: from_unix(row.created_at),
            updated_at: from_unix(row.updated_at),
        }
    }
}

/// Batch task row as stored; `result` holds a JSON-encoded [`ProcessingResult`]
#[derive(Debug, Clone, FromRow)]
struct TaskRow {
    id: i64,
    batch_id: i64,
    state: i32,
    attempts: i64,
    result: Option<String>,
    error: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl TaskRow {
    fn into_status(self) -> crate::Result<BatchTaskStatus> {
        let result = match self.result.as_deref() {
            Some(json) => Some(serde_json::from_str::<ProcessingResult>(json)?),
            None => None,
        };
        Ok(BatchTaskStatus {
            task_id: TaskId(self.id),
            batch_id: BatchId(self.batch_id),
            state: TaskState::from_i32(self.state),
            attempts: u32::try_from(self.attempts).unwrap_or(0),
            result,
            error: self.error,
            created_at: from_unix(self.created_at),
            updated_at: from_unix(self.updated_at),
        })
    }
}

fn from_unix(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

/// Database handle for opendeck-pipeline
pub struct Database {
    pool: SqlitePool,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
