//! Repository contracts the pipeline persists through
//!
//! [`Database`](crate::db::Database) implements every trait here on SQLite.
//! The orchestrator and the runner only see the traits, so tests can wrap or
//! replace the database.

use crate::error::Result;
use crate::types::{
    AcceptedDraft, BatchId, BatchTaskStatus, Collection, CollectionId, DocumentId, DocumentRecord,
    DocumentStatus, Flashcard, ProcessingResult, TaskId, TaskState, UploadBatch,
};
use async_trait::async_trait;

/// New document to be inserted into the store with status UPLOADED
#[derive(Debug, Clone)]
pub struct NewDocument {
    /// Batch the document belongs to
    pub batch_id: BatchId,
    /// Original filename as uploaded
    pub filename: String,
    /// Reference understood by the file storage backend
    pub storage_ref: String,
}

/// Document lifecycle records
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a document in status UPLOADED at the end of its batch
    async fn create_document(&self, document: &NewDocument) -> Result<DocumentId>;

    /// Fetch one document
    async fn get_document(&self, id: DocumentId) -> Result<Option<DocumentRecord>>;

    /// All documents of a batch in upload order
    async fn list_documents_by_batch(&self, batch_id: BatchId) -> Result<Vec<DocumentRecord>>;

    /// Move a document to `status`, atomically checking the transition is legal
    ///
    /// Returns the updated record. Fails with
    /// [`Error::Transition`](crate::error::Error::Transition) on an illegal edge.
    async fn update_document_status(
        &self,
        id: DocumentId,
        status: DocumentStatus,
        error_message: Option<&str>,
    ) -> Result<DocumentRecord>;
}

/// Persisted flashcards
#[async_trait]
pub trait FlashcardStore: Send + Sync {
    /// Persist validated drafts for a document in one transaction, returning how many were written
    async fn create_flashcards(&self, document_id: DocumentId, drafts: &[AcceptedDraft])
    -> Result<usize>;

    /// Number of flashcards generated from a document
    async fn count_flashcards_for_document(&self, document_id: DocumentId) -> Result<i64>;

    /// Number of flashcards in a collection
    async fn count_flashcards_for_collection(&self, collection_id: CollectionId) -> Result<i64>;

    /// Flashcards generated from a document, oldest first
    async fn list_flashcards_by_document(&self, document_id: DocumentId) -> Result<Vec<Flashcard>>;
}

/// Collections (decks)
#[async_trait]
pub trait CollectionStore: Send + Sync {
    /// Create an empty collection
    async fn create_collection(&self, user_id: &str, title: &str) -> Result<CollectionId>;

    /// Fetch one collection
    async fn get_collection(&self, id: CollectionId) -> Result<Option<Collection>>;

    /// Overwrite the collection's card count
    async fn set_card_count(&self, id: CollectionId, count: i64) -> Result<()>;
}

/// Upload batches
#[async_trait]
pub trait BatchStore: Send + Sync {
    /// Create an empty batch targeting a collection
    async fn create_batch(&self, user_id: &str, collection_id: CollectionId) -> Result<BatchId>;

    /// Fetch a batch with its document ids in upload order
    async fn get_batch(&self, id: BatchId) -> Result<Option<UploadBatch>>;
}

/// Scheduled batch executions
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Record a new PENDING task for a batch
    async fn create_task(&self, batch_id: BatchId) -> Result<TaskId>;

    /// Fetch the polling view of a task
    async fn get_task(&self, id: TaskId) -> Result<Option<BatchTaskStatus>>;

    /// The PENDING or RUNNING task of a batch, if any
    async fn find_active_task_for_batch(&self, batch_id: BatchId) -> Result<Option<TaskId>>;

    /// Mark a task RUNNING and record the attempt number that is starting
    async fn mark_task_running(&self, id: TaskId, attempt: u32) -> Result<()>;

    /// Record the terminal state of a task
    async fn finish_task(
        &self,
        id: TaskId,
        state: TaskState,
        result: Option<&ProcessingResult>,
        error: Option<&str>,
    ) -> Result<()>;

    /// Tasks left PENDING or RUNNING, oldest first
    async fn list_unfinished_tasks(&self) -> Result<Vec<BatchTaskStatus>>;
}

/// Everything the pipeline needs from persistence
pub trait PipelineStore:
    DocumentStore + FlashcardStore + CollectionStore + BatchStore + TaskStore
{
}

impl<T> PipelineStore for T where
    T: DocumentStore + FlashcardStore + CollectionStore + BatchStore + TaskStore
{
}
