//! Batch orchestration
//!
//! [`BatchOrchestrator::process_batch`] drives every document of one upload
//! batch through fetch, extraction, generation, validation and persistence.
//! Documents are processed one after another and independently: whatever
//! goes wrong with one document is recorded on it (status FAILED plus an
//! error message) and the batch moves on. Only failures of the store itself
//! escape as `Err`, for the task runner to retry.
//!
//! ## Recovery on re-invocation
//!
//! | status at start | action                                                     |
//! |-----------------|------------------------------------------------------------|
//! | UPLOADED        | processed                                                  |
//! | PROCESSING      | left over by an interrupted attempt: reprocessed if it has |
//! |                 | no flashcards yet, otherwise marked FAILED                 |
//! | COMPLETED/FAILED| skipped                                                    |

use crate::config::Config;
use crate::error::{BatchError, Error, Result};
use crate::extraction::TextExtractor;
use crate::generation::FlashcardGenerator;
use crate::storage::FileStorage;
use crate::store::PipelineStore;
use crate::types::{BatchId, DocumentRecord, DocumentStatus, GenerationOptions, ProcessingResult};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

mod document;
mod tally;
pub mod validation;

pub use tally::{BatchTally, DocumentOutcome};

/// Error message recorded on documents a cancelled batch never got to
pub const CANCELLED_REASON: &str = "batch cancelled";

/// Failure reported for a document whose record disappeared during the run
pub const MISSING_REASON: &str = "document record no longer exists";

/// Error message recorded on a PROCESSING document that already has flashcards
pub const INTERRUPTED_REASON: &str = "partial results from interrupted attempt";

/// What the task runner needs from an orchestrator
#[async_trait]
pub trait BatchProcessor: Send + Sync {
    /// Run one attempt over the batch
    ///
    /// `cancel` stops the batch for good: documents not yet started are
    /// failed. `interrupt` only pauses it: the run stops before the next
    /// document and leaves the rest untouched so a later attempt can finish.
    async fn run_batch(
        &self,
        batch_id: BatchId,
        cancel: &CancellationToken,
        interrupt: &CancellationToken,
    ) -> Result<ProcessingResult>;

    /// Mark every UPLOADED or PROCESSING document of the batch FAILED, returning how many moved
    async fn fail_unfinished_documents(&self, batch_id: BatchId, reason: &str) -> Result<usize>;
}

/// Coordinates storage, extraction, generation and persistence for upload batches
pub struct BatchOrchestrator {
    store: Arc<dyn PipelineStore>,
    storage: Arc<dyn FileStorage>,
    extractor: Arc<dyn TextExtractor>,
    generator: Arc<dyn FlashcardGenerator>,
    options: GenerationOptions,
}

impl BatchOrchestrator {
    /// Create an orchestrator
    ///
    /// `generator` is called once per document; wrap it in a
    /// [`RetryingGenerator`](crate::generation::RetryingGenerator) to get
    /// bounded retries of provider failures.
    pub fn new(
        config: &Config,
        store: Arc<dyn PipelineStore>,
        storage: Arc<dyn FileStorage>,
        extractor: Arc<dyn TextExtractor>,
        generator: Arc<dyn FlashcardGenerator>,
    ) -> Self {
        Self {
            store,
            storage,
            extractor,
            generator,
            options: GenerationOptions {
                max_cards: config.generation.max_cards,
                difficulty_hint: config.generation.difficulty_hint,
            },
        }
    }

    /// Process every non-terminal document of a batch
    ///
    /// `cancel` is checked before each document, never during one. Once it
    /// fires, the documents not yet started are marked FAILED with
    /// [`CANCELLED_REASON`] and the partial result is returned with
    /// `cancelled` set. The collection's card count is recomputed from the
    /// persisted flashcards at the end of every run.
    pub async fn process_batch(
        &self,
        batch_id: BatchId,
        cancel: &CancellationToken,
    ) -> Result<ProcessingResult> {
        self.run_batch(batch_id, cancel, &CancellationToken::new()).await
    }

    /// [`process_batch`](Self::process_batch) that can also be interrupted
    ///
    /// When `interrupt` fires the run stops before the next document, like a
    /// cancellation, but the documents not yet started keep their status and
    /// the result comes back with `interrupted` set.
    pub async fn run_batch(
        &self,
        batch_id: BatchId,
        cancel: &CancellationToken,
        interrupt: &CancellationToken,
    ) -> Result<ProcessingResult> {
        let batch = self
            .store
            .get_batch(batch_id)
            .await?
            .ok_or(BatchError::NotFound { id: batch_id })?;
        let documents = self.store.list_documents_by_batch(batch_id).await?;

        tracing::info!(
            batch_id = batch_id.0,
            collection_id = batch.collection_id.0,
            documents = documents.len(),
            "batch processing started"
        );

        let mut tally = BatchTally::new(batch_id);
        let mut cancelled = false;
        let mut interrupted = false;
        let mut documents = documents.into_iter();

        while let Some(document) = documents.next() {
            if interrupt.is_cancelled() {
                interrupted = true;
                tracing::info!(
                    batch_id = batch_id.0,
                    processed = tally.documents_seen(),
                    remaining = documents.len() + 1,
                    "batch interrupted, remaining documents left for the next attempt"
                );
                break;
            }

            if cancel.is_cancelled() {
                cancelled = true;
                tracing::warn!(
                    batch_id = batch_id.0,
                    processed = tally.documents_seen(),
                    "batch cancelled, failing documents not yet started"
                );
                for leftover in std::iter::once(document).chain(documents.by_ref()) {
                    let outcome = self.cancel_document(&leftover).await?;
                    tally = tally.record(outcome);
                }
                break;
            }

            let outcome = self.process_document(&document).await?;
            tally = tally.record(outcome);
        }

        let card_count = self
            .store
            .count_flashcards_for_collection(batch.collection_id)
            .await?;
        self.store
            .set_card_count(batch.collection_id, card_count)
            .await?;

        let mut result = tally.finish(cancelled);
        result.interrupted = interrupted;
        tracing::info!(
            batch_id = batch_id.0,
            succeeded = result.succeeded,
            failed = result.failed,
            skipped = result.skipped,
            cards_created = result.cards_created,
            collection_cards = card_count,
            cancelled,
            interrupted,
            "batch processing finished"
        );

        Ok(result)
    }

    /// Mark every UPLOADED or PROCESSING document of the batch FAILED with `reason`
    pub async fn fail_unfinished_documents(&self, batch_id: BatchId, reason: &str) -> Result<usize> {
        let mut moved = 0;
        for document in self.store.list_documents_by_batch(batch_id).await? {
            if document.status.is_terminal() {
                continue;
            }
            match self
                .store
                .update_document_status(document.id, DocumentStatus::Failed, Some(reason))
                .await
            {
                Ok(_) => moved += 1,
                Err(Error::Transition(e)) => {
                    tracing::warn!(document_id = document.id.0, error = %e, "document changed underneath, left as is");
                }
                Err(Error::NotFound(what)) => {
                    tracing::warn!(document_id = document.id.0, missing = %what, "document deleted, left as is");
                }
                Err(e) => return Err(e),
            }
        }

        if moved > 0 {
            tracing::error!(batch_id = batch_id.0, documents = moved, reason, "unfinished documents marked failed");
        }
        Ok(moved)
    }

    async fn cancel_document(&self, document: &DocumentRecord) -> Result<DocumentOutcome> {
        if document.status.is_terminal() {
            return Ok(DocumentOutcome::Skipped);
        }
        self.fail_document(document, CANCELLED_REASON, 0, 0).await
    }
}

#[async_trait]
impl BatchProcessor for BatchOrchestrator {
    async fn run_batch(
        &self,
        batch_id: BatchId,
        cancel: &CancellationToken,
        interrupt: &CancellationToken,
    ) -> Result<ProcessingResult> {
        BatchOrchestrator::run_batch(self, batch_id, cancel, interrupt).await
    }

    async fn fail_unfinished_documents(&self, batch_id: BatchId, reason: &str) -> Result<usize> {
        BatchOrchestrator::fail_unfinished_documents(self, batch_id, reason).await
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
