//! Per-document processing steps.

use super::validation::{ValidatedDrafts, validate_drafts};
use super::{BatchOrchestrator, DocumentOutcome, INTERRUPTED_REASON, MISSING_REASON};
use crate::error::{Error, ExtractionError, GenerationError, Result};
use crate::types::{DocumentFailure, DocumentRecord, DocumentStatus};

impl BatchOrchestrator {
    /// Take one document from its status at batch start to a terminal status
    ///
    /// Returns `Err` only when the store cannot record the outcome.
    pub(super) async fn process_document(&self, document: &DocumentRecord) -> Result<DocumentOutcome> {
        match document.status {
            DocumentStatus::Completed | DocumentStatus::Failed => Ok(DocumentOutcome::Skipped),
            DocumentStatus::Uploaded => {
                // Claim before any I/O so observers see progress
                match self
                    .store
                    .update_document_status(document.id, DocumentStatus::Processing, None)
                    .await
                {
                    Ok(_) => self.run_document(document).await,
                    Err(Error::Transition(e)) => {
                        tracing::warn!(document_id = document.id.0, error = %e, "document already claimed, skipped");
                        Ok(DocumentOutcome::Skipped)
                    }
                    Err(Error::NotFound(_)) => Ok(self.missing_document(document, 0, 0)),
                    Err(e) => {
                        let message = format!("failed to start processing: {e}");
                        self.fail_document(document, &message, 0, 0).await
                    }
                }
            }
            DocumentStatus::Processing => {
                let existing = self.store.count_flashcards_for_document(document.id).await?;
                if existing > 0 {
                    tracing::warn!(
                        document_id = document.id.0,
                        flashcards = existing,
                        "orphaned document has partial flashcards, failing it"
                    );
                    self.fail_document(document, INTERRUPTED_REASON, 0, 0).await
                } else {
                    tracing::warn!(document_id = document.id.0, "orphaned document reprocessed");
                    self.run_document(document).await
                }
            }
        }
    }

    /// Steps for a document already in PROCESSING
    async fn run_document(&self, document: &DocumentRecord) -> Result<DocumentOutcome> {
        let validated = match self.produce_drafts(document).await {
            Ok(validated) => validated,
            Err(message) => return self.fail_document(document, &message, 0, 0).await,
        };
        let rejected = validated.rejected;

        let cards = match self
            .store
            .create_flashcards(document.id, &validated.accepted)
            .await
        {
            Ok(cards) => cards,
            Err(e) => {
                let message = format!("failed to save flashcards: {e}");
                return self.fail_document(document, &message, 0, rejected).await;
            }
        };

        match self
            .store
            .update_document_status(document.id, DocumentStatus::Completed, None)
            .await
        {
            Ok(_) => {
                tracing::info!(
                    document_id = document.id.0,
                    filename = %document.filename,
                    cards,
                    rejected,
                    "document completed"
                );
                Ok(DocumentOutcome::Completed {
                    cards_created: cards,
                    rejected_drafts: rejected,
                })
            }
            Err(e) => {
                let message = format!("failed to mark document completed: {e}");
                self.fail_document(document, &message, cards, rejected).await
            }
        }
    }

    /// Fetch, extract, generate and validate; the error is the message to record
    async fn produce_drafts(&self, document: &DocumentRecord) -> std::result::Result<ValidatedDrafts, String> {
        let bytes = self
            .storage
            .fetch(&document.storage_ref)
            .await
            .map_err(|e| Error::from(e).to_string())?;

        let file_type = document.file_type().ok_or_else(|| {
            format!("extraction error: unrecognized file type for {}", document.filename)
        })?;

        let text = self
            .extractor
            .extract(&bytes, file_type)
            .await
            .map_err(|e| Error::from(e).to_string())?;
        if text.is_blank() {
            return Err(Error::from(ExtractionError::Empty).to_string());
        }

        let drafts = match self
            .generator
            .generate(&document.filename, &text, &self.options)
            .await
        {
            Ok(drafts) => drafts,
            Err(GenerationError::MalformedResponse(reason)) => {
                // Unusable model output is an empty result, not a processing error
                tracing::warn!(
                    document_id = document.id.0,
                    reason = %reason,
                    "generator output unusable, completing without flashcards"
                );
                Vec::new()
            }
            Err(e) => return Err(Error::from(e).to_string()),
        };

        if drafts.is_empty() {
            tracing::warn!(document_id = document.id.0, "generator returned no flashcards");
        }

        Ok(validate_drafts(&document.filename, drafts, self.options.max_cards))
    }

    /// Record a document failure
    ///
    /// A concurrent terminal write wins and turns this into a skip.
    pub(super) async fn fail_document(
        &self,
        document: &DocumentRecord,
        message: &str,
        cards_created: usize,
        rejected_drafts: usize,
    ) -> Result<DocumentOutcome> {
        match self
            .store
            .update_document_status(document.id, DocumentStatus::Failed, Some(message))
            .await
        {
            Ok(_) => {
                tracing::error!(
                    document_id = document.id.0,
                    filename = %document.filename,
                    error = message,
                    "document failed"
                );
                Ok(DocumentOutcome::Failed {
                    failure: DocumentFailure {
                        document_id: document.id,
                        filename: document.filename.clone(),
                        message: message.to_string(),
                    },
                    cards_created,
                    rejected_drafts,
                })
            }
            Err(Error::Transition(e)) => {
                tracing::warn!(document_id = document.id.0, error = %e, "document already terminal");
                Ok(DocumentOutcome::Skipped)
            }
            Err(Error::NotFound(_)) => {
                Ok(self.missing_document(document, cards_created, rejected_drafts))
            }
            Err(e) => Err(e),
        }
    }

    /// The record was deleted mid-batch; nothing left to write, but the run counts it as failed
    fn missing_document(
        &self,
        document: &DocumentRecord,
        cards_created: usize,
        rejected_drafts: usize,
    ) -> DocumentOutcome {
        tracing::warn!(
            document_id = document.id.0,
            filename = %document.filename,
            "document record deleted during processing"
        );
        DocumentOutcome::Failed {
            failure: DocumentFailure {
                document_id: document.id,
                filename: document.filename.clone(),
                message: MISSING_REASON.to_string(),
            },
            cards_created,
            rejected_drafts,
        }
    }
}
