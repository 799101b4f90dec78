//! Folding per-document outcomes into a batch result.

use crate::types::{BatchId, DocumentFailure, ProcessingResult};

/// How one document ended in this run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentOutcome {
    /// Reached COMPLETED
    Completed {
        /// Flashcards persisted
        cards_created: usize,
        /// Drafts dropped by validation
        rejected_drafts: usize,
    },
    /// Reached FAILED
    Failed {
        /// Recorded failure
        failure: DocumentFailure,
        /// Flashcards persisted before the failure, if any
        cards_created: usize,
        /// Drafts dropped by validation
        rejected_drafts: usize,
    },
    /// Already terminal when the run started, or claimed by someone else
    Skipped,
}

/// Accumulator for one batch run
#[derive(Debug)]
pub struct BatchTally {
    result: ProcessingResult,
}

impl BatchTally {
    /// Empty tally for `batch_id`
    pub fn new(batch_id: BatchId) -> Self {
        Self {
            result: ProcessingResult {
                batch_id,
                ..ProcessingResult::default()
            },
        }
    }

    /// Fold one outcome in
    pub fn record(mut self, outcome: DocumentOutcome) -> Self {
        let r = &mut self.result;
        match outcome {
            DocumentOutcome::Completed {
                cards_created,
                rejected_drafts,
            } => {
                r.succeeded += 1;
                r.cards_created += cards_created;
                r.rejected_drafts += rejected_drafts;
            }
            DocumentOutcome::Failed {
                failure,
                cards_created,
                rejected_drafts,
            } => {
                r.failed += 1;
                r.cards_created += cards_created;
                r.rejected_drafts += rejected_drafts;
                r.errors.push(failure);
            }
            DocumentOutcome::Skipped => r.skipped += 1,
        }
        self
    }

    /// Documents accounted for so far
    pub fn documents_seen(&self) -> usize {
        self.result.succeeded + self.result.failed + self.result.skipped
    }

    /// Close the tally
    pub fn finish(mut self, cancelled: bool) -> ProcessingResult {
        self.result.cancelled = cancelled;
        self.result
    }
}
