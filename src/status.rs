//! Document status state machine
//!
//! ```text
//! UPLOADED ──► PROCESSING ──► COMPLETED
//!    │              │
//!    └──────────────┴───────► FAILED
//! ```
//!
//! COMPLETED and FAILED are terminal. UPLOADED may move straight to FAILED
//! when a batch is cancelled or gives up before the document was started.

use crate::error::TransitionError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Processing status of an uploaded document
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    /// Stored and waiting to be processed
    Uploaded,
    /// Picked up by a batch attempt
    Processing,
    /// Processed; flashcards (possibly none) were persisted
    Completed,
    /// Processing failed; see the document's error message
    Failed,
}

impl DocumentStatus {
    /// Convert integer status code to DocumentStatus
    pub fn from_i32(status: i32) -> Self {
        match status {
            0 => DocumentStatus::Uploaded,
            1 => DocumentStatus::Processing,
            2 => DocumentStatus::Completed,
            _ => DocumentStatus::Failed,
        }
    }

    /// Convert DocumentStatus to integer status code
    pub fn to_i32(&self) -> i32 {
        match self {
            DocumentStatus::Uploaded => 0,
            DocumentStatus::Processing => 1,
            DocumentStatus::Completed => 2,
            DocumentStatus::Failed => 3,
        }
    }

    /// Lowercase name used in messages and serialized output
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Uploaded => "uploaded",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Completed => "completed",
            DocumentStatus::Failed => "failed",
        }
    }

    /// Whether no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, DocumentStatus::Completed | DocumentStatus::Failed)
    }

    /// Whether `self -> to` is an edge of the state machine
    pub fn can_transition_to(&self, to: DocumentStatus) -> bool {
        use DocumentStatus::*;
        matches!(
            (self, to),
            (Uploaded, Processing) | (Uploaded, Failed) | (Processing, Completed) | (Processing, Failed)
        )
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validate a requested transition, returning the error the store should surface
pub fn check_transition(from: DocumentStatus, to: DocumentStatus) -> Result<(), TransitionError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(TransitionError { from, to })
    }
}
