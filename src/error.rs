//! Error types for opendeck-pipeline
//!
//! This module provides the error taxonomy of the processing pipeline:
//! - Collaborator contract errors (storage, extraction, generation)
//! - Persistence errors from the SQLite repository layer
//! - State machine violations
//! - Batch-level errors surfaced by the orchestrator and the task runner
//!
//! Document-level failures never leave the orchestrator as `Err`; they are
//! recorded on the document and in the batch result. Only batch-level
//! (infrastructure) failures propagate as [`Error`].

use crate::types::{BatchId, DocumentId, DocumentStatus, FileType};
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for opendeck-pipeline
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "retry.max_attempts")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Stored file could not be fetched
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Text extraction failed
    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// Flashcard generation failed
    #[error("generation error: {0}")]
    Generation(#[from] GenerationError),

    /// Illegal document status transition
    #[error("invalid status transition: {0}")]
    Transition(#[from] TransitionError),

    /// Batch-level failure
    #[error("batch error: {0}")]
    Batch(#[from] BatchError),

    /// Record not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Shutdown in progress - not accepting new batches
    #[error("shutdown in progress: not accepting new batches")]
    ShuttingDown,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Record not found
    #[error("record not found: {0}")]
    NotFound(String),

    /// Constraint violation (e.g., duplicate key)
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),
}

/// Errors from the file storage collaborator
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    /// Nothing is stored under the reference
    #[error("stored file not found: {reference}")]
    NotFound {
        /// The storage reference that was requested
        reference: String,
    },

    /// The backend failed while reading the file
    #[error("failed to read stored file {reference}: {message}")]
    Io {
        /// The storage reference that was requested
        reference: String,
        /// Underlying failure description
        message: String,
    },
}

/// Errors from the text extraction collaborator
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExtractionError {
    /// No extractor is available for this file type
    #[error("unsupported format: {file_type}")]
    UnsupportedFormat {
        /// The file type that could not be handled
        file_type: FileType,
    },

    /// The file is damaged or not what its extension claims
    #[error("corrupt file: {reason}")]
    CorruptFile {
        /// What the extractor tripped over
        reason: String,
    },

    /// The file contains no extractable text
    #[error("document contains no extractable text")]
    Empty,
}

/// Errors from the flashcard generator collaborator
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerationError {
    /// The AI provider could not be reached or returned a server error
    #[error("AI provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// The AI provider rejected the request because of rate limiting
    #[error("AI provider rate limited the request (retry after {retry_after_secs:?}s)")]
    RateLimited {
        /// Provider hint for when to retry, in seconds
        retry_after_secs: Option<u64>,
    },

    /// The AI provider answered with something that is not a flashcard payload
    #[error("malformed AI response: {0}")]
    MalformedResponse(String),
}

/// A document status change that the state machine does not allow
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("cannot move document from {from} to {to}")]
pub struct TransitionError {
    /// Status the document is currently in
    pub from: DocumentStatus,
    /// Status that was requested
    pub to: DocumentStatus,
}

/// Batch-level errors
#[derive(Debug, Error)]
pub enum BatchError {
    /// Batch not found in the database
    #[error("batch {id} not found")]
    NotFound {
        /// The batch ID that was not found
        id: BatchId,
    },

    /// Document referenced by a batch is missing
    #[error("document {id} of batch {batch_id} not found")]
    DocumentMissing {
        /// The missing document
        id: DocumentId,
        /// The batch that references it
        batch_id: BatchId,
    },

    /// The batch was cancelled before all documents reached a terminal status
    #[error("batch {id} cancelled")]
    Cancelled {
        /// The cancelled batch
        id: BatchId,
    },

    /// An attempt exceeded the hard execution budget and was terminated
    #[error("batch {id} attempt {attempt} exceeded the hard time limit of {limit_secs}s")]
    AttemptTimedOut {
        /// The batch whose attempt was terminated
        id: BatchId,
        /// 1-based attempt number
        attempt: u32,
        /// Hard limit that was exceeded
        limit_secs: u64,
    },

    /// All batch-level attempts failed
    #[error("batch {id} failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        /// The batch that failed
        id: BatchId,
        /// Number of attempts made
        attempts: u32,
        /// Message of the final failure
        last_error: String,
    },
}

impl Error {
    /// Whether this error originates in the persistence layer
    pub fn is_persistence(&self) -> bool {
        matches!(self, Error::Database(_) | Error::Sqlx(_))
    }
}
