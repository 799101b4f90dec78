//! Core types for opendeck-pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use crate::status::DocumentStatus;

/// Declares an `i64` newtype identifier with the conversions and SQLite codecs
/// every row id needs.
macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// Get the inner i64 value
            pub fn get(&self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.parse()?))
            }
        }

        impl sqlx::Type<sqlx::Sqlite> for $name {
            fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
                <i64 as sqlx::Type<sqlx::Sqlite>>::type_info()
            }

            fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
                <i64 as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
            }
        }

        impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for $name {
            fn encode_by_ref(
                &self,
                buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
            ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
                sqlx::Encode::<sqlx::Sqlite>::encode_by_ref(&self.0, buf)
            }
        }

        impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for $name {
            fn decode(
                value: sqlx::sqlite::SqliteValueRef<'r>,
            ) -> Result<Self, sqlx::error::BoxDynError> {
                let id = <i64 as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
                Ok(Self(id))
            }
        }
    };
}

row_id!(
    /// Identifies one upload batch
    BatchId
);
row_id!(
    /// Identifies one uploaded document
    DocumentId
);
row_id!(
    /// Identifies a collection (deck) of flashcards
    CollectionId
);
row_id!(
    /// Identifies a persisted flashcard
    FlashcardId
);
row_id!(
    /// Identifies one scheduled batch execution
    TaskId
);

/// Supported upload formats
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    /// Portable Document Format
    Pdf,
    /// Word document
    Docx,
    /// PowerPoint presentation
    Pptx,
    /// Plain text
    Txt,
}

impl FileType {
    /// Infer the file type from a filename's extension (case-insensitive)
    pub fn from_filename(filename: &str) -> Option<Self> {
        let (_, ext) = filename.rsplit_once('.')?;
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(FileType::Pdf),
            "docx" => Some(FileType::Docx),
            "pptx" => Some(FileType::Pptx),
            "txt" => Some(FileType::Txt),
            _ => None,
        }
    }

    /// Canonical lowercase extension
    pub fn extension(&self) -> &'static str {
        match self {
            FileType::Pdf => "pdf",
            FileType::Docx => "docx",
            FileType::Pptx => "pptx",
            FileType::Txt => "txt",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Flashcard difficulty tag
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    /// Introductory material
    Beginner,
    /// Working knowledge
    Intermediate,
    /// Expert detail
    Advanced,
}

impl Difficulty {
    /// Lenient parse used for model output ("easy"/"medium"/"hard" are accepted too)
    pub fn parse_loose(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "beginner" | "easy" | "basic" => Some(Difficulty::Beginner),
            "intermediate" | "medium" => Some(Difficulty::Intermediate),
            "advanced" | "hard" | "expert" => Some(Difficulty::Advanced),
            _ => None,
        }
    }

    /// Lowercase storage name
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Beginner => "beginner",
            Difficulty::Intermediate => "intermediate",
            Difficulty::Advanced => "advanced",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One user submission destined for a single collection
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UploadBatch {
    /// Batch ID
    pub id: BatchId,
    /// Owning user
    pub user_id: String,
    /// Collection the generated flashcards belong to
    pub collection_id: CollectionId,
    /// Documents in upload order
    pub document_ids: Vec<DocumentId>,
    /// When the batch was accepted
    pub created_at: DateTime<Utc>,
}

/// Processing lifecycle record of one uploaded file
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Document ID
    pub id: DocumentId,
    /// Batch the document was uploaded with
    pub batch_id: BatchId,
    /// Original filename as uploaded
    pub filename: String,
    /// Opaque reference understood by the file storage backend
    pub storage_ref: String,
    /// Current processing status
    pub status: DocumentStatus,
    /// Failure reason when status is FAILED
    pub error_message: Option<String>,
    /// When the document reached a terminal status
    pub processed_at: Option<DateTime<Utc>>,
    /// When the record was created
    pub created_at: DateTime<Utc>,
    /// When the record was last written
    pub updated_at: DateTime<Utc>,
}

impl DocumentRecord {
    /// File type inferred from the original filename
    pub fn file_type(&self) -> Option<FileType> {
        FileType::from_filename(&self.filename)
    }
}

/// Candidate flashcard produced by a generator, not yet validated
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FlashcardDraft {
    /// Question side
    pub question: String,
    /// Answer side
    pub answer: String,
    /// Source citation, `"<document> - <location>"`
    pub source: Option<String>,
    /// Optional difficulty tag
    pub difficulty: Option<Difficulty>,
}

impl FlashcardDraft {
    /// Create a draft with a citation
    pub fn new(
        question: impl Into<String>,
        answer: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            source: Some(source.into()),
            difficulty: None,
        }
    }
}

/// A validated draft ready for persistence; the citation is guaranteed non-empty
#[derive(Clone, Debug, PartialEq)]
pub struct AcceptedDraft {
    /// Question side (trimmed, non-empty)
    pub question: String,
    /// Answer side (trimmed, non-empty)
    pub answer: String,
    /// Source citation (non-empty)
    pub source: String,
    /// Optional difficulty tag
    pub difficulty: Option<Difficulty>,
}

/// Persisted flashcard
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Flashcard {
    /// Flashcard ID
    pub id: FlashcardId,
    /// Collection the card belongs to
    pub collection_id: CollectionId,
    /// Document the card was generated from
    pub document_id: DocumentId,
    /// Question side
    pub question: String,
    /// Answer side
    pub answer: String,
    /// Source citation
    pub source: String,
    /// Optional difficulty tag
    pub difficulty: Option<Difficulty>,
    /// When the card was created
    pub created_at: DateTime<Utc>,
}

/// Collection (deck) of flashcards
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    /// Collection ID
    pub id: CollectionId,
    /// Owning user
    pub user_id: String,
    /// Display title
    pub title: String,
    /// Number of flashcards in the collection
    pub card_count: i64,
    /// When the collection was created
    pub created_at: DateTime<Utc>,
    /// When the collection was last written
    pub updated_at: DateTime<Utc>,
}

/// Parameters passed to a flashcard generator
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Upper bound on the number of cards to return
    pub max_cards: usize,
    /// Preferred difficulty, if any
    pub difficulty_hint: Option<Difficulty>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            max_cards: 20,
            difficulty_hint: None,
        }
    }
}

/// One document that ended in FAILED during a batch run
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentFailure {
    /// Failed document
    pub document_id: DocumentId,
    /// Its original filename
    pub filename: String,
    /// Recorded error message
    pub message: String,
}

/// Aggregate outcome of one batch attempt
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingResult {
    /// Batch the result belongs to
    pub batch_id: BatchId,
    /// Documents that reached COMPLETED in this run
    pub succeeded: usize,
    /// Documents that reached FAILED in this run
    pub failed: usize,
    /// Documents already terminal when the run started
    pub skipped: usize,
    /// Flashcards persisted in this run
    pub cards_created: usize,
    /// Drafts dropped by validation
    pub rejected_drafts: usize,
    /// Per-document failure messages, in processing order
    pub errors: Vec<DocumentFailure>,
    /// Whether the run stopped early because of cancellation
    pub cancelled: bool,
    /// Whether the run stopped early for a shutdown, leaving unstarted documents untouched
    #[serde(default)]
    pub interrupted: bool,
}

impl Default for BatchId {
    fn default() -> Self {
        Self(0)
    }
}

/// Lifecycle state of a scheduled batch execution
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    /// Accepted, waiting for a worker
    Pending,
    /// An attempt is executing (or waiting out a retry backoff)
    Running,
    /// Finished with a result
    Succeeded,
    /// Finished without a usable result, or stopped early
    Failed,
}

impl TaskState {
    /// Convert integer state code to TaskState
    pub fn from_i32(state: i32) -> Self {
        match state {
            0 => TaskState::Pending,
            1 => TaskState::Running,
            2 => TaskState::Succeeded,
            _ => TaskState::Failed,
        }
    }

    /// Convert TaskState to integer state code
    pub fn to_i32(&self) -> i32 {
        match self {
            TaskState::Pending => 0,
            TaskState::Running => 1,
            TaskState::Succeeded => 2,
            TaskState::Failed => 3,
        }
    }

    /// Whether the task will not change any more
    pub fn is_finished(&self) -> bool {
        matches!(self, TaskState::Succeeded | TaskState::Failed)
    }
}

/// Polling view of a scheduled batch
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatchTaskStatus {
    /// Task ID returned by `enqueue_batch`
    pub task_id: TaskId,
    /// Batch being processed
    pub batch_id: BatchId,
    /// Current lifecycle state
    pub state: TaskState,
    /// Attempts started so far
    pub attempts: u32,
    /// Result of the final attempt, once finished
    pub result: Option<ProcessingResult>,
    /// Terminal error message, if the task failed
    pub error: Option<String>,
    /// When the task was enqueued
    pub created_at: DateTime<Utc>,
    /// When the task was last written
    pub updated_at: DateTime<Utc>,
}
