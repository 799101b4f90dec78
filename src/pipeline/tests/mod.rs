use crate::config::Config;
use crate::db::Database;
use crate::error::{ExtractionError, GenerationError, StorageError};
use crate::extraction::{ExtractedText, Page, TextExtractor};
use crate::generation::FlashcardGenerator;
use crate::pipeline::BatchOrchestrator;
use crate::storage::FileStorage;
use crate::store::{BatchStore, CollectionStore, DocumentStore, NewDocument};
use crate::types::{
    BatchId, CollectionId, DocumentId, FileType, FlashcardDraft, GenerationOptions,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;
use tokio_util::sync::CancellationToken;


// ----------------------------------------------------------------------------
// Scripted collaborators
// ----------------------------------------------------------------------------

/// In-memory uploads keyed by storage reference
#[derive(Default)]
pub(super) struct MemoryStorage {
    files: Mutex<HashMap<String, Vec<u8>>>,
    delete_on_fetch: Mutex<Option<(String, Arc<Database>, DocumentId)>>,
}

impl MemoryStorage {
    pub fn put(&self, reference: &str, bytes: &[u8]) {
        self.files
            .lock()
            .unwrap()
            .insert(reference.to_string(), bytes.to_vec());
    }

    /// Delete the record of `document` while `reference` is being fetched
    pub fn delete_during_fetch(&self, reference: &str, db: Arc<Database>, document: DocumentId) {
        *self.delete_on_fetch.lock().unwrap() = Some((reference.to_string(), db, document));
    }
}

#[async_trait]
impl FileStorage for MemoryStorage {
    async fn fetch(&self, reference: &str) -> Result<Vec<u8>, StorageError> {
        let hook = {
            let mut hook = self.delete_on_fetch.lock().unwrap();
            match hook.as_ref() {
                Some((target, _, _)) if target == reference => hook.take(),
                _ => None,
            }
        };
        if let Some((_, db, document)) = hook {
            sqlx::query("DELETE FROM documents WHERE id = ?")
                .bind(document)
                .execute(db.pool())
                .await
                .unwrap();
        }

        self.files
            .lock()
            .unwrap()
            .get(reference)
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                reference: reference.to_string(),
            })
    }
}

/// Treats bytes as text; `CORRUPT` and `EMPTY` prefixes trigger the matching errors
pub(super) struct ScriptedExtractor;

#[async_trait]
impl TextExtractor for ScriptedExtractor {
    async fn extract(
        &self,
        bytes: &[u8],
        _file_type: FileType,
    ) -> Result<ExtractedText, ExtractionError> {
        let text = String::from_utf8_lossy(bytes).into_owned();
        if text.starts_with("CORRUPT") {
            return Err(ExtractionError::CorruptFile {
                reason: "bad xref table".into(),
            });
        }
        if text.starts_with("EMPTY") {
            return Err(ExtractionError::Empty);
        }
        Ok(ExtractedText {
            pages: vec![Page {
                number: 1,
                text: text.clone(),
            }],
            text,
        })
    }
}

pub(super) type GenerationOutcome = Result<Vec<FlashcardDraft>, GenerationError>;

/// Per-filename scripted generator; unscripted documents get three valid drafts
#[derive(Default)]
pub(super) struct ScriptedGenerator {
    outcomes: Mutex<HashMap<String, GenerationOutcome>>,
    calls: Mutex<Vec<String>>,
    cancel_on: Mutex<Option<(String, CancellationToken)>>,
}

impl ScriptedGenerator {
    pub fn script(&self, filename: &str, outcome: GenerationOutcome) {
        self.outcomes
            .lock()
            .unwrap()
            .insert(filename.to_string(), outcome);
    }

    /// Fire `token` while generating for `filename`
    pub fn cancel_during(&self, filename: &str, token: CancellationToken) {
        *self.cancel_on.lock().unwrap() = Some((filename.to_string(), token));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

pub(super) fn three_drafts(filename: &str) -> Vec<FlashcardDraft> {
    (1..=3)
        .map(|n| {
            FlashcardDraft::new(
                format!("Question {n} about {filename}?"),
                format!("Answer {n}"),
                format!("{filename} - Page {n}"),
            )
        })
        .collect()
}

#[async_trait]
impl FlashcardGenerator for ScriptedGenerator {
    async fn generate(
        &self,
        document_name: &str,
        _text: &ExtractedText,
        _options: &GenerationOptions,
    ) -> Result<Vec<FlashcardDraft>, GenerationError> {
        self.calls.lock().unwrap().push(document_name.to_string());

        if let Some((name, token)) = self.cancel_on.lock().unwrap().as_ref() {
            if name == document_name {
                token.cancel();
            }
        }

        self.outcomes
            .lock()
            .unwrap()
            .get(document_name)
            .cloned()
            .unwrap_or_else(|| Ok(three_drafts(document_name)))
    }
}

// ----------------------------------------------------------------------------
// Harness
// ----------------------------------------------------------------------------

pub(super) struct Harness {
    pub db: Arc<Database>,
    pub storage: Arc<MemoryStorage>,
    pub generator: Arc<ScriptedGenerator>,
    pub collection_id: CollectionId,
    pub batch_id: BatchId,
    pub config: Config,
    _file: NamedTempFile,
}

impl Harness {
    pub async fn new() -> Self {
        let file = NamedTempFile::new().unwrap();
        let db = Arc::new(Database::new(file.path()).await.unwrap());
        let collection_id = db.create_collection("user-1", "Cell Biology").await.unwrap();
        let batch_id = db.create_batch("user-1", collection_id).await.unwrap();

        Self {
            db,
            storage: Arc::new(MemoryStorage::default()),
            generator: Arc::new(ScriptedGenerator::default()),
            collection_id,
            batch_id,
            config: Config::default(),
            _file: file,
        }
    }

    /// Store `content` and register a document for it in the harness batch
    pub async fn upload(&self, filename: &str, content: &str) -> DocumentId {
        let reference = format!("user-1/{filename}");
        self.storage.put(&reference, content.as_bytes());
        self.db
            .create_document(&NewDocument {
                batch_id: self.batch_id,
                filename: filename.to_string(),
                storage_ref: reference,
            })
            .await
            .unwrap()
    }

    pub fn orchestrator(&self) -> BatchOrchestrator {
        BatchOrchestrator::new(
            &self.config,
            self.db.clone(),
            self.storage.clone(),
            Arc::new(ScriptedExtractor),
            self.generator.clone(),
        )
    }

    pub async fn document(&self, id: DocumentId) -> crate::types::DocumentRecord {
        self.db.get_document(id).await.unwrap().unwrap()
    }

    pub async fn card_count(&self) -> i64 {
        self.db
            .get_collection(self.collection_id)
            .await
            .unwrap()
            .unwrap()
            .card_count
    }
}
