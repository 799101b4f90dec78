//! Pipeline fixtures: a real SQLite database and upload directory, plus
//! scripted stand-ins for the AI provider and the binary-format extractors

use async_trait::async_trait;
use opendeck_pipeline::error::{ExtractionError, GenerationError};
use opendeck_pipeline::extraction::{ExtractedText, Page};
use opendeck_pipeline::generation::{CompletionClient, PromptGenerator, RetryingGenerator};
use opendeck_pipeline::store::{
    BatchStore, CollectionStore, DocumentStore, FlashcardStore, NewDocument, TaskStore,
};
use opendeck_pipeline::types::{
    AcceptedDraft, BatchId, BatchTaskStatus, Collection, CollectionId, DocumentId,
    DocumentRecord, DocumentStatus, FileType, Flashcard, ProcessingResult, TaskId, TaskState,
    UploadBatch,
};
use opendeck_pipeline::{
    BatchOrchestrator, Config, Database, LocalStorage, PlainTextExtractor, Result, TaskRunner,
    TextExtractor,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use super::config::fast_config;

pub const USER: &str = "user-1";

// ----------------------------------------------------------------------------
// AI provider
// ----------------------------------------------------------------------------

#[derive(Default)]
struct ProviderState {
    bodies: HashMap<String, String>,
    errors: HashMap<String, GenerationError>,
    cancel_on: Option<(String, CancellationToken)>,
    hold_on: Option<(String, Arc<Notify>, Arc<Notify>)>,
    calls: Vec<String>,
}

/// Chat completion stand-in keyed by the document name found in the system prompt
///
/// Unscripted documents get three well-formed cards citing page 1.
#[derive(Clone, Default)]
pub struct FakeProvider {
    state: Arc<Mutex<ProviderState>>,
}

impl FakeProvider {
    /// Answer requests for `document` with this raw body
    pub fn respond(&self, document: &str, body: &str) {
        self.state
            .lock()
            .unwrap()
            .bodies
            .insert(document.to_string(), body.to_string());
    }

    /// Fail requests for `document`
    pub fn fail(&self, document: &str, error: GenerationError) {
        self.state
            .lock()
            .unwrap()
            .errors
            .insert(document.to_string(), error);
    }

    /// Fire `token` while answering for `document`
    pub fn cancel_during(&self, document: &str, token: CancellationToken) {
        self.state.lock().unwrap().cancel_on = Some((document.to_string(), token));
    }

    /// Park the request for `document` until released
    ///
    /// Returns `(entered, release)`: `entered` is notified once the request
    /// arrives, and the answer goes out after `release` is notified.
    pub fn hold(&self, document: &str) -> (Arc<Notify>, Arc<Notify>) {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        self.state.lock().unwrap().hold_on =
            Some((document.to_string(), entered.clone(), release.clone()));
        (entered, release)
    }

    /// Document names requested so far
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }
}

pub fn cards_json(document: &str, count: usize) -> String {
    let cards = (1..=count)
        .map(|n| {
            serde_json::json!({
                "question": format!("Question {n} from {document}?"),
                "answer": format!("Answer {n}"),
                "source": format!("{document} - Page {n}"),
            })
        })
        .collect::<Vec<_>>();
    serde_json::json!({ "flashcards": cards }).to_string()
}

/// Pull the document name out of the citation format line of the system prompt
fn document_name(system_prompt: &str) -> String {
    let start = system_prompt
        .find("Format: \"")
        .map(|i| i + "Format: \"".len())
        .expect("system prompt has a citation format line");
    let rest = &system_prompt[start..];
    let end = rest.find(" - Page X").expect("citation format names a page");
    rest[..end].to_string()
}

#[async_trait]
impl CompletionClient for FakeProvider {
    async fn complete(
        &self,
        system_prompt: &str,
        _user_prompt: &str,
    ) -> std::result::Result<String, GenerationError> {
        let name = document_name(system_prompt);
        let held = {
            let mut state = self.state.lock().unwrap();
            match &state.hold_on {
                Some((target, _, _)) if *target == name => state.hold_on.take(),
                _ => None,
            }
        };
        if let Some((_, entered, release)) = held {
            entered.notify_one();
            release.notified().await;
        }

        let mut state = self.state.lock().unwrap();
        state.calls.push(name.clone());

        if let Some((target, token)) = &state.cancel_on {
            if *target == name {
                token.cancel();
            }
        }

        if let Some(error) = state.errors.get(&name) {
            return Err(error.clone());
        }
        Ok(state
            .bodies
            .get(&name)
            .cloned()
            .unwrap_or_else(|| cards_json(&name, 3)))
    }
}

// ----------------------------------------------------------------------------
// Extraction
// ----------------------------------------------------------------------------

/// TXT through the real extractor; PDF as a header-checked text stub
pub struct FixtureExtractor;

#[async_trait]
impl TextExtractor for FixtureExtractor {
    async fn extract(
        &self,
        bytes: &[u8],
        file_type: FileType,
    ) -> std::result::Result<ExtractedText, ExtractionError> {
        match file_type {
            FileType::Txt => PlainTextExtractor.extract(bytes, file_type).await,
            FileType::Pdf => {
                let text = String::from_utf8_lossy(bytes);
                let Some(body) = text.strip_prefix("%PDF-1.7\n") else {
                    return Err(ExtractionError::CorruptFile {
                        reason: "missing %PDF header".to_string(),
                    });
                };
                Ok(ExtractedText {
                    text: body.to_string(),
                    pages: vec![Page {
                        number: 1,
                        text: body.to_string(),
                    }],
                })
            }
            other => Err(ExtractionError::UnsupportedFormat { file_type: other }),
        }
    }
}

// ----------------------------------------------------------------------------
// Store wrapper recording status writes
// ----------------------------------------------------------------------------

/// Delegates to [`Database`] and keeps every successful status write per document
pub struct RecordingStore {
    db: Arc<Database>,
    writes: Mutex<HashMap<DocumentId, Vec<DocumentStatus>>>,
}

impl RecordingStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            writes: Mutex::new(HashMap::new()),
        }
    }

    pub fn writes_for(&self, id: DocumentId) -> Vec<DocumentStatus> {
        self.writes
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl DocumentStore for RecordingStore {
    async fn create_document(&self, document: &NewDocument) -> Result<DocumentId> {
        self.db.create_document(document).await
    }

    async fn get_document(&self, id: DocumentId) -> Result<Option<DocumentRecord>> {
        self.db.get_document(id).await
    }

    async fn list_documents_by_batch(&self, batch_id: BatchId) -> Result<Vec<DocumentRecord>> {
        self.db.list_documents_by_batch(batch_id).await
    }

    async fn update_document_status(
        &self,
        id: DocumentId,
        status: DocumentStatus,
        error_message: Option<&str>,
    ) -> Result<DocumentRecord> {
        let record = self
            .db
            .update_document_status(id, status, error_message)
            .await?;
        self.writes
            .lock()
            .unwrap()
            .entry(id)
            .or_default()
            .push(status);
        Ok(record)
    }
}

#[async_trait]
impl FlashcardStore for RecordingStore {
    async fn create_flashcards(
        &self,
        document_id: DocumentId,
        drafts: &[AcceptedDraft],
    ) -> Result<usize> {
        self.db.create_flashcards(document_id, drafts).await
    }

    async fn count_flashcards_for_document(&self, document_id: DocumentId) -> Result<i64> {
        self.db.count_flashcards_for_document(document_id).await
    }

    async fn count_flashcards_for_collection(&self, collection_id: CollectionId) -> Result<i64> {
        self.db.count_flashcards_for_collection(collection_id).await
    }

    async fn list_flashcards_by_document(&self, document_id: DocumentId) -> Result<Vec<Flashcard>> {
        self.db.list_flashcards_by_document(document_id).await
    }
}

#[async_trait]
impl CollectionStore for RecordingStore {
    async fn create_collection(&self, user_id: &str, title: &str) -> Result<CollectionId> {
        self.db.create_collection(user_id, title).await
    }

    async fn get_collection(&self, id: CollectionId) -> Result<Option<Collection>> {
        self.db.get_collection(id).await
    }

    async fn set_card_count(&self, id: CollectionId, count: i64) -> Result<()> {
        self.db.set_card_count(id, count).await
    }
}

#[async_trait]
impl BatchStore for RecordingStore {
    async fn create_batch(&self, user_id: &str, collection_id: CollectionId) -> Result<BatchId> {
        self.db.create_batch(user_id, collection_id).await
    }

    async fn get_batch(&self, id: BatchId) -> Result<Option<UploadBatch>> {
        self.db.get_batch(id).await
    }
}

#[async_trait]
impl TaskStore for RecordingStore {
    async fn create_task(&self, batch_id: BatchId) -> Result<TaskId> {
        self.db.create_task(batch_id).await
    }

    async fn get_task(&self, id: TaskId) -> Result<Option<BatchTaskStatus>> {
        self.db.get_task(id).await
    }

    async fn find_active_task_for_batch(&self, batch_id: BatchId) -> Result<Option<TaskId>> {
        self.db.find_active_task_for_batch(batch_id).await
    }

    async fn mark_task_running(&self, id: TaskId, attempt: u32) -> Result<()> {
        self.db.mark_task_running(id, attempt).await
    }

    async fn finish_task(
        &self,
        id: TaskId,
        state: TaskState,
        result: Option<&ProcessingResult>,
        error: Option<&str>,
    ) -> Result<()> {
        self.db.finish_task(id, state, result, error).await
    }

    async fn list_unfinished_tasks(&self) -> Result<Vec<BatchTaskStatus>> {
        self.db.list_unfinished_tasks().await
    }
}

// ----------------------------------------------------------------------------
// Whole pipeline
// ----------------------------------------------------------------------------

/// Database, upload directory, one collection with one batch, and the fakes
pub struct Pipeline {
    pub config: Config,
    pub db: Arc<Database>,
    pub store: Arc<RecordingStore>,
    pub provider: FakeProvider,
    pub collection_id: CollectionId,
    pub batch_id: BatchId,
    _dir: TempDir,
}

impl Pipeline {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let config = fast_config(dir.path());
        std::fs::create_dir_all(config.persistence.storage_root.join(USER))
            .expect("failed to create upload dir");

        let db = Arc::new(
            Database::new(&config.persistence.database_path)
                .await
                .expect("failed to open database"),
        );
        let collection_id = db
            .create_collection(USER, "Cell Biology")
            .await
            .expect("failed to create collection");
        let batch_id = db
            .create_batch(USER, collection_id)
            .await
            .expect("failed to create batch");

        Self {
            config,
            store: Arc::new(RecordingStore::new(db.clone())),
            db,
            provider: FakeProvider::default(),
            collection_id,
            batch_id,
            _dir: dir,
        }
    }

    /// Another batch into the fixture collection
    pub async fn new_batch(&self) -> BatchId {
        self.db
            .create_batch(USER, self.collection_id)
            .await
            .expect("failed to create batch")
    }

    /// Write an upload to disk and register it in the fixture batch
    pub async fn upload(&self, filename: &str, content: &str) -> DocumentId {
        self.upload_to(self.batch_id, filename, content).await
    }

    pub async fn upload_to(&self, batch_id: BatchId, filename: &str, content: &str) -> DocumentId {
        let reference = format!("{USER}/{filename}");
        std::fs::write(self.upload_path(&reference), content).expect("failed to write upload");
        self.db
            .create_document(&NewDocument {
                batch_id,
                filename: filename.to_string(),
                storage_ref: reference,
            })
            .await
            .expect("failed to create document")
    }

    pub fn upload_path(&self, reference: &str) -> PathBuf {
        self.config.persistence.storage_root.join(reference)
    }

    pub fn orchestrator(&self) -> BatchOrchestrator {
        let generator = RetryingGenerator::new(
            PromptGenerator::new(self.provider.clone(), &self.config.generation),
            self.config.generation.retry.clone(),
        );
        BatchOrchestrator::new(
            &self.config,
            self.store.clone(),
            Arc::new(LocalStorage::new(&self.config.persistence.storage_root)),
            Arc::new(FixtureExtractor),
            Arc::new(generator),
        )
    }

    pub fn runner(&self) -> TaskRunner {
        TaskRunner::new(
            self.config.clone(),
            self.db.clone(),
            Arc::new(self.orchestrator()),
        )
    }

    pub async fn document(&self, id: DocumentId) -> DocumentRecord {
        self.db
            .get_document(id)
            .await
            .expect("get_document failed")
            .expect("document exists")
    }

    pub async fn cards(&self, id: DocumentId) -> Vec<Flashcard> {
        self.db
            .list_flashcards_by_document(id)
            .await
            .expect("list_flashcards_by_document failed")
    }

    pub async fn card_count(&self) -> i64 {
        self.db
            .get_collection(self.collection_id)
            .await
            .expect("get_collection failed")
            .expect("collection exists")
            .card_count
    }
}
