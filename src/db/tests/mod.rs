use crate::db::Database;
use crate::store::{BatchStore, CollectionStore, DocumentStore, NewDocument};
use crate::types::{BatchId, CollectionId, DocumentId};
use tempfile::NamedTempFile;


/// Fresh database holding one collection and one empty batch
pub(super) struct Fixture {
    pub db: Database,
    pub collection_id: CollectionId,
    pub batch_id: BatchId,
    _file: NamedTempFile,
}

impl Fixture {
    pub async fn new() -> Self {
        let file = NamedTempFile::new().unwrap();
        let db = Database::new(file.path()).await.unwrap();
        let collection_id = db.create_collection("user-1", "Biology").await.unwrap();
        let batch_id = db.create_batch("user-1", collection_id).await.unwrap();
        Self {
            db,
            collection_id,
            batch_id,
            _file: file,
        }
    }

    pub async fn add_document(&self, filename: &str) -> DocumentId {
        self.db
            .create_document(&NewDocument {
                batch_id: self.batch_id,
                filename: filename.to_string(),
                storage_ref: format!("uploads/{filename}"),
            })
            .await
            .unwrap()
    }
}
