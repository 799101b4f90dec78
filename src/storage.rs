//! Stored upload retrieval
//!
//! The pipeline only ever reads uploads back; writing them is the upload
//! layer's job. [`LocalStorage`] serves files below a root directory.

use crate::error::StorageError;
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};

/// Read access to stored uploads
#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Fetch the bytes stored under `reference`
    async fn fetch(&self, reference: &str) -> Result<Vec<u8>, StorageError>;
}

/// Local filesystem storage
#[derive(Clone, Debug)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    /// Serve files below `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory files are resolved against
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a reference to a path, refusing anything that could leave the root
    fn resolve(&self, reference: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(reference);
        let escapes = reference.trim().is_empty()
            || relative
                .components()
                .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));

        if escapes {
            return Err(StorageError::Io {
                reference: reference.to_string(),
                message: "reference resolves outside the storage root".to_string(),
            });
        }

        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl FileStorage for LocalStorage {
    async fn fetch(&self, reference: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.resolve(reference)?;

        tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StorageError::NotFound {
                reference: reference.to_string(),
            },
            _ => StorageError::Io {
                reference: reference.to_string(),
                message: e.to_string(),
            },
        })
    }
}
