//! # opendeck-pipeline
//!
//! Asynchronous document-to-flashcard processing for the OpenDeck backend.
//!
//! A user uploads a batch of study documents into a collection. This crate
//! takes that batch off the request path and, for every document, fetches the
//! stored file, extracts its text, asks an AI provider for flashcards,
//! validates them and persists them, tracking each document through
//! `UPLOADED → PROCESSING → COMPLETED | FAILED`.
//!
//! ## Design Philosophy
//!
//! - **Failure isolation** - one bad document never stops the rest of its batch
//! - **Library-first** - no HTTP layer and no AI provider client; both plug in through traits
//! - **Restart-safe** - batch tasks live in SQLite and are picked up again after a crash
//! - **Explicit configuration** - everything tunable is a field of [`Config`]
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use opendeck_pipeline::{
//!     BatchOrchestrator, Config, Database, LocalStorage, PlainTextExtractor, TaskRunner,
//! };
//! use opendeck_pipeline::generation::{CompletionClient, PromptGenerator, RetryingGenerator};
//! use opendeck_pipeline::error::GenerationError;
//!
//! struct MyProvider;
//!
//! #[async_trait::async_trait]
//! impl CompletionClient for MyProvider {
//!     async fn complete(&self, _system: &str, _user: &str) -> Result<String, GenerationError> {
//!         Ok(r#"{"flashcards": []}"#.to_string())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     config.validate()?;
//!
//!     let db = Arc::new(Database::new(&config.persistence.database_path).await?);
//!     let generator = RetryingGenerator::new(
//!         PromptGenerator::new(MyProvider, &config.generation),
//!         config.generation.retry.clone(),
//!     );
//!     let orchestrator = BatchOrchestrator::new(
//!         &config,
//!         db.clone(),
//!         Arc::new(LocalStorage::new(&config.persistence.storage_root)),
//!         Arc::new(PlainTextExtractor),
//!         Arc::new(generator),
//!     );
//!
//!     let runner = TaskRunner::new(config, db, Arc::new(orchestrator));
//!     runner.start().await?;
//!
//!     # let batch_id = opendeck_pipeline::types::BatchId(1);
//!     let task_id = runner.enqueue_batch(batch_id).await?;
//!     let status = runner.get_batch_result(task_id).await?;
//!     println!("{:?}", status.state);
//!
//!     opendeck_pipeline::run_with_shutdown(runner).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Database persistence layer
pub mod db;
/// Error types
pub mod error;
/// Text extraction from uploaded files
pub mod extraction;
/// Flashcard generation
pub mod generation;
/// Batch orchestration
pub mod pipeline;
/// Retry logic with exponential backoff
pub mod retry;
/// Background batch execution
pub mod runner;
/// Document status state machine
pub mod status;
/// Stored upload retrieval
pub mod storage;
/// Repository traits over the persistence layer
pub mod store;
/// Core types
pub mod types;

// Re-export commonly used types
pub use config::{Config, GenerationConfig, PersistenceConfig, RetryConfig, RunnerConfig};
pub use db::Database;
pub use error::{
    BatchError, DatabaseError, Error, ExtractionError, GenerationError, Result, StorageError,
    TransitionError,
};
pub use extraction::{PlainTextExtractor, TextExtractor};
pub use generation::FlashcardGenerator;
pub use pipeline::{BatchOrchestrator, BatchProcessor};
pub use runner::TaskRunner;
pub use storage::{FileStorage, LocalStorage};
pub use types::{
    BatchId, BatchTaskStatus, CollectionId, DocumentId, DocumentRecord, DocumentStatus, FileType,
    Flashcard, FlashcardDraft, ProcessingResult, TaskId, TaskState,
};

/// Run the task runner until a termination signal arrives, then shut it down.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
pub async fn run_with_shutdown(runner: TaskRunner) -> Result<()> {
    wait_for_signal().await;
    runner.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration can fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("received SIGTERM"),
                _ = sigint.recv() => tracing::info!("received SIGINT"),
            }
        }
        (Err(e), Ok(mut sigint)) => {
            tracing::warn!(error = %e, "could not register SIGTERM handler, waiting for SIGINT only");
            sigint.recv().await;
            tracing::info!("received SIGINT");
        }
        (Ok(mut sigterm), Err(e)) => {
            tracing::warn!(error = %e, "could not register SIGINT handler, waiting for SIGTERM only");
            sigterm.recv().await;
            tracing::info!("received SIGTERM");
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "could not register any signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("received Ctrl+C"),
        Err(e) => tracing::error!(error = %e, "failed to listen for Ctrl+C"),
    }
}
