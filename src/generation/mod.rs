//! Flashcard generation
//!
//! [`FlashcardGenerator`] is the seam the orchestrator calls. The provided
//! pieces compose:
//!
//! ```text
//! RetryingGenerator ──► PromptGenerator ──► CompletionClient (provider HTTP, external)
//!                            │
//!                            └─ prompts::build_*_prompt, parse::parse_flashcard_response
//! ```

use crate::config::RetryConfig;
use crate::error::GenerationError;
use crate::extraction::ExtractedText;
use crate::retry::with_retry;
use crate::types::{FlashcardDraft, GenerationOptions};
use async_trait::async_trait;
use std::sync::Arc;

pub mod parse;
pub mod prompts;
mod provider;

pub use provider::{CompletionClient, PromptGenerator};

/// Produces flashcard drafts from document text
#[async_trait]
pub trait FlashcardGenerator: Send + Sync {
    /// Generate up to `options.max_cards` drafts for the named document
    async fn generate(
        &self,
        document_name: &str,
        text: &ExtractedText,
        options: &GenerationOptions,
    ) -> Result<Vec<FlashcardDraft>, GenerationError>;
}

#[async_trait]
impl<G: FlashcardGenerator + ?Sized> FlashcardGenerator for Arc<G> {
    async fn generate(
        &self,
        document_name: &str,
        text: &ExtractedText,
        options: &GenerationOptions,
    ) -> Result<Vec<FlashcardDraft>, GenerationError> {
        (**self).generate(document_name, text, options).await
    }
}

/// Wraps a generator with a bounded retry policy
///
/// Every [`GenerationError`] is retried; the last one is surfaced once the
/// policy's attempts are used up.
pub struct RetryingGenerator<G> {
    inner: G,
    retry: RetryConfig,
}

impl<G> RetryingGenerator<G> {
    /// Retry `inner` according to `retry`
    pub fn new(inner: G, retry: RetryConfig) -> Self {
        Self { inner, retry }
    }

    /// The wrapped generator
    pub fn inner(&self) -> &G {
        &self.inner
    }
}

#[async_trait]
impl<G: FlashcardGenerator> FlashcardGenerator for RetryingGenerator<G> {
    async fn generate(
        &self,
        document_name: &str,
        text: &ExtractedText,
        options: &GenerationOptions,
    ) -> Result<Vec<FlashcardDraft>, GenerationError> {
        with_retry(&self.retry, || self.inner.generate(document_name, text, options)).await
    }
}
