//! Prompt-driven generator over a chat completion provider.

use super::FlashcardGenerator;
use super::parse::parse_flashcard_response;
use super::prompts::{build_system_prompt, build_user_prompt};
use crate::config::GenerationConfig;
use crate::error::GenerationError;
use crate::extraction::ExtractedText;
use crate::types::{FlashcardDraft, GenerationOptions};
use async_trait::async_trait;

/// One chat completion round trip against an AI provider
///
/// Implementations map transport failures to
/// [`GenerationError::ProviderUnavailable`] and throttling to
/// [`GenerationError::RateLimited`].
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Send the system and user messages, return the raw response body
    async fn complete(&self, system_prompt: &str, user_prompt: &str)
    -> Result<String, GenerationError>;
}

/// Builds prompts, calls the provider and parses its JSON answer
pub struct PromptGenerator<C> {
    client: C,
    max_prompt_chars: usize,
    page_summary_limit: usize,
}

impl<C: CompletionClient> PromptGenerator<C> {
    /// Create a generator using the prompt limits from `config`
    pub fn new(client: C, config: &GenerationConfig) -> Self {
        Self {
            client,
            max_prompt_chars: config.max_prompt_chars,
            page_summary_limit: config.page_summary_limit,
        }
    }
}

#[async_trait]
impl<C: CompletionClient> FlashcardGenerator for PromptGenerator<C> {
    async fn generate(
        &self,
        document_name: &str,
        text: &ExtractedText,
        options: &GenerationOptions,
    ) -> Result<Vec<FlashcardDraft>, GenerationError> {
        let system_prompt = build_system_prompt(document_name, options);
        let user_prompt = build_user_prompt(
            &text.text,
            &text.pages,
            self.max_prompt_chars,
            self.page_summary_limit,
        );

        tracing::debug!(
            document = document_name,
            prompt_chars = user_prompt.len(),
            max_cards = options.max_cards,
            "requesting flashcards"
        );

        let body = self.client.complete(&system_prompt, &user_prompt).await?;
        let mut drafts = parse_flashcard_response(&body)?;
        drafts.truncate(options.max_cards);
        Ok(drafts)
    }
}
