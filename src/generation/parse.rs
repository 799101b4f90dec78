//! Parsing of model responses into flashcard drafts.

use crate::error::GenerationError;
use crate::types::{Difficulty, FlashcardDraft};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

// Literal pattern, cannot fail to compile
#[allow(clippy::expect_used)]
static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^\s*```[A-Za-z]*\s*\n?(.*?)\s*```\s*$").expect("valid code fence pattern")
});

/// Parse a `{"flashcards": [...]}` payload, optionally wrapped in a markdown code fence
///
/// Entries without a string `question` or `answer` are skipped; deciding
/// whether the remaining drafts are usable is left to the caller. A body that
/// is not JSON, or lacks the `flashcards` array, is a
/// [`GenerationError::MalformedResponse`].
pub fn parse_flashcard_response(body: &str) -> Result<Vec<FlashcardDraft>, GenerationError> {
    let json = match CODE_FENCE.captures(body) {
        Some(caps) => caps.get(1).map_or("", |m| m.as_str()),
        None => body.trim(),
    };

    let value: Value = serde_json::from_str(json).map_err(|e| {
        tracing::error!(error = %e, response = %preview(body), "response is not valid JSON");
        GenerationError::MalformedResponse(format!("failed to parse JSON response: {e}"))
    })?;

    let entries = value
        .get("flashcards")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            GenerationError::MalformedResponse("response missing 'flashcards' array".to_string())
        })?;

    let mut drafts = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        let question = entry.get("question").and_then(Value::as_str);
        let answer = entry.get("answer").and_then(Value::as_str);

        let (Some(question), Some(answer)) = (question, answer) else {
            tracing::warn!(index, "flashcard entry missing question or answer, skipped");
            continue;
        };

        drafts.push(FlashcardDraft {
            question: question.to_string(),
            answer: answer.to_string(),
            source: entry
                .get("source")
                .and_then(Value::as_str)
                .map(str::to_string),
            difficulty: entry
                .get("difficulty")
                .and_then(Value::as_str)
                .and_then(Difficulty::parse_loose),
        });
    }

    tracing::debug!(total = entries.len(), kept = drafts.len(), "flashcard response parsed");
    Ok(drafts)
}

fn preview(body: &str) -> &str {
    match body.char_indices().nth(500) {
        Some((cut, _)) => &body[..cut],
        None => body,
    }
}
