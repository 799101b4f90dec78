//! Draft validation and citation synthesis.

use crate::types::{AcceptedDraft, FlashcardDraft};

/// Drafts that survived validation, plus what was dropped
#[derive(Debug, Default, PartialEq)]
pub struct ValidatedDrafts {
    /// Drafts ready for persistence, in generator order
    pub accepted: Vec<AcceptedDraft>,
    /// Drafts dropped for a blank question or answer
    pub rejected: usize,
    /// Valid drafts dropped because the card limit was reached
    pub over_limit: usize,
}

/// Citation used when the generator gave none
pub fn default_citation(filename: &str) -> String {
    format!("{filename} (full document)")
}

/// Make sure a citation exists and names the document it came from
pub fn ensure_citation(filename: &str, source: Option<&str>) -> String {
    let source = source.map(str::trim).unwrap_or_default();
    if source.is_empty() {
        return default_citation(filename);
    }
    if source.to_lowercase().contains(&filename.to_lowercase()) {
        source.to_string()
    } else {
        format!("{filename} - {source}")
    }
}

/// Validate generator output for one document
///
/// Question and answer are trimmed and must be non-empty. Every accepted
/// draft carries a non-empty citation naming `filename`. At most `max_cards`
/// drafts are accepted.
pub fn validate_drafts(
    filename: &str,
    drafts: Vec<FlashcardDraft>,
    max_cards: usize,
) -> ValidatedDrafts {
    let mut validated = ValidatedDrafts::default();

    for (index, draft) in drafts.into_iter().enumerate() {
        let question = draft.question.trim();
        let answer = draft.answer.trim();

        if question.is_empty() || answer.is_empty() {
            tracing::warn!(
                filename,
                index,
                blank_question = question.is_empty(),
                blank_answer = answer.is_empty(),
                "flashcard draft rejected"
            );
            validated.rejected += 1;
            continue;
        }

        if validated.accepted.len() >= max_cards {
            validated.over_limit += 1;
            continue;
        }

        if draft.source.as_deref().is_none_or(|s| s.trim().is_empty()) {
            tracing::warn!(filename, index, "flashcard draft had no citation, using default");
        }

        validated.accepted.push(AcceptedDraft {
            question: question.to_string(),
            answer: answer.to_string(),
            source: ensure_citation(filename, draft.source.as_deref()),
            difficulty: draft.difficulty,
        });
    }

    validated
}
