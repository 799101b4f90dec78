//! Prompt construction for completion-based generators.

use crate::extraction::Page;
use crate::types::GenerationOptions;

/// Appended to document text cut at the prompt limit
pub const TRUNCATION_MARKER: &str = "\n\n[Document truncated...]";

/// Instructions sent as the system message
pub fn build_system_prompt(document_name: &str, options: &GenerationOptions) -> String {
    let difficulty = match options.difficulty_hint {
        Some(level) => format!("- Pitch the questions at a {level} level\n"),
        None => "- Create questions at different difficulty levels\n".to_string(),
    };

    format!(
        r#"You are an expert educational content creator specializing in generating high-quality flashcards from academic materials.

Your task is to analyze the provided document and create up to {max_cards} flashcards that:
1. Focus on key concepts, definitions, and important relationships
2. Use clear, concise language appropriate for the subject matter
3. Include precise source attribution for EVERY flashcard

SOURCE ATTRIBUTION REQUIREMENT:
- Every flashcard MUST include a "source" field
- Format: "{document_name} - Page X" or "{document_name} - Page X, Section Y"
- The source must reference the specific page where the information appears

Output Format:
Return a JSON object with a "flashcards" array. Each flashcard must have:
- "question": Clear, focused question
- "answer": Comprehensive but concise answer
- "source": Precise reference to document page/section
- "difficulty" (optional): one of "beginner", "intermediate", "advanced"

Example:
{{
    "flashcards": [
        {{
            "question": "What is photosynthesis?",
            "answer": "The process by which plants convert light energy into chemical energy using carbon dioxide and water, releasing oxygen.",
            "source": "{document_name} - Page 12, Section 3.2",
            "difficulty": "beginner"
        }}
    ]
}}

Quality Guidelines:
- Focus on understanding, not memorization
{difficulty}- Ensure answers are accurate and complete
- Avoid overly broad or vague questions
- Each flashcard should be self-contained"#,
        max_cards = options.max_cards,
    )
}

/// Document content sent as the user message
///
/// Text longer than `max_chars` characters is cut and marked; the first
/// `page_summary_limit` pages are listed so the model can cite page numbers.
pub fn build_user_prompt(
    text: &str,
    pages: &[Page],
    max_chars: usize,
    page_summary_limit: usize,
) -> String {
    let body = truncate_chars(text, max_chars);

    let page_info = pages
        .iter()
        .take(page_summary_limit)
        .map(|page| format!("Page {}: {} characters", page.number, page.text.chars().count()))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Document Information:\n{page_info}\n\nDocument Content:\n{body}\n\n\
         Please generate flashcards from this document. Remember to include precise source \
         attribution (page number) for each flashcard."
    )
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{}", &text[..cut], TRUNCATION_MARKER),
        None => text.to_string(),
    }
}
