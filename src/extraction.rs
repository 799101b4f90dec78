//! Text extraction from uploaded files
//!
//! Format-specific extractors (PDF, DOCX, PPTX) are supplied by the embedding
//! application through [`TextExtractor`]. [`PlainTextExtractor`] covers TXT
//! uploads and is the default.

use crate::error::ExtractionError;
use crate::types::FileType;
use async_trait::async_trait;

/// Lines grouped into one pseudo-page for plain text citations
const LINES_PER_PAGE: usize = 50;

/// One page (or slide, or pseudo-page) of extracted text
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Page {
    /// 1-based page number used in citations
    pub number: usize,
    /// Text of the page
    pub text: String,
}

/// Text extracted from a document
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExtractedText {
    /// Full document text
    pub text: String,
    /// Non-empty pages in order, for page-level citations
    pub pages: Vec<Page>,
}

impl ExtractedText {
    /// Whether there is anything to generate flashcards from
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Turns stored file bytes into text
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Extract the text of a file of the given type
    async fn extract(&self, bytes: &[u8], file_type: FileType)
    -> Result<ExtractedText, ExtractionError>;
}

/// Extractor for TXT uploads
#[derive(Clone, Copy, Debug, Default)]
pub struct PlainTextExtractor;

#[async_trait]
impl TextExtractor for PlainTextExtractor {
    async fn extract(
        &self,
        bytes: &[u8],
        file_type: FileType,
    ) -> Result<ExtractedText, ExtractionError> {
        if file_type != FileType::Txt {
            return Err(ExtractionError::UnsupportedFormat { file_type });
        }

        // Invalid sequences are replaced rather than rejected
        let text = String::from_utf8_lossy(bytes).into_owned();
        if text.trim().is_empty() {
            return Err(ExtractionError::Empty);
        }

        let lines: Vec<&str> = text.split('\n').collect();
        let pages = lines
            .chunks(LINES_PER_PAGE)
            .enumerate()
            .map(|(i, chunk)| Page {
                number: i + 1,
                text: chunk.join("\n"),
            })
            .filter(|page| !page.text.trim().is_empty())
            .collect::<Vec<_>>();

        tracing::debug!(
            lines = lines.len(),
            pages = pages.len(),
            chars = text.len(),
            "plain text extracted"
        );

        Ok(ExtractedText { text, pages })
    }
}
