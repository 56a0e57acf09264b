//! PDF text extraction.
//!
//! Wraps lopdf with typed outcomes for the failure modes that matter to
//! the repository: encrypted files, corrupt byte streams, and scanned
//! documents with no embedded text layer. Extraction never panics into
//! the caller; every failure path is a typed result.

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::config::ExtractionConfig;

/// Bumped when the extraction pipeline changes behavior. Stored with each
/// index entry so re-extraction is triggered deliberately, not on every
/// query.
pub const EXTRACTOR_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExtractError {
    /// Truncated or unparseable byte stream.
    #[error("malformed pdf: {0}")]
    Malformed(String),

    /// Encrypted or otherwise inaccessible document.
    #[error("pdf is encrypted or unreadable")]
    Unreadable,

    /// Extraction exceeded its wall-clock bound.
    #[error("extraction exceeded the {0:?} bound")]
    Timeout(Duration),
}

/// Page-ordered plain text pulled out of a PDF.
///
/// Empty `text` with a successful result means the document has no
/// embedded text layer (e.g. a scan): a valid outcome, distinct from a
/// parse failure.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedText {
    pub text: String,
    pub pages_total: usize,
    pub pages_processed: usize,
    pub extractor_version: u32,
}

impl ExtractedText {
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Converts PDF byte streams into plain text.
#[derive(Debug, Clone)]
pub struct TextExtractor {
    max_pages: usize,
}

impl TextExtractor {
    pub fn new(config: &ExtractionConfig) -> Self {
        Self {
            max_pages: config.max_pages,
        }
    }

    /// Extract page-ordered text. Idempotent: the same bytes always yield
    /// the same text for a given `EXTRACTOR_VERSION`.
    pub fn extract(&self, pdf_bytes: &[u8]) -> Result<ExtractedText, ExtractError> {
        // lopdf reports encryption either via the trailer on a parsed
        // document or as a load-time failure, depending on the file.
        let doc = match lopdf::Document::load_mem(pdf_bytes) {
            Ok(doc) => doc,
            Err(e) => {
                let message = e.to_string();
                let lowered = message.to_lowercase();
                if lowered.contains("crypt") || lowered.contains("password") {
                    return Err(ExtractError::Unreadable);
                }
                return Err(ExtractError::Malformed(message));
            }
        };

        if doc.is_encrypted() {
            return Err(ExtractError::Unreadable);
        }

        let pages = doc.get_pages();
        let pages_total = pages.len();
        if pages_total > self.max_pages {
            warn!(
                pages_total,
                max_pages = self.max_pages,
                "pdf exceeds page cap, processing the first pages only"
            );
        }

        let mut text = String::new();
        let mut pages_processed = 0;
        for (page_number, _) in pages.iter().take(self.max_pages) {
            // A page without a text layer, or with a broken content
            // stream, contributes nothing rather than failing the
            // document.
            match doc.extract_text(&[*page_number]) {
                Ok(page_text) => {
                    if !text.is_empty() {
                        text.push('\n');
                    }
                    text.push_str(page_text.trim_end());
                }
                Err(e) => {
                    debug!(page = page_number, error = %e, "no text extracted from page");
                }
            }
            pages_processed += 1;
        }

        Ok(ExtractedText {
            text,
            pages_total,
            pages_processed,
            extractor_version: EXTRACTOR_VERSION,
        })
    }
}
