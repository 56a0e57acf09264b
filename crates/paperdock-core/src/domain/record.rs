//! Paper record domain model

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A provider-specific identifier mapped onto a canonical paper.
///
/// `source` names the identifier namespace ("arxiv", "semantic_scholar",
/// "doi", ...); `id` is the identifier within it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceId {
    pub source: String,
    pub id: String,
}

impl SourceId {
    pub fn new(source: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            id: id.into(),
        }
    }
}

/// The canonical unit of storage: one logical paper, regardless of how many
/// providers reported it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperRecord {
    /// Stable canonical identifier, immutable once assigned.
    pub paper_id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub abstract_text: Option<String>,
    pub url: Option<String>,
    pub venue: Option<String>,
    /// Search keywords under which this paper was collected.
    pub keywords: Vec<String>,
    pub published_date: Option<NaiveDate>,
    pub citation_count: Option<i64>,
    /// Append-only: a merge never removes a previously recorded mapping.
    pub source_ids: Vec<SourceId>,
    /// Set once a PDF has been attached; the file is owned by the repository.
    pub pdf_path: Option<PathBuf>,
    pub full_text_available: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaperRecord {
    pub fn first_author(&self) -> Option<&str> {
        self.authors.first().map(String::as_str)
    }

    /// Whether this record carries a given source mapping.
    pub fn has_source_id(&self, source: &str, id: &str) -> bool {
        self.source_ids
            .iter()
            .any(|s| s.source == source && s.id == id)
    }
}

/// Derived full-text index state for one paper.
///
/// References a `paper_id` without owning the record; invalid once the
/// record is deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub paper_id: String,
    /// Whitespace-normalized extracted text. Matching case-folds both
    /// sides; the stored text keeps its case for snippet display.
    pub content: String,
    pub token_count: usize,
    pub extractor_version: u32,
    pub indexed_at: DateTime<Utc>,
}

/// Aggregate citation statistics for one venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueStat {
    pub venue: String,
    pub paper_count: usize,
    pub mean_citations: f64,
    pub max_citations: i64,
}
