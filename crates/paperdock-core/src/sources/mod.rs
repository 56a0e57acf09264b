//! Provider boundary types.
//!
//! Remote search clients (arXiv, Semantic Scholar, ...) and the PDF
//! download transport live outside this crate; they hand the core the
//! types defined here. A missing optional field is absent, never an error.

use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Raw metadata for one paper as reported by a single provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawPaperMetadata {
    /// Provider-specific identifier (e.g. an arXiv id or an S2 paper id).
    pub provider_id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub abstract_text: Option<String>,
    pub doi: Option<String>,
    pub arxiv_id: Option<String>,
    pub url: Option<String>,
    pub venue: Option<String>,
    /// Search keywords that surfaced this paper.
    pub keywords: Vec<String>,
    pub published_date: Option<NaiveDate>,
    pub citation_count: Option<i64>,
    /// Reference the PDF transport can resolve to bytes, when the provider
    /// offers one.
    pub pdf_url: Option<String>,
}

/// Collaborator that turns a PDF reference into bytes.
pub trait PdfFetch {
    fn fetch(&self, reference: &str) -> Result<Vec<u8>, FetchError>;
}

/// Typed failure of the PDF transport. "No PDF" is a normal terminal
/// state for a record, not a repository error.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("pdf unavailable: {0}")]
    Unavailable(String),
}

/// Errors a provider client can surface at the boundary.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    #[error("http error: {0}")]
    Http(String),
    #[error("unparseable provider response: {0}")]
    Parse(String),
    #[error("provider rate limit reached")]
    RateLimit,
    #[error("no results")]
    NotFound,
    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

lazy_static! {
    /// Modern (2007+) arXiv identifiers: YYMM.NNNNN with an optional
    /// version suffix.
    static ref ARXIV_ID: Regex = Regex::new(r"^\d{4}\.\d{4,5}(v\d+)?$").expect("static regex");
}

/// Normalize a DOI for comparison: strip resolver prefixes and lowercase.
pub fn normalize_doi(doi: &str) -> String {
    doi.trim()
        .to_lowercase()
        .replace("https://doi.org/", "")
        .replace("http://doi.org/", "")
        .replace("doi:", "")
        .trim()
        .to_string()
}

/// Normalize an arXiv id for comparison: strip the `arxiv:` prefix and any
/// version suffix, so `2301.12345v2` and `arXiv:2301.12345` unify.
pub fn normalize_arxiv_id(arxiv: &str) -> String {
    let cleaned = arxiv.trim().to_lowercase().replace("arxiv:", "");
    let cleaned = cleaned.trim().to_string();

    if ARXIV_ID.is_match(&cleaned) {
        if let Some(pos) = cleaned.rfind('v') {
            return cleaned[..pos].to_string();
        }
    }
    cleaned
}

/// Parse a provider-reported publication date.
///
/// arXiv reports full dates; Semantic Scholar often reports a bare year,
/// which resolves to January 1 for range comparisons.
pub fn parse_published_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(date);
    }
    value
        .parse::<i32>()
        .ok()
        .and_then(|year| NaiveDate::from_ymd_opt(year, 1, 1))
}
