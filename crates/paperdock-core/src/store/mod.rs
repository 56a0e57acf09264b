//! Durable paper metadata storage.

mod db;
mod sqlite;

pub use db::Database;
pub use sqlite::MetadataStore;

use chrono::NaiveDate;
use thiserror::Error;

use crate::identity::ReviewFlag;

/// Errors from the metadata store.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("paper not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Result of a merge-upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertOutcome {
    pub paper_id: String,
    /// True when a new record was created, false when an existing one was
    /// merged into.
    pub created: bool,
    /// Present when the new record's title nearly collides with an
    /// existing one; the records were kept distinct.
    pub review: Option<ReviewFlag>,
}

/// Metadata filters applied by [`MetadataStore::list`]. Applies no
/// ranking; ordering and pagination belong to the query engine.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    /// Case-insensitive substring match against title OR abstract.
    pub keyword: Option<String>,
    /// Case-insensitive substring match against venue.
    pub venue: Option<String>,
    /// Excludes records with unknown citation count.
    pub min_citations: Option<i64>,
    /// Inclusive; records without a publication date are excluded when a
    /// bound is set.
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    /// Only records with an indexed full text.
    pub full_text_only: bool,
    /// Restrict to this id set (used to push full-text matches down).
    pub paper_ids: Option<Vec<String>>,
}

impl ListFilter {
    pub fn is_empty(&self) -> bool {
        self.keyword.is_none()
            && self.venue.is_none()
            && self.min_citations.is_none()
            && self.date_from.is_none()
            && self.date_to.is_none()
            && !self.full_text_only
            && self.paper_ids.is_none()
    }
}

/// Replace characters that are unsafe in filenames and cap the length, so
/// provider-supplied ids cannot escape the papers directory.
pub(crate) fn sanitize_filename(name: &str) -> String {
    let mut safe: String = name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    safe.truncate(200);
    safe
}
