//! Query criteria, ranking and pagination.
//!
//! Filtering applies in a fixed order so results are explainable:
//! full-text restriction, then publication-date range, then citation
//! threshold, then keyword/venue matching. Ranking is citation count
//! descending, ties by publication date descending, final tie by id
//! ascending. Fully deterministic, so repeated calls paginate stably
//! over an unchanged store.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::PaperRecord;
use crate::store::ListFilter;

#[derive(Debug, Clone, Error)]
pub enum QueryError {
    #[error("invalid criteria: {0}")]
    Validation(String),
}

/// Composite query over the local collection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryCriteria {
    /// Case-insensitive substring against title or abstract (OR).
    pub keyword: Option<String>,
    /// Case-insensitive substring against venue.
    pub venue: Option<String>,
    /// Excludes records with unknown citation count.
    pub min_citation_count: Option<i64>,
    /// Inclusive range; records without a date are excluded when either
    /// bound is set.
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    /// Every term must appear in the indexed full text.
    pub full_text_terms: Vec<String>,
    /// Only records whose full text has been indexed.
    pub full_text_only: bool,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl QueryCriteria {
    /// Reject criteria that cannot produce a meaningful result. A failed
    /// validation returns no partial results.
    pub fn validate(&self) -> Result<(), QueryError> {
        if let (Some(from), Some(to)) = (self.date_from, self.date_to) {
            if from > to {
                return Err(QueryError::Validation(format!(
                    "date_from {} is after date_to {}",
                    from, to
                )));
            }
        }
        if self.limit == Some(0) {
            return Err(QueryError::Validation("limit must be positive".into()));
        }
        if let Some(min) = self.min_citation_count {
            if min < 0 {
                return Err(QueryError::Validation(
                    "min_citation_count must not be negative".into(),
                ));
            }
        }
        Ok(())
    }

    pub fn wants_full_text(&self) -> bool {
        self.full_text_terms.iter().any(|t| !t.trim().is_empty())
    }

    /// The metadata filters this query pushes down to the store,
    /// optionally restricted to a full-text candidate set.
    pub fn to_list_filter(&self, paper_ids: Option<Vec<String>>) -> ListFilter {
        ListFilter {
            keyword: self.keyword.clone(),
            venue: self.venue.clone(),
            min_citations: self.min_citation_count,
            date_from: self.date_from,
            date_to: self.date_to,
            full_text_only: self.full_text_only,
            paper_ids,
        }
    }
}

/// Order records by citation count desc, publication date desc, id asc.
/// Records without a citation count or date sort after those with one.
pub fn rank(records: &mut [PaperRecord]) {
    records.sort_by(|a, b| {
        b.citation_count
            .unwrap_or(i64::MIN)
            .cmp(&a.citation_count.unwrap_or(i64::MIN))
            .then_with(|| b.published_date.cmp(&a.published_date))
            .then_with(|| a.paper_id.cmp(&b.paper_id))
    });
}

/// Apply offset/limit to an already-ranked result list.
pub fn paginate(records: Vec<PaperRecord>, offset: usize, limit: Option<usize>) -> Vec<PaperRecord> {
    records
        .into_iter()
        .skip(offset)
        .take(limit.unwrap_or(usize::MAX))
        .collect()
}
