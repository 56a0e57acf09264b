//! Repository facade.
//!
//! Wires the identity resolver, metadata store, text extractor, full-text
//! index and background jobs into the surface callers use: `upsert`,
//! `get`, `delete`, `attach_pdf`, `query`, `reindex_all` and the
//! full-text context search. Every operation returns a typed outcome;
//! expected conditions (not found, malformed PDF, no PDF) never surface
//! as panics.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::config::RepositoryConfig;
use crate::domain::{PaperRecord, VenueStat};
use crate::export::{export_records, ExportError, ExportFormat};
use crate::extract::{ExtractError, TextExtractor, EXTRACTOR_VERSION};
use crate::index::{self, FullTextIndex, IndexError};
use crate::jobs::{ExtractionJobs, ExtractionStatus, JobError};
use crate::query::{self, QueryCriteria, QueryError};
use crate::sources::RawPaperMetadata;
use crate::store::{Database, ListFilter, MetadataStore, StoreError, UpsertOutcome};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Extraction(#[from] ExtractError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Export(#[from] ExportError),
}

impl From<JobError> for RepositoryError {
    fn from(e: JobError) -> Self {
        match e {
            JobError::NotFound(id) => RepositoryError::Store(StoreError::NotFound(id)),
            JobError::Extraction(e) => RepositoryError::Extraction(e),
            JobError::Storage(msg) => RepositoryError::Store(StoreError::Storage(msg)),
        }
    }
}

/// A full-text search result with display context.
#[derive(Debug, Clone, PartialEq)]
pub struct FullTextContext {
    pub paper_id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub snippet: String,
    pub matched_tokens: usize,
}

/// Outcome of a full index rebuild.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReindexReport {
    pub reindexed: usize,
    pub skipped: usize,
    /// `(paper_id, reason)` for papers whose PDF could not be processed;
    /// their records remain queryable with `full_text_available = false`.
    pub failed: Vec<(String, String)>,
}

/// The local paper repository.
pub struct Repository {
    config: RepositoryConfig,
    store: MetadataStore,
    index: FullTextIndex,
    extractor: TextExtractor,
    jobs: ExtractionJobs,
}

impl Repository {
    /// Open (or create) the repository described by the configuration.
    pub fn open(config: RepositoryConfig) -> Result<Self, RepositoryError> {
        std::fs::create_dir_all(&config.papers_dir)
            .map_err(|e| StoreError::Storage(format!("create papers dir: {}", e)))?;
        if let Some(parent) = config.db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Storage(format!("create data dir: {}", e)))?;
        }
        let db = Arc::new(Database::open(&config.db_path)?);
        Ok(Self::with_database(db, config))
    }

    /// Repository over an in-memory database (for testing). PDFs still
    /// land in `papers_dir`.
    pub fn in_memory(papers_dir: impl Into<PathBuf>) -> Result<Self, RepositoryError> {
        let papers_dir = papers_dir.into();
        let config = RepositoryConfig {
            data_dir: papers_dir.clone(),
            db_path: papers_dir.join("papers.db"),
            papers_dir,
            extraction: Default::default(),
        };
        let db = Arc::new(Database::open_in_memory()?);
        Ok(Self::with_database(db, config))
    }

    fn with_database(db: Arc<Database>, config: RepositoryConfig) -> Self {
        let store = MetadataStore::new(db.clone(), &config.papers_dir);
        let index = FullTextIndex::new(db);
        let extractor = TextExtractor::new(&config.extraction);
        let jobs = ExtractionJobs::new(
            store.clone(),
            index.clone(),
            extractor.clone(),
            config.extraction.timeout,
        );
        Self {
            config,
            store,
            index,
            extractor,
            jobs,
        }
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    /// Merge raw provider metadata into the collection.
    pub fn upsert(
        &self,
        raw: &RawPaperMetadata,
        source: &str,
    ) -> Result<UpsertOutcome, RepositoryError> {
        Ok(self.store.upsert(raw, source)?)
    }

    pub fn get(&self, paper_id: &str) -> Result<Option<PaperRecord>, RepositoryError> {
        Ok(self.store.get(paper_id)?)
    }

    /// Lookup by id, falling back to a title substring match.
    pub fn find(&self, key: &str) -> Result<Option<PaperRecord>, RepositoryError> {
        Ok(self.store.lookup(key)?)
    }

    /// Remove a record, its source mappings, its index entry and its PDF.
    pub fn delete(&self, paper_id: &str) -> Result<(), RepositoryError> {
        Ok(self.store.delete(paper_id)?)
    }

    /// Store a downloaded PDF for the paper and extract/index its text.
    ///
    /// A failed extraction leaves the record queryable with
    /// `full_text_available = false`; the typed error tells the caller
    /// why the text is missing.
    pub async fn attach_pdf(
        &self,
        paper_id: &str,
        pdf_bytes: &[u8],
    ) -> Result<ExtractionStatus, RepositoryError> {
        self.store.attach_pdf(paper_id, pdf_bytes)?;
        Ok(self.jobs.ensure_full_text(paper_id).await?)
    }

    /// Extract and index the paper's attached PDF if that has not
    /// happened yet; concurrent calls share one job.
    pub async fn ensure_full_text(
        &self,
        paper_id: &str,
    ) -> Result<ExtractionStatus, RepositoryError> {
        Ok(self.jobs.ensure_full_text(paper_id).await?)
    }

    /// Run a composite query: full-text restriction, metadata filters,
    /// deterministic ranking, offset/limit pagination.
    pub fn query(&self, criteria: &QueryCriteria) -> Result<Vec<PaperRecord>, RepositoryError> {
        criteria.validate()?;

        let restriction = if criteria.wants_full_text() {
            let hits = self.index.search(&criteria.full_text_terms)?;
            if hits.is_empty() {
                return Ok(Vec::new());
            }
            Some(hits.into_iter().map(|h| h.paper_id).collect())
        } else {
            None
        };

        let mut records = self.store.list(&criteria.to_list_filter(restriction))?;
        query::rank(&mut records);
        Ok(query::paginate(records, criteria.offset, criteria.limit))
    }

    /// Query and serialize in one step.
    pub fn export(
        &self,
        criteria: &QueryCriteria,
        format: ExportFormat,
    ) -> Result<String, RepositoryError> {
        let records = self.query(criteria)?;
        Ok(export_records(&records, format)?)
    }

    /// Full-text search returning context snippets around the first
    /// matching term, most token matches first.
    pub fn full_text_contexts(
        &self,
        terms: &[String],
        limit: usize,
    ) -> Result<Vec<FullTextContext>, RepositoryError> {
        let mut hits = self.index.search(terms)?;
        hits.sort_by(|a, b| {
            b.matched_tokens
                .cmp(&a.matched_tokens)
                .then_with(|| a.paper_id.cmp(&b.paper_id))
        });

        let mut contexts = Vec::new();
        for hit in hits.into_iter().take(limit) {
            let Some(record) = self.store.get(&hit.paper_id)? else {
                // Entry outlived its record; stale, skip it.
                continue;
            };
            let Some(content) = self.index.content(&hit.paper_id)? else {
                continue;
            };
            let snippet = snippet(&content, terms, 100).unwrap_or_default();
            contexts.push(FullTextContext {
                paper_id: record.paper_id,
                title: record.title,
                authors: record.authors,
                snippet,
                matched_tokens: hit.matched_tokens,
            });
        }
        Ok(contexts)
    }

    /// Rebuild the full-text index from stored PDFs. The designed
    /// recovery path after extractor upgrades or index corruption:
    /// entries already built with the current extractor version are
    /// skipped unless `force` is set.
    pub fn reindex_all(&self, force: bool) -> Result<ReindexReport, RepositoryError> {
        let mut report = ReindexReport::default();

        for record in self.store.list(&ListFilter::default())? {
            let Some(pdf_path) = record.pdf_path.as_ref() else {
                continue;
            };

            if !force {
                if let Some(version) = self.index.entry_version(&record.paper_id)? {
                    if version == EXTRACTOR_VERSION {
                        report.skipped += 1;
                        continue;
                    }
                }
            }

            let outcome = std::fs::read(pdf_path)
                .map_err(|e| ExtractError::Malformed(format!("read pdf: {}", e)))
                .and_then(|bytes| self.extractor.extract(&bytes));

            match outcome {
                Ok(extracted) if extracted.is_empty() => {
                    self.index.remove(&record.paper_id)?;
                    report.reindexed += 1;
                }
                Ok(extracted) => {
                    self.index
                        .index(&index::build_entry(&record.paper_id, &extracted.text))?;
                    report.reindexed += 1;
                }
                Err(e) => {
                    warn!(paper_id = %record.paper_id, error = %e, "reindex failed for paper");
                    self.index.remove(&record.paper_id)?;
                    report.failed.push((record.paper_id, e.to_string()));
                }
            }
        }

        info!(
            reindexed = report.reindexed,
            skipped = report.skipped,
            failed = report.failed.len(),
            "index rebuild complete"
        );
        Ok(report)
    }

    /// Venues ranked by mean citation count.
    pub fn venue_stats(&self, limit: usize) -> Result<Vec<VenueStat>, RepositoryError> {
        Ok(self.store.venue_stats(limit)?)
    }
}

/// Extract a context window around the first matching term, ellipsized on
/// both sides when truncated.
fn snippet(content: &str, terms: &[String], context_chars: usize) -> Option<String> {
    let folded = content.to_lowercase();

    let mut first: Option<(usize, usize)> = None;
    for term in terms {
        let needle = term.trim().to_lowercase();
        if needle.is_empty() {
            continue;
        }
        if let Some(pos) = folded.find(&needle) {
            if first.map_or(true, |(p, _)| pos < p) {
                first = Some((pos, needle.len()));
            }
        }
    }
    let (pos, term_len) = first?;

    // Case folding can change byte lengths for some scripts; fall back to
    // slicing the folded text when the offsets no longer line up.
    let hay = if folded.len() == content.len() {
        content
    } else {
        folded.as_str()
    };

    let start = floor_char_boundary(hay, pos.saturating_sub(context_chars));
    let end = ceil_char_boundary(hay, (pos + term_len + context_chars).min(hay.len()));

    let mut out = String::new();
    if start > 0 {
        out.push_str("...");
    }
    out.push_str(hay[start..end].trim());
    if end < hay.len() {
        out.push_str("...");
    }
    Some(out)
}

fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    while index > 0 && !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn ceil_char_boundary(s: &str, mut index: usize) -> usize {
    while index < s.len() && !s.is_char_boundary(index) {
        index += 1;
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snippet_windows_around_first_match() {
        let content = "aaaa ".repeat(50) + "needle" + &" bbbb".repeat(50);
        let result = snippet(&content, &["needle".to_string()], 20).unwrap();
        assert!(result.starts_with("..."));
        assert!(result.ends_with("..."));
        assert!(result.contains("needle"));
        assert!(result.len() < 60);
    }

    #[test]
    fn snippet_at_text_start_has_no_leading_ellipsis() {
        let result = snippet("needle in a haystack", &["needle".to_string()], 30).unwrap();
        assert_eq!(result, "needle in a haystack");
    }

    #[test]
    fn snippet_is_case_insensitive() {
        let result = snippet("The Needle is here", &["NEEDLE".to_string()], 50).unwrap();
        assert!(result.contains("Needle"));
    }

    #[test]
    fn snippet_without_match_is_none() {
        assert!(snippet("nothing here", &["needle".to_string()], 50).is_none());
    }

    #[test]
    fn snippet_respects_char_boundaries() {
        let content = format!("{} needle {}", "é".repeat(120), "ü".repeat(120));
        let result = snippet(&content, &["needle".to_string()], 25).unwrap();
        assert!(result.contains("needle"));
    }
}
