//! SQLite-backed metadata store.
//!
//! Mutations (`upsert`, `attach_pdf`, `delete`) serialize through the
//! shared connection mutex; two providers upserting the same paper
//! concurrently cannot race into divergent records.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, warn};

use super::{sanitize_filename, Database, ListFilter, StoreError, UpsertOutcome};
use crate::domain::{PaperRecord, SourceId, VenueStat};
use crate::identity::{self, IdentityLookup, Resolution};
use crate::sources::RawPaperMetadata;

const RECORD_COLUMNS: &str = "paper_id, title, authors, abstract, url, venue, keywords, \
     published_date, citation_count, pdf_path, full_text_available, created, modified";

/// Durable mapping from canonical paper identity to paper record.
#[derive(Clone)]
pub struct MetadataStore {
    db: Arc<Database>,
    papers_dir: PathBuf,
}

impl MetadataStore {
    pub fn new(db: Arc<Database>, papers_dir: impl Into<PathBuf>) -> Self {
        Self {
            db,
            papers_dir: papers_dir.into(),
        }
    }

    /// Resolve identity, then merge: creates the record if unknown,
    /// otherwise unions source ids and fills absent fields. Never
    /// overwrites a non-empty field with an empty one.
    pub fn upsert(&self, raw: &RawPaperMetadata, source: &str) -> Result<UpsertOutcome, StoreError> {
        let conn = self.db.lock()?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| StoreError::Storage(format!("begin tx: {}", e)))?;

        let outcome = match identity::resolve(raw, source, &ConnLookup(&tx))? {
            Resolution::Existing(paper_id) => {
                Self::merge_into(&tx, &paper_id, raw, source)?;
                debug!(paper_id = %paper_id, source, "merged provider record");
                UpsertOutcome {
                    paper_id,
                    created: false,
                    review: None,
                }
            }
            Resolution::New {
                paper_id,
                normalized_title,
                review,
            } => {
                Self::insert_new(&tx, &paper_id, &normalized_title, raw, source)?;
                if let Some(flag) = &review {
                    warn!(
                        paper_id = %paper_id,
                        similar = %flag.similar_paper_id,
                        similarity = flag.similarity,
                        "title nearly collides with an existing record; kept distinct"
                    );
                }
                UpsertOutcome {
                    paper_id,
                    created: true,
                    review,
                }
            }
        };

        tx.commit()
            .map_err(|e| StoreError::Storage(format!("commit: {}", e)))?;
        Ok(outcome)
    }

    pub fn get(&self, paper_id: &str) -> Result<Option<PaperRecord>, StoreError> {
        let conn = self.db.lock()?;
        Self::get_with_conn(&conn, paper_id)
    }

    /// Lookup by exact id, falling back to a case-insensitive title
    /// substring match.
    pub fn lookup(&self, key: &str) -> Result<Option<PaperRecord>, StoreError> {
        let conn = self.db.lock()?;
        if let Some(record) = Self::get_with_conn(&conn, key)? {
            return Ok(Some(record));
        }

        let sql = format!(
            "SELECT {} FROM papers WHERE title LIKE ?1 ORDER BY paper_id LIMIT 1",
            RECORD_COLUMNS
        );
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| StoreError::Storage(format!("prepare lookup: {}", e)))?;
        let record = stmt
            .query_row(params![format!("%{}%", key)], Self::row_to_record)
            .optional()
            .map_err(|e| StoreError::Storage(format!("lookup: {}", e)))?;

        match record {
            Some(mut record) => {
                record.source_ids = Self::load_sources(&conn, &record.paper_id)?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Fetch records matching the filter, ordered by id. No ranking.
    pub fn list(&self, filter: &ListFilter) -> Result<Vec<PaperRecord>, StoreError> {
        let mut conditions: Vec<String> = Vec::new();
        let mut bound: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(keyword) = &filter.keyword {
            conditions.push("(title LIKE ? OR abstract LIKE ?)".into());
            let pattern = format!("%{}%", keyword);
            bound.push(Box::new(pattern.clone()));
            bound.push(Box::new(pattern));
        }
        if let Some(venue) = &filter.venue {
            conditions.push("venue LIKE ?".into());
            bound.push(Box::new(format!("%{}%", venue)));
        }
        if let Some(min) = filter.min_citations {
            conditions.push("citation_count IS NOT NULL AND citation_count >= ?".into());
            bound.push(Box::new(min));
        }
        if let Some(from) = filter.date_from {
            conditions.push("published_date IS NOT NULL AND published_date >= ?".into());
            bound.push(Box::new(date_to_text(from)));
        }
        if let Some(to) = filter.date_to {
            conditions.push("published_date IS NOT NULL AND published_date <= ?".into());
            bound.push(Box::new(date_to_text(to)));
        }
        if filter.full_text_only {
            conditions.push("full_text_available = 1".into());
        }
        if let Some(ids) = &filter.paper_ids {
            if ids.is_empty() {
                return Ok(Vec::new());
            }
            let placeholders = vec!["?"; ids.len()].join(", ");
            conditions.push(format!("paper_id IN ({})", placeholders));
            for id in ids {
                bound.push(Box::new(id.clone()));
            }
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };
        let sql = format!(
            "SELECT {} FROM papers {} ORDER BY paper_id",
            RECORD_COLUMNS, where_clause
        );

        let conn = self.db.lock()?;
        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            bound.iter().map(|p| p.as_ref()).collect();

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| StoreError::Storage(format!("prepare list: {}", e)))?;
        let rows = stmt
            .query_map(params_ref.as_slice(), Self::row_to_record)
            .map_err(|e| StoreError::Storage(format!("list: {}", e)))?;

        let mut records = Vec::new();
        for row in rows {
            let mut record = row.map_err(|e| StoreError::Storage(format!("list row: {}", e)))?;
            record.source_ids = Self::load_sources(&conn, &record.paper_id)?;
            records.push(record);
        }
        Ok(records)
    }

    /// Store the PDF bytes under the papers directory and record the path.
    /// Does not mark `full_text_available`; that happens only after the
    /// index write is confirmed.
    pub fn attach_pdf(&self, paper_id: &str, pdf_bytes: &[u8]) -> Result<PathBuf, StoreError> {
        let conn = self.db.lock()?;
        if !Self::exists(&conn, paper_id)? {
            return Err(StoreError::NotFound(paper_id.to_string()));
        }

        std::fs::create_dir_all(&self.papers_dir)
            .map_err(|e| StoreError::Storage(format!("create papers dir: {}", e)))?;
        let path = self
            .papers_dir
            .join(format!("{}.pdf", sanitize_filename(paper_id)));
        std::fs::write(&path, pdf_bytes)
            .map_err(|e| StoreError::Storage(format!("write pdf {}: {}", path.display(), e)))?;

        let path_text = path.to_string_lossy().into_owned();
        conn.execute(
            "UPDATE papers SET pdf_path = ?1, modified = ?2 WHERE paper_id = ?3",
            params![path_text, now_millis(), paper_id],
        )
        .map_err(|e| StoreError::Storage(format!("attach pdf: {}", e)))?;

        debug!(paper_id, path = %path.display(), "attached pdf");
        Ok(path)
    }

    /// Remove the record; cascades to source mappings, the full-text entry
    /// and the stored PDF.
    pub fn delete(&self, paper_id: &str) -> Result<(), StoreError> {
        let pdf_path: Option<String> = {
            let conn = self.db.lock()?;
            let path = conn
                .query_row(
                    "SELECT pdf_path FROM papers WHERE paper_id = ?1",
                    params![paper_id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| StoreError::Storage(format!("delete lookup: {}", e)))?
                .ok_or_else(|| StoreError::NotFound(paper_id.to_string()))?;

            // paper_sources and full_text rows go with the record
            conn.execute("DELETE FROM papers WHERE paper_id = ?1", params![paper_id])
                .map_err(|e| StoreError::Storage(format!("delete: {}", e)))?;
            path
        };

        if let Some(path) = pdf_path {
            if let Err(e) = std::fs::remove_file(&path) {
                warn!(paper_id, path, error = %e, "could not remove stored pdf");
            }
        }
        Ok(())
    }

    /// Venues ranked by mean citation count.
    pub fn venue_stats(&self, limit: usize) -> Result<Vec<VenueStat>, StoreError> {
        let conn = self.db.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT venue, COUNT(*), AVG(citation_count), MAX(citation_count)
                 FROM papers
                 WHERE venue IS NOT NULL AND venue != ''
                 GROUP BY venue
                 ORDER BY AVG(citation_count) DESC
                 LIMIT ?1",
            )
            .map_err(|e| StoreError::Storage(format!("prepare venue stats: {}", e)))?;

        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok(VenueStat {
                    venue: row.get(0)?,
                    paper_count: row.get::<_, i64>(1)? as usize,
                    mean_citations: row.get::<_, Option<f64>>(2)?.unwrap_or(0.0),
                    max_citations: row.get::<_, Option<i64>>(3)?.unwrap_or(0),
                })
            })
            .map_err(|e| StoreError::Storage(format!("venue stats: {}", e)))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| StoreError::Storage(format!("venue stats row: {}", e)))
    }

    pub fn record_count(&self) -> Result<usize, StoreError> {
        let conn = self.db.lock()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM papers", [], |row| row.get(0))
            .map_err(|e| StoreError::Storage(format!("count: {}", e)))?;
        Ok(count as usize)
    }

    // ----- internals -----

    fn exists(conn: &Connection, paper_id: &str) -> Result<bool, StoreError> {
        conn.query_row(
            "SELECT COUNT(*) FROM papers WHERE paper_id = ?1",
            params![paper_id],
            |row| row.get::<_, i64>(0),
        )
        .map(|c| c > 0)
        .map_err(|e| StoreError::Storage(format!("exists: {}", e)))
    }

    fn get_with_conn(conn: &Connection, paper_id: &str) -> Result<Option<PaperRecord>, StoreError> {
        let sql = format!("SELECT {} FROM papers WHERE paper_id = ?1", RECORD_COLUMNS);
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| StoreError::Storage(format!("prepare get: {}", e)))?;

        let record = stmt
            .query_row(params![paper_id], Self::row_to_record)
            .optional()
            .map_err(|e| StoreError::Storage(format!("get: {}", e)))?;

        match record {
            Some(mut record) => {
                record.source_ids = Self::load_sources(conn, paper_id)?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    fn insert_new(
        conn: &Connection,
        paper_id: &str,
        normalized_title: &str,
        raw: &RawPaperMetadata,
        source: &str,
    ) -> Result<(), StoreError> {
        let now = now_millis();
        let authors_json = to_json(&raw.authors)?;
        let keywords_json = to_json(&raw.keywords)?;
        let citation_updated = raw.citation_count.map(|_| now);

        conn.execute(
            "INSERT INTO papers (paper_id, title, normalized_title, authors, abstract, url,
                                 venue, keywords, published_date, citation_count,
                                 citation_updated, created, modified)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)",
            params![
                paper_id,
                raw.title,
                normalized_title,
                authors_json,
                empty_to_none(raw.abstract_text.as_deref()),
                empty_to_none(raw.url.as_deref()),
                empty_to_none(raw.venue.as_deref()),
                keywords_json,
                raw.published_date.map(date_to_text),
                raw.citation_count,
                citation_updated,
                now,
            ],
        )
        .map_err(|e| StoreError::Storage(format!("insert: {}", e)))?;

        Self::record_aliases(conn, paper_id, raw, source)
    }

    fn merge_into(
        conn: &Connection,
        paper_id: &str,
        raw: &RawPaperMetadata,
        source: &str,
    ) -> Result<(), StoreError> {
        struct Current {
            authors_json: String,
            abstract_text: Option<String>,
            url: Option<String>,
            venue: Option<String>,
            keywords_json: String,
            published_date: Option<String>,
            citation_count: Option<i64>,
        }

        let current = conn
            .query_row(
                "SELECT authors, abstract, url, venue, keywords, published_date, citation_count
                 FROM papers WHERE paper_id = ?1",
                params![paper_id],
                |row| {
                    Ok(Current {
                        authors_json: row.get(0)?,
                        abstract_text: row.get(1)?,
                        url: row.get(2)?,
                        venue: row.get(3)?,
                        keywords_json: row.get(4)?,
                        published_date: row.get(5)?,
                        citation_count: row.get(6)?,
                    })
                },
            )
            .map_err(|e| StoreError::Storage(format!("merge read: {}", e)))?;

        let now = now_millis();

        // Fill previously-absent optionals; never replace content with
        // an empty value from a lower-confidence source.
        let abstract_text = merge_optional(current.abstract_text, raw.abstract_text.as_deref());
        let url = merge_optional(current.url, raw.url.as_deref());
        let venue = merge_optional(current.venue, raw.venue.as_deref());
        let published_date = match current.published_date {
            Some(existing) => Some(existing),
            None => raw.published_date.map(date_to_text),
        };

        let current_authors: Vec<String> = from_json(&current.authors_json)?;
        let authors_json = if current_authors.is_empty() && !raw.authors.is_empty() {
            to_json(&raw.authors)?
        } else {
            current.authors_json
        };

        let mut keywords: Vec<String> = from_json(&current.keywords_json)?;
        for keyword in &raw.keywords {
            if !keywords.contains(keyword) {
                keywords.push(keyword.clone());
            }
        }
        let keywords_json = to_json(&keywords)?;

        // The most recently fetched citation count replaces the stored
        // one; the replacement instant is recorded.
        let (citation_count, citation_changed) = match (current.citation_count, raw.citation_count)
        {
            (old, Some(new)) if old != Some(new) => (Some(new), true),
            (old, _) => (old, false),
        };

        if citation_changed {
            conn.execute(
                "UPDATE papers SET citation_count = ?1, citation_updated = ?2 WHERE paper_id = ?3",
                params![citation_count, now, paper_id],
            )
            .map_err(|e| StoreError::Storage(format!("merge citations: {}", e)))?;
        }

        conn.execute(
            "UPDATE papers
             SET authors = ?1, abstract = ?2, url = ?3, venue = ?4, keywords = ?5,
                 published_date = ?6, modified = ?7
             WHERE paper_id = ?8",
            params![
                authors_json,
                abstract_text,
                url,
                venue,
                keywords_json,
                published_date,
                now,
                paper_id,
            ],
        )
        .map_err(|e| StoreError::Storage(format!("merge: {}", e)))?;

        Self::record_aliases(conn, paper_id, raw, source)
    }

    /// Union the record's source mappings with this raw record's aliases.
    /// Append-only: nothing is ever removed here.
    fn record_aliases(
        conn: &Connection,
        paper_id: &str,
        raw: &RawPaperMetadata,
        source: &str,
    ) -> Result<(), StoreError> {
        for (alias_source, alias_id) in identity::source_aliases(raw, source) {
            conn.execute(
                "INSERT OR IGNORE INTO paper_sources (paper_id, source, source_id)
                 VALUES (?1, ?2, ?3)",
                params![paper_id, alias_source, alias_id],
            )
            .map_err(|e| StoreError::Storage(format!("insert source: {}", e)))?;
        }
        Ok(())
    }

    fn load_sources(conn: &Connection, paper_id: &str) -> Result<Vec<SourceId>, StoreError> {
        let mut stmt = conn
            .prepare(
                "SELECT source, source_id FROM paper_sources
                 WHERE paper_id = ?1 ORDER BY source, source_id",
            )
            .map_err(|e| StoreError::Storage(format!("prepare sources: {}", e)))?;
        let sources = stmt
            .query_map(params![paper_id], |row| {
                Ok(SourceId {
                    source: row.get(0)?,
                    id: row.get(1)?,
                })
            })
            .map_err(|e| StoreError::Storage(format!("query sources: {}", e)))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StoreError::Storage(format!("collect sources: {}", e)))?;
        Ok(sources)
    }

    fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<PaperRecord> {
        let authors_json: String = row.get(2)?;
        let keywords_json: String = row.get(6)?;
        let published: Option<String> = row.get(7)?;
        let pdf_path: Option<String> = row.get(9)?;
        let created_ms: i64 = row.get(11)?;
        let modified_ms: i64 = row.get(12)?;

        Ok(PaperRecord {
            paper_id: row.get(0)?,
            title: row.get(1)?,
            authors: serde_json::from_str(&authors_json).unwrap_or_default(),
            abstract_text: row.get(3)?,
            url: row.get(4)?,
            venue: row.get(5)?,
            keywords: serde_json::from_str(&keywords_json).unwrap_or_default(),
            published_date: published.and_then(|d| text_to_date(&d)),
            citation_count: row.get(8)?,
            source_ids: Vec::new(),
            pdf_path: pdf_path.map(PathBuf::from),
            full_text_available: row.get(10)?,
            created_at: millis_to_datetime(created_ms),
            updated_at: millis_to_datetime(modified_ms),
        })
    }
}

/// Identity lookups against an open connection, used during `upsert`.
struct ConnLookup<'a>(&'a Connection);

impl IdentityLookup for ConnLookup<'_> {
    fn paper_for_source_id(&self, source: &str, id: &str) -> Result<Option<String>, StoreError> {
        self.0
            .query_row(
                "SELECT paper_id FROM paper_sources WHERE source = ?1 AND source_id = ?2",
                params![source, id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| StoreError::Storage(format!("source lookup: {}", e)))
    }

    fn paper_for_normalized_title(&self, normalized: &str) -> Result<Option<String>, StoreError> {
        self.0
            .query_row(
                "SELECT paper_id FROM papers WHERE normalized_title = ?1
                 ORDER BY paper_id LIMIT 1",
                params![normalized],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| StoreError::Storage(format!("title lookup: {}", e)))
    }

    fn normalized_titles(&self) -> Result<Vec<(String, String)>, StoreError> {
        let mut stmt = self
            .0
            .prepare("SELECT paper_id, normalized_title FROM papers")
            .map_err(|e| StoreError::Storage(format!("prepare titles: {}", e)))?;
        let titles = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(|e| StoreError::Storage(format!("query titles: {}", e)))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StoreError::Storage(format!("collect titles: {}", e)))?;
        Ok(titles)
    }
}

fn merge_optional(existing: Option<String>, incoming: Option<&str>) -> Option<String> {
    match existing {
        Some(value) if !value.is_empty() => Some(value),
        _ => incoming
            .filter(|v| !v.is_empty())
            .map(|v| v.to_string()),
    }
}

fn empty_to_none(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(|v| v.to_string())
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| StoreError::Storage(format!("encode: {}", e)))
}

fn from_json<T: serde::de::DeserializeOwned>(value: &str) -> Result<T, StoreError> {
    serde_json::from_str(value).map_err(|e| StoreError::Storage(format!("decode: {}", e)))
}

pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

pub(crate) fn millis_to_datetime(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_else(Utc::now)
}

pub(crate) fn date_to_text(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub(crate) fn text_to_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ListFilter;

    fn store() -> (Arc<Database>, MetadataStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(Database::open_in_memory().unwrap());
        let store = MetadataStore::new(db.clone(), dir.path().join("papers"));
        (db, store, dir)
    }

    fn raw(title: &str, provider_id: &str) -> RawPaperMetadata {
        RawPaperMetadata {
            provider_id: provider_id.to_string(),
            title: title.to_string(),
            authors: vec!["Jane Doe".to_string(), "John Roe".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn upsert_same_provider_id_is_idempotent() {
        let (_db, store, _dir) = store();
        let metadata = raw("Stochastic Parrots", "2101.00001");

        let first = store.upsert(&metadata, "arxiv").unwrap();
        let second = store.upsert(&metadata, "arxiv").unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.paper_id, second.paper_id);
        assert_eq!(store.record_count().unwrap(), 1);

        let record = store.get(&first.paper_id).unwrap().unwrap();
        assert_eq!(record.source_ids, vec![SourceId::new("arxiv", "2101.00001")]);
    }

    #[test]
    fn two_providers_same_title_merge_into_one_record() {
        let (_db, store, _dir) = store();
        let from_arxiv = raw("Attention Is All You Need", "1706.03762");
        let from_s2 = raw("Attention is all you need!", "s2-abc");

        let a = store.upsert(&from_arxiv, "arxiv").unwrap();
        let b = store.upsert(&from_s2, "semantic_scholar").unwrap();

        assert_eq!(a.paper_id, b.paper_id);
        assert_eq!(store.record_count().unwrap(), 1);

        let record = store.get(&a.paper_id).unwrap().unwrap();
        assert!(record.has_source_id("arxiv", "1706.03762"));
        assert!(record.has_source_id("semantic_scholar", "s2-abc"));
    }

    #[test]
    fn citation_count_replaced_by_latest_fetch() {
        let (_db, store, _dir) = store();
        let mut metadata = raw("Scaling Laws", "2001.08361");
        metadata.citation_count = Some(10);
        metadata.published_date = NaiveDate::from_ymd_opt(2023, 1, 1);

        let outcome = store.upsert(&metadata, "arxiv").unwrap();

        metadata.provider_id = "s2-xyz".to_string();
        metadata.citation_count = Some(15);
        store.upsert(&metadata, "semantic_scholar").unwrap();

        let record = store.get(&outcome.paper_id).unwrap().unwrap();
        assert_eq!(record.citation_count, Some(15));
        assert_eq!(
            record.source_ids,
            vec![
                SourceId::new("arxiv", "2001.08361"),
                SourceId::new("semantic_scholar", "s2-xyz"),
            ]
        );
        assert_eq!(store.record_count().unwrap(), 1);
    }

    #[test]
    fn merge_fills_absent_fields_but_never_clears() {
        let (_db, store, _dir) = store();
        let sparse = raw("Emergent Abilities", "2206.07682");
        let id = store.upsert(&sparse, "arxiv").unwrap().paper_id;

        let mut enriched = raw("Emergent Abilities", "s2-1");
        enriched.abstract_text = Some("We study emergence.".to_string());
        enriched.venue = Some("TMLR".to_string());
        store.upsert(&enriched, "semantic_scholar").unwrap();

        // A later sparse upsert must not clear the filled fields
        store.upsert(&sparse, "arxiv").unwrap();

        let record = store.get(&id).unwrap().unwrap();
        assert_eq!(record.abstract_text.as_deref(), Some("We study emergence."));
        assert_eq!(record.venue.as_deref(), Some("TMLR"));
    }

    #[test]
    fn near_duplicate_titles_stay_distinct_with_flag() {
        let (_db, store, _dir) = store();
        store
            .upsert(&raw("Deep Residual Learning for Image Recognition", "a1"), "arxiv")
            .unwrap();
        let outcome = store
            .upsert(&raw("Deep Residual Learning for Image Recognitions", "a2"), "arxiv")
            .unwrap();

        assert!(outcome.created);
        assert!(outcome.review.is_some());
        assert_eq!(store.record_count().unwrap(), 2);
    }

    #[test]
    fn doi_bridges_providers_with_different_titles() {
        let (_db, store, _dir) = store();
        let mut first = raw("A Formatted Title", "x1");
        first.doi = Some("10.5555/paper".to_string());
        let id = store.upsert(&first, "arxiv").unwrap().paper_id;

        // Same DOI, provider mangled the title
        let mut second = raw("A Formatted Title [PREPRINT]", "y2");
        second.doi = Some("https://doi.org/10.5555/PAPER".to_string());
        let merged = store.upsert(&second, "semantic_scholar").unwrap();

        assert_eq!(merged.paper_id, id);
        assert_eq!(store.record_count().unwrap(), 1);
    }

    #[test]
    fn keywords_union_on_merge() {
        let (_db, store, _dir) = store();
        let mut metadata = raw("Retrieval Augmentation", "r1");
        metadata.keywords = vec!["rag".to_string()];
        let id = store.upsert(&metadata, "arxiv").unwrap().paper_id;

        metadata.keywords = vec!["rag".to_string(), "retrieval".to_string()];
        store.upsert(&metadata, "arxiv").unwrap();

        let record = store.get(&id).unwrap().unwrap();
        assert_eq!(record.keywords, vec!["rag", "retrieval"]);
    }

    #[test]
    fn get_unknown_returns_none() {
        let (_db, store, _dir) = store();
        assert!(store.get("missing").unwrap().is_none());
    }

    #[test]
    fn lookup_falls_back_to_title_substring() {
        let (_db, store, _dir) = store();
        let id = store
            .upsert(&raw("Language Models are Few-Shot Learners", "gpt3"), "arxiv")
            .unwrap()
            .paper_id;

        let by_title = store.lookup("few-shot").unwrap().unwrap();
        assert_eq!(by_title.paper_id, id);
        assert!(store.lookup("nonexistent paper").unwrap().is_none());
    }

    #[test]
    fn attach_pdf_unknown_paper_is_not_found() {
        let (_db, store, _dir) = store();
        let err = store.attach_pdf("missing", b"%PDF-1.5").unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn attach_pdf_writes_file_and_records_path() {
        let (_db, store, _dir) = store();
        let id = store.upsert(&raw("Paper", "p1"), "arxiv").unwrap().paper_id;

        let path = store.attach_pdf(&id, b"%PDF-1.5 fake").unwrap();
        assert!(path.exists());

        let record = store.get(&id).unwrap().unwrap();
        assert_eq!(record.pdf_path.as_deref(), Some(path.as_path()));
        // Attaching alone never claims full text
        assert!(!record.full_text_available);
    }

    #[test]
    fn delete_cascades_sources_fulltext_and_pdf() {
        let (db, store, _dir) = store();
        let id = store.upsert(&raw("Doomed", "d1"), "arxiv").unwrap().paper_id;
        let pdf = store.attach_pdf(&id, b"%PDF-1.5").unwrap();

        {
            let conn = db.lock().unwrap();
            conn.execute(
                "INSERT INTO full_text (paper_id, content, token_count, extractor_version, indexed_at)
                 VALUES (?1, 'text', 1, 1, 0)",
                params![id],
            )
            .unwrap();
        }

        store.delete(&id).unwrap();

        assert!(store.get(&id).unwrap().is_none());
        assert!(!pdf.exists());
        let conn = db.lock().unwrap();
        let sources: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM paper_sources WHERE paper_id = ?1",
                params![id],
                |row| row.get(0),
            )
            .unwrap();
        let fulltext: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM full_text WHERE paper_id = ?1",
                params![id],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(sources, 0);
        assert_eq!(fulltext, 0);
    }

    #[test]
    fn delete_unknown_is_not_found() {
        let (_db, store, _dir) = store();
        let err = store.delete("missing").unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn list_keyword_matches_title_or_abstract() {
        let (_db, store, _dir) = store();
        let mut a = raw("Transformers for Vision", "v1");
        a.abstract_text = Some("Image classification study".to_string());
        store.upsert(&a, "arxiv").unwrap();

        let mut b = raw("Convolutional Networks", "v2");
        b.abstract_text = Some("A transformer-free approach".to_string());
        store.upsert(&b, "arxiv").unwrap();

        store.upsert(&raw("Unrelated Work", "v3"), "arxiv").unwrap();

        let filter = ListFilter {
            keyword: Some("transformer".to_string()),
            ..Default::default()
        };
        let results = store.list(&filter).unwrap();
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn list_min_citations_excludes_unknown_counts() {
        let (_db, store, _dir) = store();
        let mut cited = raw("Cited", "c1");
        cited.citation_count = Some(150);
        store.upsert(&cited, "arxiv").unwrap();

        let mut barely = raw("Barely Cited", "c2");
        barely.citation_count = Some(50);
        store.upsert(&barely, "arxiv").unwrap();

        store.upsert(&raw("Uncounted", "c3"), "arxiv").unwrap();

        let filter = ListFilter {
            min_citations: Some(100),
            ..Default::default()
        };
        let results = store.list(&filter).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "Cited");
    }

    #[test]
    fn list_date_range_excludes_undated_and_out_of_range() {
        let (_db, store, _dir) = store();
        let mut in_range = raw("In Range", "d1");
        in_range.published_date = NaiveDate::from_ymd_opt(2023, 6, 1);
        store.upsert(&in_range, "arxiv").unwrap();

        let mut late = raw("Too Late", "d2");
        late.published_date = NaiveDate::from_ymd_opt(2024, 2, 1);
        store.upsert(&late, "arxiv").unwrap();

        store.upsert(&raw("Undated", "d3"), "arxiv").unwrap();

        let filter = ListFilter {
            date_from: NaiveDate::from_ymd_opt(2023, 1, 1),
            date_to: NaiveDate::from_ymd_opt(2023, 12, 31),
            ..Default::default()
        };
        let results = store.list(&filter).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "In Range");
    }

    #[test]
    fn list_restricts_to_id_set() {
        let (_db, store, _dir) = store();
        let keep = store.upsert(&raw("Keep", "k1"), "arxiv").unwrap().paper_id;
        store.upsert(&raw("Drop", "k2"), "arxiv").unwrap();

        let filter = ListFilter {
            paper_ids: Some(vec![keep.clone()]),
            ..Default::default()
        };
        let results = store.list(&filter).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].paper_id, keep);

        let empty = ListFilter {
            paper_ids: Some(Vec::new()),
            ..Default::default()
        };
        assert!(store.list(&empty).unwrap().is_empty());
    }

    #[test]
    fn venue_stats_ranked_by_mean_citations() {
        let (_db, store, _dir) = store();
        for (title, id, venue, citations) in [
            ("P1", "s1", "NeurIPS", 100),
            ("P2", "s2", "NeurIPS", 50),
            ("P3", "s3", "Workshop", 5),
        ] {
            let mut metadata = raw(title, id);
            metadata.venue = Some(venue.to_string());
            metadata.citation_count = Some(citations);
            store.upsert(&metadata, "arxiv").unwrap();
        }

        let stats = store.venue_stats(10).unwrap();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].venue, "NeurIPS");
        assert_eq!(stats[0].paper_count, 2);
        assert_eq!(stats[0].max_citations, 100);
        assert!((stats[0].mean_citations - 75.0).abs() < f64::EPSILON);
    }
}
