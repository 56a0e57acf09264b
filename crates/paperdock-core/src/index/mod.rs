//! Derived full-text index.
//!
//! Maps `paper_id` to searchable extracted text so full-text queries never
//! re-scan PDFs. Entries live in the same database as the records because
//! the index write and the `full_text_available` flag must commit as one
//! logical transaction (index first, flag second), and because the index
//! is always reconstructible from records + stored PDFs; it is never a
//! sole source of truth.

use std::sync::Arc;

use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use thiserror::Error;
use tracing::debug;

use crate::domain::IndexEntry;
use crate::extract::EXTRACTOR_VERSION;
use crate::store::{Database, StoreError};

#[derive(Debug, Clone, Error)]
pub enum IndexError {
    #[error("paper not found: {0}")]
    NotFound(String),

    #[error("index storage error: {0}")]
    Storage(String),
}

impl From<StoreError> for IndexError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => IndexError::NotFound(id),
            StoreError::Validation(msg) | StoreError::Storage(msg) => IndexError::Storage(msg),
        }
    }
}

/// One full-text match: the paper and how many query terms appeared as
/// standalone tokens (the relevance signal).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FullTextHit {
    pub paper_id: String,
    pub matched_tokens: usize,
}

/// Build the index entry for a paper from freshly extracted text.
pub fn build_entry(paper_id: &str, text: &str) -> IndexEntry {
    let content = normalize_content(text);
    IndexEntry {
        paper_id: paper_id.to_string(),
        token_count: content.split_whitespace().count(),
        content,
        extractor_version: EXTRACTOR_VERSION,
        indexed_at: Utc::now(),
    }
}

/// Whitespace-normalize extracted text: single spaces, no leading or
/// trailing runs. Case is kept so snippets read naturally; matching
/// case-folds both sides.
fn normalize_content(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Clone)]
pub struct FullTextIndex {
    db: Arc<Database>,
}

impl FullTextIndex {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Create or replace the entry for a paper and mark the record as
    /// full-text searchable. Both writes commit together; on a crash the
    /// flag stays false until the entry is durable.
    pub fn index(&self, entry: &IndexEntry) -> Result<(), IndexError> {
        let conn = self.db.lock()?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| IndexError::Storage(format!("begin tx: {}", e)))?;

        let known: i64 = tx
            .query_row(
                "SELECT COUNT(*) FROM papers WHERE paper_id = ?1",
                params![entry.paper_id],
                |row| row.get(0),
            )
            .map_err(|e| IndexError::Storage(format!("index lookup: {}", e)))?;
        if known == 0 {
            return Err(IndexError::NotFound(entry.paper_id.clone()));
        }

        tx.execute(
            "INSERT OR REPLACE INTO full_text
                 (paper_id, content, token_count, extractor_version, indexed_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.paper_id,
                entry.content,
                entry.token_count as i64,
                entry.extractor_version,
                entry.indexed_at.timestamp_millis(),
            ],
        )
        .map_err(|e| IndexError::Storage(format!("write entry: {}", e)))?;

        tx.execute(
            "UPDATE papers SET full_text_available = 1, modified = ?1 WHERE paper_id = ?2",
            params![Utc::now().timestamp_millis(), entry.paper_id],
        )
        .map_err(|e| IndexError::Storage(format!("set flag: {}", e)))?;

        tx.commit()
            .map_err(|e| IndexError::Storage(format!("commit: {}", e)))?;

        debug!(paper_id = %entry.paper_id, tokens = entry.token_count, "indexed full text");
        Ok(())
    }

    /// Drop the entry and clear the flag. Idempotent.
    pub fn remove(&self, paper_id: &str) -> Result<(), IndexError> {
        let conn = self.db.lock()?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| IndexError::Storage(format!("begin tx: {}", e)))?;

        tx.execute(
            "UPDATE papers SET full_text_available = 0 WHERE paper_id = ?1",
            params![paper_id],
        )
        .map_err(|e| IndexError::Storage(format!("clear flag: {}", e)))?;
        tx.execute(
            "DELETE FROM full_text WHERE paper_id = ?1",
            params![paper_id],
        )
        .map_err(|e| IndexError::Storage(format!("delete entry: {}", e)))?;

        tx.commit()
            .map_err(|e| IndexError::Storage(format!("commit: {}", e)))
    }

    /// Papers whose indexed text contains every query term as a
    /// case-insensitive substring, ordered by id.
    pub fn search(&self, terms: &[String]) -> Result<Vec<FullTextHit>, IndexError> {
        let needles: Vec<String> = terms
            .iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        if needles.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.db.lock()?;
        let mut stmt = conn
            .prepare("SELECT paper_id, content FROM full_text ORDER BY paper_id")
            .map_err(|e| IndexError::Storage(format!("prepare search: {}", e)))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(|e| IndexError::Storage(format!("search: {}", e)))?;

        let mut hits = Vec::new();
        for row in rows {
            let (paper_id, content) =
                row.map_err(|e| IndexError::Storage(format!("search row: {}", e)))?;
            let folded = content.to_lowercase();
            if !needles.iter().all(|needle| folded.contains(needle.as_str())) {
                continue;
            }
            let tokens: std::collections::HashSet<&str> = folded.split_whitespace().collect();
            let matched_tokens = needles
                .iter()
                .filter(|needle| tokens.contains(needle.as_str()))
                .count();
            hits.push(FullTextHit {
                paper_id,
                matched_tokens,
            });
        }
        Ok(hits)
    }

    /// Stored content for one paper, used for snippet display.
    pub fn content(&self, paper_id: &str) -> Result<Option<String>, IndexError> {
        let conn = self.db.lock()?;
        conn.query_row(
            "SELECT content FROM full_text WHERE paper_id = ?1",
            params![paper_id],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| IndexError::Storage(format!("content: {}", e)))
    }

    /// Extractor version an entry was built with, if one exists.
    pub fn entry_version(&self, paper_id: &str) -> Result<Option<u32>, IndexError> {
        let conn = self.db.lock()?;
        conn.query_row(
            "SELECT extractor_version FROM full_text WHERE paper_id = ?1",
            params![paper_id],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| IndexError::Storage(format!("entry version: {}", e)))
    }
}
