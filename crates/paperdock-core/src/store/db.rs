//! Shared SQLite handle.
//!
//! All mutating operations serialize through the connection mutex, which
//! gives the single-writer discipline the store requires. WAL mode keeps
//! concurrent readers on a consistent snapshot.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::Connection;

use super::StoreError;

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a database at the given path.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn =
            Connection::open(path).map_err(|e| StoreError::Storage(format!("open: {}", e)))?;
        Self::init_with_connection(conn)
    }

    /// Create an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StoreError::Storage(format!("open_in_memory: {}", e)))?;
        Self::init_with_connection(conn)
    }

    fn init_with_connection(conn: Connection) -> Result<Self, StoreError> {
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS papers (
                paper_id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                normalized_title TEXT NOT NULL,
                authors TEXT NOT NULL,
                abstract TEXT,
                url TEXT,
                venue TEXT,
                keywords TEXT NOT NULL DEFAULT '[]',
                published_date TEXT,
                citation_count INTEGER,
                citation_updated INTEGER,
                pdf_path TEXT,
                full_text_available INTEGER NOT NULL DEFAULT 0,
                created INTEGER NOT NULL,
                modified INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS paper_sources (
                paper_id TEXT NOT NULL REFERENCES papers(paper_id) ON DELETE CASCADE,
                source TEXT NOT NULL,
                source_id TEXT NOT NULL,
                PRIMARY KEY (source, source_id)
            );

            CREATE TABLE IF NOT EXISTS full_text (
                paper_id TEXT PRIMARY KEY REFERENCES papers(paper_id) ON DELETE CASCADE,
                content TEXT NOT NULL,
                token_count INTEGER NOT NULL,
                extractor_version INTEGER NOT NULL,
                indexed_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_papers_normalized_title ON papers(normalized_title);
            CREATE INDEX IF NOT EXISTS idx_papers_citations ON papers(citation_count);
            CREATE INDEX IF NOT EXISTS idx_papers_published ON papers(published_date);
            CREATE INDEX IF NOT EXISTS idx_papers_venue ON papers(venue);
            CREATE INDEX IF NOT EXISTS idx_paper_sources_paper ON paper_sources(paper_id);
            ",
        )
        .map_err(|e| StoreError::Storage(format!("init_schema: {}", e)))?;

        Ok(())
    }

    /// Acquire the connection for a read or a serialized write.
    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Storage(format!("connection lock poisoned: {}", e)))
    }
}
