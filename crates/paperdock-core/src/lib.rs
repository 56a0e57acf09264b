//! paperdock-core: local repository and search core for collected academic papers
//!
//! This library provides the storage side of a paper-collection tool:
//! - Canonical identity resolution across heterogeneous providers
//! - Durable, merge-on-upsert metadata storage (SQLite)
//! - PDF text extraction tolerant of malformed and image-only files
//! - A derived, rebuildable full-text index
//! - A composite query/filter/rank pipeline with CSV/JSON export
//!
//! Remote provider clients and PDF transport are collaborators: their
//! boundary types live in [`sources`], their implementations do not.

pub mod config;
pub mod domain;
pub mod export;
pub mod extract;
pub mod identity;
pub mod index;
pub mod jobs;
pub mod query;
pub mod sources;
pub mod store;

mod repository;

// Re-export main types for convenience
pub use config::{ExtractionConfig, RepositoryConfig};
pub use domain::{IndexEntry, PaperRecord, SourceId, VenueStat};
pub use export::{export_records, ExportError, ExportFormat};
pub use extract::{ExtractError, ExtractedText, TextExtractor, EXTRACTOR_VERSION};
pub use identity::{ReviewFlag, Resolution};
pub use index::{FullTextHit, FullTextIndex, IndexError};
pub use jobs::{ExtractionJobs, ExtractionStatus, JobError};
pub use query::{QueryCriteria, QueryError};
pub use repository::{FullTextContext, ReindexReport, Repository, RepositoryError};
pub use sources::{FetchError, PdfFetch, RawPaperMetadata, SourceError};
pub use store::{ListFilter, MetadataStore, StoreError, UpsertOutcome};
