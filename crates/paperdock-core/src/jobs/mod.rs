//! Background extraction and indexing.
//!
//! Text extraction is CPU-bound and must not block metadata reads, so it
//! runs on blocking worker threads behind a per-paper in-flight table: a
//! second request for a paper that is already being extracted awaits the
//! running job instead of duplicating work. Jobs run to completion even
//! when their caller goes away, so the result is still cached for the
//! next request, and every job is bounded by the configured timeout.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::extract::{ExtractError, TextExtractor};
use crate::index::{self, FullTextIndex, IndexError};
use crate::store::{MetadataStore, StoreError};

/// Terminal state of one extraction job.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionStatus {
    /// Text extracted and indexed.
    Indexed { token_count: usize },
    /// The PDF parsed but carries no text layer; nothing was indexed and
    /// the record keeps `full_text_available = false`.
    NoText,
    /// The record has no attached PDF; a normal terminal state.
    NoPdf,
}

#[derive(Debug, Clone, Error)]
pub enum JobError {
    #[error("paper not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Extraction(#[from] ExtractError),

    #[error("storage failure: {0}")]
    Storage(String),
}

impl From<StoreError> for JobError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => JobError::NotFound(id),
            StoreError::Validation(msg) | StoreError::Storage(msg) => JobError::Storage(msg),
        }
    }
}

impl From<IndexError> for JobError {
    fn from(e: IndexError) -> Self {
        match e {
            IndexError::NotFound(id) => JobError::NotFound(id),
            IndexError::Storage(msg) => JobError::Storage(msg),
        }
    }
}

type JobResult = Result<ExtractionStatus, JobError>;
type InflightTable = Mutex<HashMap<String, watch::Receiver<Option<JobResult>>>>;

/// Worker front-end for extraction/indexing with in-flight deduplication.
#[derive(Clone)]
pub struct ExtractionJobs {
    store: MetadataStore,
    index: FullTextIndex,
    extractor: TextExtractor,
    timeout: Duration,
    inflight: Arc<InflightTable>,
}

impl ExtractionJobs {
    pub fn new(
        store: MetadataStore,
        index: FullTextIndex,
        extractor: TextExtractor,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            index,
            extractor,
            timeout,
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Extract and index the paper's attached PDF, reusing a running job
    /// for the same paper when one exists. Abandoning the returned future
    /// does not cancel the underlying job.
    pub async fn ensure_full_text(&self, paper_id: &str) -> JobResult {
        let mut rx = self.join_or_spawn(paper_id)?;

        loop {
            {
                let value = rx.borrow_and_update();
                if let Some(result) = value.as_ref() {
                    return result.clone();
                }
            }
            if rx.changed().await.is_err() {
                let value = rx.borrow();
                return value.as_ref().cloned().unwrap_or_else(|| {
                    Err(JobError::Storage("extraction job vanished".into()))
                });
            }
        }
    }

    fn join_or_spawn(
        &self,
        paper_id: &str,
    ) -> Result<watch::Receiver<Option<JobResult>>, JobError> {
        let mut inflight = self
            .inflight
            .lock()
            .map_err(|e| JobError::Storage(format!("in-flight table poisoned: {}", e)))?;

        if let Some(rx) = inflight.get(paper_id) {
            debug!(paper_id, "joining in-flight extraction");
            return Ok(rx.clone());
        }

        let (tx, rx) = watch::channel(None);
        inflight.insert(paper_id.to_string(), rx.clone());

        let jobs = self.clone();
        let id = paper_id.to_string();
        tokio::spawn(async move {
            let result = jobs.run_job(&id).await;
            if let Err(error) = &result {
                warn!(paper_id = %id, %error, "extraction job failed");
            }
            let _ = tx.send(Some(result));
            if let Ok(mut inflight) = jobs.inflight.lock() {
                inflight.remove(&id);
            }
        });

        Ok(rx)
    }

    async fn run_job(&self, paper_id: &str) -> JobResult {
        let record = self
            .store
            .get(paper_id)?
            .ok_or_else(|| JobError::NotFound(paper_id.to_string()))?;
        let Some(pdf_path) = record.pdf_path else {
            return Ok(ExtractionStatus::NoPdf);
        };

        let bytes = std::fs::read(&pdf_path)
            .map_err(|e| JobError::Storage(format!("read {}: {}", pdf_path.display(), e)))?;

        let extractor = self.extractor.clone();
        let work = tokio::task::spawn_blocking(move || extractor.extract(&bytes));
        let extracted = match tokio::time::timeout(self.timeout, work).await {
            Err(_) => return Err(ExtractError::Timeout(self.timeout).into()),
            Ok(Err(join_error)) => {
                return Err(JobError::Storage(format!(
                    "extraction worker died: {}",
                    join_error
                )))
            }
            Ok(Ok(result)) => result?,
        };

        if extracted.is_empty() {
            debug!(paper_id, "pdf has no text layer, nothing to index");
            return Ok(ExtractionStatus::NoText);
        }

        let entry = index::build_entry(paper_id, &extracted.text);
        let token_count = entry.token_count;
        self.index.index(&entry)?;
        Ok(ExtractionStatus::Indexed { token_count })
    }
}
