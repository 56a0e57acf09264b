//! Process-wide configuration.
//!
//! Built once at startup and passed explicitly into each component's
//! constructor; no component reads ambient global state.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for the paper repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Root directory for all repository state.
    pub data_dir: PathBuf,
    /// Directory holding downloaded PDFs, owned by the repository.
    pub papers_dir: PathBuf,
    /// Path of the SQLite database file.
    pub db_path: PathBuf,
    #[serde(default)]
    pub extraction: ExtractionConfig,
}

impl RepositoryConfig {
    /// Derive the standard layout under a single data directory.
    pub fn for_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            papers_dir: data_dir.join("papers"),
            db_path: data_dir.join("papers.db"),
            data_dir,
            extraction: ExtractionConfig::default(),
        }
    }

    pub fn papers_dir(&self) -> &Path {
        &self.papers_dir
    }
}

/// Bounds applied to PDF text extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Pages beyond this count are not processed.
    pub max_pages: usize,
    /// Wall-clock bound for a single extraction job.
    pub timeout: Duration,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_pages: 500,
            timeout: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_paths_from_data_dir() {
        let config = RepositoryConfig::for_data_dir("/tmp/paperdock");
        assert_eq!(config.papers_dir, PathBuf::from("/tmp/paperdock/papers"));
        assert_eq!(config.db_path, PathBuf::from("/tmp/paperdock/papers.db"));
        assert_eq!(config.extraction.max_pages, 500);
    }

    #[test]
    fn config_serde_round_trip() {
        let config = RepositoryConfig::for_data_dir("./data");
        let json = serde_json::to_string(&config).unwrap();
        let back: RepositoryConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.db_path, config.db_path);
        assert_eq!(back.extraction.timeout, config.extraction.timeout);
    }
}
