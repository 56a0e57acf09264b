//! Canonical identity resolution.
//!
//! Maps raw provider metadata onto a stable `paper_id` so the same logical
//! paper arriving from two providers lands on one record. Resolution is
//! deterministic and explainable: provider-id match, then exact
//! normalized-title match, then a freshly minted content-derived id.
//! Near-miss titles are flagged for review, never merged: a missed merge
//! is recoverable, a wrong merge is not.
//!
//! This module is pure: it looks up and computes, it never mutates.

mod normalize;

pub use normalize::{extract_surname, normalize_author, normalize_title};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::sources::{normalize_arxiv_id, normalize_doi, RawPaperMetadata};
use crate::store::StoreError;

/// Jaro-Winkler similarity at or above this, without exact equality,
/// produces a [`ReviewFlag`].
const REVIEW_SIMILARITY: f64 = 0.90;

/// Read-only view of the store used during resolution.
pub trait IdentityLookup {
    /// Canonical id already recorded for a `(source, source_id)` mapping.
    fn paper_for_source_id(&self, source: &str, id: &str) -> Result<Option<String>, StoreError>;

    /// Canonical id of a record whose normalized title matches exactly.
    fn paper_for_normalized_title(&self, normalized: &str) -> Result<Option<String>, StoreError>;

    /// All `(paper_id, normalized_title)` pairs, for near-miss detection.
    fn normalized_titles(&self) -> Result<Vec<(String, String)>, StoreError>;
}

/// Outcome of resolving raw metadata against the store.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// The paper is already known under this canonical id.
    Existing(String),
    /// No match; a new record should be created under `paper_id`.
    New {
        paper_id: String,
        normalized_title: String,
        review: Option<ReviewFlag>,
    },
}

/// An ambiguous title collision: similar but not identical to an existing
/// record. Surfaced to the caller for manual review instead of merging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewFlag {
    pub similar_paper_id: String,
    pub similar_normalized_title: String,
    pub similarity: f64,
}

/// All identifier namespaces under which this raw record is known,
/// including DOI and arXiv aliases when present.
pub fn source_aliases(raw: &RawPaperMetadata, source: &str) -> Vec<(String, String)> {
    let mut aliases = Vec::with_capacity(3);
    if !raw.provider_id.is_empty() {
        aliases.push((source.to_string(), raw.provider_id.clone()));
    }
    if let Some(doi) = raw.doi.as_deref() {
        let doi = normalize_doi(doi);
        if !doi.is_empty() {
            aliases.push(("doi".to_string(), doi));
        }
    }
    if let Some(arxiv) = raw.arxiv_id.as_deref() {
        let arxiv = normalize_arxiv_id(arxiv);
        if !arxiv.is_empty() {
            aliases.push(("arxiv".to_string(), arxiv));
        }
    }
    aliases
}

/// Mint the canonical id for a new paper: hex SHA-256 over the normalized
/// title and first-author surname, truncated to 32 chars. Deterministic, so
/// re-resolving the same metadata always yields the same id.
pub fn mint_paper_id(normalized_title: &str, raw: &RawPaperMetadata, source: &str) -> String {
    let mut hasher = Sha256::new();
    if normalized_title.is_empty() {
        // Untitled records hash their provider identity instead, so two
        // unrelated untitled papers cannot collide.
        hasher.update(source.as_bytes());
        hasher.update(b":");
        hasher.update(raw.provider_id.as_bytes());
    } else {
        let surname = raw
            .authors
            .first()
            .map(|a| extract_surname(a))
            .unwrap_or_default();
        hasher.update(normalized_title.as_bytes());
        hasher.update(b"\n");
        hasher.update(surname.as_bytes());
    }
    let digest = hasher.finalize();
    hex::encode(&digest[..16])
}

/// Resolve raw provider metadata to a canonical identity.
pub fn resolve(
    raw: &RawPaperMetadata,
    source: &str,
    lookup: &dyn IdentityLookup,
) -> Result<Resolution, StoreError> {
    // (a) any known identifier mapping wins
    for (alias_source, alias_id) in source_aliases(raw, source) {
        if let Some(paper_id) = lookup.paper_for_source_id(&alias_source, &alias_id)? {
            return Ok(Resolution::Existing(paper_id));
        }
    }

    // (b) exact normalized-title match
    let normalized = normalize_title(&raw.title);
    if !normalized.is_empty() {
        if let Some(paper_id) = lookup.paper_for_normalized_title(&normalized)? {
            return Ok(Resolution::Existing(paper_id));
        }
    }

    // (c) mint a new id; flag near-miss titles for review
    let review = if normalized.is_empty() {
        None
    } else {
        find_similar_title(&normalized, &lookup.normalized_titles()?)
    };

    Ok(Resolution::New {
        paper_id: mint_paper_id(&normalized, raw, source),
        normalized_title: normalized,
        review,
    })
}

fn find_similar_title(
    normalized: &str,
    existing: &[(String, String)],
) -> Option<ReviewFlag> {
    let mut best: Option<ReviewFlag> = None;
    for (paper_id, title) in existing {
        if title.is_empty() {
            continue;
        }
        let similarity = strsim::jaro_winkler(normalized, title);
        if similarity >= REVIEW_SIMILARITY
            && best.as_ref().map_or(true, |b| similarity > b.similarity)
        {
            best = Some(ReviewFlag {
                similar_paper_id: paper_id.clone(),
                similar_normalized_title: title.clone(),
                similarity,
            });
        }
    }
    best
}
