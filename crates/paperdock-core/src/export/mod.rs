//! Serialization of query results to CSV and JSON.
//!
//! Presentation-only: consumes ranked records from the query engine and
//! never touches the store.

use thiserror::Error;

use crate::domain::PaperRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("csv serialization failed: {0}")]
    Csv(String),

    #[error("json serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<csv::Error> for ExportError {
    fn from(e: csv::Error) -> Self {
        ExportError::Csv(e.to_string())
    }
}

/// Serialize records in the requested format.
pub fn export_records(records: &[PaperRecord], format: ExportFormat) -> Result<String, ExportError> {
    match format {
        ExportFormat::Csv => to_csv(records),
        ExportFormat::Json => Ok(serde_json::to_string_pretty(records)?),
    }
}

fn to_csv(records: &[PaperRecord]) -> Result<String, ExportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record([
        "paper_id",
        "title",
        "authors",
        "sources",
        "url",
        "venue",
        "citation_count",
        "published_date",
        "full_text_available",
        "created_at",
        "updated_at",
    ])?;

    for record in records {
        let sources = record
            .source_ids
            .iter()
            .map(|s| format!("{}:{}", s.source, s.id))
            .collect::<Vec<_>>()
            .join("; ");
        writer.write_record([
            record.paper_id.as_str(),
            record.title.as_str(),
            &record.authors.join("; "),
            &sources,
            record.url.as_deref().unwrap_or(""),
            record.venue.as_deref().unwrap_or(""),
            &record
                .citation_count
                .map(|c| c.to_string())
                .unwrap_or_default(),
            &record
                .published_date
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
            if record.full_text_available { "1" } else { "0" },
            &record.created_at.to_rfc3339(),
            &record.updated_at.to_rfc3339(),
        ])?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| ExportError::Csv(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| ExportError::Csv(e.to_string()))
}
