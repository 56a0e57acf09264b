//! Domain models for the paper repository.

mod record;

pub use record::{IndexEntry, PaperRecord, SourceId, VenueStat};
