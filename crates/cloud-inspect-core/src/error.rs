//! Error types for the store and ingestion boundary.
//!
//! The analytical algorithms themselves (cidr, parsers, relations, topology,
//! reachability, audit, diff) never raise past their public boundary — every
//! failure mode they can hit is folded into a typed status field on the
//! returned record (`HopStatus::Unknown`, `truncated`, per-file
//! `IngestFileError`). These error enums exist only where raising is
//! legitimate: the store and the ingestion entry point.

use uuid::Uuid;

/// Errors surfaced by a [`crate::store::ResourceStore`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested snapshot does not exist.
    #[error("snapshot not found: {0}")]
    SnapshotNotFound(Uuid),

    /// The requested resource does not exist in the given snapshot.
    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    /// A lookup batch exceeded the store's parameter-limit chunking contract.
    #[error("lookup batch of {0} ids exceeds the chunk size of {1}")]
    BatchTooLarge(usize, usize),
}

/// Errors that can occur while parsing a single export file.
///
/// Per spec §7, ingestion never aborts a whole upload because of one of
/// these — they are collected into `IngestReport::errors` and logged.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// The file content was not valid JSON.
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// The file could not be read from disk.
    #[error("failed to read file: {0}")]
    Io(#[from] std::io::Error),

    /// The JSON was valid but matched none of the four recognised envelope
    /// shapes (array, `{data: [...]}`, `{data: {items: [...]}}`, or a bare
    /// object/array of records).
    #[error("unrecognised envelope shape")]
    UnrecognisedEnvelope,
}
