//! Error taxonomy for fetching and parsing.
//!
//! Storage and orchestration code uses `anyhow`; these typed errors exist
//! where callers branch on the kind of failure (retry or not, count or not).

use std::path::PathBuf;

use thiserror::Error;

use crate::models::IngestStats;

/// Failure while obtaining one source partition's archive.
#[derive(Error, Debug)]
pub enum FetchError {
    /// Network failure or non-success HTTP status. Retryable.
    #[error("transport error fetching {url}: {message}")]
    Transport { url: String, message: String },

    /// Payload written to disk is not a readable zip archive. Retryable.
    #[error("payload for source {source_id} is not a valid archive: {message}")]
    Integrity { source_id: String, message: String },

    /// Archive is valid but could not be unpacked. Not retried.
    #[error("failed to extract {}: {message}", .archive.display())]
    Extraction { archive: PathBuf, message: String },

    #[error("filesystem error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Every attempt for a source failed; wraps the last failure.
    #[error("source {source_id} failed after {attempts} attempts: {last}")]
    Exhausted {
        source_id: String,
        attempts: u32,
        last: Box<FetchError>,
    },
}

impl FetchError {
    /// Whether another download attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FetchError::Extraction { .. } | FetchError::Exhausted { .. })
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        FetchError::Io {
            path: path.into(),
            source,
        }
    }
}

/// A record line that cannot be turned into a taxpayer record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("malformed record: expected at least 3 fields, found {found}")]
    Malformed { found: usize },
}

/// Directory or file ingestion stopped by a failed write.
///
/// `committed` counts what was durably stored before the failure, so run
/// totals stay in line with the table.
#[derive(Error, Debug)]
#[error("ingestion of {} aborted: {cause:#}", .path.display())]
pub struct IngestAborted {
    pub path: PathBuf,
    pub committed: IngestStats,
    pub cause: anyhow::Error,
}
