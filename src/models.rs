//! Core data models used throughout the ingestion pipeline.
//!
//! These types represent the taxpayer records, download targets, and run
//! outcomes that flow between the fetcher, the ingestor, and the store.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

/// Status stored when a source line carries no status field.
pub const UNKNOWN_STATUS: &str = "UNKNOWN";

/// Number of source partitions the registry is split into (`0`..=`9`).
pub const SOURCE_COUNT: u8 = 10;

/// One taxpayer entry, keyed by `tax_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaxpayerRecord {
    pub tax_id: String,
    pub name: String,
    pub check_digit: String,
    pub prior_tax_id: Option<String>,
    pub status: String,
    /// Source partition the record was loaded from, e.g. `"ruc7"`.
    pub source_id: String,
}

/// Remote location of one source partition's archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTarget {
    /// Single digit, `"0"`..`"9"`.
    pub source_id: String,
    pub url: String,
    /// Standardized file name, e.g. `"ruc7.zip"`.
    pub expected_file_name: String,
}

/// A downloaded, validated, and extracted archive.
#[derive(Debug, Clone)]
pub struct ExtractedDirectory {
    pub source_id: String,
    pub url: String,
    pub archive_path: PathBuf,
    pub dir: PathBuf,
    pub archive_sha256: String,
    pub archive_bytes: u64,
}

/// Processed/error line counts for a file, directory, or whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    pub processed: u64,
    pub errors: u64,
}

impl IngestStats {
    pub fn add(&mut self, other: IngestStats) {
        self.processed += other.processed;
        self.errors += other.errors;
    }
}

/// Latest ingestion outcome for a source partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceSync {
    pub source_id: String,
    pub archive_url: String,
    pub archive_sha256: String,
    pub processed: u64,
    pub errors: u64,
    /// Unix seconds.
    pub synced_at: i64,
}

/// Aggregate outcome of one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub attempted: usize,
    /// Source ids (single digits) that were fetched and ingested.
    pub succeeded: Vec<String>,
    /// Source ids whose fetch or ingest failed.
    pub failed: Vec<String>,
    /// Committed record counts, including those of sources that failed
    /// partway through ingestion.
    pub records: IngestStats,
    pub elapsed: Duration,
}
