//! Archive fetching: discovery → download with retry → validation → extraction.
//!
//! All filesystem writes are scoped to one source id: the archive lands at
//! `<download_dir>/<prefix><id>.zip` and is unpacked into
//! `<extract_dir>/<prefix><id>/`.
//!
//! # Failure model
//!
//! | Failure | Handling |
//! |---------|----------|
//! | Listing page unreachable / empty | Fallback URL catalog |
//! | Transport error, non-2xx status | Retried, fixed delay |
//! | Payload is not a zip | File deleted, retried |
//! | Extraction failure | Source failed, not retried |
//!
//! A failed source never aborts the others.

pub mod discovery;
pub mod download;
pub mod extract;
pub mod http;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::FetchConfig;
use crate::error::FetchError;
use crate::models::{DownloadTarget, ExtractedDirectory};

use self::http::HttpSource;

/// Result of [`ArchiveFetcher::fetch_all`].
#[derive(Debug, Default)]
pub struct FetchReport {
    pub extracted: Vec<ExtractedDirectory>,
    /// Source ids that could not be downloaded or extracted.
    pub failed: Vec<String>,
}

/// Resolves, downloads, validates, and extracts source archives.
pub struct ArchiveFetcher {
    http: Arc<dyn HttpSource>,
    config: FetchConfig,
}

impl ArchiveFetcher {
    pub fn new(http: Arc<dyn HttpSource>, config: FetchConfig) -> Self {
        Self { http, config }
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Deduplicated targets, at most one per source id, ordered by id.
    pub async fn discover(&self) -> Vec<DownloadTarget> {
        discovery::discover(self.http.as_ref(), &self.config).await
    }

    /// Directory a source's archive is extracted into.
    pub fn extract_dir_for(&self, source_id: &str) -> PathBuf {
        self.config
            .extract_dir
            .join(format!("{}{}", self.config.file_prefix, source_id))
    }

    /// Download, validate, and extract one target.
    pub async fn fetch_target(
        &self,
        target: &DownloadTarget,
    ) -> Result<ExtractedDirectory, FetchError> {
        let download_dir = &self.config.download_dir;
        tokio::fs::create_dir_all(download_dir)
            .await
            .map_err(|e| FetchError::io(download_dir, e))?;

        let archive = download::download_with_retry(
            self.http.as_ref(),
            target,
            download_dir,
            self.config.max_attempts,
            Duration::from_secs(self.config.retry_delay_secs),
        )
        .await?;

        let dir =
            extract::extract_archive(&archive.path, &self.extract_dir_for(&target.source_id))
                .await?;

        Ok(ExtractedDirectory {
            source_id: target.source_id.clone(),
            url: target.url.clone(),
            archive_path: archive.path,
            dir,
            archive_sha256: archive.sha256,
            archive_bytes: archive.bytes,
        })
    }

    /// Discover and fetch every source, continuing past failures.
    pub async fn fetch_all(&self) -> FetchReport {
        let mut report = FetchReport::default();
        for target in self.discover().await {
            match self.fetch_target(&target).await {
                Ok(extracted) => report.extracted.push(extracted),
                Err(e) => {
                    warn!(source = %target.source_id, error = %e, "source fetch failed");
                    report.failed.push(target.source_id.clone());
                }
            }
        }
        info!(
            succeeded = report.extracted.len(),
            failed = report.failed.len(),
            "download summary"
        );
        report
    }
}
