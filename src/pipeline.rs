//! Ingestion pipeline orchestration.
//!
//! Coordinates one full run: discovery → per source (download → extract →
//! ingest) → summary. Sources are processed sequentially; a failure in one
//! source's fetch or ingest is recorded and the run moves on.
//!
//! Only one run executes at a time. [`Pipeline::run_once`] waits for an
//! in-flight run to finish; [`Pipeline::try_run_once`] skips instead, which
//! is what timer triggers use.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::config::{Config, IngestConfig};
use crate::fetch::http::ReqwestSource;
use crate::fetch::ArchiveFetcher;
use crate::ingest::DirectoryIngestor;
use crate::models::{RunSummary, SourceSync};
use crate::store::RecordStore;

/// The fetch → ingest pipeline bound to a store.
pub struct Pipeline {
    fetcher: ArchiveFetcher,
    store: Arc<dyn RecordStore>,
    ingest: IngestConfig,
    running: Mutex<()>,
}

impl Pipeline {
    pub fn new(fetcher: ArchiveFetcher, store: Arc<dyn RecordStore>, ingest: IngestConfig) -> Self {
        Self {
            fetcher,
            store,
            ingest,
            running: Mutex::new(()),
        }
    }

    /// Build a pipeline that talks to the real publisher over HTTP.
    pub fn from_config(config: &Config, store: Arc<dyn RecordStore>) -> Result<Self> {
        let http = Arc::new(ReqwestSource::new(&config.fetch)?);
        let fetcher = ArchiveFetcher::new(http, config.fetch.clone());
        Ok(Self::new(fetcher, store, config.ingest.clone()))
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Execute one run, waiting for any run already in progress.
    pub async fn run_once(&self) -> RunSummary {
        let _guard = self.running.lock().await;
        self.run_locked().await
    }

    /// Execute one run unless another is in progress, in which case `None`.
    pub async fn try_run_once(&self) -> Option<RunSummary> {
        let _guard = match self.running.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                warn!("a sync run is already in progress, skipping trigger");
                return None;
            }
        };
        Some(self.run_locked().await)
    }

    async fn run_locked(&self) -> RunSummary {
        let started = Instant::now();
        info!("starting registry sync run");

        let targets = self.fetcher.discover().await;
        let mut summary = RunSummary {
            attempted: targets.len(),
            ..RunSummary::default()
        };

        let ingestor = match DirectoryIngestor::new(
            self.store.as_ref(),
            self.ingest.batch_size,
            &self.ingest.include_globs,
        ) {
            Ok(i) => i,
            Err(e) => {
                error!(error = %e, "cannot build ingestor, marking every source failed");
                summary.failed = targets.into_iter().map(|t| t.source_id).collect();
                summary.elapsed = started.elapsed();
                log_summary(&summary);
                return summary;
            }
        };

        for target in &targets {
            info!(source = %target.source_id, "processing source");

            let extracted = match self.fetcher.fetch_target(target).await {
                Ok(x) => x,
                Err(e) => {
                    warn!(source = %target.source_id, error = %e, "source fetch failed");
                    summary.failed.push(target.source_id.clone());
                    continue;
                }
            };

            match ingestor.ingest(&extracted.dir).await {
                Ok(stats) => {
                    summary.records.add(stats);
                    summary.succeeded.push(target.source_id.clone());

                    let sync = SourceSync {
                        source_id: format!("{}{}", self.fetcher.config().file_prefix, target.source_id),
                        archive_url: extracted.url.clone(),
                        archive_sha256: extracted.archive_sha256.clone(),
                        processed: stats.processed,
                        errors: stats.errors,
                        synced_at: chrono::Utc::now().timestamp(),
                    };
                    if let Err(e) = self.store.record_sync(&sync).await {
                        warn!(source = %target.source_id, error = %e, "could not record sync outcome");
                    }
                }
                Err(e) => {
                    warn!(
                        source = %target.source_id,
                        dir = %extracted.dir.display(),
                        committed = e.committed.processed,
                        error = %e,
                        "source ingestion failed"
                    );
                    summary.records.add(e.committed);
                    summary.failed.push(target.source_id.clone());
                }
            }
        }

        summary.elapsed = started.elapsed();
        log_summary(&summary);
        summary
    }
}

fn log_summary(summary: &RunSummary) {
    info!(
        attempted = summary.attempted,
        succeeded = summary.succeeded.len(),
        failed = summary.failed.len(),
        processed = summary.records.processed,
        errors = summary.records.errors,
        elapsed_secs = summary.elapsed.as_secs_f64(),
        "sync run complete"
    );
    if !summary.succeeded.is_empty() {
        info!("successfully processed sources: {}", summary.succeeded.join(", "));
    }
    if !summary.failed.is_empty() {
        warn!("failed sources: {}", summary.failed.join(", "));
    }
}
