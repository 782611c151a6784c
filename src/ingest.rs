//! Directory ingestion: extracted archive → parsed records → store.
//!
//! Each source partition is extracted into its own directory (`ruc0/`,
//! `ruc1/`, ...) holding one or more pipe-delimited `.txt` files. The
//! directory name becomes the `source_id` of every record loaded from it.
//!
//! Files are streamed line by line; a file is never read into memory whole.
//! Malformed lines are counted and logged, never fatal. A failed batch
//! transaction aborts the directory and is returned to the caller.

use std::path::{Path, PathBuf};

use anyhow::Result;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::batch::BatchWriter;
use crate::error::IngestAborted;
use crate::models::IngestStats;
use crate::parser::{parse_line, trim_line_ending};
use crate::store::RecordStore;

/// Streams the text files of a directory into a [`RecordStore`].
pub struct DirectoryIngestor<'a> {
    store: &'a dyn RecordStore,
    batch_size: usize,
    include: GlobSet,
}

impl<'a> DirectoryIngestor<'a> {
    /// `include_globs` are matched case-insensitively against file names.
    pub fn new(
        store: &'a dyn RecordStore,
        batch_size: usize,
        include_globs: &[String],
    ) -> Result<Self> {
        Ok(Self {
            store,
            batch_size,
            include: build_globset(include_globs)?,
        })
    }

    /// Ingest every matching file directly under `dir`.
    ///
    /// A missing directory is reported as a single error rather than a
    /// failure. A failed write aborts the directory; the returned
    /// [`IngestAborted`] carries what was committed before it.
    pub async fn ingest(&self, dir: &Path) -> Result<IngestStats, IngestAborted> {
        if !dir.is_dir() {
            warn!(dir = %dir.display(), "directory not found");
            return Ok(IngestStats {
                processed: 0,
                errors: 1,
            });
        }

        let source_id = dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let files = self.list_files(dir).map_err(|cause| IngestAborted {
            path: dir.to_path_buf(),
            committed: IngestStats::default(),
            cause,
        })?;
        info!(dir = %dir.display(), files = files.len(), "ingesting directory");

        let mut total = IngestStats::default();
        for path in &files {
            match self.ingest_file(path, &source_id).await {
                Ok(stats) => total.add(stats),
                Err(mut aborted) => {
                    total.add(aborted.committed);
                    aborted.committed = total;
                    return Err(aborted);
                }
            }
        }

        info!(
            dir = %dir.display(),
            processed = total.processed,
            errors = total.errors,
            "directory ingested"
        );
        Ok(total)
    }

    /// Ingest every `<prefix>*` subdirectory of `root`, in name order.
    ///
    /// Unlike [`ingest`](Self::ingest), a directory whose ingestion fails is
    /// logged and counted as one error so the remaining ones still load.
    pub async fn ingest_root(&self, root: &Path, prefix: &str) -> Result<IngestStats> {
        if !root.is_dir() {
            warn!(root = %root.display(), "extraction root not found");
            return Ok(IngestStats {
                processed: 0,
                errors: 1,
            });
        }

        let mut dirs: Vec<PathBuf> = Vec::new();
        for entry in WalkDir::new(root).min_depth(1).max_depth(1) {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy();
            if entry.file_type().is_dir() && name.starts_with(prefix) {
                dirs.push(entry.into_path());
            }
        }
        dirs.sort();
        info!(root = %root.display(), dirs = dirs.len(), "ingesting extracted directories");

        let mut total = IngestStats::default();
        for dir in &dirs {
            match self.ingest(dir).await {
                Ok(stats) => total.add(stats),
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "directory failed");
                    total.add(e.committed);
                    total.errors += 1;
                }
            }
        }
        Ok(total)
    }

    /// Stream one file through the parser into a fresh [`BatchWriter`].
    pub async fn ingest_file(
        &self,
        path: &Path,
        source_id: &str,
    ) -> Result<IngestStats, IngestAborted> {
        let mut stats = IngestStats::default();

        let file = match tokio::fs::File::open(path).await {
            Ok(f) => f,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "cannot open file");
                stats.errors = 1;
                return Ok(stats);
            }
        };

        let mut reader = BufReader::new(file);
        let mut writer = BatchWriter::new(self.store, self.batch_size);
        let mut buf: Vec<u8> = Vec::new();
        let mut line_no: u64 = 0;

        loop {
            buf.clear();
            let n = match reader.read_until(b'\n', &mut buf).await {
                Ok(n) => n,
                Err(e) => {
                    warn!(file = %path.display(), line = line_no, error = %e, "read failed, stopping file");
                    stats.errors += 1;
                    break;
                }
            };
            if n == 0 {
                break;
            }
            line_no += 1;

            // Registry files are not guaranteed to be UTF-8.
            let text = String::from_utf8_lossy(&buf);
            let line = trim_line_ending(&text);
            if line.trim().is_empty() {
                continue;
            }

            match parse_line(line, source_id) {
                Ok(record) => {
                    if let Err(cause) = writer.add(record).await {
                        return Err(aborted(path, &writer, stats, cause));
                    }
                    stats.processed += 1;
                }
                Err(e) => {
                    warn!(file = %path.display(), line = line_no, content = line, "{}", e);
                    stats.errors += 1;
                }
            }
        }

        if let Err(cause) = writer.flush().await {
            return Err(aborted(path, &writer, stats, cause));
        }

        info!(
            file = %path.display(),
            processed = stats.processed,
            errors = stats.errors,
            batches = writer.flushes(),
            "file ingested"
        );
        Ok(stats)
    }

    fn list_files(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            if self.include.is_match(entry.file_name()) {
                files.push(entry.into_path());
            }
        }
        // Sort for deterministic ordering
        files.sort();
        Ok(files)
    }
}

/// Only records the writer actually committed count as processed.
fn aborted(
    path: &Path,
    writer: &BatchWriter<'_>,
    stats: IngestStats,
    cause: anyhow::Error,
) -> IngestAborted {
    IngestAborted {
        path: path.to_path_buf(),
        committed: IngestStats {
            processed: writer.written(),
            errors: stats.errors,
        },
        cause,
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(GlobBuilder::new(pattern).case_insensitive(true).build()?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use std::fs;
    use tempfile::TempDir;

    fn txt() -> Vec<String> {
        vec!["*.txt".to_string()]
    }

    #[tokio::test]
    async fn test_scenario_two_files() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("ruc1");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("a.txt"), "111|Alice|5|000|ACTIVE").unwrap();
        fs::write(dir.join("b.txt"), "222|Bob|3").unwrap();

        let store = InMemoryStore::new();
        let ingestor = DirectoryIngestor::new(&store, 1000, &txt()).unwrap();
        let stats = ingestor.ingest(&dir).await.unwrap();
        assert_eq!(
            stats,
            IngestStats {
                processed: 2,
                errors: 0
            }
        );

        let alice = store.find_by_key("111").await.unwrap().unwrap();
        assert_eq!(alice.prior_tax_id.as_deref(), Some("000"));
        assert_eq!(alice.status, "ACTIVE");
        assert_eq!(alice.source_id, "ruc1");
        let bob = store.find_by_key("222").await.unwrap().unwrap();
        assert_eq!(bob.prior_tax_id, None);
        assert_eq!(bob.status, "UNKNOWN");
    }

    #[tokio::test]
    async fn test_blank_lines_skipped_malformed_counted() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("ruc2");
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("ruc2.txt"),
            "\n   \n1|A|1\r\nbroken line\n2|B\n3|C|3|\n\n",
        )
        .unwrap();

        let store = InMemoryStore::new();
        let ingestor = DirectoryIngestor::new(&store, 1000, &txt()).unwrap();
        let stats = ingestor.ingest(&dir).await.unwrap();
        assert_eq!(stats.processed, 2);
        assert_eq!(stats.errors, 2);
        assert_eq!(store.find_by_key("1").await.unwrap().unwrap().check_digit, "1");
        assert_eq!(
            store.find_by_key("3").await.unwrap().unwrap().prior_tax_id.as_deref(),
            Some("")
        );
    }

    #[tokio::test]
    async fn test_missing_directory_is_one_error() {
        let tmp = TempDir::new().unwrap();
        let store = InMemoryStore::new();
        let ingestor = DirectoryIngestor::new(&store, 1000, &txt()).unwrap();
        let stats = ingestor.ingest(&tmp.path().join("ruc9")).await.unwrap();
        assert_eq!(
            stats,
            IngestStats {
                processed: 0,
                errors: 1
            }
        );
    }

    #[tokio::test]
    async fn test_only_top_level_text_files() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("ruc3");
        fs::create_dir_all(dir.join("nested")).unwrap();
        fs::write(dir.join("UPPER.TXT"), "1|A|1").unwrap();
        fs::write(dir.join("notes.md"), "2|B|2").unwrap();
        fs::write(dir.join("nested").join("deep.txt"), "3|C|3").unwrap();

        let store = InMemoryStore::new();
        let ingestor = DirectoryIngestor::new(&store, 1000, &txt()).unwrap();
        let stats = ingestor.ingest(&dir).await.unwrap();
        assert_eq!(stats.processed, 1);
        assert!(store.find_by_key("1").await.unwrap().is_some());
        assert!(store.find_by_key("2").await.unwrap().is_none());
        assert!(store.find_by_key("3").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_non_utf8_bytes_are_tolerated() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("ruc4");
        fs::create_dir_all(&dir).unwrap();
        // "PE\xD1A" is Latin-1 for PEÑA
        fs::write(dir.join("ruc4.txt"), b"44|PE\xD1A|4|44|ACTIVO\n").unwrap();

        let store = InMemoryStore::new();
        let ingestor = DirectoryIngestor::new(&store, 1000, &txt()).unwrap();
        let stats = ingestor.ingest(&dir).await.unwrap();
        assert_eq!(stats.processed, 1);
        let r = store.find_by_key("44").await.unwrap().unwrap();
        assert!(r.name.starts_with("PE"));
        assert_eq!(r.status, "ACTIVO");
    }

    #[tokio::test]
    async fn test_persistence_failure_propagates() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("ruc5");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("ruc5.txt"), "1|A|1\n2|B|2\n").unwrap();

        let store = InMemoryStore::new();
        store.set_fail_writes(true);
        let ingestor = DirectoryIngestor::new(&store, 1000, &txt()).unwrap();
        let err = ingestor.ingest(&dir).await.unwrap_err();
        assert_eq!(err.committed, IngestStats::default());
        assert!(err.to_string().contains("simulated write failure"));
    }

    #[tokio::test]
    async fn test_aborted_directory_reports_committed_records() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("ruc6");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("a.txt"), "1|A|1\nbad\n2|B|2\n").unwrap();
        fs::write(dir.join("b.txt"), "3|C|3\n4|D|4\n5|E|5\n").unwrap();

        let store = InMemoryStore::new();
        // a.txt plus the first batch of b.txt succeed
        store.fail_source_after("ruc6", 2);
        let ingestor = DirectoryIngestor::new(&store, 2, &txt()).unwrap();
        let err = ingestor.ingest(&dir).await.unwrap_err();

        assert_eq!(
            err.committed,
            IngestStats {
                processed: 4,
                errors: 1
            }
        );
        assert_eq!(err.path, dir.join("b.txt"));
        assert_eq!(store.len(), 4);
        assert!(store.find_by_key("5").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ingest_root_walks_prefixed_dirs() {
        let tmp = TempDir::new().unwrap();
        for (name, line) in [("ruc0", "10|A|1"), ("ruc1", "11|B|2"), ("other", "12|C|3")] {
            let dir = tmp.path().join(name);
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join("data.txt"), line).unwrap();
        }

        let store = InMemoryStore::new();
        let ingestor = DirectoryIngestor::new(&store, 1000, &txt()).unwrap();
        let stats = ingestor.ingest_root(tmp.path(), "ruc").await.unwrap();
        assert_eq!(stats.processed, 2);
        assert_eq!(stats.errors, 0);
        assert_eq!(
            store.count_by_source().await.unwrap(),
            vec![("ruc0".to_string(), 1), ("ruc1".to_string(), 1)]
        );
    }
}
