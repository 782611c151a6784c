//! Archive extraction into a per-source directory.
//!
//! The target directory is emptied first, so its contents always mirror the
//! latest archive and files dropped by the publisher are not ingested again.
//! Unpacking runs on the blocking pool.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::FetchError;

/// Replace the contents of `target_dir` with every entry of `archive`.
///
/// The archive is opened before anything is removed, so an unreadable
/// archive leaves the previous extraction in place. Entries whose paths
/// would escape `target_dir` are rejected by the zip reader.
pub async fn extract_archive(archive: &Path, target_dir: &Path) -> Result<PathBuf, FetchError> {
    let archive = archive.to_path_buf();
    let target = target_dir.to_path_buf();
    info!(archive = %archive.display(), target = %target.display(), "extracting");

    let joined = {
        let archive = archive.clone();
        let target = target.clone();
        tokio::task::spawn_blocking(move || -> Result<usize, FetchError> {
            let fail = |message: String| FetchError::Extraction {
                archive: archive.clone(),
                message,
            };
            let file = std::fs::File::open(&archive).map_err(|e| FetchError::io(&archive, e))?;
            let mut zip = zip::ZipArchive::new(file).map_err(|e| fail(e.to_string()))?;
            if target.exists() {
                std::fs::remove_dir_all(&target).map_err(|e| FetchError::io(&target, e))?;
            }
            std::fs::create_dir_all(&target).map_err(|e| FetchError::io(&target, e))?;
            let entries = zip.len();
            zip.extract(&target).map_err(|e| fail(e.to_string()))?;
            Ok(entries)
        })
        .await
    };

    let entries = joined.map_err(|e| FetchError::Extraction {
        archive: archive.clone(),
        message: e.to_string(),
    })??;

    info!(target = %target.display(), entries, "extracted");
    Ok(target)
}
