//! Archive download with a fixed retry budget and integrity validation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::error::FetchError;
use crate::models::DownloadTarget;

use super::http::HttpSource;

/// A downloaded archive that opened successfully as a zip container.
#[derive(Debug, Clone)]
pub struct DownloadedArchive {
    pub path: PathBuf,
    pub sha256: String,
    pub bytes: u64,
}

/// Download `target` into `dest_dir`, retrying up to `max_attempts` times
/// with a fixed `delay` between attempts.
///
/// Every failed attempt counts: transport errors, non-2xx statuses, write
/// errors, and payloads that are not valid archives (which are deleted
/// before the next attempt).
pub async fn download_with_retry(
    http: &dyn HttpSource,
    target: &DownloadTarget,
    dest_dir: &Path,
    max_attempts: u32,
    delay: Duration,
) -> Result<DownloadedArchive, FetchError> {
    let output = dest_dir.join(&target.expected_file_name);
    let mut last_err = None;

    for attempt in 1..=max_attempts {
        if attempt > 1 {
            tokio::time::sleep(delay).await;
        }

        info!(
            source = %target.source_id,
            url = %target.url,
            attempt,
            max_attempts,
            "downloading {}",
            target.expected_file_name
        );

        match download_once(http, target, &output).await {
            Ok(archive) => {
                info!(
                    source = %target.source_id,
                    bytes = archive.bytes,
                    sha256 = %archive.sha256,
                    "downloaded and verified {}",
                    target.expected_file_name
                );
                return Ok(archive);
            }
            Err(e) => {
                warn!(
                    source = %target.source_id,
                    attempt,
                    max_attempts,
                    error = %e,
                    "download attempt failed"
                );
                if !e.is_retryable() {
                    return Err(e);
                }
                last_err = Some(e);
            }
        }
    }

    let last = last_err.unwrap_or_else(|| FetchError::Transport {
        url: target.url.clone(),
        message: "no attempts made".to_string(),
    });
    warn!(
        source = %target.source_id,
        attempts = max_attempts,
        "giving up on {}",
        target.expected_file_name
    );
    Err(FetchError::Exhausted {
        source_id: target.source_id.clone(),
        attempts: max_attempts,
        last: Box::new(last),
    })
}

async fn download_once(
    http: &dyn HttpSource,
    target: &DownloadTarget,
    output: &Path,
) -> Result<DownloadedArchive, FetchError> {
    let payload = http.get_bytes(&target.url).await?;

    if let Some(ct) = payload.content_type.as_deref() {
        if !ct.contains("zip") && !ct.contains("octet-stream") {
            warn!(
                source = %target.source_id,
                content_type = ct,
                "response is not declared as a zip, validating anyway"
            );
        }
    }

    let sha256 = format!("{:x}", Sha256::digest(&payload.bytes));
    let bytes = payload.bytes.len() as u64;

    tokio::fs::write(output, &payload.bytes)
        .await
        .map_err(|e| FetchError::io(output, e))?;

    if let Err(message) = validate_archive(output).await {
        if let Err(e) = tokio::fs::remove_file(output).await {
            warn!(file = %output.display(), error = %e, "could not delete invalid archive");
        }
        return Err(FetchError::Integrity {
            source_id: target.source_id.clone(),
            message,
        });
    }

    Ok(DownloadedArchive {
        path: output.to_path_buf(),
        sha256,
        bytes,
    })
}

/// Open the file as a zip container without extracting it.
pub async fn validate_archive(path: &Path) -> Result<(), String> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let file = std::fs::File::open(&path).map_err(|e| e.to_string())?;
        zip::ZipArchive::new(file)
            .map(|_| ())
            .map_err(|e| e.to_string())
    })
    .await
    .map_err(|e| e.to_string())?
}
