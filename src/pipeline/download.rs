//! Result download: fetch the text and ALTO artifacts for every processed key.
//!
//! Each artifact is written next to its source image as `<stem>.txt` /
//! `<stem>.xml`, overwriting a previous run's output. Writes go to a `.tmp`
//! sibling first and are renamed into place, so an interrupted run never
//! leaves a truncated result behind.
//!
//! One missing or unwritable artifact is recorded and the next one is still
//! attempted. Keys are downloaded `download_concurrency` at a time.

use crate::api::{self, OP_DOWNLOAD};
use crate::config::BatchConfig;
use crate::error::{FileError, OcrBatchError};
use crate::model::{Artifact, ImageAsset};
use crate::output::{DownloadSummary, SavedArtifact};
use crate::progress::Stage;
use crate::transport::{ApiRequest, OcrTransport};
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Download every artifact of every asset in `assets` from `request_id`.
///
/// # Returns
/// Saved files and per-file failures. The only error is
/// [`OcrBatchError::Cancelled`].
pub async fn download_results(
    transport: &dyn OcrTransport,
    config: &BatchConfig,
    request_id: &str,
    assets: &[ImageAsset],
) -> Result<DownloadSummary, OcrBatchError> {
    if let Some(ref cb) = config.progress_callback {
        cb.on_stage_start(Stage::Download, assets.len());
    }

    let results: Vec<Result<(Vec<SavedArtifact>, Vec<FileError>), OcrBatchError>> =
        stream::iter(assets.iter().map(|asset| async move {
            config.check_cancelled()?;
            Ok::<_, OcrBatchError>(download_asset(transport, config, request_id, asset).await)
        }))
        .buffer_unordered(config.download_concurrency.max(1))
        .collect()
        .await;

    let mut summary = DownloadSummary::default();
    let mut complete = 0usize;
    let mut incomplete = 0usize;
    for result in results {
        let (saved, failures) = result?;
        if failures.is_empty() {
            complete += 1;
        } else {
            incomplete += 1;
        }
        summary.saved.extend(saved);
        summary.failures.extend(failures);
    }
    summary
        .saved
        .sort_by(|a, b| a.source.cmp(&b.source).then(a.path.cmp(&b.path)));

    info!(
        "Downloaded {} files for {} images ({} failed)",
        summary.saved.len(),
        assets.len(),
        summary.failures.len()
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_stage_complete(Stage::Download, complete, incomplete);
    }
    Ok(summary)
}

/// Both artifacts of one asset. Never fails as a whole.
async fn download_asset(
    transport: &dyn OcrTransport,
    config: &BatchConfig,
    request_id: &str,
    asset: &ImageAsset,
) -> (Vec<SavedArtifact>, Vec<FileError>) {
    let mut saved = Vec::with_capacity(Artifact::ALL.len());
    let mut failures = Vec::new();

    for artifact in Artifact::ALL {
        match download_artifact(transport, config, request_id, asset, artifact).await {
            Ok(path) => {
                info!("OK {}: {}", artifact, path.display());
                saved.push(SavedArtifact {
                    source: asset.path.clone(),
                    artifact,
                    path,
                });
            }
            Err(e) => {
                warn!("{}", e);
                failures.push(e);
            }
        }
    }

    if let Some(ref cb) = config.progress_callback {
        match failures.first() {
            None => cb.on_item_complete(Stage::Download, &asset.path),
            Some(e) => cb.on_item_error(Stage::Download, &asset.path, &e.to_string()),
        }
    }
    (saved, failures)
}

async fn download_artifact(
    transport: &dyn OcrTransport,
    config: &BatchConfig,
    request_id: &str,
    asset: &ImageAsset,
    artifact: Artifact,
) -> Result<PathBuf, FileError> {
    let request = ApiRequest::get(
        api::download_path(request_id, &asset.key, artifact),
        config.request_timeout(),
    );
    let response = transport
        .send(request)
        .await
        .map_err(|e| FileError::DownloadFailed {
            path: asset.path.clone(),
            artifact: artifact.to_string(),
            detail: format!("{OP_DOWNLOAD}: {e}"),
        })?;

    if !response.is_ok() {
        return Err(FileError::ArtifactUnavailable {
            path: asset.path.clone(),
            artifact: artifact.to_string(),
            status: response.status,
        });
    }

    let out = artifact.output_path(&asset.path);
    write_atomic(&out, &response.body)
        .await
        .map_err(|e| FileError::WriteFailed {
            path: asset.path.clone(),
            detail: format!("{}: {e}", out.display()),
        })?;
    debug!("Wrote {} bytes to {}", response.body.len(), out.display());
    Ok(out)
}

/// Write to `<path>.tmp`, then rename over `path`.
async fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let ext = path
        .extension()
        .map(|e| format!("{}.tmp", e.to_string_lossy()))
        .unwrap_or_else(|| "tmp".to_string());
    let tmp_path = path.with_extension(ext);

    tokio::fs::write(&tmp_path, bytes).await?;
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(e);
    }
    Ok(())
}
