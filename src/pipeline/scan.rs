//! Directory scan: find the images to OCR and give each one its key.
//!
//! The walk is recursive and lexically ordered within each directory, so two
//! runs over the same tree submit images in the same order. Symlinked
//! directories are not followed.

use crate::error::OcrBatchError;
use crate::key::{checked_key, ensure_unique};
use crate::model::{Artifact, ImageAsset, ImageFormat};
use crate::pipeline::transcode::TEMP_PREFIX;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Scan `dir` and return every supported image as an [`ImageAsset`].
///
/// # Errors
/// - [`OcrBatchError::NotADirectory`] if `dir` is missing or a file
/// - [`OcrBatchError::ScanFailed`] if a directory cannot be read
/// - [`OcrBatchError::NoImages`] if nothing matched
/// - key and output errors from [`assets_from_paths`]
pub async fn discover_images(dir: &Path) -> Result<Vec<ImageAsset>, OcrBatchError> {
    let dir = dir.to_path_buf();
    tokio::task::spawn_blocking(move || discover_blocking(&dir))
        .await
        .map_err(|e| OcrBatchError::Internal(format!("scan task panicked: {e}")))?
}

fn discover_blocking(dir: &Path) -> Result<Vec<ImageAsset>, OcrBatchError> {
    if !dir.is_dir() {
        return Err(OcrBatchError::NotADirectory {
            path: dir.to_path_buf(),
        });
    }

    let mut files = Vec::new();
    walk(dir, &mut files)?;
    if files.is_empty() {
        return Err(OcrBatchError::NoImages {
            path: dir.to_path_buf(),
        });
    }

    let assets = assets_from_paths(files)?;
    info!("Found {} images in {}", assets.len(), dir.display());
    Ok(assets)
}

/// Turn image paths into assets, deriving and de-duplicating keys.
///
/// Paths with an unsupported extension are skipped. Two images that would
/// write the same result files (`p.tif` and `p.jpg`) are rejected.
pub fn assets_from_paths(
    paths: impl IntoIterator<Item = PathBuf>,
) -> Result<Vec<ImageAsset>, OcrBatchError> {
    let mut assets = Vec::new();
    for path in paths {
        let Some(format) = ImageFormat::from_path(&path) else {
            debug!("Skipping non-image {}", path.display());
            continue;
        };
        let key = checked_key(&path)?;
        assets.push(ImageAsset { path, key, format });
    }
    ensure_unique(&assets)?;
    ensure_distinct_outputs(&assets)?;
    Ok(assets)
}

fn ensure_distinct_outputs(assets: &[ImageAsset]) -> Result<(), OcrBatchError> {
    let mut seen: HashMap<PathBuf, &Path> = HashMap::with_capacity(assets.len());
    for asset in assets {
        let output = Artifact::Text.output_path(&asset.path);
        if let Some(first) = seen.get(&output) {
            return Err(OcrBatchError::OutputCollision {
                output,
                first: first.to_path_buf(),
                second: asset.path.clone(),
            });
        }
        seen.insert(output, asset.path.as_path());
    }
    Ok(())
}

fn walk(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), OcrBatchError> {
    let scan_err = |source| OcrBatchError::ScanFailed {
        path: dir.to_path_buf(),
        source,
    };

    let mut entries = std::fs::read_dir(dir)
        .map_err(scan_err)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(scan_err)?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        let file_type = entry.file_type().map_err(scan_err)?;
        if file_type.is_dir() {
            walk(&path, out)?;
            continue;
        }
        let is_file = file_type.is_file() || (file_type.is_symlink() && path.is_file());
        if !is_file || is_leftover_temp(&path) {
            continue;
        }
        if ImageFormat::from_path(&path).is_some() {
            out.push(path);
        }
    }
    Ok(())
}

/// Transcoded temp files from an interrupted run.
fn is_leftover_temp(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(TEMP_PREFIX))
}
