//! Upload: send each image into the request under its key.
//!
//! Files go one at a time in discovery order. Each file is isolated: an
//! unreadable scan, a failed transcode or a rejected upload is recorded as a
//! [`FileError`] and the loop moves on, so one oversized page cannot hold back
//! the rest of the directory.

use crate::api::{self, OP_UPLOAD};
use crate::config::BatchConfig;
use crate::error::{FileError, OcrBatchError};
use crate::model::{BatchRequest, ImageAsset};
use crate::output::UploadSummary;
use crate::pipeline::transcode::{prepare_upload, PreparedUpload};
use crate::progress::Stage;
use crate::transport::{ApiRequest, FilePart, OcrTransport, RequestBody};
use tracing::{info, warn};

/// Multipart field name the service reads the image from.
pub const UPLOAD_FIELD: &str = "file";

/// Upload every asset into `request`.
///
/// # Returns
/// The assets the service accepted and the per-file failures. The only error
/// is [`OcrBatchError::Cancelled`].
pub async fn upload_assets(
    transport: &dyn OcrTransport,
    config: &BatchConfig,
    request: &BatchRequest,
    assets: &[ImageAsset],
) -> Result<UploadSummary, OcrBatchError> {
    let mut summary = UploadSummary::default();
    if let Some(ref cb) = config.progress_callback {
        cb.on_stage_start(Stage::Upload, assets.len());
    }

    for asset in assets {
        config.check_cancelled()?;

        match upload_one(transport, config, &request.request_id, asset).await {
            Ok(()) => {
                info!("OK upload: {}", asset.path.display());
                if let Some(ref cb) = config.progress_callback {
                    cb.on_item_complete(Stage::Upload, &asset.path);
                }
                summary.uploaded.push(asset.clone());
            }
            Err(e) => {
                warn!("{}", e);
                if let Some(ref cb) = config.progress_callback {
                    cb.on_item_error(Stage::Upload, &asset.path, &e.to_string());
                }
                summary.failures.push(e);
            }
        }
    }

    info!(
        "Uploaded {}/{} images ({} failed)",
        summary.uploaded.len(),
        assets.len(),
        summary.failures.len()
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_stage_complete(Stage::Upload, summary.uploaded.len(), summary.failures.len());
    }
    Ok(summary)
}

/// Transcode if needed, read, send. The temp file (if any) is removed when
/// `prepared` goes out of scope at the end of this function.
async fn upload_one(
    transport: &dyn OcrTransport,
    config: &BatchConfig,
    request_id: &str,
    asset: &ImageAsset,
) -> Result<(), FileError> {
    let prepared: PreparedUpload = prepare_upload(&asset.path).await?;

    let bytes = tokio::fs::read(prepared.path())
        .await
        .map_err(|e| FileError::ReadFailed {
            path: asset.path.clone(),
            detail: e.to_string(),
        })?;

    let part = FilePart {
        field: UPLOAD_FIELD.to_string(),
        file_name: prepared.upload_file_name(),
        mime_type: prepared.mime_type().to_string(),
        bytes,
    };
    let request = ApiRequest::post(
        api::upload_path(request_id, &asset.key),
        RequestBody::Multipart(part),
        config.request_timeout(),
    );

    let result = transport.send(request).await;
    drop(prepared);

    let response = result.map_err(|e| FileError::UploadFailed {
        path: asset.path.clone(),
        detail: format!("{OP_UPLOAD}: {e}"),
    })?;

    if !response.is_ok() {
        return Err(FileError::UploadRejected {
            path: asset.path.clone(),
            status: response.status,
            message: api::error_message(&response.body),
        });
    }
    Ok(())
}
