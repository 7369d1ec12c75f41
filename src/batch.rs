//! Batch entry points: chain the pipeline stages over one directory.
//!
//! [`run_batch`] is the full lifecycle. [`download_only`] re-fetches the
//! results of a request created earlier, for example after the client was
//! interrupted while polling.

use crate::config::BatchConfig;
use crate::error::OcrBatchError;
use crate::output::BatchReport;
use crate::pipeline::{download, poll, scan, submit, upload};
use crate::transport::resolve_transport;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// OCR every image under `dir` and write the results beside them.
///
/// # Returns
/// `Ok(BatchReport)` once the request is fully processed, even if some files
/// failed (check [`BatchReport::has_failures`]).
///
/// # Errors
/// Returns `Err(OcrBatchError)` only when the run as a whole cannot continue:
/// - nothing to scan, or a key collision
/// - request creation failed
/// - the request became unusable while polling
/// - the poll ceiling was reached, or the run was cancelled
pub async fn run_batch(dir: &Path, config: &BatchConfig) -> Result<BatchReport, OcrBatchError> {
    let started = Instant::now();
    info!("Starting batch in {}", dir.display());
    debug!("{:?}", config);

    // ── Step 1: Discover images ──────────────────────────────────────────
    let assets = scan::discover_images(dir).await?;

    // ── Step 2: Create the remote request ────────────────────────────────
    let transport = resolve_transport(config)?;
    config.check_cancelled()?;
    let request = submit::create_request(transport.as_ref(), config, &assets).await?;

    if config.upload_delay_ms > 0 {
        poll::pause(config, Duration::from_millis(config.upload_delay_ms)).await?;
    }

    // ── Step 3: Upload ───────────────────────────────────────────────────
    let uploads = upload::upload_assets(transport.as_ref(), config, &request, &assets).await?;

    // ── Step 4: Wait for OCR ─────────────────────────────────────────────
    let outcome = poll::wait_for_completion(
        transport.as_ref(),
        config,
        &request.request_id,
        &uploads.uploaded,
    )
    .await?;

    // ── Step 5: Download results ─────────────────────────────────────────
    let downloads = download::download_results(
        transport.as_ref(),
        config,
        &request.request_id,
        &outcome.processed,
    )
    .await?;

    let mut failures = uploads.failures;
    failures.extend(outcome.failures);
    failures.extend(downloads.failures);

    let report = BatchReport {
        request_id: request.request_id,
        discovered: assets.len(),
        uploaded: uploads.uploaded.len(),
        processed: outcome.processed.len(),
        artifacts_saved: downloads.saved.len(),
        poll_attempts: outcome.attempts,
        failures,
        total_duration_ms: started.elapsed().as_millis() as u64,
    };

    info!(
        "Batch {} complete: {}/{} processed, {} files saved, {} failures, {}ms",
        report.request_id,
        report.processed,
        report.discovered,
        report.artifacts_saved,
        report.failures.len(),
        report.total_duration_ms
    );
    Ok(report)
}

/// Download text and ALTO for every image under `dir` from an existing request.
///
/// No status check is made; keys the service has no result for are reported
/// as [`crate::error::FileError::ArtifactUnavailable`].
pub async fn download_only(
    dir: &Path,
    request_id: &str,
    config: &BatchConfig,
) -> Result<BatchReport, OcrBatchError> {
    let started = Instant::now();
    info!("Pulling results of {} into {}", request_id, dir.display());

    let assets = scan::discover_images(dir).await?;
    let transport = resolve_transport(config)?;
    let downloads =
        download::download_results(transport.as_ref(), config, request_id, &assets).await?;

    Ok(BatchReport {
        request_id: request_id.to_string(),
        discovered: assets.len(),
        artifacts_saved: downloads.saved.len(),
        failures: downloads.failures,
        total_duration_ms: started.elapsed().as_millis() as u64,
        ..BatchReport::default()
    })
}
