//! Status polling: wait until every uploaded key is terminal.
//!
//! One `request_status` call returns the state of every key in the request,
//! so each cycle costs a single round trip regardless of batch size. A cycle
//! classifies each uploaded key as processed, failed (terminal error state)
//! or pending; the batch is complete when nothing is pending.
//!
//! ## Fatal vs. not-yet-done
//!
//! "Still processing" is retried on the [`PollSchedule`]; everything that a
//! retry cannot fix stops the loop at once:
//!
//! | Answer | Result |
//! |--------|--------|
//! | 404 | [`OcrBatchError::RequestNotFound`] |
//! | 401 / 403 | [`OcrBatchError::RequestNotOwned`] |
//! | other non-200 | [`OcrBatchError::UnexpectedStatus`] |
//! | bad JSON, key absent | [`OcrBatchError::Decode`] |
//! | no answer | [`OcrBatchError::Transport`] |
//!
//! ## Ceilings
//!
//! `max_poll_attempts` and `max_poll_duration_secs` bound the loop; hitting
//! either yields [`OcrBatchError::PollLimitExceeded`]. The delay between
//! cycles is raced against the run's cancel token.

use crate::api::{self, RequestStatusResponse, OP_STATUS};
use crate::config::BatchConfig;
use crate::error::{FileError, OcrBatchError};
use crate::model::{ImageAsset, ImageState};
use crate::output::{PollCycle, PollOutcome};
use crate::progress::Stage;
use crate::transport::{ApiRequest, OcrTransport};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, info, warn};

// ── Schedules ────────────────────────────────────────────────────────────

/// Delay strategy between status checks.
pub trait PollSchedule: Send + Sync {
    /// Delay after the check numbered `attempt` (0-based) came back incomplete.
    fn delay(&self, attempt: u32) -> Duration;

    /// Short human-readable form for logs.
    fn describe(&self) -> String;
}

/// The same delay after every check.
#[derive(Debug, Clone, Copy)]
pub struct FixedInterval {
    interval: Duration,
}

impl FixedInterval {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl PollSchedule for FixedInterval {
    fn delay(&self, _attempt: u32) -> Duration {
        self.interval
    }

    fn describe(&self) -> String {
        format!("fixed {}s", self.interval.as_secs())
    }
}

/// `initial * 2^attempt`, capped at `max`.
#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoff {
    initial: Duration,
    max: Duration,
}

impl ExponentialBackoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
        }
    }
}

impl PollSchedule for ExponentialBackoff {
    fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(31));
        self.initial.saturating_mul(factor).min(self.max)
    }

    fn describe(&self) -> String {
        format!(
            "exponential {}s..{}s",
            self.initial.as_secs(),
            self.max.as_secs()
        )
    }
}

// ── Polling ──────────────────────────────────────────────────────────────

/// Poll `request_id` until every asset is processed or terminally failed.
///
/// # Returns
/// The processed assets (to download) and a [`FileError::OcrFailed`] for each
/// asset that ended in a failure state.
pub async fn wait_for_completion(
    transport: &dyn OcrTransport,
    config: &BatchConfig,
    request_id: &str,
    assets: &[ImageAsset],
) -> Result<PollOutcome, OcrBatchError> {
    if assets.is_empty() {
        return Ok(PollOutcome::default());
    }
    let started = Instant::now();
    let mut attempt: u32 = 0;

    if let Some(ref cb) = config.progress_callback {
        cb.on_stage_start(Stage::Poll, assets.len());
    }

    loop {
        config.check_cancelled()?;

        let status = fetch_status(transport, config, request_id).await?;
        let cycle = evaluate(&status, assets)?;
        attempt += 1;

        if let Some(ref cb) = config.progress_callback {
            cb.on_poll(attempt, cycle.done(), cycle.total());
        }

        if cycle.is_complete() {
            info!(
                "OCR done: {}/{} processed, {} failed (after {} checks)",
                cycle.processed.len(),
                cycle.total(),
                cycle.failed.len(),
                attempt
            );
            if let Some(ref cb) = config.progress_callback {
                cb.on_stage_complete(Stage::Poll, cycle.processed.len(), cycle.failed.len());
            }
            return Ok(into_outcome(cycle, attempt));
        }

        if config.max_poll_attempts.is_some_and(|max| attempt >= max) {
            return Err(limit_exceeded(attempt, started));
        }
        let delay = config.poll_schedule.delay(attempt - 1);
        if let Some(max) = config.max_poll_duration() {
            if started.elapsed() + delay > max {
                return Err(limit_exceeded(attempt, started));
            }
        }

        info!(
            "OCR not done yet ({} / {}), trying again in {}s...",
            cycle.done(),
            cycle.total(),
            delay.as_secs()
        );
        pause(config, delay).await?;
    }
}

/// One `request_status` call, mapped to a typed answer or a fatal error.
pub async fn fetch_status(
    transport: &dyn OcrTransport,
    config: &BatchConfig,
    request_id: &str,
) -> Result<RequestStatusResponse, OcrBatchError> {
    let request = ApiRequest::get(api::status_path(request_id), config.status_timeout());
    let response = transport
        .send(request)
        .await
        .map_err(|e| OcrBatchError::transport(OP_STATUS, e))?;

    match response.status {
        200 => api::decode_json(OP_STATUS, &response.body),
        404 => Err(OcrBatchError::RequestNotFound {
            request_id: request_id.to_string(),
        }),
        401 | 403 => Err(OcrBatchError::RequestNotOwned {
            request_id: request_id.to_string(),
        }),
        status => Err(OcrBatchError::UnexpectedStatus {
            operation: OP_STATUS,
            status,
        }),
    }
}

/// Classify every asset against one status answer.
///
/// A key that the answer does not mention is a decode error: the service
/// lost track of it and waiting cannot bring it back.
pub fn evaluate(
    status: &RequestStatusResponse,
    assets: &[ImageAsset],
) -> Result<PollCycle, OcrBatchError> {
    let mut cycle = PollCycle::default();
    for asset in assets {
        let entry = status.request_status.get(&asset.key).ok_or_else(|| {
            OcrBatchError::decode(
                OP_STATUS,
                format!("no state reported for key '{}'", asset.key),
            )
        })?;
        let state = ImageState::parse(&entry.state);
        if state.is_processed() {
            cycle.processed.push(asset.clone());
        } else if state.is_terminal_failure() {
            cycle.failed.push((asset.clone(), state));
        } else {
            if let ImageState::Other(ref raw) = state {
                debug!("Unknown state '{}' for {}; still waiting", raw, asset.key);
            }
            cycle.pending.push((asset.clone(), state));
        }
    }
    Ok(cycle)
}

fn into_outcome(cycle: PollCycle, attempts: u32) -> PollOutcome {
    let failures = cycle
        .failed
        .into_iter()
        .map(|(asset, state)| {
            warn!("OCR failed for {} (state {})", asset.path.display(), state);
            FileError::OcrFailed {
                path: asset.path,
                key: asset.key,
                state: state.to_string(),
            }
        })
        .collect();
    PollOutcome {
        processed: cycle.processed,
        failures,
        attempts,
    }
}

fn limit_exceeded(attempts: u32, started: Instant) -> OcrBatchError {
    OcrBatchError::PollLimitExceeded {
        attempts,
        elapsed_secs: started.elapsed().as_secs(),
    }
}

/// Sleep for `delay`, waking early with `Cancelled` if the run is cancelled.
pub(crate) async fn pause(config: &BatchConfig, delay: Duration) -> Result<(), OcrBatchError> {
    match config.cancel {
        Some(ref token) => {
            tokio::select! {
                _ = sleep(delay) => Ok(()),
                _ = token.cancelled() => Err(OcrBatchError::Cancelled),
            }
        }
        None => {
            sleep(delay).await;
            Ok(())
        }
    }
}
