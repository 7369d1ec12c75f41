//! Stage summaries and the final batch report.

use crate::error::FileError;
use crate::model::{Artifact, ImageAsset, ImageState};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// What the uploader achieved.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadSummary {
    /// Assets the service accepted, in upload order. Paths are the originals,
    /// never the transcoded temp files.
    pub uploaded: Vec<ImageAsset>,
    pub failures: Vec<FileError>,
}

/// Classification of every uploaded key after one status check.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PollCycle {
    pub processed: Vec<ImageAsset>,
    pub failed: Vec<(ImageAsset, ImageState)>,
    pub pending: Vec<(ImageAsset, ImageState)>,
}

impl PollCycle {
    /// No key is waiting any more.
    pub fn is_complete(&self) -> bool {
        self.pending.is_empty()
    }

    /// Keys in a terminal state, successful or not.
    pub fn done(&self) -> usize {
        self.processed.len() + self.failed.len()
    }

    pub fn total(&self) -> usize {
        self.done() + self.pending.len()
    }
}

/// Final state of polling.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PollOutcome {
    /// Keys that reached `PROCESSED`; these are downloaded.
    pub processed: Vec<ImageAsset>,
    /// Keys that reached a terminal failure state.
    pub failures: Vec<FileError>,
    /// Status checks performed.
    pub attempts: u32,
}

/// One artifact written to disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedArtifact {
    pub source: PathBuf,
    pub artifact: Artifact,
    pub path: PathBuf,
}

/// What the downloader achieved.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DownloadSummary {
    pub saved: Vec<SavedArtifact>,
    pub failures: Vec<FileError>,
}

/// Outcome of a whole run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchReport {
    pub request_id: String,
    pub discovered: usize,
    pub uploaded: usize,
    pub processed: usize,
    pub artifacts_saved: usize,
    pub poll_attempts: u32,
    /// Every per-file failure from every stage.
    pub failures: Vec<FileError>,
    pub total_duration_ms: u64,
}

impl BatchReport {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}
