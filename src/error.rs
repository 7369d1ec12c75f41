//! Error types for the pero-batch library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`OcrBatchError`]: **fatal**, the remote request cannot be created or
//!   can no longer be trusted (service unreachable during submission, request
//!   id unknown, undecodable status). Returned as `Err(OcrBatchError)` from the
//!   top-level entry points in [`crate::batch`] and [`crate::admin`].
//!
//! * [`FileError`]: **non-fatal**, a single image failed (unreadable TIFF,
//!   rejected upload, missing artifact) but every other image is fine. Stored
//!   inside the stage summaries in [`crate::output`] so one bad scan never
//!   blocks a directory of thousands.
//!
//! Only the binary turns errors into process exit codes, through
//! [`OcrBatchError::exit_code`].

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Failure of the transport itself: no HTTP status was received.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The call exceeded its timeout.
    #[error("timed out after {secs}s")]
    Timeout { secs: u64 },

    /// Connection refused, DNS failure, TLS error, body stream broken, …
    #[error("connection failed: {detail}")]
    Connection { detail: String },

    /// The configured endpoint cannot be combined with the request path.
    #[error("invalid url: {detail}")]
    InvalidUrl { detail: String },
}

/// All fatal errors returned by the pero-batch library.
///
/// Per-file failures use [`FileError`] and are stored in the stage summaries
/// rather than propagated here.
#[derive(Debug, Error)]
pub enum OcrBatchError {
    // ── Local input errors ────────────────────────────────────────────────
    /// The configuration is incomplete or inconsistent.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The input path does not exist or is not a directory.
    #[error("'{path}' is not a directory or does not exist")]
    NotADirectory { path: PathBuf },

    /// Walking the input directory failed.
    #[error("Error while examining '{path}': {source}\nCheck permissions and contents of this directory.")]
    ScanFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The directory holds no image the service accepts.
    #[error("No images (.tif, .tiff, .jpg, .jpeg, .png, .jp2, .jp2k) found in '{path}'")]
    NoImages { path: PathBuf },

    // ── Key errors ────────────────────────────────────────────────────────
    /// The file name normalises to an empty key.
    #[error("File name of '{path}' yields an empty service key")]
    EmptyKey { path: PathBuf },

    /// Two files normalise to the same key; the service could not tell them apart.
    #[error("Key collision: '{first}' and '{second}' both map to key '{key}'\nRename one of them and retry.")]
    KeyCollision {
        key: String,
        first: PathBuf,
        second: PathBuf,
    },

    /// Two files would write their results to the same output path.
    #[error("Output collision: '{first}' and '{second}' would both write '{output}'\nRename one of them and retry.")]
    OutputCollision {
        output: PathBuf,
        first: PathBuf,
        second: PathBuf,
    },

    // ── Remote errors ─────────────────────────────────────────────────────
    /// The service could not be reached for a call the batch depends on.
    #[error("Transport error during {operation}: {source}")]
    Transport {
        operation: &'static str,
        #[source]
        source: TransportError,
    },

    /// Submission referenced an engine the service does not know (HTTP 404).
    #[error("OCR engine {engine_id} not found\nList available engines with --engines.")]
    EngineNotFound { engine_id: i64 },

    /// The service rejected the submission body (HTTP 422).
    #[error("Submission rejected by the service (bad request data): {message}")]
    InvalidSubmission { message: String },

    /// HTTP 200 but the body reports a non-success status.
    #[error("{operation}: service answered status '{status}'{}", .message.as_deref().map(|m| format!(": {m}")).unwrap_or_default())]
    ServiceRejected {
        operation: &'static str,
        status: String,
        message: Option<String>,
    },

    /// The request id is unknown to the service (HTTP 404).
    #[error("Request '{request_id}' does not exist")]
    RequestNotFound { request_id: String },

    /// The request id belongs to another API key (HTTP 401/403).
    #[error("Request '{request_id}' does not belong to this API key")]
    RequestNotOwned { request_id: String },

    /// An HTTP status this client has no mapping for.
    #[error("{operation}: server responded {status} (not handled by this client)")]
    UnexpectedStatus { operation: &'static str, status: u16 },

    /// A response body was not the JSON shape the endpoint promises.
    #[error("{operation}: could not decode response: {detail}")]
    Decode {
        operation: &'static str,
        detail: String,
    },

    // ── Polling errors ────────────────────────────────────────────────────
    /// The configured attempt or duration ceiling was reached before completion.
    #[error("OCR not finished after {attempts} status checks ({elapsed_secs}s)")]
    PollLimitExceeded { attempts: u32, elapsed_secs: u64 },

    /// The run was cancelled through its [`crate::cancel::CancelToken`].
    #[error("Cancelled")]
    Cancelled,

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl OcrBatchError {
    /// Process exit code for this error category.
    ///
    /// Scripts branch on these, so the numbers are part of the CLI contract.
    pub fn exit_code(&self) -> u8 {
        match self {
            OcrBatchError::Transport { .. } => 1,
            OcrBatchError::NotADirectory { .. } => 2,
            OcrBatchError::ScanFailed { .. } | OcrBatchError::NoImages { .. } => 3,
            OcrBatchError::Config(_) => 4,
            OcrBatchError::ServiceRejected { .. } => 5,
            OcrBatchError::EngineNotFound { .. } | OcrBatchError::InvalidSubmission { .. } => 6,
            OcrBatchError::Decode { .. } => 7,
            OcrBatchError::RequestNotFound { .. } => 8,
            OcrBatchError::RequestNotOwned { .. } => 9,
            OcrBatchError::UnexpectedStatus { .. } => 10,
            OcrBatchError::EmptyKey { .. }
            | OcrBatchError::KeyCollision { .. }
            | OcrBatchError::OutputCollision { .. } => 11,
            OcrBatchError::PollLimitExceeded { .. } => 13,
            OcrBatchError::Internal(_) => 14,
            OcrBatchError::Cancelled => 130,
        }
    }

    pub(crate) fn transport(operation: &'static str, source: TransportError) -> Self {
        OcrBatchError::Transport { operation, source }
    }

    pub(crate) fn decode(operation: &'static str, err: impl std::fmt::Display) -> Self {
        OcrBatchError::Decode {
            operation,
            detail: err.to_string(),
        }
    }
}

/// Exit code the CLI uses when the batch finished but some files failed.
pub const EXIT_PARTIAL_FAILURE: u8 = 12;

/// A non-fatal error for a single image.
///
/// The batch continues; the image is excluded from later stages.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum FileError {
    /// TIFF could not be decoded or re-encoded as JPEG.
    #[error("{path}: transcoding to JPEG failed: {detail}")]
    Transcode { path: PathBuf, detail: String },

    /// The file to upload could not be read.
    #[error("{path}: cannot read file: {detail}")]
    ReadFailed { path: PathBuf, detail: String },

    /// Upload never got an HTTP answer.
    #[error("{path}: upload failed: {detail}")]
    UploadFailed { path: PathBuf, detail: String },

    /// Upload answered with a non-200 status.
    #[error("{path}: upload rejected with status {status}{}", .message.as_deref().map(|m| format!(": {m}")).unwrap_or_default())]
    UploadRejected {
        path: PathBuf,
        status: u16,
        message: Option<String>,
    },

    /// The service reached a terminal failure state for this image.
    #[error("{path}: OCR ended in state {state} (key '{key}')")]
    OcrFailed {
        path: PathBuf,
        key: String,
        state: String,
    },

    /// A result artifact answered with a non-200 status.
    #[error("{path}: {artifact} result unavailable (status {status})")]
    ArtifactUnavailable {
        path: PathBuf,
        artifact: String,
        status: u16,
    },

    /// A result artifact download never got an HTTP answer.
    #[error("{path}: {artifact} download failed: {detail}")]
    DownloadFailed {
        path: PathBuf,
        artifact: String,
        detail: String,
    },

    /// The downloaded artifact could not be written to disk.
    #[error("{path}: cannot write result: {detail}")]
    WriteFailed { path: PathBuf, detail: String },
}

impl FileError {
    /// The source image this failure belongs to.
    pub fn path(&self) -> &Path {
        match self {
            FileError::Transcode { path, .. }
            | FileError::ReadFailed { path, .. }
            | FileError::UploadFailed { path, .. }
            | FileError::UploadRejected { path, .. }
            | FileError::OcrFailed { path, .. }
            | FileError::ArtifactUnavailable { path, .. }
            | FileError::DownloadFailed { path, .. }
            | FileError::WriteFailed { path, .. } => path,
        }
    }
}
