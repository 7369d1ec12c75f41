//! Wire shapes of the PERO OCR REST API.
//!
//! Every endpoint gets a typed body so a missing or mistyped field surfaces as
//! an [`OcrBatchError::Decode`] instead of a panic deep in the poll loop.

use crate::error::OcrBatchError;
use crate::model::{Artifact, EngineDescriptor};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

pub const OP_CREATE: &str = "post_processing_request";
pub const OP_UPLOAD: &str = "upload_image";
pub const OP_STATUS: &str = "request_status";
pub const OP_DOWNLOAD: &str = "download_results";
pub const OP_CANCEL: &str = "cancel_request";
pub const OP_ENGINES: &str = "get_engines";

/// `status` value of a successful JSON answer.
pub const STATUS_SUCCESS: &str = "success";

// ── Paths ────────────────────────────────────────────────────────────────

/// Path segments relative to the configured endpoint.
///
/// Segments are kept apart so the transport can percent-encode each one;
/// keys are file names and may contain `#`, `?` or `%`.
pub fn create_path() -> Vec<String> {
    vec![OP_CREATE.to_string()]
}

pub fn upload_path(request_id: &str, key: &str) -> Vec<String> {
    vec![OP_UPLOAD.to_string(), request_id.to_string(), key.to_string()]
}

pub fn status_path(request_id: &str) -> Vec<String> {
    vec![OP_STATUS.to_string(), request_id.to_string()]
}

pub fn download_path(request_id: &str, key: &str, artifact: Artifact) -> Vec<String> {
    vec![
        OP_DOWNLOAD.to_string(),
        request_id.to_string(),
        key.to_string(),
        artifact.api_format().to_string(),
    ]
}

pub fn cancel_path(request_id: &str) -> Vec<String> {
    vec![OP_CANCEL.to_string(), request_id.to_string()]
}

pub fn engines_path() -> Vec<String> {
    vec![OP_ENGINES.to_string()]
}

// ── Bodies ───────────────────────────────────────────────────────────────

/// Body of `post_processing_request`.
///
/// Every key maps to `null`; the service fills the slots as uploads arrive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessingRequestBody {
    pub engine: i64,
    pub images: BTreeMap<String, Option<String>>,
}

impl ProcessingRequestBody {
    pub fn new<'a>(engine: i64, keys: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            engine,
            images: keys.into_iter().map(|k| (k.to_string(), None)).collect(),
        }
    }
}

/// Answer of `post_processing_request`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessingRequestResponse {
    pub status: String,
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Answer of `request_status`.
#[derive(Debug, Clone, Deserialize)]
pub struct RequestStatusResponse {
    pub request_status: HashMap<String, ImageStatusEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageStatusEntry {
    pub state: String,
    #[serde(default)]
    pub quality: Option<f64>,
}

/// Answer of `get_engines`.
#[derive(Debug, Clone, Deserialize)]
pub struct EnginesResponse {
    pub status: String,
    #[serde(default)]
    pub engines: BTreeMap<String, EngineEntry>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineEntry {
    pub id: i64,
    #[serde(default)]
    pub description: Option<String>,
}

impl EnginesResponse {
    /// Flatten the name-keyed map into descriptors, ordered by id.
    pub fn into_descriptors(self) -> Vec<EngineDescriptor> {
        let mut engines: Vec<EngineDescriptor> = self
            .engines
            .into_iter()
            .map(|(name, entry)| EngineDescriptor {
                id: entry.id,
                name,
                description: entry.description.filter(|d| !d.trim().is_empty()),
            })
            .collect();
        engines.sort_by(|a, b| a.id.cmp(&b.id).then_with(|| a.name.cmp(&b.name)));
        engines
    }
}

/// Error body some endpoints attach to non-200 answers.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
}

/// Best-effort `message` from an error body; `None` if it is not JSON.
pub fn error_message(body: &[u8]) -> Option<String> {
    serde_json::from_slice::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message)
}

/// Decode a JSON body, mapping failure to [`OcrBatchError::Decode`].
pub fn decode_json<T: serde::de::DeserializeOwned>(
    operation: &'static str,
    body: &[u8],
) -> Result<T, OcrBatchError> {
    serde_json::from_slice(body).map_err(|e| OcrBatchError::decode(operation, e))
}
