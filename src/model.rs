//! Domain types shared by every pipeline stage.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Image encodings the scanner picks up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageFormat {
    Tiff,
    Jpeg,
    Png,
    Jpeg2000,
}

impl ImageFormat {
    /// Detect the format from the file extension (case-insensitive).
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "tif" | "tiff" => Some(ImageFormat::Tiff),
            "jpg" | "jpeg" => Some(ImageFormat::Jpeg),
            "png" => Some(ImageFormat::Png),
            "jp2" | "jp2k" => Some(ImageFormat::Jpeg2000),
            _ => None,
        }
    }

    /// Whether the service accepts this encoding as-is.
    pub fn needs_transcode(self) -> bool {
        matches!(self, ImageFormat::Tiff)
    }

    /// MIME type sent with the multipart upload.
    pub fn mime_type(self) -> &'static str {
        match self {
            ImageFormat::Tiff => "image/tiff",
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg2000 => "image/jp2",
        }
    }
}

/// One local image taking part in a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageAsset {
    /// Path as discovered on disk.
    pub path: PathBuf,
    /// Service key, see [`crate::key::derive_key`].
    pub key: String,
    pub format: ImageFormat,
}

/// A remote processing request created by [`crate::pipeline::submit`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRequest {
    /// Opaque, server-assigned.
    pub request_id: String,
    pub engine_id: i64,
    /// Keys announced in the request body.
    pub keys: Vec<String>,
}

/// Per-image state as reported by `request_status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageState {
    Created,
    Waiting,
    Processing,
    /// Terminal success.
    Processed,
    Failed,
    Canceled,
    Expired,
    /// A state string this client does not know. Treated as not done.
    Other(String),
}

impl ImageState {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "CREATED" => ImageState::Created,
            "WAITING" => ImageState::Waiting,
            "PROCESSING" => ImageState::Processing,
            "PROCESSED" => ImageState::Processed,
            "FAILED" | "ERROR" => ImageState::Failed,
            "CANCELED" | "CANCELLED" => ImageState::Canceled,
            "EXPIRED" => ImageState::Expired,
            _ => ImageState::Other(raw.to_string()),
        }
    }

    pub fn is_processed(&self) -> bool {
        matches!(self, ImageState::Processed)
    }

    /// Terminal states other than success; polling can stop waiting for these.
    pub fn is_terminal_failure(&self) -> bool {
        matches!(
            self,
            ImageState::Failed | ImageState::Canceled | ImageState::Expired
        )
    }
}

impl fmt::Display for ImageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ImageState::Created => "CREATED",
            ImageState::Waiting => "WAITING",
            ImageState::Processing => "PROCESSING",
            ImageState::Processed => "PROCESSED",
            ImageState::Failed => "FAILED",
            ImageState::Canceled => "CANCELED",
            ImageState::Expired => "EXPIRED",
            ImageState::Other(raw) => raw,
        };
        f.write_str(s)
    }
}

/// An OCR engine offered by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineDescriptor {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
}

/// Result artifacts the service produces per image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Artifact {
    /// Plain text.
    Text,
    /// ALTO XML with page/line/word geometry.
    Alto,
}

impl Artifact {
    pub const ALL: [Artifact; 2] = [Artifact::Text, Artifact::Alto];

    /// Format segment in the `download_results` path.
    pub fn api_format(self) -> &'static str {
        match self {
            Artifact::Text => "txt",
            Artifact::Alto => "alto",
        }
    }

    /// Extension of the file written beside the source image.
    pub fn file_extension(self) -> &'static str {
        match self {
            Artifact::Text => "txt",
            Artifact::Alto => "xml",
        }
    }

    /// `<source-stem>.<ext>` in the source image's directory.
    pub fn output_path(self, source: &Path) -> PathBuf {
        source.with_extension(self.file_extension())
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.api_format())
    }
}
