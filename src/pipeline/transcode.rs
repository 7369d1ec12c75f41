//! Format transcoding: TIFF → baseline JPEG before upload.
//!
//! The service accepts JPEG, PNG and JPEG 2000 but not TIFF, which is what
//! most scanners produce. TIFFs are decoded and re-encoded into a hidden
//! sibling temp file. The temp file is owned by [`PreparedUpload`] and removed
//! when that value is dropped, so it disappears after the upload attempt on
//! every path: success, rejected upload, transport error or panic.
//!
//! Decoding a 600 DPI page is CPU-heavy, so it runs in `spawn_blocking`.

use crate::error::FileError;
use crate::model::ImageFormat;
use image::codecs::jpeg::JpegEncoder;
use image::ImageReader;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// File-name prefix of transcoded temp files.
pub const TEMP_PREFIX: &str = ".pero-batch-";

/// JPEG quality used for transcoded pages.
pub const JPEG_QUALITY: u8 = 90;

/// The file that will actually be uploaded for an image.
#[derive(Debug)]
pub enum PreparedUpload {
    /// The source file is uploaded as-is.
    Original(PathBuf),
    /// A transcoded JPEG; deleted when this value is dropped.
    Transcoded { source: PathBuf, file: NamedTempFile },
}

impl PreparedUpload {
    /// Path of the bytes to send.
    pub fn path(&self) -> &Path {
        match self {
            PreparedUpload::Original(p) => p,
            PreparedUpload::Transcoded { file, .. } => file.path(),
        }
    }

    pub fn is_transcoded(&self) -> bool {
        matches!(self, PreparedUpload::Transcoded { .. })
    }

    /// File name announced in the multipart body: the source stem with the
    /// extension of what is really being sent.
    pub fn upload_file_name(&self) -> String {
        match self {
            PreparedUpload::Original(p) => file_name_of(p),
            PreparedUpload::Transcoded { source, .. } => {
                file_name_of(&source.with_extension("jpg"))
            }
        }
    }

    /// MIME type of the bytes to send.
    pub fn mime_type(&self) -> &'static str {
        match self {
            PreparedUpload::Original(p) => ImageFormat::from_path(p)
                .map(ImageFormat::mime_type)
                .unwrap_or("application/octet-stream"),
            PreparedUpload::Transcoded { .. } => ImageFormat::Jpeg.mime_type(),
        }
    }
}

fn file_name_of(p: &Path) -> String {
    p.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Prepare `path` for upload, transcoding TIFF to JPEG.
///
/// Any other extension passes through untouched and no file is created.
pub async fn prepare_upload(path: &Path) -> Result<PreparedUpload, FileError> {
    let needs_transcode = ImageFormat::from_path(path).is_some_and(ImageFormat::needs_transcode);
    if !needs_transcode {
        return Ok(PreparedUpload::Original(path.to_path_buf()));
    }

    let source = path.to_path_buf();
    tokio::task::spawn_blocking(move || transcode_blocking(&source))
        .await
        .map_err(|e| FileError::Transcode {
            path: path.to_path_buf(),
            detail: format!("transcode task panicked: {e}"),
        })?
}

/// Blocking implementation of TIFF → JPEG.
fn transcode_blocking(source: &Path) -> Result<PreparedUpload, FileError> {
    let fail = |detail: String| FileError::Transcode {
        path: source.to_path_buf(),
        detail,
    };

    let image = ImageReader::open(source)
        .map_err(|e| fail(format!("cannot open: {e}")))?
        .with_guessed_format()
        .map_err(|e| fail(format!("cannot read: {e}")))?
        .decode()
        .map_err(|e| fail(format!("cannot decode TIFF: {e}")))?;

    // JPEG carries neither alpha nor 16-bit samples.
    let rgb = image.to_rgb8();

    let dir = match source.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut file = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .suffix(".jpg")
        .tempfile_in(dir)
        .map_err(|e| fail(format!("cannot create temp file in {}: {e}", dir.display())))?;

    {
        let mut writer = BufWriter::new(file.as_file_mut());
        JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY)
            .encode_image(&rgb)
            .map_err(|e| fail(format!("cannot encode JPEG: {e}")))?;
        writer
            .flush()
            .map_err(|e| fail(format!("cannot write JPEG: {e}")))?;
    }

    debug!(
        "Transcoded {} ({}x{}) → {}",
        source.display(),
        rgb.width(),
        rgb.height(),
        file.path().display()
    );

    Ok(PreparedUpload::Transcoded {
        source: source.to_path_buf(),
        file,
    })
}
