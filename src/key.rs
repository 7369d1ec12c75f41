//! Service keys: the only identifier the OCR service correlates images by.
//!
//! Upload, status and download calls all address an image by its key, never
//! by its local path, so the key must be stable for a path and unique within
//! one request. The derivation keeps the base name but drops whitespace and
//! diacritics, which the service mangles in URLs:
//!
//! ```text
//! /scans/2024/café report.tif ──▶ cafereport.tif
//! ```

use crate::error::OcrBatchError;
use crate::model::ImageAsset;
use std::collections::HashMap;
use std::path::Path;
use unicode_normalization::UnicodeNormalization;
use unicode_properties::{GeneralCategory, UnicodeGeneralCategory};

/// Derive the service key for `path`.
///
/// Pure string transformation on the base name; the filesystem is never
/// consulted. May return an empty string; use [`checked_key`] when the
/// result is going to the service.
pub fn derive_key(path: &Path) -> String {
    let base = path
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_default();
    normalize(&base)
}

/// Strip whitespace and nonspacing marks, returning NFC text.
///
/// Only category Mn goes. Spacing (Mc) and enclosing (Me) marks carry
/// meaning in scripts such as Devanagari and are kept.
pub fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .nfd()
        .filter(|c| !is_nonspacing_mark(*c))
        .nfc()
        .collect()
}

fn is_nonspacing_mark(c: char) -> bool {
    c.general_category() == GeneralCategory::NonspacingMark
}

/// [`derive_key`], rejecting keys that come out empty.
pub fn checked_key(path: &Path) -> Result<String, OcrBatchError> {
    let key = derive_key(path);
    if key.is_empty() {
        return Err(OcrBatchError::EmptyKey {
            path: path.to_path_buf(),
        });
    }
    Ok(key)
}

/// Fail if two assets share a key.
///
/// Runs before the request is created: once a duplicate key reaches the
/// service, the second upload silently replaces the first.
pub fn ensure_unique(assets: &[ImageAsset]) -> Result<(), OcrBatchError> {
    let mut seen: HashMap<&str, &Path> = HashMap::with_capacity(assets.len());
    for asset in assets {
        if let Some(first) = seen.insert(asset.key.as_str(), asset.path.as_path()) {
            return Err(OcrBatchError::KeyCollision {
                key: asset.key.clone(),
                first: first.to_path_buf(),
                second: asset.path.clone(),
            });
        }
    }
    Ok(())
}
