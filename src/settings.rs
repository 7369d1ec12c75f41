//! User settings file (`.ocrtools.yml`).
//!
//! Looked up in the home directory first, then in the working directory.
//! When neither exists a default file is written to the home directory and
//! [`SettingsSource::Created`] tells the caller to stop and let the user fill
//! in the API key.
//!
//! ```yaml
//! pero:
//!   api_key: api-key-here
//!   endpoint: https://pero-ocr.fit.vutbr.cz/api/
//!   default_engine: 1
//! ```

use crate::config::{BatchConfigBuilder, DEFAULT_ENDPOINT};
use crate::error::OcrBatchError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// File name searched for in each candidate directory.
pub const SETTINGS_FILE_NAME: &str = ".ocrtools.yml";

/// `api_key` value written into a fresh settings file.
pub const PLACEHOLDER_API_KEY: &str = "api-key-here";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub pero: PeroSettings,
}

/// The `pero:` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeroSettings {
    pub api_key: String,
    pub endpoint: String,
    pub default_engine: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_interval_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_timeout_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_polls: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_wait_secs: Option<u64>,
}

impl Default for PeroSettings {
    fn default() -> Self {
        Self {
            api_key: PLACEHOLDER_API_KEY.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            default_engine: 1,
            poll_interval_secs: None,
            status_timeout_secs: None,
            max_polls: None,
            max_wait_secs: None,
        }
    }
}

impl Settings {
    /// Copy file values onto `builder`. Later builder calls override them.
    ///
    /// The placeholder key is not copied, so an untouched default file fails
    /// with a clear "API key is empty" error instead of a 401.
    pub fn apply(&self, builder: BatchConfigBuilder) -> BatchConfigBuilder {
        let p = &self.pero;
        let mut builder = builder.endpoint(&p.endpoint).engine_id(p.default_engine);
        if !p.api_key.trim().is_empty() && p.api_key != PLACEHOLDER_API_KEY {
            builder = builder.api_key(&p.api_key);
        }
        if let Some(secs) = p.poll_interval_secs {
            builder = builder.poll_interval_secs(secs);
        }
        if let Some(secs) = p.status_timeout_secs {
            builder = builder.status_timeout_secs(secs);
        }
        if let Some(n) = p.max_polls {
            builder = builder.max_poll_attempts(n);
        }
        if let Some(secs) = p.max_wait_secs {
            builder = builder.max_poll_duration_secs(secs);
        }
        builder
    }
}

/// Where the settings came from.
#[derive(Debug)]
pub enum SettingsSource {
    /// An existing file was read.
    Loaded { settings: Settings, path: PathBuf },
    /// No file existed; a default one was written here.
    Created { path: PathBuf },
}

/// Candidate files in lookup order.
pub fn search_paths() -> Vec<PathBuf> {
    candidates(dirs::home_dir().as_deref(), Path::new("."))
}

fn candidates(home: Option<&Path>, cwd: &Path) -> Vec<PathBuf> {
    home.into_iter()
        .chain(std::iter::once(cwd))
        .map(|dir| dir.join(SETTINGS_FILE_NAME))
        .collect()
}

/// Load `explicit` if given, otherwise the first file in [`search_paths`],
/// writing a default into the home directory when none exists.
pub async fn load_or_init(explicit: Option<&Path>) -> Result<SettingsSource, OcrBatchError> {
    let home = dirs::home_dir();
    load_or_init_in(explicit, home.as_deref(), Path::new(".")).await
}

async fn load_or_init_in(
    explicit: Option<&Path>,
    home: Option<&Path>,
    cwd: &Path,
) -> Result<SettingsSource, OcrBatchError> {
    if let Some(path) = explicit {
        let settings = load(path).await?;
        return Ok(SettingsSource::Loaded {
            settings,
            path: path.to_path_buf(),
        });
    }

    for path in candidates(home, cwd) {
        if fs::try_exists(&path).await.unwrap_or(false) {
            let settings = load(&path).await?;
            return Ok(SettingsSource::Loaded { settings, path });
        }
        debug!("No settings at {}", path.display());
    }

    let home = home.ok_or_else(|| {
        OcrBatchError::Config("home directory cannot be determined".into())
    })?;
    let path = home.join(SETTINGS_FILE_NAME);
    write(&Settings::default(), &path).await?;
    info!("Created default settings at {}", path.display());
    Ok(SettingsSource::Created { path })
}

/// Read and parse one settings file.
pub async fn load(path: &Path) -> Result<Settings, OcrBatchError> {
    let raw = fs::read_to_string(path).await.map_err(|e| {
        OcrBatchError::Config(format!("cannot read settings {}: {e}", path.display()))
    })?;
    let settings: Settings = serde_yaml::from_str(&raw).map_err(|e| {
        OcrBatchError::Config(format!(
            "please check your settings {}: {e}",
            path.display()
        ))
    })?;
    debug!("Loaded settings from {}", path.display());
    Ok(settings)
}

/// Write `settings` as YAML (temp file, then rename).
pub async fn write(settings: &Settings, path: &Path) -> Result<(), OcrBatchError> {
    let yaml = serde_yaml::to_string(settings)
        .map_err(|e| OcrBatchError::Internal(format!("settings YAML: {e}")))?;
    let write_err =
        |e: std::io::Error| OcrBatchError::Config(format!("cannot write {}: {e}", path.display()));

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await.map_err(write_err)?;
        }
    }
    let tmp_path = path.with_extension("yml.tmp");
    fs::write(&tmp_path, yaml.as_bytes()).await.map_err(write_err)?;
    fs::rename(&tmp_path, path).await.map_err(write_err)?;
    Ok(())
}
