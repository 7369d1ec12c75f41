//! Configuration for a batch run.
//!
//! All run behaviour is controlled through [`BatchConfig`], built via its
//! [`BatchConfigBuilder`] and passed by reference into every stage. Nothing
//! below the binary reads the environment or a settings file; the CLI (or a
//! library caller) resolves those once and hands over a finished value.

use crate::cancel::CancelToken;
use crate::error::OcrBatchError;
use crate::pipeline::poll::{FixedInterval, PollSchedule};
use crate::progress::ProgressCallback;
use crate::transport::OcrTransport;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Public PERO OCR endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://pero-ocr.fit.vutbr.cz/api/";

/// Configuration for one invocation against the OCR service.
///
/// # Example
/// ```rust
/// use pero_batch::BatchConfig;
///
/// let config = BatchConfig::builder()
///     .api_key("secret")
///     .engine_id(2)
///     .poll_interval_secs(30)
///     .max_poll_attempts(120)
///     .build()
///     .unwrap();
/// assert_eq!(config.engine_id, 2);
/// ```
#[derive(Clone)]
pub struct BatchConfig {
    /// Base URL every API path is appended to. Default: [`DEFAULT_ENDPOINT`].
    pub endpoint: String,

    /// Value of the `api-key` header.
    pub api_key: String,

    /// OCR engine used for new requests. Default: 1.
    pub engine_id: i64,

    /// Timeout for submission, upload, download and admin calls, in seconds. Default: 300.
    pub request_timeout_secs: u64,

    /// Timeout for one `request_status` call, in seconds. Default: 1800.
    ///
    /// The service may hold the status call while it is busy recognising, so
    /// this is much longer than the other timeouts.
    pub status_timeout_secs: u64,

    /// Pause between request creation and the first upload, in ms. Default: 1000.
    ///
    /// Freshly created requests are not always ready to accept images.
    pub upload_delay_ms: u64,

    /// Delay strategy between status checks. Default: fixed 60 s.
    pub poll_schedule: Arc<dyn PollSchedule>,

    /// Give up after this many status checks. Default: unbounded.
    pub max_poll_attempts: Option<u32>,

    /// Give up once polling has run this long, in seconds. Default: unbounded.
    pub max_poll_duration_secs: Option<u64>,

    /// Number of images whose results are downloaded at once. Default: 1.
    pub download_concurrency: usize,

    /// Pre-constructed transport. Takes precedence over `endpoint`/`api_key`.
    pub transport: Option<Arc<dyn OcrTransport>>,

    /// Receives per-file and per-poll events.
    pub progress_callback: Option<ProgressCallback>,

    /// Checked before every per-file operation and every status check.
    pub cancel: Option<CancelToken>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: String::new(),
            engine_id: 1,
            request_timeout_secs: 300,
            status_timeout_secs: 1800,
            upload_delay_ms: 1000,
            poll_schedule: Arc::new(FixedInterval::new(Duration::from_secs(60))),
            max_poll_attempts: None,
            max_poll_duration_secs: None,
            download_concurrency: 1,
            transport: None,
            progress_callback: None,
            cancel: None,
        }
    }
}

impl fmt::Debug for BatchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &if self.api_key.is_empty() { "<unset>" } else { "<redacted>" })
            .field("engine_id", &self.engine_id)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("status_timeout_secs", &self.status_timeout_secs)
            .field("upload_delay_ms", &self.upload_delay_ms)
            .field("poll_schedule", &self.poll_schedule.describe())
            .field("max_poll_attempts", &self.max_poll_attempts)
            .field("max_poll_duration_secs", &self.max_poll_duration_secs)
            .field("download_concurrency", &self.download_concurrency)
            .field("transport", &self.transport.as_ref().map(|_| "<dyn OcrTransport>"))
            .finish()
    }
}

impl BatchConfig {
    /// Create a new builder for `BatchConfig`.
    pub fn builder() -> BatchConfigBuilder {
        BatchConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn status_timeout(&self) -> Duration {
        Duration::from_secs(self.status_timeout_secs)
    }

    pub fn max_poll_duration(&self) -> Option<Duration> {
        self.max_poll_duration_secs.map(Duration::from_secs)
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelToken::is_cancelled)
    }

    /// `Err(Cancelled)` once the run's token has been tripped.
    pub(crate) fn check_cancelled(&self) -> Result<(), OcrBatchError> {
        if self.is_cancelled() {
            Err(OcrBatchError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Builder for [`BatchConfig`].
pub struct BatchConfigBuilder {
    config: BatchConfig,
}

impl fmt::Debug for BatchConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl BatchConfigBuilder {
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.endpoint = endpoint.into();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = key.into();
        self
    }

    pub fn engine_id(mut self, id: i64) -> Self {
        self.config.engine_id = id;
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    pub fn status_timeout_secs(mut self, secs: u64) -> Self {
        self.config.status_timeout_secs = secs;
        self
    }

    pub fn upload_delay_ms(mut self, ms: u64) -> Self {
        self.config.upload_delay_ms = ms;
        self
    }

    /// Shorthand for a [`FixedInterval`] schedule.
    pub fn poll_interval_secs(mut self, secs: u64) -> Self {
        self.config.poll_schedule = Arc::new(FixedInterval::new(Duration::from_secs(secs)));
        self
    }

    pub fn poll_schedule(mut self, schedule: Arc<dyn PollSchedule>) -> Self {
        self.config.poll_schedule = schedule;
        self
    }

    pub fn max_poll_attempts(mut self, n: u32) -> Self {
        self.config.max_poll_attempts = Some(n);
        self
    }

    pub fn max_poll_duration_secs(mut self, secs: u64) -> Self {
        self.config.max_poll_duration_secs = Some(secs);
        self
    }

    pub fn download_concurrency(mut self, n: usize) -> Self {
        self.config.download_concurrency = n.max(1);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn OcrTransport>) -> Self {
        self.config.transport = Some(transport);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.config.cancel = Some(token);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<BatchConfig, OcrBatchError> {
        let c = &self.config;
        if c.endpoint.trim().is_empty() {
            return Err(OcrBatchError::Config("endpoint must not be empty".into()));
        }
        if c.engine_id < 0 {
            return Err(OcrBatchError::Config(format!(
                "engine id must be ≥ 0, got {}",
                c.engine_id
            )));
        }
        if c.request_timeout_secs == 0 || c.status_timeout_secs == 0 {
            return Err(OcrBatchError::Config("timeouts must be ≥ 1s".into()));
        }
        if c.max_poll_attempts == Some(0) {
            return Err(OcrBatchError::Config(
                "max poll attempts must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}
