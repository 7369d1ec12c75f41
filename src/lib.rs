//! # pero-batch
//!
//! Batch OCR of a directory of scans through the remote
//! [PERO OCR](https://pero-ocr.fit.vutbr.cz/) service.
//!
//! ## Pipeline Overview
//!
//! ```text
//! directory
//!  │
//!  ├─ 1. Scan       find .tif/.jpg/.png/.jp2 files, derive one key per file
//!  ├─ 2. Submit     create a remote request announcing every key
//!  ├─ 3. Upload     send each file (TIFF transcoded to JPEG first)
//!  ├─ 4. Poll       wait until every key is PROCESSED or failed
//!  └─ 5. Download   write <stem>.txt and <stem>.xml (ALTO) beside each scan
//! ```
//!
//! A failure confined to one file (unreadable TIFF, rejected upload, missing
//! artifact) is recorded in the [`BatchReport`] and never stops the batch.
//! Failures that make the request unusable are returned as [`OcrBatchError`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pero_batch::{run_batch, BatchConfig};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = BatchConfig::builder()
//!         .api_key(std::env::var("PERO_API_KEY")?)
//!         .engine_id(1)
//!         .build()?;
//!     let report = run_batch(Path::new("scans/"), &config).await?;
//!     eprintln!(
//!         "request {}: {}/{} processed, {} failures",
//!         report.request_id,
//!         report.processed,
//!         report.discovered,
//!         report.failures.len()
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pero-batch` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! pero-batch = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod admin;
pub mod api;
pub mod batch;
pub mod cancel;
pub mod config;
pub mod error;
pub mod key;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod settings;
pub mod transport;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use admin::{cancel_request, list_engines};
pub use batch::{download_only, run_batch};
pub use cancel::{cancel_pair, CancelHandle, CancelToken};
pub use config::{BatchConfig, BatchConfigBuilder, DEFAULT_ENDPOINT};
pub use error::{FileError, OcrBatchError, TransportError, EXIT_PARTIAL_FAILURE};
pub use model::{Artifact, EngineDescriptor, ImageAsset, ImageFormat, ImageState};
pub use output::{BatchReport, DownloadSummary, PollOutcome, SavedArtifact, UploadSummary};
pub use pipeline::poll::{ExponentialBackoff, FixedInterval, PollSchedule};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback, Stage};
pub use transport::{ApiRequest, HttpResponse, OcrTransport, ReqwestTransport};
