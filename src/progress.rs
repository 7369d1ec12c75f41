//! Progress-callback trait for batch events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::BatchConfigBuilder::progress_callback`] to receive events
//! as the pipeline uploads, polls and downloads. The CLI uses it to drive a
//! terminal progress bar; library callers can forward events anywhere.
//!
//! # Example
//!
//! ```rust
//! use pero_batch::{BatchConfig, BatchProgressCallback, Stage};
//! use std::path::Path;
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     uploaded: AtomicUsize,
//! }
//!
//! impl BatchProgressCallback for CountingCallback {
//!     fn on_item_complete(&self, stage: Stage, _path: &Path) {
//!         if stage == Stage::Upload {
//!             self.uploaded.fetch_add(1, Ordering::SeqCst);
//!         }
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { uploaded: AtomicUsize::new(0) });
//!
//! let config = BatchConfig::builder()
//!     .progress_callback(counter as Arc<dyn BatchProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Pipeline stage an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Upload,
    Poll,
    Download,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Upload => "upload",
            Stage::Poll => "poll",
            Stage::Download => "download",
        })
    }
}

/// Called by the pipeline as it works through a batch.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. With `download_concurrency > 1` the download events
/// may arrive from several tasks at once; protect shared state accordingly.
pub trait BatchProgressCallback: Send + Sync {
    /// A stage begins with `total` items.
    fn on_stage_start(&self, stage: Stage, total: usize) {
        let _ = (stage, total);
    }

    /// One image finished a stage successfully.
    fn on_item_complete(&self, stage: Stage, path: &Path) {
        let _ = (stage, path);
    }

    /// One image failed a stage; the batch continues without it.
    fn on_item_error(&self, stage: Stage, path: &Path, error: &str) {
        let _ = (stage, path, error);
    }

    /// A status check finished: `done` of `total` keys are terminal.
    ///
    /// `attempt` is 1-based.
    fn on_poll(&self, attempt: u32, done: usize, total: usize) {
        let _ = (attempt, done, total);
    }

    /// A stage has attempted every item.
    fn on_stage_complete(&self, stage: Stage, succeeded: usize, failed: usize) {
        let _ = (stage, succeeded, failed);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::BatchConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct TrackingCallback {
        completes: AtomicUsize,
        errors: AtomicUsize,
        polls: Mutex<Vec<(u32, usize, usize)>>,
    }

    impl BatchProgressCallback for TrackingCallback {
        fn on_item_complete(&self, _stage: Stage, _path: &Path) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_item_error(&self, _stage: Stage, _path: &Path, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_poll(&self, attempt: u32, done: usize, total: usize) {
            self.polls.lock().unwrap().push((attempt, done, total));
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_stage_start(Stage::Upload, 3);
        cb.on_item_complete(Stage::Upload, Path::new("a.tif"));
        cb.on_item_error(Stage::Download, Path::new("b.tif"), "404");
        cb.on_poll(1, 0, 3);
        cb.on_stage_complete(Stage::Upload, 2, 1);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_item_complete(Stage::Upload, Path::new("a.tif"));
        tracker.on_item_complete(Stage::Download, Path::new("a.tif"));
        tracker.on_item_error(Stage::Upload, Path::new("b.tif"), "413");
        tracker.on_poll(1, 1, 2);
        tracker.on_poll(2, 2, 2);

        assert_eq!(tracker.completes.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
        assert_eq!(*tracker.polls.lock().unwrap(), vec![(1, 1, 2), (2, 2, 2)]);
    }

    #[test]
    fn stage_display() {
        assert_eq!(Stage::Download.to_string(), "download");
    }
}
