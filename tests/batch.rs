//! Integration tests for the full batch lifecycle.
//!
//! Every test drives the public entry points against [`ScriptedTransport`],
//! an in-process stand-in for the OCR service, over a temporary directory of
//! synthesised scans. No network access is needed.
//!
//! Run with:
//!   cargo test --test batch

mod common;

use common::{builder, created, init_tracing, listing, status, write_jpeg, write_tiff, ScriptedTransport};
use pero_batch::transport::Method;
use pero_batch::{
    cancel_pair, cancel_request, download_only, list_engines, run_batch, BatchProgressCallback,
    FileError, OcrBatchError, Stage, TransportError,
};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

// ── Test helpers ─────────────────────────────────────────────────────────────

const CREATE: &str = "post_processing_request";

/// Script every call of a clean two-image run on request `r1`.
fn script_happy_run(t: &ScriptedTransport) {
    t.reply(CREATE, 200, &created("r1"))
        .reply("upload_image/r1/a.tif", 200, "")
        .reply("upload_image/r1/b.jpg", 200, "")
        .reply(
            "request_status/r1",
            200,
            &status(&[("a.tif", "PROCESSING"), ("b.jpg", "PROCESSED")]),
        )
        .reply(
            "request_status/r1",
            200,
            &status(&[("a.tif", "PROCESSED"), ("b.jpg", "PROCESSED")]),
        )
        .reply("download_results/r1/a.tif/txt", 200, "text of a")
        .reply("download_results/r1/a.tif/alto", 200, "<alto>a</alto>")
        .reply("download_results/r1/b.jpg/txt", 200, "text of b")
        .reply("download_results/r1/b.jpg/alto", 200, "<alto>b</alto>");
}

fn two_scans() -> TempDir {
    let dir = TempDir::new().unwrap();
    write_tiff(&dir.path().join("a.tif"));
    write_jpeg(&dir.path().join("b.jpg"));
    dir
}

fn read(dir: &Path, name: &str) -> String {
    std::fs::read_to_string(dir.join(name)).unwrap()
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
}

impl BatchProgressCallback for Recorder {
    fn on_stage_start(&self, stage: Stage, total: usize) {
        self.events.lock().unwrap().push(format!("start {stage} {total}"));
    }

    fn on_poll(&self, attempt: u32, done: usize, total: usize) {
        self.events
            .lock()
            .unwrap()
            .push(format!("poll {attempt} {done}/{total}"));
    }

    fn on_stage_complete(&self, stage: Stage, succeeded: usize, failed: usize) {
        self.events
            .lock()
            .unwrap()
            .push(format!("done {stage} {succeeded}/{failed}"));
    }
}

// ── Full lifecycle ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_end_to_end_tiff_and_jpeg() {
    init_tracing();
    let dir = two_scans();
    let t = ScriptedTransport::new();
    script_happy_run(&t);
    let recorder = Arc::new(Recorder::default());
    let config = builder(&t)
        .engine_id(2)
        .progress_callback(recorder.clone() as Arc<dyn BatchProgressCallback>)
        .build()
        .unwrap();

    let report = tokio_test::assert_ok!(run_batch(dir.path(), &config).await);

    assert_eq!(report.request_id, "r1");
    assert_eq!(report.discovered, 2);
    assert_eq!(report.uploaded, 2);
    assert_eq!(report.processed, 2);
    assert_eq!(report.artifacts_saved, 4);
    assert_eq!(report.poll_attempts, 2);
    assert!(!report.has_failures(), "{:?}", report.failures);

    assert_eq!(read(dir.path(), "a.txt"), "text of a");
    assert_eq!(read(dir.path(), "a.xml"), "<alto>a</alto>");
    assert_eq!(read(dir.path(), "b.txt"), "text of b");
    assert_eq!(read(dir.path(), "b.xml"), "<alto>b</alto>");

    // originals untouched, transcoded temp file gone
    assert_eq!(
        listing(dir.path()),
        vec!["a.tif", "a.txt", "a.xml", "b.jpg", "b.txt", "b.xml"]
    );

    let calls = t.calls();
    let create = &calls[0];
    assert_eq!(create.path, CREATE);
    let body = create.json.as_ref().unwrap();
    assert_eq!(body["engine"], 2);
    assert!(body["images"]["a.tif"].is_null());
    assert!(body["images"]["b.jpg"].is_null());

    let a_upload = calls
        .iter()
        .find(|c| c.path == "upload_image/r1/a.tif")
        .and_then(|c| c.upload.clone())
        .unwrap();
    assert_eq!(a_upload.field, "file");
    assert_eq!(a_upload.file_name, "a.jpg");
    assert_eq!(a_upload.mime_type, "image/jpeg");
    assert_eq!(&a_upload.bytes[..2], &[0xFF, 0xD8], "TIFF must be sent as JPEG");

    let b_upload = calls
        .iter()
        .find(|c| c.path == "upload_image/r1/b.jpg")
        .and_then(|c| c.upload.clone())
        .unwrap();
    assert_eq!(b_upload.bytes, std::fs::read(dir.path().join("b.jpg")).unwrap());

    assert_eq!(t.count("request_status/"), 2);
    assert!(calls
        .iter()
        .filter(|c| c.path.starts_with("request_status/"))
        .all(|c| c.method == Method::Get));

    let events = recorder.events.lock().unwrap().clone();
    assert_eq!(
        events,
        vec![
            "start upload 2",
            "done upload 2/0",
            "start poll 2",
            "poll 1 1/2",
            "poll 2 2/2",
            "done poll 2/0",
            "start download 2",
            "done download 2/0",
        ]
    );
}

#[tokio::test]
async fn test_rerun_overwrites_previous_results() {
    let dir = two_scans();
    std::fs::write(dir.path().join("a.txt"), "old").unwrap();
    let t = ScriptedTransport::new();
    script_happy_run(&t);
    let config = builder(&t).build().unwrap();

    run_batch(dir.path(), &config).await.unwrap();
    assert_eq!(read(dir.path(), "a.txt"), "text of a");
}

// ── Fatal paths ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_status_404_stops_polling_after_one_call() {
    init_tracing();
    let dir = two_scans();
    let t = ScriptedTransport::new();
    t.reply(CREATE, 200, &created("r1"))
        .reply("upload_image/r1/a.tif", 200, "")
        .reply("upload_image/r1/b.jpg", 200, "")
        .reply("request_status/r1", 404, "");
    let config = builder(&t).build().unwrap();

    let err = tokio_test::assert_err!(run_batch(dir.path(), &config).await);
    assert!(matches!(err, OcrBatchError::RequestNotFound { ref request_id } if request_id == "r1"));
    assert_eq!(err.exit_code(), 8);
    assert_eq!(t.count("request_status/"), 1);
    assert_eq!(t.count("download_results/"), 0);
}

#[tokio::test]
async fn test_status_403_is_not_owned() {
    let dir = two_scans();
    let t = ScriptedTransport::new();
    t.reply(CREATE, 200, &created("r1"))
        .reply("upload_image/r1/a.tif", 200, "")
        .reply("upload_image/r1/b.jpg", 200, "")
        .reply("request_status/r1", 403, "");
    let config = builder(&t).build().unwrap();

    let err = run_batch(dir.path(), &config).await.unwrap_err();
    assert!(matches!(err, OcrBatchError::RequestNotOwned { .. }));
    assert_eq!(t.count("request_status/"), 1);
}

#[tokio::test]
async fn test_poll_limit_is_enforced() {
    let dir = two_scans();
    let t = ScriptedTransport::new();
    t.reply(CREATE, 200, &created("r1"))
        .reply("upload_image/r1/a.tif", 200, "")
        .reply("upload_image/r1/b.jpg", 200, "")
        .reply(
            "request_status/r1",
            200,
            &status(&[("a.tif", "PROCESSING"), ("b.jpg", "WAITING")]),
        );
    let config = builder(&t).max_poll_attempts(3).build().unwrap();

    let err = run_batch(dir.path(), &config).await.unwrap_err();
    assert!(matches!(err, OcrBatchError::PollLimitExceeded { attempts: 3, .. }));
    assert_eq!(err.exit_code(), 13);
    assert_eq!(t.count("request_status/"), 3);
}

#[tokio::test]
async fn test_cancel_wakes_sleeping_poller() {
    let dir = two_scans();
    let t = ScriptedTransport::new();
    t.reply(CREATE, 200, &created("r1"))
        .reply("upload_image/r1/a.tif", 200, "")
        .reply("upload_image/r1/b.jpg", 200, "")
        .reply(
            "request_status/r1",
            200,
            &status(&[("a.tif", "PROCESSING"), ("b.jpg", "PROCESSING")]),
        );
    let (handle, token) = cancel_pair();
    let config = builder(&t)
        .poll_interval_secs(3600)
        .cancel_token(token)
        .build()
        .unwrap();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        handle.cancel();
    });

    let result = tokio::time::timeout(Duration::from_secs(10), run_batch(dir.path(), &config))
        .await
        .expect("cancellation must interrupt the poll delay");
    let err = result.unwrap_err();
    assert!(matches!(err, OcrBatchError::Cancelled));
    assert_eq!(err.exit_code(), 130);
    assert_eq!(t.count("download_results/"), 0);
}

#[tokio::test]
async fn test_key_collision_rejected_before_any_call() {
    let dir = TempDir::new().unwrap();
    write_jpeg(&dir.path().join("page 1.jpg"));
    write_jpeg(&dir.path().join("page1.jpg"));
    let t = ScriptedTransport::new();
    let config = builder(&t).build().unwrap();

    let err = run_batch(dir.path(), &config).await.unwrap_err();
    assert!(matches!(err, OcrBatchError::KeyCollision { ref key, .. } if key == "page1.jpg"));
    assert!(t.calls().is_empty());
}

#[tokio::test]
async fn test_local_input_errors() {
    let t = ScriptedTransport::new();
    let config = builder(&t).build().unwrap();

    let missing = run_batch(Path::new("/no/such/dir"), &config).await.unwrap_err();
    assert_eq!(missing.exit_code(), 2);

    let empty = TempDir::new().unwrap();
    std::fs::write(empty.path().join("notes.txt"), "not a scan").unwrap();
    let none = run_batch(empty.path(), &config).await.unwrap_err();
    assert!(matches!(none, OcrBatchError::NoImages { .. }));
    assert_eq!(none.exit_code(), 3);
    assert!(t.calls().is_empty());
}

#[tokio::test]
async fn test_submission_transport_failure_is_fatal() {
    let dir = two_scans();
    let t = ScriptedTransport::new();
    t.fail(
        CREATE,
        TransportError::Connection {
            detail: "connection refused".into(),
        },
    );
    let config = builder(&t).build().unwrap();

    let err = run_batch(dir.path(), &config).await.unwrap_err();
    assert!(matches!(err, OcrBatchError::Transport { operation: CREATE, .. }));
    assert_eq!(t.count("upload_image/"), 0);
}

#[tokio::test]
async fn test_status_transport_failure_is_fatal() {
    let dir = two_scans();
    let t = ScriptedTransport::new();
    t.reply(CREATE, 200, &created("r1"))
        .reply("upload_image/r1/a.tif", 200, "")
        .reply("upload_image/r1/b.jpg", 200, "")
        .fail(
            "request_status/r1",
            TransportError::Connection {
                detail: "connection refused".into(),
            },
        );
    let config = builder(&t).build().unwrap();

    let err = run_batch(dir.path(), &config).await.unwrap_err();
    assert!(matches!(
        err,
        OcrBatchError::Transport { operation: "request_status", .. }
    ));
    assert_eq!(err.exit_code(), 1);
    assert_eq!(t.count("request_status/"), 1);
    assert_eq!(t.count("download_results/"), 0);
    assert_eq!(listing(dir.path()), vec!["a.tif", "b.jpg"]);
}

#[tokio::test]
async fn test_cancel_during_upload_delay() {
    let dir = two_scans();
    let t = ScriptedTransport::new();
    t.reply(CREATE, 200, &created("r1"));
    let (handle, token) = cancel_pair();
    let config = builder(&t)
        .upload_delay_ms(3_600_000)
        .cancel_token(token)
        .build()
        .unwrap();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.cancel();
    });

    let result = tokio::time::timeout(Duration::from_secs(10), run_batch(dir.path(), &config))
        .await
        .expect("cancellation must interrupt the upload delay");
    assert!(matches!(result, Err(OcrBatchError::Cancelled)));
    assert_eq!(t.count(CREATE), 1);
    assert_eq!(t.count("upload_image/"), 0);
}

#[tokio::test]
async fn test_same_stem_with_two_extensions_rejected_before_any_call() {
    let dir = TempDir::new().unwrap();
    write_tiff(&dir.path().join("p.tif"));
    write_jpeg(&dir.path().join("p.jpg"));
    let t = ScriptedTransport::new();
    let config = builder(&t).build().unwrap();

    let err = run_batch(dir.path(), &config).await.unwrap_err();
    assert!(matches!(err, OcrBatchError::OutputCollision { ref output, .. } if output == &dir.path().join("p.txt")));
    assert_eq!(err.exit_code(), 11);
    assert!(t.calls().is_empty());
}

// ── Per-file failures ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_rejected_upload_is_left_out_of_polling() {
    let dir = two_scans();
    let t = ScriptedTransport::new();
    t.reply(CREATE, 200, &created("r1"))
        .reply("upload_image/r1/a.tif", 413, r#"{"message":"file too large"}"#)
        .reply("upload_image/r1/b.jpg", 200, "")
        // a.tif never arrived, so the service keeps it CREATED
        .reply(
            "request_status/r1",
            200,
            &status(&[("a.tif", "CREATED"), ("b.jpg", "PROCESSED")]),
        )
        .reply("download_results/r1/b.jpg/txt", 200, "b")
        .reply("download_results/r1/b.jpg/alto", 200, "<alto/>");
    let config = builder(&t).build().unwrap();

    let report = run_batch(dir.path(), &config).await.unwrap();
    assert_eq!(report.uploaded, 1);
    assert_eq!(report.processed, 1);
    assert_eq!(report.poll_attempts, 1);
    assert_eq!(report.artifacts_saved, 2);
    assert_eq!(report.failures.len(), 1);
    match &report.failures[0] {
        FileError::UploadRejected {
            path,
            status,
            message,
        } => {
            assert_eq!(path, &dir.path().join("a.tif"));
            assert_eq!(*status, 413);
            assert_eq!(message.as_deref(), Some("file too large"));
        }
        other => panic!("unexpected failure: {other}"),
    }
    assert!(!dir.path().join("a.txt").exists());
    // transcoded JPEG of the rejected TIFF is gone too
    assert_eq!(listing(dir.path()), vec!["a.tif", "b.jpg", "b.txt", "b.xml"]);
}

#[tokio::test]
async fn test_upload_transport_failure_cleans_temp_file() {
    let dir = two_scans();
    let t = ScriptedTransport::new();
    t.reply(CREATE, 200, &created("r1"))
        .fail(
            "upload_image/r1/a.tif",
            TransportError::Connection {
                detail: "connection reset".into(),
            },
        )
        .reply("upload_image/r1/b.jpg", 200, "")
        .reply("request_status/r1", 200, &status(&[("b.jpg", "PROCESSED")]))
        .reply("download_results/r1/b.jpg/txt", 200, "b")
        .reply("download_results/r1/b.jpg/alto", 200, "<alto/>");
    let config = builder(&t).build().unwrap();

    let report = run_batch(dir.path(), &config).await.unwrap();
    assert_eq!(report.uploaded, 1);
    assert!(matches!(
        &report.failures[..],
        [FileError::UploadFailed { path, detail }]
            if path == &dir.path().join("a.tif") && detail.contains("connection reset")
    ));
    assert_eq!(listing(dir.path()), vec!["a.tif", "b.jpg", "b.txt", "b.xml"]);
}

#[tokio::test]
async fn test_failed_state_is_reported_not_downloaded() {
    let dir = two_scans();
    let t = ScriptedTransport::new();
    t.reply(CREATE, 200, &created("r1"))
        .reply("upload_image/r1/a.tif", 200, "")
        .reply("upload_image/r1/b.jpg", 200, "")
        .reply(
            "request_status/r1",
            200,
            &status(&[("a.tif", "FAILED"), ("b.jpg", "PROCESSED")]),
        )
        .reply("download_results/r1/b.jpg/txt", 200, "b")
        .reply("download_results/r1/b.jpg/alto", 200, "<alto/>");
    let config = builder(&t).build().unwrap();

    let report = run_batch(dir.path(), &config).await.unwrap();
    assert!(report.has_failures());
    assert!(matches!(
        &report.failures[0],
        FileError::OcrFailed { key, state, .. } if key == "a.tif" && state == "FAILED"
    ));
    assert_eq!(t.count("download_results/r1/a.tif"), 0);
    assert_eq!(t.count("download_results/r1/b.jpg"), 2);
}

#[tokio::test]
async fn test_missing_artifact_does_not_block_next_key() {
    let dir = two_scans();
    let t = ScriptedTransport::new();
    t.reply(CREATE, 200, &created("r1"))
        .reply("upload_image/r1/a.tif", 200, "")
        .reply("upload_image/r1/b.jpg", 200, "")
        .reply(
            "request_status/r1",
            200,
            &status(&[("a.tif", "PROCESSED"), ("b.jpg", "PROCESSED")]),
        )
        // no a.tif/txt scripted: 404
        .reply("download_results/r1/a.tif/alto", 200, "<alto>a</alto>")
        .reply("download_results/r1/b.jpg/txt", 200, "text of b")
        .reply("download_results/r1/b.jpg/alto", 200, "<alto>b</alto>");
    let config = builder(&t).build().unwrap();

    let report = run_batch(dir.path(), &config).await.unwrap();
    assert_eq!(report.artifacts_saved, 3);
    assert!(matches!(
        &report.failures[..],
        [FileError::ArtifactUnavailable { status: 404, .. }]
    ));
    assert!(!dir.path().join("a.txt").exists());
    assert_eq!(read(dir.path(), "b.txt"), "text of b");
}

// ── Pull-only and admin ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_download_only_skips_submission_and_polling() {
    let dir = two_scans();
    let t = ScriptedTransport::new();
    t.reply("download_results/old/a.tif/txt", 200, "a")
        .reply("download_results/old/a.tif/alto", 200, "<a/>")
        .reply("download_results/old/b.jpg/txt", 200, "b")
        .reply("download_results/old/b.jpg/alto", 200, "<b/>");
    let config = builder(&t).download_concurrency(2).build().unwrap();

    let report = download_only(dir.path(), "old", &config).await.unwrap();
    assert_eq!(report.request_id, "old");
    assert_eq!(report.artifacts_saved, 4);
    assert!(!report.has_failures());
    assert_eq!(t.count(CREATE), 0);
    assert_eq!(t.count("upload_image/"), 0);
    assert_eq!(t.count("request_status/"), 0);
    assert_eq!(read(dir.path(), "b.xml"), "<b/>");
}

#[tokio::test]
async fn test_cancel_and_list_engines() {
    let t = ScriptedTransport::new();
    t.reply("cancel_request/r9", 200, "").reply(
        "get_engines",
        200,
        r#"{"status":"success","engines":{
            "pero_eu_cz_print_newspapers_2022-09-26":{"id":2,"description":"Czech newspapers"},
            "pero_generic":{"id":1,"description":null}}}"#,
    );
    let config = builder(&t).build().unwrap();

    tokio_test::assert_ok!(cancel_request(&config, "r9").await);
    let err = cancel_request(&config, "unknown").await.unwrap_err();
    assert!(matches!(err, OcrBatchError::RequestNotFound { .. }));

    let engines = list_engines(&config).await.unwrap();
    let ids: Vec<i64> = engines.iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![1, 2]);
    assert_eq!(engines[0].description, None);

    let calls = t.calls();
    assert_eq!(calls[0].method, Method::Post);
    assert_eq!(calls[0].path, "cancel_request/r9");
}
