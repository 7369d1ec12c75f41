//! Shared fixtures for the integration tests: an in-process scripted
//! transport and helpers that synthesise scan directories.

#![allow(dead_code)]

use async_trait::async_trait;
use image::{Rgb, RgbImage};
use pero_batch::transport::{FilePart, Method, RequestBody};
use pero_batch::{ApiRequest, BatchConfig, BatchConfigBuilder, HttpResponse, OcrTransport, TransportError};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};

type Answer = Result<HttpResponse, TransportError>;

/// Route library logs through the test harness; `RUST_LOG=debug` shows them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// One call as the transport saw it.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: Method,
    pub path: String,
    pub json: Option<serde_json::Value>,
    pub upload: Option<FilePart>,
}

/// Answers by request path from per-path queues.
///
/// Each queue is consumed front to back; its last answer repeats forever.
/// Paths with no script answer 404.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<String, VecDeque<Answer>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(&self, path: &str, status: u16, body: &str) -> &Self {
        self.push(path, Ok(HttpResponse::new(status, body)))
    }

    pub fn fail(&self, path: &str, error: TransportError) -> &Self {
        self.push(path, Err(error))
    }

    fn push(&self, path: &str, answer: Answer) -> &Self {
        self.routes
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push_back(answer);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.path.starts_with(prefix))
            .count()
    }
}

/// A config builder that talks to `transport` and never sleeps between polls.
pub fn builder(transport: &Arc<ScriptedTransport>) -> BatchConfigBuilder {
    BatchConfig::builder()
        .transport(Arc::clone(transport) as Arc<dyn OcrTransport>)
        .upload_delay_ms(0)
        .poll_interval_secs(0)
}

#[async_trait]
impl OcrTransport for ScriptedTransport {
    async fn send(&self, request: ApiRequest) -> Result<HttpResponse, TransportError> {
        let path = request.path();
        let (json, upload) = match request.body {
            RequestBody::Empty => (None, None),
            RequestBody::Json(v) => (Some(v), None),
            RequestBody::Multipart(part) => (None, Some(part)),
        };
        self.calls.lock().unwrap().push(RecordedCall {
            method: request.method,
            path: path.clone(),
            json,
            upload,
        });

        let mut routes = self.routes.lock().unwrap();
        match routes.get_mut(&path) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_else(not_found),
            Some(queue) => queue.front().cloned().unwrap_or_else(not_found),
            None => not_found(),
        }
    }
}

fn not_found() -> Answer {
    Ok(HttpResponse::new(404, ""))
}

/// `{"status":"success","request_id":id}`
pub fn created(id: &str) -> String {
    serde_json::json!({ "status": "success", "request_id": id }).to_string()
}

/// `{"request_status":{key:{"state":state},...}}`
pub fn status(pairs: &[(&str, &str)]) -> String {
    let map: serde_json::Map<String, serde_json::Value> = pairs
        .iter()
        .map(|(k, s)| (k.to_string(), serde_json::json!({ "state": s, "quality": null })))
        .collect();
    serde_json::json!({ "status": "success", "request_status": map }).to_string()
}

pub fn write_tiff(path: &Path) {
    RgbImage::from_fn(32, 24, |x, y| Rgb([(x * 8) as u8, (y * 10) as u8, 128]))
        .save(path)
        .unwrap();
}

pub fn write_jpeg(path: &Path) {
    RgbImage::from_pixel(20, 20, Rgb([240, 240, 240]))
        .save(path)
        .unwrap();
}

/// Sorted file names directly inside `dir`.
pub fn listing(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
