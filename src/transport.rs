//! HTTP transport seam.
//!
//! Pipeline stages never touch `reqwest` directly. They build an
//! [`ApiRequest`] and hand it to an [`OcrTransport`]; the production
//! implementation is [`ReqwestTransport`]. A pre-built transport can be set on
//! [`crate::config::BatchConfig`], which is how the integration tests drive
//! the whole pipeline without a network.
//!
//! The transport reports only what happened on the wire: an HTTP status with
//! its body, or a [`TransportError`]. Interpreting the status is the stage's
//! job, because the same code means different things per endpoint (404 is
//! "engine not found" on submission but "request not found" on status).

use crate::config::BatchConfig;
use crate::error::{OcrBatchError, TransportError};
use async_trait::async_trait;
use reqwest::Url;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Header carrying the API key on every call.
pub const API_KEY_HEADER: &str = "api-key";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// A file sent as one multipart form field.
#[derive(Debug, Clone)]
pub struct FilePart {
    pub field: String,
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub enum RequestBody {
    Empty,
    Json(serde_json::Value),
    Multipart(FilePart),
}

/// One call against the service, relative to the configured endpoint.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub segments: Vec<String>,
    pub body: RequestBody,
    pub timeout: Duration,
}

impl ApiRequest {
    pub fn get(segments: Vec<String>, timeout: Duration) -> Self {
        Self {
            method: Method::Get,
            segments,
            body: RequestBody::Empty,
            timeout,
        }
    }

    pub fn post(segments: Vec<String>, body: RequestBody, timeout: Duration) -> Self {
        Self {
            method: Method::Post,
            segments,
            body,
            timeout,
        }
    }

    /// Path for logs: segments joined with `/`.
    pub fn path(&self) -> String {
        self.segments.join("/")
    }
}

/// Status and raw body of an answered call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

/// Anything that can carry an [`ApiRequest`] to the service.
///
/// Implementations must be `Send + Sync`: one transport is shared by every
/// stage of a run through an `Arc`.
#[async_trait]
pub trait OcrTransport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<HttpResponse, TransportError>;
}

/// Production transport backed by a single pooled `reqwest::Client`.
pub struct ReqwestTransport {
    client: reqwest::Client,
    base: Url,
    api_key: String,
}

impl ReqwestTransport {
    pub fn new(endpoint: &str, api_key: impl Into<String>) -> Result<Self, OcrBatchError> {
        let base = Url::parse(endpoint)
            .map_err(|e| OcrBatchError::Config(format!("invalid endpoint '{endpoint}': {e}")))?;
        if base.cannot_be_a_base() {
            return Err(OcrBatchError::Config(format!(
                "endpoint '{endpoint}' cannot carry a path"
            )));
        }
        let client = reqwest::Client::builder()
            .user_agent(concat!("pero-batch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| OcrBatchError::Internal(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            base,
            api_key: api_key.into(),
        })
    }

    /// Endpoint joined with percent-encoded `segments`.
    pub fn url_for(&self, segments: &[String]) -> Result<Url, TransportError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| TransportError::InvalidUrl {
                detail: format!("'{}' cannot carry a path", self.base),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

#[async_trait]
impl OcrTransport for ReqwestTransport {
    async fn send(&self, request: ApiRequest) -> Result<HttpResponse, TransportError> {
        let url = self.url_for(&request.segments)?;
        debug!("{:?} {}", request.method, url);

        let builder = match request.method {
            Method::Get => self.client.get(url),
            Method::Post => self.client.post(url),
        }
        .header(API_KEY_HEADER, &self.api_key)
        .timeout(request.timeout);

        let builder = match request.body {
            RequestBody::Empty => builder.header(reqwest::header::CONTENT_TYPE, "application/json"),
            RequestBody::Json(value) => builder.json(&value),
            RequestBody::Multipart(part) => {
                let file = reqwest::multipart::Part::bytes(part.bytes)
                    .file_name(part.file_name)
                    .mime_str(&part.mime_type)
                    .map_err(|e| TransportError::Connection {
                        detail: format!("invalid mime type: {e}"),
                    })?;
                builder.multipart(reqwest::multipart::Form::new().part(part.field, file))
            }
        };

        let secs = request.timeout.as_secs();
        let response = builder.send().await.map_err(|e| map_reqwest_error(e, secs))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| map_reqwest_error(e, secs))?;

        Ok(HttpResponse {
            status,
            body: body.to_vec(),
        })
    }
}

fn map_reqwest_error(e: reqwest::Error, secs: u64) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout { secs }
    } else {
        TransportError::Connection {
            detail: e.to_string(),
        }
    }
}

/// Use the configured transport, or build the reqwest one from endpoint + key.
pub fn resolve_transport(config: &BatchConfig) -> Result<Arc<dyn OcrTransport>, OcrBatchError> {
    if let Some(ref transport) = config.transport {
        return Ok(Arc::clone(transport));
    }
    if config.api_key.trim().is_empty() {
        return Err(OcrBatchError::Config(
            "API key is empty; set pero.api_key in ~/.ocrtools.yml or pass --api-key".into(),
        ));
    }
    Ok(Arc::new(ReqwestTransport::new(
        &config.endpoint,
        config.api_key.clone(),
    )?))
}
