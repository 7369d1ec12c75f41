//! Request creation: announce every key and obtain the request id.
//!
//! A failed submission is fatal: without a request id there is nothing to
//! upload into. No retries happen here.

use crate::api::{self, ProcessingRequestBody, ProcessingRequestResponse, OP_CREATE, STATUS_SUCCESS};
use crate::config::BatchConfig;
use crate::error::OcrBatchError;
use crate::model::{BatchRequest, ImageAsset};
use crate::transport::{ApiRequest, OcrTransport, RequestBody};
use tracing::{debug, info};

/// Create a remote processing request for `assets` on the configured engine.
pub async fn create_request(
    transport: &dyn OcrTransport,
    config: &BatchConfig,
    assets: &[ImageAsset],
) -> Result<BatchRequest, OcrBatchError> {
    let body = ProcessingRequestBody::new(config.engine_id, assets.iter().map(|a| a.key.as_str()));
    let keys: Vec<String> = body.images.keys().cloned().collect();
    let json = serde_json::to_value(&body).map_err(|e| OcrBatchError::Internal(format!("request body: {e}")))?;

    debug!(
        "Creating request on engine {} with {} images",
        config.engine_id,
        keys.len()
    );

    let request = ApiRequest::post(
        api::create_path(),
        RequestBody::Json(json),
        config.request_timeout(),
    );
    let response = transport
        .send(request)
        .await
        .map_err(|e| OcrBatchError::transport(OP_CREATE, e))?;

    match response.status {
        200 => {}
        404 => {
            return Err(OcrBatchError::EngineNotFound {
                engine_id: config.engine_id,
            })
        }
        422 => {
            return Err(OcrBatchError::InvalidSubmission {
                message: api::error_message(&response.body)
                    .unwrap_or_else(|| "bad JSON data".to_string()),
            })
        }
        status => {
            return Err(OcrBatchError::UnexpectedStatus {
                operation: OP_CREATE,
                status,
            })
        }
    }

    let parsed: ProcessingRequestResponse = api::decode_json(OP_CREATE, &response.body)?;
    if parsed.status != STATUS_SUCCESS {
        return Err(OcrBatchError::ServiceRejected {
            operation: OP_CREATE,
            status: parsed.status,
            message: parsed.message,
        });
    }
    let request_id = parsed
        .request_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| OcrBatchError::decode(OP_CREATE, "success answer without request_id"))?;

    info!("Created request {} ({} images)", request_id, keys.len());

    Ok(BatchRequest {
        request_id,
        engine_id: config.engine_id,
        keys,
    })
}
