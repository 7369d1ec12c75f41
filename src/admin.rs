//! Administrative calls that sit outside a batch run.

use crate::api::{self, EnginesResponse, OP_CANCEL, OP_ENGINES, STATUS_SUCCESS};
use crate::config::BatchConfig;
use crate::error::OcrBatchError;
use crate::model::EngineDescriptor;
use crate::transport::{resolve_transport, ApiRequest, RequestBody};
use tracing::info;

/// Ask the service to cancel `request_id`.
pub async fn cancel_request(config: &BatchConfig, request_id: &str) -> Result<(), OcrBatchError> {
    let transport = resolve_transport(config)?;
    let request = ApiRequest::post(
        api::cancel_path(request_id),
        RequestBody::Empty,
        config.request_timeout(),
    );
    let response = transport
        .send(request)
        .await
        .map_err(|e| OcrBatchError::transport(OP_CANCEL, e))?;

    match response.status {
        200 => {
            info!("Cancelled request {}", request_id);
            Ok(())
        }
        404 => Err(OcrBatchError::RequestNotFound {
            request_id: request_id.to_string(),
        }),
        401 | 403 => Err(OcrBatchError::RequestNotOwned {
            request_id: request_id.to_string(),
        }),
        status => Err(OcrBatchError::UnexpectedStatus {
            operation: OP_CANCEL,
            status,
        }),
    }
}

/// Engines available to the configured API key, ordered by id.
pub async fn list_engines(config: &BatchConfig) -> Result<Vec<EngineDescriptor>, OcrBatchError> {
    let transport = resolve_transport(config)?;
    let response = transport
        .send(ApiRequest::get(api::engines_path(), config.request_timeout()))
        .await
        .map_err(|e| OcrBatchError::transport(OP_ENGINES, e))?;

    if !response.is_ok() {
        return Err(OcrBatchError::UnexpectedStatus {
            operation: OP_ENGINES,
            status: response.status,
        });
    }

    let parsed: EnginesResponse = api::decode_json(OP_ENGINES, &response.body)?;
    if parsed.status != STATUS_SUCCESS {
        return Err(OcrBatchError::ServiceRejected {
            operation: OP_ENGINES,
            status: parsed.status,
            message: parsed.message,
        });
    }
    Ok(parsed.into_descriptors())
}
