use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::pipeline::PipelineError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// HTTP status for a failed run. Upstream failures are 5xx, caller mistakes 4xx.
pub fn pipeline_status(error: &PipelineError) -> StatusCode {
    match error {
        PipelineError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        PipelineError::RevisionLimitExceeded { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        PipelineError::TransientExternal { .. } => StatusCode::SERVICE_UNAVAILABLE,
        PipelineError::NonRetryableExternal { .. } => StatusCode::BAD_GATEWAY,
        PipelineError::RunTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        PipelineError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::Pipeline(e) => {
                let status = pipeline_status(e);
                if status.is_server_error() {
                    tracing::error!("Pipeline error: {e}");
                }
                (status, e.code(), e.public_message())
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
