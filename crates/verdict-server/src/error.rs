//! Server error types

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;
use verdict_core::FieldError;
use verdict_runtime::RuntimeError;

/// Server error type
#[derive(Debug)]
pub enum ServerError {
    /// Input rejected before evaluation; carries field-level messages
    Validation(Vec<FieldError>),

    /// Unknown route parameter (e.g. refresh source)
    NotFound(String),

    /// Anything the caller cannot act on; details stay in the logs
    Internal(String),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerError::Validation(errors) => write!(f, "validation failed: {} fields", errors.len()),
            ServerError::NotFound(what) => write!(f, "not found: {}", what),
            ServerError::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl std::error::Error for ServerError {}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        match self {
            ServerError::Validation(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({
                    "success": false,
                    "error": { "code": "validation_failed", "fields": errors },
                })),
            )
                .into_response(),
            ServerError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                Json(json!({
                    "success": false,
                    "error": { "code": "not_found", "message": what },
                })),
            )
                .into_response(),
            ServerError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "success": false,
                        "error": { "code": "internal_error" },
                    })),
                )
                    .into_response()
            }
        }
    }
}

impl From<RuntimeError> for ServerError {
    fn from(err: RuntimeError) -> Self {
        match err {
            RuntimeError::InvalidInput(errors) => ServerError::Validation(errors),
            other => ServerError::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_input_maps_to_validation() {
        let err: ServerError =
            RuntimeError::InvalidInput(vec![FieldError::new("input", "missing")]).into();
        assert!(matches!(err, ServerError::Validation(_)));
    }

    #[test]
    fn test_store_error_maps_to_internal() {
        let err: ServerError = RuntimeError::Store("connection reset".to_string()).into();
        assert!(matches!(err, ServerError::Internal(_)));
    }
}
