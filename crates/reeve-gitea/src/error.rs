//! Plugin and API error handling.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use reeve_core::secret::SecretError;
use reeve_scheduler::{ScanError, ScanQueueError};
use serde_json::json;
use thiserror::Error;

/// Errors raised while handling engine requests.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("invalid git trigger: {0}")]
    InvalidTrigger(String),

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("unknown method {0}")]
    UnknownMethod(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("scan failed: {0}")]
    Scan(#[from] ScanError),

    #[error("scan queue: {0}")]
    Queue(#[from] ScanQueueError),

    #[error("encryption failed: {0}")]
    Secret(#[from] SecretError),

    #[error(transparent)]
    Host(#[from] reeve_core::Error),
}

/// API error type.
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Unauthorized(String),
    Unavailable(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

impl From<PluginError> for ApiError {
    fn from(err: PluginError) -> Self {
        match err {
            PluginError::InvalidTrigger(_)
            | PluginError::InvalidMessage(_)
            | PluginError::UnknownMethod(_)
            | PluginError::InvalidArguments(_) => ApiError::BadRequest(err.to_string()),
            PluginError::Queue(ScanQueueError::Closed) => ApiError::Unavailable(err.to_string()),
            PluginError::Host(reeve_core::Error::NotFound(msg)) => ApiError::NotFound(msg),
            PluginError::Host(reeve_core::Error::InvalidInput(msg)) => ApiError::BadRequest(msg),
            _ => ApiError::Internal(err.to_string()),
        }
    }
}
