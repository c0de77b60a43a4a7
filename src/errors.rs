use crate::services::{object_store::StoreError, transform::TransformError};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;
use thiserror::Error;

/// Request-level failures of the resize flow.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("malformed request path: {0}")]
    MalformedRequest(String),
    #[error("source object `{key}` not found in bucket `{bucket}`")]
    SourceNotFound { bucket: String, key: String },
    #[error("object store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),
    #[error("transform failed: {0}")]
    TransformFailure(#[from] TransformError),
    #[error("internal error: {0}")]
    Internal(String),
}

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    /// Shortcut for 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<ProxyError> for AppError {
    fn from(err: ProxyError) -> Self {
        match err {
            ProxyError::MalformedRequest(_) => AppError::bad_request(err.to_string()),
            ProxyError::SourceNotFound { .. } => AppError::not_found(err.to_string()),
            // Store and codec details stay in the logs.
            ProxyError::StoreUnavailable(_) => AppError::internal("object store unavailable"),
            ProxyError::TransformFailure(_) => AppError::internal("image transform failed"),
            ProxyError::Internal(_) => AppError::internal("internal server error"),
        }
    }
}
