//! Fixed diagnostic endpoints, answered before any store access.
//!
//! - GET /favicon.ico  -> empty 200
//! - GET /health-check -> plain-text "OK"

use axum::{http::StatusCode, response::IntoResponse};

/// `GET /favicon.ico`
///
/// Browsers ask for this on every page; answer without touching the store.
pub async fn favicon() -> impl IntoResponse {
    StatusCode::OK
}

/// `GET /health-check`
///
/// Liveness probe. Cheap and never performs I/O.
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
