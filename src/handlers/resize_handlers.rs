//! HTTP handler for resize requests. Delegates the cache-aside flow to
//! `ResizeService` and turns its result into a response.

use crate::{
    errors::{AppError, ProxyError},
    models::object::ObjectMetadata,
    services::resize_service::{CacheStatus, ResizeService},
};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::Response,
};
use bytes::Bytes;
use futures::{FutureExt, StreamExt, stream};
use std::{any::Any, convert::Infallible, panic::AssertUnwindSafe};
use tokio::sync::oneshot;

/// GET `/{*path}`: serve a transformed image, from cache when possible.
///
/// Panics during handling are caught here, reported, and answered with 500.
pub async fn resize_image(
    State(service): State<ResizeService>,
    Path(path): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let host = headers.get(header::HOST).and_then(|v| v.to_str().ok());

    let rendition = match AssertUnwindSafe(service.serve(&path, host))
        .catch_unwind()
        .await
    {
        Ok(result) => result?,
        Err(panic) => {
            let err = ProxyError::Internal(panic_message(panic.as_ref()));
            service.reporter().report("resize", &path, &err);
            return Err(err.into());
        }
    };

    let content_length = rendition.object.body.len();
    let (body, served) = body_with_completion(rendition.object.body);
    if let Some(backfill) = rendition.backfill {
        backfill.spawn_after(async move {
            // An error means the response was dropped; backfill anyway.
            let _ = served.await;
        });
    }

    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    set_object_headers(
        headers,
        &rendition.object.metadata,
        content_length,
        service.settings().cache_control.as_deref(),
    );
    headers.insert(
        HeaderName::from_static("x-cache"),
        HeaderValue::from_static(match rendition.status {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
        }),
    );

    Ok(response)
}

/// Any path the router cannot place is malformed.
pub async fn unmatched_path() -> AppError {
    ProxyError::MalformedRequest("too few path segments".into()).into()
}

/// A body yielding `payload`, and a receiver that fires once the server has
/// polled the body to its end.
fn body_with_completion(payload: Bytes) -> (Body, oneshot::Receiver<()>) {
    let (tx, rx) = oneshot::channel();
    let data = stream::once(async move { Ok::<_, Infallible>(payload) });
    let done = stream::once(async move {
        let _ = tx.send(());
    })
    .filter_map(|()| async { None::<Result<Bytes, Infallible>> });

    (Body::from_stream(data.chain(done)), rx)
}

/// `Content-Length` is the count of bytes actually served, not the stored size.
fn set_object_headers(
    headers: &mut HeaderMap,
    meta: &ObjectMetadata,
    content_length: usize,
    cache_control: Option<&str>,
) {
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&meta.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );

    if meta.size != content_length as i64 {
        tracing::warn!(
            stored_size = meta.size,
            served_size = content_length,
            "object metadata size disagrees with payload"
        );
    }
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(content_length));

    if let Ok(value) = HeaderValue::from_str(&meta.http_last_modified()) {
        headers.insert(header::LAST_MODIFIED, value);
    }

    if let Some(value) = cache_control.and_then(|v| HeaderValue::from_str(v).ok()) {
        headers.insert(header::CACHE_CONTROL, value);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        format!("panic: {}", msg)
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        format!("panic: {}", msg)
    } else {
        "panic: unknown payload".to_string()
    }
}
