//! Defines routes for the resize proxy.
//!
//! ## Structure
//! - **Diagnostics** (no store access)
//!   - `GET /favicon.ico`: empty 200
//!   - `GET /health-check`: plain-text `OK`
//!
//! - **Images**
//!   - `GET /{bucket}/{options}/{*object}`, or `/{options}/{*object}` when the
//!     bucket comes from the Host header
//!
//! Anything else is a malformed request (400).

use crate::{
    handlers::{
        health_handlers::{favicon, health_check},
        resize_handlers::{resize_image, unmatched_path},
    },
    services::resize_service::ResizeService,
};
use axum::{Router, routing::get};

/// Build and return the router.
///
/// The router carries shared state (`ResizeService`) to all handlers.
pub fn routes() -> Router<ResizeService> {
    Router::new()
        .route("/favicon.ico", get(favicon))
        .route("/health-check", get(health_check))
        .route("/{*path}", get(resize_image))
        .fallback(unmatched_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::object::{ObjectMetadata, StoredObject},
        services::{
            object_store::ObjectStore,
            reporter::FailureReporter,
            resize_service::ResizeSettings,
            transform::Transformer,
        },
        test_support::{CountingStore, PanickingTransformer, RecordingReporter, StubTransformer},
    };
    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode, header},
        response::Response,
    };
    use chrono::Utc;
    use std::sync::{Arc, atomic::Ordering};
    use tower::ServiceExt;

    struct App {
        router: Router,
        service: ResizeService,
        store: Arc<CountingStore>,
        reporter: Arc<RecordingReporter>,
    }

    async fn app_with(transformer: Arc<dyn Transformer>) -> App {
        let store = Arc::new(CountingStore::new());
        store
            .seed("images", "folder/photo.jpg", b"original", "image/jpeg")
            .await;
        let reporter = Arc::new(RecordingReporter::default());
        let service = ResizeService::new(
            store.clone(),
            transformer,
            reporter.clone() as Arc<dyn FailureReporter>,
            ResizeSettings {
                cache_control: Some("public, max-age=60".into()),
                ..ResizeSettings::default()
            },
        );
        App {
            router: routes().with_state(service.clone()),
            service,
            store,
            reporter,
        }
    }

    async fn app() -> App {
        app_with(Arc::new(StubTransformer::new())).await
    }

    async fn send(router: &Router, method: Method, uri: &str) -> Response {
        router
            .clone()
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    async fn get(router: &Router, uri: &str) -> Response {
        send(router, Method::GET, uri).await
    }

    fn header_str<'a>(resp: &'a Response, name: &str) -> &'a str {
        resp.headers().get(name).unwrap().to_str().unwrap()
    }

    #[tokio::test]
    async fn health_check_and_favicon_skip_the_store() {
        let app = app().await;

        let resp = get(&app.router, "/health-check").await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(&to_bytes(resp.into_body(), usize::MAX).await.unwrap()[..], b"OK");

        let resp = get(&app.router, "/favicon.ico").await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(to_bytes(resp.into_body(), usize::MAX).await.unwrap().is_empty());

        assert_eq!(app.store.total_calls(), 0);
    }

    #[tokio::test]
    async fn malformed_paths_are_bad_requests() {
        let app = app().await;

        for uri in ["/onlyonesegment", "/images/200x", "/"] {
            let resp = get(&app.router, uri).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{uri}");
        }
        assert_eq!(app.store.total_calls(), 0);
    }

    #[tokio::test]
    async fn miss_serves_transformed_image_then_backfills() {
        let app = app().await;
        let expected = StubTransformer::output(b"original", "200x,q80");

        let resp = get(&app.router, "/images/200x,q80/folder/photo.jpg").await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(header_str(&resp, "x-cache"), "MISS");
        assert_eq!(header_str(&resp, "content-type"), "image/jpeg");
        assert_eq!(
            header_str(&resp, "content-length"),
            expected.len().to_string()
        );
        assert_eq!(header_str(&resp, "cache-control"), "public, max-age=60");
        assert!(header_str(&resp, "last-modified").ends_with(" GMT"));

        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body, expected);

        app.service.drain_backfills().await;
        let cached = app
            .store
            .inner
            .get("images", "_cache/folder/200x,q80/photo.jpg")
            .await
            .unwrap();
        assert_eq!(cached.body, expected);
        assert_eq!(app.store.puts.load(Ordering::SeqCst), 1);

        let resp = get(&app.router, "/images/q80,200x/folder/photo.jpg").await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(header_str(&resp, "x-cache"), "HIT");
        assert_eq!(
            header_str(&resp, "content-length"),
            expected.len().to_string()
        );
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body, expected);
    }

    #[tokio::test]
    async fn content_length_follows_the_served_body() {
        let app = app().await;
        let expected = StubTransformer::output(b"original", "200x");
        // Stored metadata claims a different size than the payload.
        let metadata = ObjectMetadata::new(Some("image/jpeg"), 1, Utc::now());
        app.store
            .inner
            .insert(
                "images",
                "_cache/folder/200x/photo.jpg",
                StoredObject::new(expected.clone(), metadata),
            )
            .await;

        let resp = get(&app.router, "/images/200x/folder/photo.jpg").await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(header_str(&resp, "x-cache"), "HIT");
        assert_eq!(
            header_str(&resp, "content-length"),
            expected.len().to_string()
        );
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body, expected);
    }

    #[tokio::test]
    async fn missing_source_is_404_without_cache_write() {
        let app = app().await;

        let resp = get(&app.router, "/images/200x/nope.jpg").await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        app.service.drain_backfills().await;
        assert_eq!(app.store.puts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn transform_failure_is_500_without_cache_write() {
        let app = app_with(Arc::new(StubTransformer::failing())).await;

        let resp = get(&app.router, "/images/200x/folder/photo.jpg").await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        app.service.drain_backfills().await;
        assert_eq!(app.store.puts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn panics_become_500_and_are_reported() {
        let app = app_with(Arc::new(PanickingTransformer)).await;

        let resp = get(&app.router, "/images/200x/folder/photo.jpg").await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(app.reporter.operations(), vec!["resize"]);

        // The service keeps answering.
        let resp = get(&app.router, "/health-check").await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn only_get_is_served() {
        let app = app().await;

        let resp = send(&app.router, Method::POST, "/images/200x/folder/photo.jpg").await;
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(app.store.total_calls(), 0);
    }

    #[tokio::test]
    async fn host_mode_reads_bucket_from_host_header() {
        let store = Arc::new(CountingStore::new());
        store
            .seed("images.example.com", "a/b.png", b"png", "image/png")
            .await;
        let service = ResizeService::new(
            store.clone(),
            Arc::new(StubTransformer::new()),
            Arc::new(RecordingReporter::default()),
            ResizeSettings {
                bucket_source: crate::config::BucketSource::Host,
                ..ResizeSettings::default()
            },
        );
        let router = routes().with_state(service);

        let resp = router
            .oneshot(
                Request::builder()
                    .uri("/100/a/b.png")
                    .header(header::HOST, "images.example.com:8080")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(header_str(&resp, "content-type"), "image/png");
    }
}
