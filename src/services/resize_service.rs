//! src/services/resize_service.rs
//!
//! ResizeService: cache-aside orchestration over the object store.
//!
//! ```text
//! request ─► derive key ─► cache get ─┬─ hit ──────────────────────► serve
//!                                     └─ miss ─► origin get ─► transform ─► serve ─► backfill
//! ```
//!
//! Cache lookup failures degrade to a miss. Origin and transform failures end
//! the request. Backfill runs after the response has been handed off, on its
//! own task, and only ever reports its failures.

use super::{
    object_store::ObjectStore,
    reporter::FailureReporter,
    transform::Transformer,
};
use crate::{
    config::BucketSource,
    errors::ProxyError,
    models::{
        cache_key::CacheKey,
        object::{ObjectMetadata, StoredObject},
        request::ResizeRequest,
    },
};
use bytes::Bytes;
use std::{future::Future, sync::Arc};
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

/// Where transformed variants are written.
#[derive(Clone, Debug)]
pub struct CacheSettings {
    /// Dedicated cache bucket. `None` keeps variants next to their source.
    pub bucket: Option<String>,

    /// Key prefix for every cached variant.
    pub prefix: String,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            bucket: None,
            prefix: "_cache".into(),
        }
    }
}

impl CacheSettings {
    /// Cache bucket and key for a request. A shared cache bucket namespaces
    /// keys by source bucket so different buckets never collide.
    pub fn locate(&self, req: &ResizeRequest) -> (String, CacheKey) {
        match &self.bucket {
            Some(bucket) => {
                let namespace = format!("{}/{}", self.prefix, req.bucket);
                (
                    bucket.clone(),
                    CacheKey::derive(&namespace, &req.spec, &req.object),
                )
            }
            None => (
                req.bucket.clone(),
                CacheKey::derive(&self.prefix, &req.spec, &req.object),
            ),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ResizeSettings {
    pub bucket_source: BucketSource,
    pub cache: CacheSettings,
    /// `Cache-Control` value attached to image responses.
    pub cache_control: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

/// The bytes to serve, plus the pending cache write on a miss.
pub struct Rendition {
    pub object: StoredObject,
    pub status: CacheStatus,
    pub backfill: Option<Backfill>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackfillOutcome {
    Written,
    /// Another request already populated the key.
    Skipped,
    Failed,
}

/// A cache write scheduled after a successful transform.
pub struct Backfill {
    store: Arc<dyn ObjectStore>,
    reporter: Arc<dyn FailureReporter>,
    tracker: TaskTracker,
    bucket: String,
    key: CacheKey,
    body: Bytes,
    content_type: String,
}

impl Backfill {
    /// Spawn the write once `served` resolves.
    ///
    /// The task is detached from the request: dropping the response or
    /// cancelling the handler does not cancel it.
    pub fn spawn_after<F>(self, served: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let tracker = self.tracker.clone();
        tracker.spawn(async move {
            served.await;
            self.run().await;
        });
    }

    /// Stat, then put only if the key is still missing.
    ///
    /// Stat-then-put is not atomic: two misses may both write. That is
    /// harmless because the transform is deterministic.
    pub async fn run(self) -> BackfillOutcome {
        let key = self.key.as_str();
        match self.store.stat(&self.bucket, key).await {
            Ok(_) => {
                debug!("backfill skipped, {}/{} already cached", self.bucket, key);
                BackfillOutcome::Skipped
            }
            Err(err) if err.is_not_found() => {
                let size = self.body.len();
                match self
                    .store
                    .put(&self.bucket, key, self.body, &self.content_type)
                    .await
                {
                    Ok(()) => {
                        info!("backfill stored {}/{} ({} bytes)", self.bucket, key, size);
                        BackfillOutcome::Written
                    }
                    Err(err) => {
                        self.reporter.report("backfill_put", key, &err);
                        BackfillOutcome::Failed
                    }
                }
            }
            Err(err) => {
                self.reporter.report("backfill_stat", key, &err);
                BackfillOutcome::Failed
            }
        }
    }
}

/// Request orchestrator. Cheap to clone; all collaborators are shared handles.
#[derive(Clone)]
pub struct ResizeService {
    store: Arc<dyn ObjectStore>,
    transformer: Arc<dyn Transformer>,
    reporter: Arc<dyn FailureReporter>,
    settings: Arc<ResizeSettings>,
    backfills: TaskTracker,
}

impl ResizeService {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        transformer: Arc<dyn Transformer>,
        reporter: Arc<dyn FailureReporter>,
        settings: ResizeSettings,
    ) -> Self {
        Self {
            store,
            transformer,
            reporter,
            settings: Arc::new(settings),
            backfills: TaskTracker::new(),
        }
    }

    pub fn settings(&self) -> &ResizeSettings {
        &self.settings
    }

    pub fn reporter(&self) -> &dyn FailureReporter {
        self.reporter.as_ref()
    }

    /// Parse a request path and resize. Server-side failures are reported
    /// before being returned.
    pub async fn serve(&self, path: &str, host: Option<&str>) -> Result<Rendition, ProxyError> {
        let req = ResizeRequest::from_path(path, host, self.settings.bucket_source)?;
        let result = self.resize(&req).await;
        if let Err(err) = &result {
            let client_error = matches!(
                err,
                ProxyError::MalformedRequest(_) | ProxyError::SourceNotFound { .. }
            );
            if !client_error {
                self.reporter.report("resize", path, err);
            }
        }
        result
    }

    /// Cache lookup, then origin fetch and transform on a miss.
    pub async fn resize(&self, req: &ResizeRequest) -> Result<Rendition, ProxyError> {
        let (cache_bucket, key) = self.settings.cache.locate(req);

        match self.store.get(&cache_bucket, key.as_str()).await {
            Ok(object) => {
                debug!("cache hit for {}/{}", cache_bucket, key);
                return Ok(Rendition {
                    object,
                    status: CacheStatus::Hit,
                    backfill: None,
                });
            }
            Err(err) if err.is_not_found() => {
                debug!("cache miss for {}/{}", cache_bucket, key);
            }
            Err(err) => {
                // Never fail a request just because the cache is unreachable.
                self.reporter.report("cache_lookup", key.as_str(), &err);
            }
        }

        let source = self
            .store
            .get(&req.bucket, req.object.raw())
            .await
            .map_err(|err| {
                if err.is_not_found() {
                    ProxyError::SourceNotFound {
                        bucket: req.bucket.clone(),
                        key: req.object.raw().to_string(),
                    }
                } else {
                    ProxyError::StoreUnavailable(err)
                }
            })?;

        let body = self.transformer.transform(source.body, &req.spec).await?;
        let metadata = ObjectMetadata {
            size: body.len() as i64,
            ..source.metadata
        };

        let backfill = Backfill {
            store: self.store.clone(),
            reporter: self.reporter.clone(),
            tracker: self.backfills.clone(),
            bucket: cache_bucket,
            key,
            body: body.clone(),
            content_type: metadata.content_type.clone(),
        };

        Ok(Rendition {
            object: StoredObject::new(body, metadata),
            status: CacheStatus::Miss,
            backfill: Some(backfill),
        })
    }

    /// Wait for every scheduled backfill to finish.
    pub async fn drain_backfills(&self) {
        self.backfills.close();
        self.backfills.wait().await;
        self.backfills.reopen();
    }
}
