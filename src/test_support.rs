//! Stub collaborators shared by unit tests.

use crate::{
    models::{
        object::{ObjectMetadata, StoredObject},
        options::TransformSpec,
    },
    services::{
        memory_store::MemoryObjectStore,
        object_store::{ObjectStore, StoreError, StoreResult},
        reporter::FailureReporter,
        transform::{TransformError, Transformer},
    },
};
use async_trait::async_trait;
use bytes::Bytes;
use std::{
    error::Error,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

/// Memory store that counts calls and can inject faults.
#[derive(Default)]
pub struct CountingStore {
    pub inner: MemoryObjectStore,
    pub gets: AtomicUsize,
    pub stats: AtomicUsize,
    pub puts: AtomicUsize,
    fail_gets_under: Option<String>,
    fail_stats: bool,
    fail_puts: bool,
}

impl CountingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail `get` for keys starting with `prefix`.
    pub fn failing_gets_under(mut self, prefix: &str) -> Self {
        self.fail_gets_under = Some(prefix.to_string());
        self
    }

    pub fn failing_stats(mut self) -> Self {
        self.fail_stats = true;
        self
    }

    pub fn failing_puts(mut self) -> Self {
        self.fail_puts = true;
        self
    }

    /// Write directly to the backing store without touching counters.
    pub async fn seed(&self, bucket: &str, key: &str, body: &'static [u8], content_type: &str) {
        self.inner
            .put(bucket, key, Bytes::from_static(body), content_type)
            .await
            .unwrap();
    }

    pub fn total_calls(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
            + self.stats.load(Ordering::SeqCst)
            + self.puts.load(Ordering::SeqCst)
    }
}

fn injected() -> StoreError {
    StoreError::Backend("injected fault".into())
}

#[async_trait]
impl ObjectStore for CountingStore {
    async fn get(&self, bucket: &str, key: &str) -> StoreResult<StoredObject> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if self
            .fail_gets_under
            .as_deref()
            .is_some_and(|prefix| key.starts_with(prefix))
        {
            return Err(injected());
        }
        self.inner.get(bucket, key).await
    }

    async fn stat(&self, bucket: &str, key: &str) -> StoreResult<ObjectMetadata> {
        self.stats.fetch_add(1, Ordering::SeqCst);
        if self.fail_stats {
            return Err(injected());
        }
        self.inner.stat(bucket, key).await
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> StoreResult<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if self.fail_puts {
            return Err(injected());
        }
        self.inner.put(bucket, key, body, content_type).await
    }
}

/// Deterministic transform: tags the source with the canonical options.
#[derive(Default)]
pub struct StubTransformer {
    pub calls: AtomicUsize,
    fail: bool,
}

impl StubTransformer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn output(source: &[u8], canonical: &str) -> Bytes {
        let mut out = format!("resized[{canonical}]:").into_bytes();
        out.extend_from_slice(source);
        Bytes::from(out)
    }
}

#[async_trait]
impl Transformer for StubTransformer {
    async fn transform(&self, source: Bytes, spec: &TransformSpec) -> Result<Bytes, TransformError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(TransformError::InvalidRotation(spec.rotation_degrees));
        }
        Ok(Self::output(&source, &spec.canonical()))
    }
}

/// Transformer that panics, for boundary recovery tests.
pub struct PanickingTransformer;

#[async_trait]
impl Transformer for PanickingTransformer {
    async fn transform(&self, _source: Bytes, _spec: &TransformSpec) -> Result<Bytes, TransformError> {
        panic!("transform blew up");
    }
}

/// Collects reported operation names.
#[derive(Default)]
pub struct RecordingReporter {
    reports: Mutex<Vec<(&'static str, String)>>,
}

impl RecordingReporter {
    pub fn operations(&self) -> Vec<&'static str> {
        self.reports
            .lock()
            .unwrap()
            .iter()
            .map(|(op, _)| *op)
            .collect()
    }
}

impl FailureReporter for RecordingReporter {
    fn report(&self, operation: &'static str, context: &str, _error: &(dyn Error + 'static)) {
        self.reports
            .lock()
            .unwrap()
            .push((operation, context.to_string()));
    }
}
