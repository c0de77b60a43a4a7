//! In-process object store for local development and tests.

use super::object_store::{ObjectStore, StoreError, StoreResult};
use crate::models::object::{ObjectMetadata, StoredObject};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<(String, String), StoredObject>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub async fn object_count(&self) -> usize {
        self.objects.read().await.len()
    }

    /// Store an object with exactly the given metadata.
    #[cfg(test)]
    pub async fn insert(&self, bucket: &str, key: &str, object: StoredObject) {
        self.objects
            .write()
            .await
            .insert((bucket.to_string(), key.to_string()), object);
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get(&self, bucket: &str, key: &str) -> StoreResult<StoredObject> {
        self.objects
            .read()
            .await
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::not_found(bucket, key))
    }

    async fn stat(&self, bucket: &str, key: &str) -> StoreResult<ObjectMetadata> {
        self.get(bucket, key).await.map(|object| object.metadata)
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> StoreResult<()> {
        let metadata = ObjectMetadata::new(Some(content_type), body.len() as i64, Utc::now());
        self.objects.write().await.insert(
            (bucket.to_string(), key.to_string()),
            StoredObject::new(body, metadata),
        );
        Ok(())
    }
}
