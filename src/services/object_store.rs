//! Object-store client contract shared by every backend.
//!
//! Each operation is independently idempotent. `put` may race with itself on
//! the same key; last write wins, which is fine because payloads for a given
//! key are identical.

use crate::models::object::{ObjectMetadata, StoredObject};
use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object `{key}` not found in bucket `{bucket}`")]
    NotFound { bucket: String, key: String },
    #[error("invalid object key `{0}`")]
    InvalidKey(String),
    #[error("bucket `{name}` invalid: {reason}")]
    InvalidBucketName { name: String, reason: String },
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("object store request failed: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn not_found(bucket: &str, key: &str) -> Self {
        Self::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    }

    /// Missing objects are an expected outcome, everything else is a fault.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Bucket-scoped get/stat/put against a remote or local object store.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Fetch an object's payload and metadata.
    async fn get(&self, bucket: &str, key: &str) -> StoreResult<StoredObject>;

    /// Fetch only an object's metadata.
    async fn stat(&self, bucket: &str, key: &str) -> StoreResult<ObjectMetadata>;

    /// Write (or overwrite) an object.
    async fn put(&self, bucket: &str, key: &str, body: Bytes, content_type: &str)
    -> StoreResult<()>;
}
