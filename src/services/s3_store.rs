//! S3 (or S3-compatible) object-store backend.

use super::object_store::{ObjectStore, StoreError, StoreResult};
use crate::models::object::{ObjectMetadata, StoredObject};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    Client,
    config::Region,
    error::DisplayErrorContext,
    primitives::{ByteStream, DateTime as AwsDateTime},
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Shared, concurrency-safe S3 client wrapper.
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Arc<Client>,
}

impl S3ObjectStore {
    pub fn new(client: Client) -> Self {
        Self {
            client: Arc::new(client),
        }
    }

    /// Build a client from the default AWS credential chain.
    ///
    /// A custom `endpoint` switches to path-style addressing so MinIO and
    /// other S3-compatible stores work.
    pub async fn connect(endpoint: Option<&str>, region: Option<&str>) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(Region::new(region.to_string()));
        }
        let shared = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self::new(Client::from_conf(builder.build()))
    }
}

fn backend_error(err: impl std::error::Error) -> StoreError {
    StoreError::Backend(DisplayErrorContext(err).to_string())
}

fn to_chrono(ts: Option<&AwsDateTime>) -> DateTime<Utc> {
    ts.and_then(|t| DateTime::from_timestamp(t.secs(), t.subsec_nanos()))
        .unwrap_or_else(Utc::now)
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn get(&self, bucket: &str, key: &str) -> StoreResult<StoredObject> {
        let output = match self.client.get_object().bucket(bucket).key(key).send().await {
            Ok(output) => output,
            Err(err) if err.as_service_error().is_some_and(|e| e.is_no_such_key()) => {
                return Err(StoreError::not_found(bucket, key));
            }
            Err(err) => return Err(backend_error(err)),
        };

        let metadata = ObjectMetadata::new(
            output.content_type(),
            output.content_length().unwrap_or_default(),
            to_chrono(output.last_modified()),
        );
        let body = output.body.collect().await.map_err(backend_error)?.into_bytes();

        Ok(StoredObject::new(body, metadata))
    }

    async fn stat(&self, bucket: &str, key: &str) -> StoreResult<ObjectMetadata> {
        let output = match self.client.head_object().bucket(bucket).key(key).send().await {
            Ok(output) => output,
            Err(err) if err.as_service_error().is_some_and(|e| e.is_not_found()) => {
                return Err(StoreError::not_found(bucket, key));
            }
            Err(err) => return Err(backend_error(err)),
        };

        Ok(ObjectMetadata::new(
            output.content_type(),
            output.content_length().unwrap_or_default(),
            to_chrono(output.last_modified()),
        ))
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> StoreResult<()> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(backend_error)?;
        Ok(())
    }
}
