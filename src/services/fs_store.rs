//! src/services/fs_store.rs
//!
//! FsObjectStore: object-store backend for single-node deployments. Metadata
//! lives in SQLite, payloads on local disk sharded beneath
//! `base_path/{bucket}/{shard}/{shard}/{key}`.

use super::object_store::{ObjectStore, StoreError, StoreResult};
use crate::models::object::{ObjectMetadata, StoredObject};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

/// Schema applied by [`FsObjectStore::migrate`].
const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

const MAX_OBJECT_KEY_LEN: usize = 1024;
const BUCKET_NAME_MIN_LEN: usize = 3;
const BUCKET_NAME_MAX_LEN: usize = 63;

#[derive(FromRow, Debug)]
struct ObjectRecord {
    content_type: Option<String>,
    size_bytes: i64,
    last_modified: DateTime<Utc>,
}

impl From<ObjectRecord> for ObjectMetadata {
    fn from(record: ObjectRecord) -> Self {
        ObjectMetadata::new(
            record.content_type.as_deref(),
            record.size_bytes,
            record.last_modified,
        )
    }
}

/// Local object store:
/// - `put` writes bytes to disk atomically and upserts metadata
/// - `get` reads metadata from SQLite and payload from disk
/// - `stat` reads metadata only
#[derive(Clone)]
pub struct FsObjectStore {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where object payloads are stored.
    pub base_path: PathBuf,
}

impl FsObjectStore {
    /// Create a new store backed by the provided SQLite pool and using
    /// `base_path` as the root directory for object payloads.
    pub fn new(db: Arc<SqlitePool>, base_path: impl Into<PathBuf>) -> Self {
        Self {
            db,
            base_path: base_path.into(),
        }
    }

    /// Apply the embedded schema. Idempotent.
    pub async fn migrate(&self) -> StoreResult<()> {
        let statements = SCHEMA
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        tracing::info!("Running {} migration statements...", statements.len());

        for stmt in statements {
            debug!("Executing migration SQL: {}", stmt);
            sqlx::query(stmt).execute(&*self.db).await?;
        }
        Ok(())
    }

    /// Basic key validation to avoid trivial path traversal vectors.
    fn ensure_key_safe(key: &str) -> StoreResult<()> {
        let unsafe_key = key.is_empty()
            || key.len() > MAX_OBJECT_KEY_LEN
            || key.starts_with('/')
            || key.split('/').any(|segment| segment == "..")
            || key
                .bytes()
                .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0');

        if unsafe_key {
            Err(StoreError::InvalidKey(key.to_string()))
        } else {
            Ok(())
        }
    }

    /// Validate bucket name format.
    ///
    /// Enforces S3-like naming rules:
    /// - 3–63 characters
    /// - lowercase letters, digits, dots, hyphens only
    /// - cannot start/end with dot or hyphen
    /// - cannot contain consecutive dots or dot-hyphen patterns
    /// - cannot look like an IPv4 address
    fn ensure_bucket_name_safe(name: &str) -> StoreResult<()> {
        let invalid = |reason: &str| {
            Err(StoreError::InvalidBucketName {
                name: name.to_string(),
                reason: reason.into(),
            })
        };

        let len = name.len();
        if !(BUCKET_NAME_MIN_LEN..=BUCKET_NAME_MAX_LEN).contains(&len) {
            return invalid("must be between 3 and 63 characters");
        }
        if !name
            .chars()
            .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '.' | '-'))
        {
            return invalid("allowed characters are lowercase letters, digits, dots, and hyphens");
        }
        if name.starts_with(['.', '-']) || name.ends_with(['.', '-']) {
            return invalid("must start and end with a lowercase letter or digit");
        }
        if name.contains("..") || name.contains("-.") || name.contains(".-") {
            return invalid("cannot contain consecutive dots or dot-hyphen combinations");
        }
        if is_ipv4_like(name) {
            return invalid("must not be formatted like an IP address");
        }
        Ok(())
    }

    /// Keys and buckets that fail validation can never have been written.
    fn ensure_readable(bucket: &str, key: &str) -> StoreResult<()> {
        match Self::ensure_bucket_name_safe(bucket).and_then(|_| Self::ensure_key_safe(key)) {
            Ok(()) => Ok(()),
            Err(err) => {
                debug!("treating unreadable {}/{} as missing: {}", bucket, key, err);
                Err(StoreError::not_found(bucket, key))
            }
        }
    }

    /// Generate two-level shard identifiers for an object key.
    ///
    /// Uses MD5(bucket/key) and returns the first two bytes as lowercase
    /// hexadecimal strings (00–ff). Reduces file count per directory.
    fn object_shards(bucket: &str, key: &str) -> (String, String) {
        let digest = md5::compute(format!("{}/{}", bucket, key));
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    /// Combines base_path/bucket/{shard}/{shard}/{key}.
    /// Parent directories may not exist yet.
    fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(bucket, key);
        let mut path = self.base_path.clone();
        path.push(bucket);
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    async fn fetch_record(&self, bucket: &str, key: &str) -> StoreResult<ObjectRecord> {
        sqlx::query_as::<_, ObjectRecord>(
            "SELECT content_type, size_bytes, last_modified
             FROM objects WHERE bucket = ? AND key = ?",
        )
        .bind(bucket)
        .bind(key)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => StoreError::not_found(bucket, key),
            other => StoreError::Sqlx(other),
        })
    }

    /// Write `body` to a temp file, fsync, then rename into place.
    /// The temp name is unique per call so concurrent writers never collide.
    async fn write_payload(&self, file_path: &Path, body: &[u8]) -> StoreResult<()> {
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            StoreError::Io(io::Error::new(
                ErrorKind::Other,
                "object path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));

        let written = async {
            let mut file = File::create(&tmp_path).await?;
            file.write_all(body).await?;
            file.flush().await?;
            file.sync_all().await
        }
        .await;
        if let Err(err) = written {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(err));
        }

        if let Err(err) = fs::rename(&tmp_path, file_path).await {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(file_path).await?;
                fs::rename(&tmp_path, file_path).await?;
            } else {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StoreError::Io(err));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn get(&self, bucket: &str, key: &str) -> StoreResult<StoredObject> {
        Self::ensure_readable(bucket, key)?;
        let metadata: ObjectMetadata = self.fetch_record(bucket, key).await?.into();

        let file_path = self.object_path(bucket, key);
        let body = fs::read(&file_path).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                StoreError::not_found(bucket, key)
            } else {
                StoreError::Io(err)
            }
        })?;

        Ok(StoredObject::new(Bytes::from(body), metadata))
    }

    async fn stat(&self, bucket: &str, key: &str) -> StoreResult<ObjectMetadata> {
        Self::ensure_readable(bucket, key)?;
        Ok(self.fetch_record(bucket, key).await?.into())
    }

    /// Last write wins: the metadata row is upserted after the payload lands.
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> StoreResult<()> {
        Self::ensure_bucket_name_safe(bucket)?;
        Self::ensure_key_safe(key)?;

        let file_path = self.object_path(bucket, key);
        self.write_payload(&file_path, &body).await?;

        sqlx::query(
            r#"
            INSERT INTO objects (bucket, key, content_type, size_bytes, last_modified)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(bucket, key) DO UPDATE SET
                content_type = excluded.content_type,
                size_bytes = excluded.size_bytes,
                last_modified = excluded.last_modified
            "#,
        )
        .bind(bucket)
        .bind(key)
        .bind(content_type)
        .bind(body.len() as i64)
        .bind(Utc::now())
        .execute(&*self.db)
        .await?;

        debug!("stored {}/{} ({} bytes)", bucket, key, body.len());
        Ok(())
    }
}

/// Check if a string matches IPv4-like dotted decimal form.
/// Rejects names formatted like `1.2.3.4`.
fn is_ipv4_like(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() == 4
        && parts.iter().all(|segment| {
            !segment.is_empty()
                && segment.len() <= 3
                && segment.chars().all(|c| c.is_ascii_digit())
                && segment.parse::<u8>().is_ok()
        })
}
