//! Objects as seen through the object-store client: a payload plus the
//! metadata the store reports for it.

use bytes::Bytes;
use chrono::{DateTime, Utc};

pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Store-reported metadata, passed through unchanged to HTTP responses.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectMetadata {
    /// Content type (MIME type).
    pub content_type: String,

    /// Size in bytes.
    pub size: i64,

    /// Timestamp when the object was last written.
    pub last_modified: DateTime<Utc>,
}

impl ObjectMetadata {
    pub fn new(content_type: Option<&str>, size: i64, last_modified: DateTime<Utc>) -> Self {
        Self {
            content_type: content_type
                .filter(|ct| !ct.is_empty())
                .unwrap_or(DEFAULT_CONTENT_TYPE)
                .to_string(),
            size,
            last_modified,
        }
    }

    /// `Last-Modified` in IMF-fixdate form, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`.
    pub fn http_last_modified(&self) -> String {
        self.last_modified
            .format("%a, %d %b %Y %H:%M:%S GMT")
            .to_string()
    }
}

/// A fully buffered object body with its metadata.
#[derive(Clone, Debug)]
pub struct StoredObject {
    pub body: Bytes,
    pub metadata: ObjectMetadata,
}

impl StoredObject {
    pub fn new(body: Bytes, metadata: ObjectMetadata) -> Self {
        Self { body, metadata }
    }
}
