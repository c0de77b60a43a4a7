//! Decomposition of an inbound image path into bucket, options and object.

use super::{
    cache_key::ObjectPath,
    options::{TransformSpec, repair_remote_url},
};
use crate::{config::BucketSource, errors::ProxyError};

/// A validated resize request.
#[derive(Clone, Debug)]
pub struct ResizeRequest {
    /// Bucket holding the source object.
    pub bucket: String,

    /// Decoded options segment.
    pub spec: TransformSpec,

    /// Source object path (may contain slashes).
    pub object: ObjectPath,
}

impl ResizeRequest {
    /// Parse `/{bucket}/{options}/{object...}`, or `/{options}/{object...}`
    /// with the bucket taken from `host` when `source` is [`BucketSource::Host`].
    pub fn from_path(
        path: &str,
        host: Option<&str>,
        source: BucketSource,
    ) -> Result<Self, ProxyError> {
        let path = path.strip_prefix('/').unwrap_or(path);

        let (bucket, rest) = match source {
            BucketSource::Path => {
                let (bucket, rest) = path
                    .split_once('/')
                    .ok_or_else(|| ProxyError::MalformedRequest("too few path segments".into()))?;
                (bucket.to_string(), rest)
            }
            BucketSource::Host => {
                let host = host
                    .map(strip_port)
                    .filter(|h| !h.is_empty())
                    .ok_or_else(|| ProxyError::MalformedRequest("missing Host header".into()))?;
                (host.to_string(), path)
            }
        };

        if bucket.is_empty() {
            return Err(ProxyError::MalformedRequest("empty bucket segment".into()));
        }

        let (options, object) = rest
            .split_once('/')
            .ok_or_else(|| ProxyError::MalformedRequest("too few path segments".into()))?;

        let object = ObjectPath::parse(&repair_remote_url(object))
            .ok_or_else(|| ProxyError::MalformedRequest("empty object path".into()))?;

        Ok(Self {
            bucket,
            spec: TransformSpec::parse(options),
            object,
        })
    }
}

fn strip_port(host: &str) -> &str {
    match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    }
}
