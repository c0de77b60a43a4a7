//! Deterministic storage keys for transformed variants.
//!
//! Layout: `{namespace}/{directory}/{canonical options}/{filename}`, e.g.
//! `_cache/folder/200x,q80/photo.jpg`. The options segment is always the
//! second-to-last one, so distinct `(namespace, options, path)` triples never
//! share a key.

use super::options::TransformSpec;
use std::fmt;

/// An object path split into clean segments.
///
/// Keeps the raw form for origin fetches and the normalized segments for key
/// derivation: redundant separators and `.` are collapsed, `..` is resolved
/// lexically (never above the root), backslashes count as separators and
/// control characters are dropped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectPath {
    raw: String,
    segments: Vec<String>,
}

impl ObjectPath {
    /// Returns `None` when nothing is left after normalization.
    pub fn parse(raw: &str) -> Option<Self> {
        let segments = normalize_segments(raw);
        if segments.is_empty() {
            return None;
        }
        Some(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    /// The path exactly as requested.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn directory(&self) -> &[String] {
        &self.segments[..self.segments.len() - 1]
    }

    pub fn filename(&self) -> &str {
        &self.segments[self.segments.len() - 1]
    }
}

fn normalize_segments(raw: &str) -> Vec<String> {
    let mut segments: Vec<String> = Vec::new();
    for segment in raw.split(['/', '\\']) {
        let cleaned: String = segment.chars().filter(|c| !c.is_control()).collect();
        match cleaned.as_str() {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            _ => segments.push(cleaned),
        }
    }
    segments
}

/// Storage key of a cached variant.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Pure: no I/O, no clock, no randomness.
    pub fn derive(namespace: &str, spec: &TransformSpec, path: &ObjectPath) -> Self {
        let mut segments = normalize_segments(namespace);
        segments.extend(path.directory().iter().cloned());
        segments.push(escape_options(&spec.canonical()));
        segments.push(path.filename().to_string());
        Self(segments.join("/"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Keep the options in one segment even if a signature carries separators.
fn escape_options(canonical: &str) -> String {
    canonical
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| match c {
            '%' => "%25".to_string(),
            '/' => "%2F".to_string(),
            '\\' => "%5C".to_string(),
            other => other.to_string(),
        })
        .collect()
}
