//! Shared types: object metadata and the tagged cache value.
//!
//! [`ObjectMeta`] is what gets written to the `<key>.json` sidecar and what
//! `GET /manage/{key}` returns, so its serde shape is part of the on-disk and
//! wire format.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// MIME types that classify an uploaded object as [`ObjectKind::Image`].
pub const IMAGE_MIME_TYPES: &[&str] = &[
    "image/png",
    "image/jpeg",
    "image/tiff",
    "image/webp",
    "image/bmp",
    "image/gif",
];

/// Recognised kinds of stored object.
///
/// Images can be re-encoded or transformed on the fly; everything else is
/// served byte-for-byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Binary,
    Image,
}

impl ObjectKind {
    /// Classify an upload by its declared `Content-Type`.
    pub fn from_mime(mime: &str) -> Self {
        let essence = mime.split(';').next().unwrap_or("").trim();
        if IMAGE_MIME_TYPES
            .iter()
            .any(|m| m.eq_ignore_ascii_case(essence))
        {
            ObjectKind::Image
        } else {
            ObjectKind::Binary
        }
    }
}

/// Sidecar metadata stored next to every blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub kind: ObjectKind,
    pub mime: String,
    /// Free-form attributes supplied at upload time (query parameters of the PUT).
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
}

/// Caller-supplied description of a new object; the store stamps `created_at`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewObject {
    pub kind: ObjectKind,
    pub mime: String,
    pub attributes: HashMap<String, String>,
}

impl NewObject {
    pub fn new(mime: impl Into<String>) -> Self {
        let mime = mime.into();
        Self {
            kind: ObjectKind::from_mime(&mime),
            mime,
            attributes: HashMap::new(),
        }
    }

    pub fn with_attributes(mut self, attributes: HashMap<String, String>) -> Self {
        self.attributes = attributes;
        self
    }

    pub(crate) fn into_meta(self, created_at: DateTime<Utc>) -> ObjectMeta {
        ObjectMeta {
            kind: self.kind,
            mime: self.mime,
            attributes: self.attributes,
            created_at,
        }
    }
}

/// A value held by the eviction cache.
///
/// Every read names the variant it expects; a different variant under the
/// same key counts as a miss and the stale entry is dropped.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheEntry {
    RawBlob(Bytes),
    Metadata(ObjectMeta),
    DerivedBlob(Bytes),
}

impl CacheEntry {
    pub fn tag(&self) -> &'static str {
        match self {
            CacheEntry::RawBlob(_) => "raw",
            CacheEntry::Metadata(_) => "meta",
            CacheEntry::DerivedBlob(_) => "derived",
        }
    }
}
