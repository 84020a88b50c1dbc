//! Storage contract types.
//!
//! The fetcher in `refract-storage` resolves a source image across a tiered
//! list of origins. The kernel defines the vocabulary: origin kinds, the
//! [`ObjectStore`] blob trait with conditional and range semantics, and the
//! [`StorageResult`] every successful fetch produces. Concrete adapters
//! (S3-compatible stores, in-memory stores for tests) live with the fetcher.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ─────────────────────────────────────────────────────────────────────────────
// OriginKind
// ─────────────────────────────────────────────────────────────────────────────

/// A source of image bytes, in the order a profile may try them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OriginKind {
    /// Key-value blob store bound to the process (no public URL).
    ObjectStore,
    /// Authenticated remote HTTP origin.
    Remote,
    /// Anonymous fallback HTTP origin.
    Fallback,
}

impl OriginKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OriginKind::ObjectStore => "object-store",
            OriginKind::Remote => "remote",
            OriginKind::Fallback => "fallback",
        }
    }
}

impl fmt::Display for OriginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Conditional / range options
// ─────────────────────────────────────────────────────────────────────────────

/// Byte range requested by the client, propagated to the origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRange {
    /// `bytes=offset-` or `bytes=offset-end`.
    Offset { offset: u64, length: Option<u64> },
    /// `bytes=-length` (last `length` bytes).
    Suffix { length: u64 },
}

/// Conditional-fetch preconditions, mirroring the blob store's `onlyIf`
/// semantics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conditions {
    /// Succeed only when the stored etag differs (`If-None-Match`).
    pub etag_does_not_match: Option<String>,
    /// Succeed only when the object changed after this instant
    /// (`If-Modified-Since`).
    pub uploaded_after: Option<DateTime<Utc>>,
}

impl Conditions {
    pub fn is_empty(&self) -> bool {
        self.etag_does_not_match.is_none() && self.uploaded_after.is_none()
    }
}

/// Options for a single `ObjectStore::get`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GetOptions {
    pub only_if: Option<Conditions>,
    pub range: Option<ByteRange>,
}

// ─────────────────────────────────────────────────────────────────────────────
// ObjectStore trait
// ─────────────────────────────────────────────────────────────────────────────

/// A stored blob plus the HTTP-relevant metadata the store keeps with it.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub body: Bytes,
    /// Total object size. When a range was requested, `body` holds the
    /// partial content and `size` the full length.
    pub size: u64,
    pub etag: Option<String>,
    pub uploaded: Option<DateTime<Utc>>,
    pub content_type: Option<String>,
    pub cache_control: Option<String>,
}

/// Outcome of a conditional blob read.
#[derive(Debug, Clone)]
pub enum ObjectGet {
    Found(StoredObject),
    /// Preconditions held: the caller's copy is current.
    NotModified { etag: Option<String> },
    Missing,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ObjectStoreError {
    #[error("object store backend error: {0}")]
    Backend(String),
}

/// Key-value blob interface the object-store origin speaks.
///
/// Implementations must be `Send + Sync`; the fetcher shares one instance
/// across all requests.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, key: &str, opts: &GetOptions) -> Result<ObjectGet, ObjectStoreError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Fetch results
// ─────────────────────────────────────────────────────────────────────────────

/// A successful fetch: the bytes plus everything the response builder and
/// cache controller need to know about where they came from.
#[derive(Debug, Clone)]
pub struct StorageResult {
    pub body: Bytes,
    /// Which origin produced the bytes.
    pub source: OriginKind,
    pub content_type: String,
    /// Total size of the source object.
    pub size: u64,
    /// The per-origin rewritten path that hit.
    pub path: String,
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    /// Intrinsic dimensions when the origin happened to know them.
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// 200, or 206 for a satisfied range request.
    pub status: u16,
    /// `Content-Range` value accompanying a 206.
    pub content_range: Option<String>,
}

/// Terminal outcome of the tiered fetch loop.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Fetched(StorageResult),
    /// An origin confirmed the client's cached copy is current.
    NotModified {
        source: OriginKind,
        etag: Option<String>,
    },
}

/// One failed origin try, kept for debug headers and the final error.
#[derive(Debug, Clone, Serialize)]
pub struct OriginAttempt {
    pub origin: OriginKind,
    pub status: Option<u16>,
    pub reason: String,
}

// =============================================================================
// Tests
// =============================================================================
