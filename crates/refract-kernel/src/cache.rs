//! Transform-cache contract.
//!
//! The persistent transform cache is an external key-value store; the kernel
//! only fixes the interface. The cache controller in `refract-gateway` reads
//! and writes through [`TransformCache`]; `refract-storage` ships an
//! in-memory implementation for tests and single-node deployments.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Metadata stored alongside cached transform bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMetadata {
    pub content_type: String,
    /// Time to live in seconds.
    pub ttl: u64,
    /// Invalidation tags attached to this entry.
    pub tags: Vec<String>,
    /// Human-readable rendering of the fingerprint inputs, kept so operators
    /// can tell what an entry is without re-deriving the key.
    pub fingerprint_inputs: String,
}

/// A cache hit: stored bytes plus their metadata.
#[derive(Debug, Clone)]
pub struct CachedTransform {
    pub body: Bytes,
    pub metadata: CacheMetadata,
}

/// Cache failures are never fatal; the controller logs and bypasses.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CacheStoreError {
    #[error("transform cache backend error: {0}")]
    Backend(String),
}

/// The external key-value transform cache. Eventually consistent; callers
/// must not rely on read-your-writes.
#[async_trait]
pub trait TransformCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<CachedTransform>, CacheStoreError>;

    async fn put(
        &self,
        key: &str,
        body: Bytes,
        metadata: CacheMetadata,
    ) -> Result<(), CacheStoreError>;
}
