//! In-memory transform-cache store.
//!
//! Implements the kernel [`TransformCache`] trait with a concurrent map and
//! per-entry expiry. Suitable for tests and single-node deployments; a
//! production deployment binds an external KV service instead.

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use refract_kernel::cache::{CacheMetadata, CacheStoreError, CachedTransform, TransformCache};
use std::time::{Duration, Instant};

#[derive(Default)]
pub struct MemoryTransformCache {
    entries: DashMap<String, (CachedTransform, Instant)>,
}

impl MemoryTransformCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl TransformCache for MemoryTransformCache {
    async fn get(&self, key: &str) -> Result<Option<CachedTransform>, CacheStoreError> {
        if let Some(entry) = self.entries.get(key) {
            let (cached, expires_at) = entry.value();
            if Instant::now() < *expires_at {
                return Ok(Some(cached.clone()));
            }
        }
        // Expired entries are dropped lazily on the next read.
        self.entries
            .remove_if(key, |_, (_, expires_at)| Instant::now() >= *expires_at);
        Ok(None)
    }

    async fn put(
        &self,
        key: &str,
        body: Bytes,
        metadata: CacheMetadata,
    ) -> Result<(), CacheStoreError> {
        let expires_at = Instant::now() + Duration::from_secs(metadata.ttl);
        self.entries
            .insert(key.to_string(), (CachedTransform { body, metadata }, expires_at));
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(ttl: u64) -> CacheMetadata {
        CacheMetadata {
            content_type: "image/webp".into(),
            ttl,
            tags: vec!["img-test".into()],
            fingerprint_inputs: "path|opts".into(),
        }
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let cache = MemoryTransformCache::new();
        cache
            .put("k1", Bytes::from_static(b"webp-bytes"), metadata(60))
            .await
            .unwrap();

        let hit = cache.get("k1").await.unwrap().expect("hit");
        assert_eq!(hit.body.as_ref(), b"webp-bytes");
        assert_eq!(hit.metadata.content_type, "image/webp");
    }

    #[tokio::test]
    async fn miss_returns_none() {
        let cache = MemoryTransformCache::new();
        assert!(cache.get("absent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_entries_are_dropped() {
        let cache = MemoryTransformCache::new();
        cache
            .put("k1", Bytes::from_static(b"x"), metadata(0))
            .await
            .unwrap();
        assert!(cache.get("k1").await.unwrap().is_none());
        assert!(cache.is_empty());
    }
}
