//! In-memory [`ObjectStore`] implementation.
//!
//! Backed by a concurrent map. Suitable for tests and single-node
//! deployments; production bindings belong in adapter modules (see the
//! `s3` feature).

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use refract_kernel::storage::{
    ByteRange, GetOptions, ObjectGet, ObjectStore, ObjectStoreError, StoredObject,
};

#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: DashMap<String, StoredObject>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an object. The etag is a hex digest of the body so conditional
    /// semantics behave like a real store.
    pub fn put(&self, key: impl Into<String>, body: Bytes, content_type: &str) {
        self.put_at(key, body, content_type, Utc::now());
    }

    /// Insert with an explicit upload instant (for conditional-request
    /// tests).
    pub fn put_at(
        &self,
        key: impl Into<String>,
        body: Bytes,
        content_type: &str,
        uploaded: DateTime<Utc>,
    ) {
        use sha2::{Digest, Sha256};
        let etag = hex::encode(&Sha256::digest(&body)[..16]);
        self.objects.insert(
            key.into(),
            StoredObject {
                size: body.len() as u64,
                body,
                etag: Some(etag),
                uploaded: Some(uploaded),
                content_type: Some(content_type.to_string()),
                cache_control: None,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get(&self, key: &str, opts: &GetOptions) -> Result<ObjectGet, ObjectStoreError> {
        let Some(entry) = self.objects.get(key) else {
            return Ok(ObjectGet::Missing);
        };
        let stored = entry.value().clone();
        drop(entry);

        if let Some(only_if) = &opts.only_if {
            let etag_current = match (&only_if.etag_does_not_match, &stored.etag) {
                (Some(client_etag), Some(etag)) => client_etag == etag,
                _ => false,
            };
            let unchanged_since = match (only_if.uploaded_after, stored.uploaded) {
                (Some(since), Some(uploaded)) => uploaded <= since,
                _ => false,
            };
            if etag_current || unchanged_since {
                return Ok(ObjectGet::NotModified {
                    etag: stored.etag.clone(),
                });
            }
        }

        let object = match opts.range {
            Some(range) => slice_range(stored, range),
            None => Some(stored),
        };
        Ok(object.map(ObjectGet::Found).unwrap_or(ObjectGet::Missing))
    }
}

/// Apply a byte range to a stored object, keeping `size` as the full length.
/// An unsatisfiable range yields `None`.
fn slice_range(stored: StoredObject, range: ByteRange) -> Option<StoredObject> {
    let len = stored.body.len() as u64;
    let (start, end) = match range {
        ByteRange::Offset { offset, length } => {
            let end = length.map_or(len, |l| (offset + l).min(len));
            (offset, end)
        }
        ByteRange::Suffix { length } => (len.saturating_sub(length), len),
    };
    if start >= len || start >= end {
        return None;
    }
    Some(StoredObject {
        body: stored.body.slice(start as usize..end as usize),
        ..stored
    })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use refract_kernel::storage::Conditions;

    fn store() -> MemoryObjectStore {
        let s = MemoryObjectStore::new();
        s.put("img/photo.jpg", Bytes::from_static(b"0123456789"), "image/jpeg");
        s
    }

    #[tokio::test]
    async fn get_returns_stored_object() {
        let s = store();
        match s.get("img/photo.jpg", &GetOptions::default()).await.unwrap() {
            ObjectGet::Found(obj) => {
                assert_eq!(obj.body.as_ref(), b"0123456789");
                assert_eq!(obj.content_type.as_deref(), Some("image/jpeg"));
                assert!(obj.etag.is_some());
            }
            other => panic!("expected Found, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_key_is_missing() {
        let s = store();
        assert!(matches!(
            s.get("nope.jpg", &GetOptions::default()).await.unwrap(),
            ObjectGet::Missing
        ));
    }

    #[tokio::test]
    async fn matching_etag_returns_not_modified() {
        let s = store();
        let etag = match s.get("img/photo.jpg", &GetOptions::default()).await.unwrap() {
            ObjectGet::Found(obj) => obj.etag.unwrap(),
            _ => unreachable!(),
        };
        let opts = GetOptions {
            only_if: Some(Conditions {
                etag_does_not_match: Some(etag),
                ..Default::default()
            }),
            range: None,
        };
        assert!(matches!(
            s.get("img/photo.jpg", &opts).await.unwrap(),
            ObjectGet::NotModified { .. }
        ));
    }

    #[tokio::test]
    async fn stale_etag_returns_body() {
        let s = store();
        let opts = GetOptions {
            only_if: Some(Conditions {
                etag_does_not_match: Some("different".into()),
                ..Default::default()
            }),
            range: None,
        };
        assert!(matches!(
            s.get("img/photo.jpg", &opts).await.unwrap(),
            ObjectGet::Found(_)
        ));
    }

    #[tokio::test]
    async fn unchanged_since_returns_not_modified() {
        let s = MemoryObjectStore::new();
        let uploaded = Utc::now() - chrono::Duration::hours(2);
        s.put_at("old.jpg", Bytes::from_static(b"x"), "image/jpeg", uploaded);

        let opts = GetOptions {
            only_if: Some(Conditions {
                uploaded_after: Some(Utc::now() - chrono::Duration::hours(1)),
                ..Default::default()
            }),
            range: None,
        };
        assert!(matches!(
            s.get("old.jpg", &opts).await.unwrap(),
            ObjectGet::NotModified { .. }
        ));
    }

    #[tokio::test]
    async fn range_slices_but_keeps_total_size() {
        let s = store();
        let opts = GetOptions {
            only_if: None,
            range: Some(ByteRange::Offset {
                offset: 2,
                length: Some(3),
            }),
        };
        match s.get("img/photo.jpg", &opts).await.unwrap() {
            ObjectGet::Found(obj) => {
                assert_eq!(obj.body.as_ref(), b"234");
                assert_eq!(obj.size, 10);
            }
            other => panic!("expected Found, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn suffix_range_takes_the_tail() {
        let s = store();
        let opts = GetOptions {
            only_if: None,
            range: Some(ByteRange::Suffix { length: 4 }),
        };
        match s.get("img/photo.jpg", &opts).await.unwrap() {
            ObjectGet::Found(obj) => assert_eq!(obj.body.as_ref(), b"6789"),
            other => panic!("expected Found, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unsatisfiable_range_is_missing() {
        let s = store();
        let opts = GetOptions {
            only_if: None,
            range: Some(ByteRange::Offset {
                offset: 99,
                length: None,
            }),
        };
        assert!(matches!(
            s.get("img/photo.jpg", &opts).await.unwrap(),
            ObjectGet::Missing
        ));
    }
}
