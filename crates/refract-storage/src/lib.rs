//! Refract storage resolution layer.
//!
//! Resolves a logical image path to source bytes across a tiered set of
//! origins:
//!
//! ```text
//! path ──► PathRouter ──► profile + per-origin rewritten path
//!              │
//!              ▼
//!        StorageFetcher ──► object store ──► remote ──► fallback
//!              │                (first success wins)
//!              ▼
//!        AuthProvider (bearer | header | query-signed | aws-v4)
//! ```
//!
//! Conditional (`If-None-Match` / `If-Modified-Since`) and `Range` state is
//! propagated to whichever origin answers. The crate also ships the
//! in-memory [`ObjectStore`](refract_kernel::storage::ObjectStore) and
//! [`TransformCache`](refract_kernel::cache::TransformCache) backends, plus
//! an S3-compatible adapter behind the `s3` feature.

pub mod auth;
pub mod fetcher;
pub mod kv;
pub mod object_store;
pub mod router;

pub use auth::{AuthError, AuthOutcome, AuthProvider, EnvSecrets, SecretSource};
pub use fetcher::{RequestConditions, StorageError, StorageFetcher, parse_range_header};
pub use kv::MemoryTransformCache;
pub use object_store::MemoryObjectStore;
#[cfg(feature = "s3")]
pub use object_store::{S3Config, S3ObjectStore};
pub use router::{PathRouter, RouterError};
