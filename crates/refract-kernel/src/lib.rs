//! Refract Kernel — contract types for the image-proxy pipeline.
//!
//! The kernel holds everything the pipeline crates share and nothing that
//! does I/O on its own:
//!
//! - the parameter vocabulary ([`params`]): typed registry, option values,
//!   size codes, overlay descriptors;
//! - client capability types ([`client`]);
//! - the per-request context with breadcrumbs and background work
//!   ([`context`]);
//! - the external-collaborator traits ([`storage`], [`cache`],
//!   [`transform`]);
//! - the settings model and loader ([`config`]).
//!
//! Dependency ordering is one-way: `refract-kernel` ← `refract-params` ←
//! `refract-storage` ← `refract-gateway`.

pub mod cache;
pub mod client;
pub mod config;
pub mod context;
pub mod params;
pub mod storage;
pub mod transform;

pub use cache::{CacheMetadata, CacheStoreError, CachedTransform, TransformCache};
pub use client::{ClientCapabilities, DeviceClass, NetworkQuality, PerformanceBudget};
pub use config::{ConfigError, Settings, SettingsError};
pub use context::{Breadcrumb, RequestContext};
pub use params::{OptionMap, OptionValue, ParamSource, ResolvedOptions, TransformOption};
pub use storage::{
    ByteRange, Conditions, FetchOutcome, GetOptions, ObjectGet, ObjectStore, ObjectStoreError,
    OriginAttempt, OriginKind, StorageResult, StoredObject,
};
pub use transform::{ImageMetadata, TransformBackend, TransformError, TransformedImage};
