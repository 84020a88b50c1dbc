//! Object-store adapters.
//!
//! The kernel's [`ObjectStore`](refract_kernel::storage::ObjectStore) trait
//! models the blob binding; this module ships the concrete backends:
//! [`MemoryObjectStore`] for tests and single-node deployments, and (behind
//! the `s3` feature) an adapter over any S3-compatible service.

pub mod memory;
#[cfg(feature = "s3")]
pub mod s3;

pub use memory::MemoryObjectStore;
#[cfg(feature = "s3")]
pub use s3::{S3Config, S3ObjectStore};
