//! Transform-primitive contract.
//!
//! The pixel work happens in an external resizing service. The kernel fixes
//! the two operations the orchestrator needs: a pixel transform and a
//! metadata probe (the `format=json` mode, which returns intrinsic
//! dimensions instead of pixels). The HTTP implementation lives in
//! `refract-gateway`; tests use scripted implementations.

use crate::params::option_map::OptionMap;
use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use thiserror::Error;

/// Pixel output of a successful transform.
#[derive(Debug, Clone)]
pub struct TransformedImage {
    pub body: Bytes,
    pub content_type: String,
}

/// The `format=json` metadata record.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ImageMetadata {
    pub width: u32,
    pub height: u32,
    pub format: String,
    #[serde(default)]
    pub orientation: Option<u32>,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransformError {
    /// The primitive did not answer within its deadline (524-class).
    #[error("transform primitive timed out")]
    Timeout,

    /// The primitive answered with a non-success status.
    #[error("transform primitive returned status {0}")]
    Upstream(u16),

    /// Transport-level failure reaching the primitive.
    #[error("transform transport error: {0}")]
    Transport(String),

    /// The metadata probe returned a payload that does not parse.
    #[error("metadata probe returned invalid payload: {0}")]
    InvalidMetadata(String),
}

/// The external image-resizing primitive.
#[async_trait]
pub trait TransformBackend: Send + Sync {
    /// Transform the source at `source_url` with the finalized options.
    async fn transform(
        &self,
        source_url: &str,
        options: &OptionMap,
    ) -> Result<TransformedImage, TransformError>;

    /// Fetch intrinsic metadata (`format=json`) for the source.
    async fn probe(&self, source_url: &str) -> Result<ImageMetadata, TransformError>;
}
