//! Scripted transform backend.
//!
//! Stands in for the external resizing primitive: records every call (so
//! tests can assert how often the transform ran), returns canned pixel
//! bytes, and reports configurable intrinsic dimensions for the
//! `format=json` probe.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use refract_kernel::params::OptionMap;
use refract_kernel::transform::{
    ImageMetadata, TransformBackend, TransformError, TransformedImage,
};
use std::sync::atomic::{AtomicUsize, Ordering};

pub struct ScriptedTransformBackend {
    transform_calls: AtomicUsize,
    probe_calls: AtomicUsize,
    /// Option bundles received, in call order.
    seen_options: Mutex<Vec<OptionMap>>,
    /// Intrinsic dimensions the probe reports.
    pub dimensions: (u32, u32),
    /// When set, every transform call fails with a timeout.
    pub fail_transforms: bool,
}

impl Default for ScriptedTransformBackend {
    fn default() -> Self {
        Self {
            transform_calls: AtomicUsize::new(0),
            probe_calls: AtomicUsize::new(0),
            seen_options: Mutex::new(Vec::new()),
            dimensions: (2048, 1365),
            fail_transforms: false,
        }
    }
}

impl ScriptedTransformBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail_transforms: true,
            ..Default::default()
        }
    }

    pub fn transform_calls(&self) -> usize {
        self.transform_calls.load(Ordering::SeqCst)
    }

    pub fn probe_calls(&self) -> usize {
        self.probe_calls.load(Ordering::SeqCst)
    }

    /// The option bundle of call `index`.
    pub fn options_seen(&self, index: usize) -> Option<OptionMap> {
        self.seen_options.lock().get(index).cloned()
    }
}

#[async_trait]
impl TransformBackend for ScriptedTransformBackend {
    async fn transform(
        &self,
        _source_url: &str,
        options: &OptionMap,
    ) -> Result<TransformedImage, TransformError> {
        self.transform_calls.fetch_add(1, Ordering::SeqCst);
        self.seen_options.lock().push(options.clone());
        if self.fail_transforms {
            return Err(TransformError::Timeout);
        }
        let content_type = match options.format() {
            Some("webp") => "image/webp",
            Some("avif") => "image/avif",
            Some("png") => "image/png",
            _ => "image/jpeg",
        };
        Ok(TransformedImage {
            body: Bytes::from_static(b"transformed-pixels"),
            content_type: content_type.to_string(),
        })
    }

    async fn probe(&self, _source_url: &str) -> Result<ImageMetadata, TransformError> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        Ok(ImageMetadata {
            width: self.dimensions.0,
            height: self.dimensions.1,
            format: "jpeg".into(),
            orientation: None,
        })
    }
}
