//! Transform orchestration.
//!
//! Coordinates the two-phase transform:
//!
//! 1. **Enrich** — fill option gaps from client signals (format, quality,
//!    width, DPR). Explicit user values are never touched.
//! 2. **Render** — when the option set needs intrinsic dimensions (crop
//!    without both dimensions, pending conditionals, context-aware aspect
//!    cropping), run the `format=json` metadata probe first (memoized in a
//!    bounded dimension cache), evaluate conditionals, translate the
//!    engine-internal options onto the primitive's vocabulary, and invoke
//!    the transform. Primitive failure falls back to the unmodified source
//!    bytes with the content type preserved.

use crate::detector::ClientDetector;
use axum::http::HeaderMap;
use bytes::Bytes;
use lru::LruCache;
use parking_lot::Mutex;
use refract_kernel::config::TransformSettings;
use refract_kernel::context::RequestContext;
use refract_kernel::params::{OptionMap, OptionValue, ResolvedOptions};
use refract_kernel::storage::StorageResult;
use refract_kernel::transform::TransformBackend;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::{debug, warn};

/// Capacity of the intrinsic-dimension cache (entries are tiny).
const DIMENSION_CACHE_CAPACITY: usize = 4096;

/// Names the resolution engine understands but the primitive does not; they
/// are translated (or dropped) before the wire call.
const ENGINE_INTERNAL: &[&str] = &["aspect", "focal", "ctx", "allowExpansion", "derivative"];

/// Final pixel response, transformed or fallen back.
#[derive(Debug, Clone)]
pub struct RenderedImage {
    pub body: Bytes,
    pub content_type: String,
    /// True when the primitive failed and the original bytes are served.
    pub fallback: bool,
    /// The option bundle actually sent to the primitive.
    pub wire_options: OptionMap,
}

pub struct TransformOrchestrator {
    backend: Arc<dyn TransformBackend>,
    detector: ClientDetector,
    transform: TransformSettings,
    dimension_cache: Mutex<LruCache<String, (u32, u32)>>,
}

impl TransformOrchestrator {
    pub fn new(
        backend: Arc<dyn TransformBackend>,
        detector: ClientDetector,
        transform: TransformSettings,
    ) -> Self {
        Self {
            backend,
            detector,
            transform,
            dimension_cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(DIMENSION_CACHE_CAPACITY).expect("capacity is non-zero"),
            )),
        }
    }

    // ── Phase 1: client-signal enrichment ────────────────────────────────────

    /// Fill gaps in the option map from the client capability record.
    /// Explicit flags and user-provided values always win.
    pub fn enrich(&self, ctx: &RequestContext, headers: &HeaderMap, options: &mut ResolvedOptions) {
        if !self.detector.enabled() {
            return;
        }

        let caps = ctx.client_capabilities(|| self.detector.detect(headers));
        let budget = self.detector.budget(&caps, &self.transform);

        let format_is_auto = matches!(options.map.format(), None | Some("auto"));
        if format_is_auto {
            if let Some(format) = &budget.preferred_format {
                options.map.insert("format", OptionValue::Str(format.clone()));
            }
        }

        if !options.map.contains("quality") {
            options
                .map
                .insert("quality", OptionValue::Number(budget.quality_target as f64));
        }

        // DPR is baked into the suggested width here, exactly once; no
        // standalone dpr option is emitted, or the primitive would apply
        // the ratio a second time.
        if !options.explicit_width && !options.map.contains("width") {
            if let Some(viewport) = caps.viewport_width {
                let target = (viewport as f64 * caps.dpr).ceil() as u32;
                let width = self.round_up_to_breakpoint(target).min(budget.max_width);
                options.map.insert("width", OptionValue::Number(width as f64));
            }
        }

        ctx.breadcrumb(
            "detector",
            format!(
                "enriched: network={:?} dpr={} format={:?}",
                caps.network, caps.dpr, budget.preferred_format
            ),
        );
    }

    /// Smallest configured responsive breakpoint at or above `target`.
    fn round_up_to_breakpoint(&self, target: u32) -> u32 {
        let mut widths = self.transform.responsive_widths.clone();
        widths.sort_unstable();
        widths
            .into_iter()
            .find(|w| *w >= target)
            .unwrap_or_else(|| {
                *self
                    .transform
                    .responsive_widths
                    .iter()
                    .max()
                    .expect("responsive widths validated non-empty")
            })
    }

    // ── Phase 2: render ──────────────────────────────────────────────────────

    /// Run the (possibly two-phase) transform for a fetched source.
    pub async fn render(
        &self,
        ctx: &RequestContext,
        source_path: &str,
        source: &StorageResult,
        options: &mut ResolvedOptions,
    ) -> RenderedImage {
        let dims = if needs_metadata(options) {
            let dims = self.intrinsic_dimensions(ctx, source_path, source).await;
            match dims {
                Some((w, h)) => {
                    self.apply_conditionals(ctx, options, w, h);
                    Some((w, h))
                }
                None => {
                    // Conditional evaluation is skipped when dimensions stay
                    // unknown; base options proceed.
                    if !options.conditionals.is_empty() {
                        warn!(source_path, "metadata unavailable; skipping conditionals");
                        ctx.breadcrumb("transform", "metadata unavailable; conditionals skipped");
                    }
                    None
                }
            }
        } else {
            None
        };

        let wire = finalize_wire_options(options, dims);

        match self.backend.transform(source_path, &wire).await {
            Ok(image) => {
                ctx.breadcrumb("transform", format!("transformed as {}", image.content_type));
                RenderedImage {
                    body: image.body,
                    content_type: image.content_type,
                    fallback: false,
                    wire_options: wire,
                }
            }
            Err(err) => {
                warn!(%err, source_path, "transform primitive failed; serving original bytes");
                ctx.breadcrumb("transform", format!("fallback to source: {err}"));
                RenderedImage {
                    body: source.body.clone(),
                    content_type: source.content_type.clone(),
                    fallback: true,
                    wire_options: wire,
                }
            }
        }
    }

    /// Intrinsic `(width, height)`: dimension cache → origin hint →
    /// metadata probe.
    async fn intrinsic_dimensions(
        &self,
        ctx: &RequestContext,
        source_path: &str,
        source: &StorageResult,
    ) -> Option<(u32, u32)> {
        if let Some(hit) = self.dimension_cache.lock().get(source_path) {
            return Some(*hit);
        }

        if let (Some(w), Some(h)) = (source.width, source.height) {
            self.dimension_cache.lock().put(source_path.to_string(), (w, h));
            return Some((w, h));
        }

        match self.backend.probe(source_path).await {
            Ok(meta) => {
                debug!(
                    source_path,
                    width = meta.width,
                    height = meta.height,
                    "metadata probe"
                );
                ctx.breadcrumb(
                    "transform",
                    format!("probed {}x{}", meta.width, meta.height),
                );
                self.dimension_cache
                    .lock()
                    .put(source_path.to_string(), (meta.width, meta.height));
                Some((meta.width, meta.height))
            }
            Err(err) => {
                warn!(%err, source_path, "metadata probe failed");
                None
            }
        }
    }

    fn apply_conditionals(
        &self,
        ctx: &RequestContext,
        options: &mut ResolvedOptions,
        width: u32,
        height: u32,
    ) {
        for cond in std::mem::take(&mut options.conditionals) {
            if cond.evaluate(width, height) {
                ctx.breadcrumb("transform", "dimension conditional matched");
                for (name, value) in cond.then {
                    options.map.insert(name, value);
                }
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire translation
// ─────────────────────────────────────────────────────────────────────────────

/// Translate the canonical map onto the primitive's vocabulary:
/// aspect becomes a concrete width/height pair (using intrinsic dimensions
/// when only the ratio is known), the focal point becomes coordinate
/// gravity, and engine-internal names are stripped.
pub fn finalize_wire_options(options: &ResolvedOptions, dims: Option<(u32, u32)>) -> OptionMap {
    let mut wire = OptionMap::new();
    for (name, value) in options.map.iter() {
        if ENGINE_INTERNAL.contains(&name.as_str()) {
            continue;
        }
        wire.insert(name.clone(), value.clone());
    }

    if let Some(aspect) = options.map.string("aspect") {
        if let Some((aw, ah)) = parse_aspect(aspect) {
            let width = wire.width();
            let height = wire.height();
            match (width, height) {
                (Some(w), None) => {
                    wire.insert("height", OptionValue::Number((w as f64 * ah / aw).round()));
                }
                (None, Some(h)) => {
                    wire.insert("width", OptionValue::Number((h as f64 * aw / ah).round()));
                }
                (None, None) => {
                    if let Some((iw, ih)) = dims {
                        // Largest crop of the intrinsic image honoring the
                        // requested ratio.
                        let w = (iw as f64).min(ih as f64 * aw / ah);
                        wire.insert("width", OptionValue::Number(w.round()));
                        wire.insert("height", OptionValue::Number((w * ah / aw).round()));
                    }
                }
                (Some(_), Some(_)) => {}
            }
            wire.insert_default("fit", OptionValue::Str("crop".into()));
        }
    }

    if let Some((x, y)) = options.map.get("focal").and_then(|v| v.as_coord()) {
        wire.insert("gravity", OptionValue::Coord(x, y));
    }

    wire
}

fn parse_aspect(aspect: &str) -> Option<(f64, f64)> {
    let (w, h) = aspect.split_once(':')?;
    let w: f64 = w.trim().parse().ok()?;
    let h: f64 = h.trim().parse().ok()?;
    (w > 0.0 && h > 0.0).then_some((w, h))
}

/// Does this option set require intrinsic dimensions before the transform?
pub fn needs_metadata(options: &ResolvedOptions) -> bool {
    if options.needs_image_info {
        return true;
    }
    options.map.fit() == Some("crop")
        && !(options.map.contains("width") && options.map.contains("height"))
}

// =============================================================================
// Tests
// =============================================================================
