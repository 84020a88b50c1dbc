//! Cache control: fingerprints, TTLs, tags, bypass, and the KV write path.
//!
//! Two tiers cooperate: the CDN layer is steered with response
//! `Cache-Control` (and tag headers), while the persistent transform cache
//! is an external KV store keyed by fingerprint. KV failures are never
//! fatal — the controller logs and bypasses.

use fnv::FnvHasher;
use lru::LruCache;
use parking_lot::Mutex;
use refract_kernel::cache::{CacheMetadata, CachedTransform, TransformCache};
use refract_kernel::config::CacheSettings;
use refract_kernel::context::RequestContext;
use refract_kernel::params::OptionMap;
use std::hash::Hasher;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::{debug, warn};

/// How many fingerprints the access tracker remembers for the bypass
/// scoring heuristic.
const ACCESS_TRACKER_CAPACITY: usize = 8192;

/// Cache lookup outcome annotated for the debug surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
    Bypass,
    Disabled,
}

impl CacheStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheStatus::Hit => "hit",
            CacheStatus::Miss => "miss",
            CacheStatus::Bypass => "bypass",
            CacheStatus::Disabled => "disabled",
        }
    }
}

pub struct CacheController {
    settings: CacheSettings,
    environment: String,
    store: Option<Arc<dyn TransformCache>>,
    /// Recent per-fingerprint access counts, feeding the bypass score.
    access: Mutex<LruCache<String, u32>>,
}

impl CacheController {
    pub fn new(
        settings: CacheSettings,
        environment: String,
        store: Option<Arc<dyn TransformCache>>,
    ) -> Self {
        Self {
            settings,
            environment,
            store,
            access: Mutex::new(LruCache::new(
                NonZeroUsize::new(ACCESS_TRACKER_CAPACITY).expect("capacity is non-zero"),
            )),
        }
    }

    // ── Fingerprints ─────────────────────────────────────────────────────────

    /// Deterministic cache key over everything that shapes the artifact:
    /// normalized path, the raw query minus diagnostics and cache busters,
    /// the canonical option map, and the output format.
    pub fn fingerprint(
        &self,
        clean_path: &str,
        raw_query: &str,
        options: &OptionMap,
        output_format: &str,
    ) -> String {
        let inputs = self.fingerprint_inputs(clean_path, raw_query, options, output_format);
        let mut hasher = FnvHasher::default();
        hasher.write(inputs.as_bytes());
        format!("{:016x}", hasher.finish())
    }

    /// The pre-hash rendering, stored in cache metadata for operators.
    pub fn fingerprint_inputs(
        &self,
        clean_path: &str,
        raw_query: &str,
        options: &OptionMap,
        output_format: &str,
    ) -> String {
        format!(
            "{clean_path}?{}#{}#{output_format}",
            self.strip_volatile_params(raw_query),
            options.canonical_string(),
        )
    }

    /// Remove `debug`, configured cache busters, and bypass toggles from the
    /// query before hashing, preserving pair order.
    fn strip_volatile_params(&self, raw_query: &str) -> String {
        raw_query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .filter(|pair| {
                let key = pair.split('=').next().unwrap_or(pair);
                key != "debug"
                    && !self.settings.cache_buster_params.iter().any(|p| p == key)
                    && !self.settings.bypass.params.iter().any(|p| p == key)
            })
            .collect::<Vec<_>>()
            .join("&")
    }

    // ── TTL selection ────────────────────────────────────────────────────────

    /// TTL precedence: longest matching path prefix → status class →
    /// content type → default.
    pub fn ttl_for(&self, path: &str, status: u16, content_type: &str) -> u64 {
        if let Some(ttl) = self
            .settings
            .path_ttls
            .iter()
            .filter(|(prefix, _)| path.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, ttl)| *ttl)
        {
            return ttl;
        }

        let class = match status {
            200..=299 => "2xx",
            300..=399 => "3xx",
            400..=499 => "4xx",
            _ => "5xx",
        };
        if let Some(ttl) = self.settings.ttl_by_status.get(class) {
            return *ttl;
        }

        if let Some(ttl) = self.settings.ttl_by_content_type.get(content_type) {
            return *ttl;
        }

        self.settings.default_ttl
    }

    // ── Tags ─────────────────────────────────────────────────────────────────

    /// Invalidation tags for a cached artifact, capped at `max_tags`.
    pub fn tags_for(&self, clean_path: &str, options: &OptionMap) -> Vec<String> {
        if !self.settings.tags.enabled {
            return Vec::new();
        }
        let prefix = &self.settings.tags.prefix;
        let mut tags = vec![format!("{prefix}all")];

        if let Some(derivative) = options.string("derivative") {
            tags.push(format!("{prefix}drv-{derivative}"));
        }
        if let Some(format) = options.format() {
            tags.push(format!("{prefix}fmt-{format}"));
        }
        if let Some(quality) = options.number("quality") {
            // Bucketed so one tag covers a quality band.
            let bucket = ((quality / 10.0).round() * 10.0) as u32;
            tags.push(format!("{prefix}q-{bucket}"));
        }
        if let Some(width) = options.width() {
            tags.push(format!("{prefix}w-{width}"));
        }
        if let Some(height) = options.height() {
            tags.push(format!("{prefix}h-{height}"));
        }

        let mut segments = clean_path.trim_matches('/').split('/').filter(|s| !s.is_empty());
        if let Some(first) = segments.next() {
            tags.push(format!("{prefix}p-{first}"));
            if let Some(second) = segments.next() {
                tags.push(format!("{prefix}p-{first}-{second}"));
            }
        }

        tags.truncate(self.settings.tags.max_tags);
        tags
    }

    // ── Bypass policy ────────────────────────────────────────────────────────

    /// OR of: disallowed path prefix, bypass query parameter,
    /// `no-cache`/`no-store` on the request, bypassed environment, or the
    /// size/access score exceeding its threshold.
    pub fn should_bypass(
        &self,
        clean_path: &str,
        query_keys: &[String],
        request_cache_control: Option<&str>,
        fingerprint: &str,
        size_hint: Option<u64>,
    ) -> bool {
        if self
            .settings
            .transform_cache
            .disallowed_prefixes
            .iter()
            .any(|prefix| clean_path.starts_with(prefix.as_str()))
        {
            return true;
        }
        if self.settings.bypass.paths.iter().any(|p| clean_path.starts_with(p.as_str())) {
            return true;
        }
        if query_keys
            .iter()
            .any(|key| self.settings.bypass.params.iter().any(|p| p == key))
        {
            return true;
        }
        if let Some(cc) = request_cache_control {
            if cc.contains("no-cache") || cc.contains("no-store") {
                return true;
            }
        }
        if self
            .settings
            .bypass
            .environments
            .iter()
            .any(|env| env.eq_ignore_ascii_case(&self.environment))
        {
            return true;
        }

        self.bypass_score(fingerprint, size_hint) > self.settings.bypass.score_threshold
    }

    /// Size/access heuristic: large artifacts that are rarely requested are
    /// not worth a cache slot.
    fn bypass_score(&self, fingerprint: &str, size_hint: Option<u64>) -> f64 {
        let size_points = match size_hint.unwrap_or(0) {
            s if s > 5 * 1024 * 1024 => 8.0,
            s if s > 1024 * 1024 => 4.0,
            s if s > 100 * 1024 => 1.0,
            _ => 0.0,
        };
        let accesses = *self.access.lock().get(fingerprint).unwrap_or(&0);
        let rarity_points = (5u32.saturating_sub(accesses)) as f64;
        size_points + rarity_points
    }

    // ── Read / write ─────────────────────────────────────────────────────────

    /// Read-through lookup. Records the access for the scoring heuristic.
    pub async fn lookup(&self, ctx: &RequestContext, key: &str) -> (CacheStatus, Option<CachedTransform>) {
        {
            let mut access = self.access.lock();
            let count = access.get(key).copied().unwrap_or(0);
            access.put(key.to_string(), count.saturating_add(1));
        }

        let Some(store) = &self.store else {
            return (CacheStatus::Disabled, None);
        };
        if !self.settings.transform_cache.enabled {
            return (CacheStatus::Disabled, None);
        }

        match store.get(key).await {
            Ok(Some(cached)) => {
                ctx.breadcrumb("cache", format!("kv hit for {key}"));
                (CacheStatus::Hit, Some(cached))
            }
            Ok(None) => (CacheStatus::Miss, None),
            Err(err) => {
                warn!(%err, key, "transform cache read failed; bypassing");
                ctx.breadcrumb("cache", format!("kv read failed: {err}"));
                (CacheStatus::Miss, None)
            }
        }
    }

    /// Schedule a background write of a transformed response. Oversized
    /// bodies are skipped; failures are logged, never surfaced.
    pub fn store_response(
        &self,
        ctx: &RequestContext,
        key: &str,
        body: bytes::Bytes,
        content_type: &str,
        ttl: u64,
        tags: Vec<String>,
        fingerprint_inputs: String,
    ) {
        let Some(store) = &self.store else {
            return;
        };
        if !self.settings.transform_cache.enabled {
            return;
        }
        if body.len() > self.settings.transform_cache.max_size {
            debug!(
                key,
                size = body.len(),
                max = self.settings.transform_cache.max_size,
                "response exceeds transform-cache size cap"
            );
            return;
        }

        let store = Arc::clone(store);
        let key = key.to_string();
        let metadata = CacheMetadata {
            content_type: content_type.to_string(),
            ttl,
            tags,
            fingerprint_inputs,
        };

        ctx.breadcrumb("cache", format!("scheduled kv write for {key}"));
        ctx.spawn_background("transform-cache-write", async move {
            if let Err(err) = store.put(&key, body, metadata).await {
                warn!(%err, key = key.as_str(), "transform cache write failed");
            }
        });
    }

    /// `Cache-Control` value steering the CDN layer. With
    /// `cache_everything` on, an explicit `s-maxage` keeps the edge caching
    /// responses the origin would otherwise consider uncacheable.
    pub fn cache_control(&self, ttl: u64) -> String {
        if ttl == 0 {
            return "no-store".to_string();
        }
        if self.settings.cache_everything {
            format!("public, max-age={ttl}, s-maxage={ttl}")
        } else {
            format!("public, max-age={ttl}")
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use refract_kernel::params::OptionValue;
    use refract_storage::MemoryTransformCache;

    fn controller() -> CacheController {
        CacheController::new(
            CacheSettings::default(),
            "production".into(),
            Some(Arc::new(MemoryTransformCache::new())),
        )
    }

    fn options(width: u32) -> OptionMap {
        let mut map = OptionMap::new();
        map.insert("width", OptionValue::Number(width as f64));
        map.insert("format", OptionValue::Str("webp".into()));
        map
    }

    // ── Fingerprints ─────────────────────────────────────────────────────────

    #[test]
    fn identical_inputs_produce_identical_keys() {
        let c = controller();
        let a = c.fingerprint("/img/p.jpg", "width=800", &options(800), "webp");
        let b = c.fingerprint("/img/p.jpg", "width=800", &options(800), "webp");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn any_changed_input_changes_the_key() {
        let c = controller();
        let base = c.fingerprint("/img/p.jpg", "width=800", &options(800), "webp");
        assert_ne!(base, c.fingerprint("/img/other.jpg", "width=800", &options(800), "webp"));
        assert_ne!(base, c.fingerprint("/img/p.jpg", "width=900", &options(900), "webp"));
        assert_ne!(base, c.fingerprint("/img/p.jpg", "width=800", &options(800), "avif"));
    }

    #[test]
    fn volatile_params_do_not_affect_the_key() {
        let c = controller();
        let a = c.fingerprint("/img/p.jpg", "width=800", &options(800), "webp");
        let b = c.fingerprint("/img/p.jpg", "width=800&debug=true&v=123", &options(800), "webp");
        assert_eq!(a, b);
    }

    // ── TTLs ─────────────────────────────────────────────────────────────────

    #[test]
    fn longest_path_prefix_wins() {
        let mut settings = CacheSettings::default();
        settings.path_ttls.insert("/img/".into(), 100);
        settings.path_ttls.insert("/img/hero/".into(), 600);
        let c = CacheController::new(settings, "production".into(), None);

        assert_eq!(c.ttl_for("/img/hero/banner.jpg", 200, "image/webp"), 600);
        assert_eq!(c.ttl_for("/img/banner.jpg", 200, "image/webp"), 100);
    }

    #[test]
    fn status_class_applies_after_paths() {
        let c = controller();
        assert_eq!(c.ttl_for("/other.jpg", 200, "image/webp"), 86_400);
        assert_eq!(c.ttl_for("/other.jpg", 404, "image/webp"), 60);
        assert_eq!(c.ttl_for("/other.jpg", 502, "image/webp"), 10);
    }

    #[test]
    fn content_type_then_default() {
        let mut settings = CacheSettings::default();
        settings.ttl_by_status.clear();
        settings.ttl_by_content_type.insert("image/gif".into(), 120);
        let c = CacheController::new(settings, "production".into(), None);

        assert_eq!(c.ttl_for("/a.gif", 200, "image/gif"), 120);
        assert_eq!(c.ttl_for("/a.png", 200, "image/png"), 86_400);
    }

    // ── Tags ─────────────────────────────────────────────────────────────────

    #[test]
    fn tags_enumerate_salient_properties() {
        let c = controller();
        let mut map = options(800);
        map.insert("quality", OptionValue::Number(82.0));
        map.insert("derivative", OptionValue::Str("hero".into()));

        let tags = c.tags_for("/img/products/p.jpg", &map);
        assert!(tags.contains(&"img-all".to_string()));
        assert!(tags.contains(&"img-drv-hero".to_string()));
        assert!(tags.contains(&"img-fmt-webp".to_string()));
        assert!(tags.contains(&"img-q-80".to_string()));
        assert!(tags.contains(&"img-w-800".to_string()));
        assert!(tags.contains(&"img-p-img".to_string()));
        assert!(tags.contains(&"img-p-img-products".to_string()));
    }

    #[test]
    fn tags_are_capped_at_max() {
        let mut settings = CacheSettings::default();
        settings.tags.max_tags = 2;
        let c = CacheController::new(settings, "production".into(), None);
        let tags = c.tags_for("/img/p.jpg", &options(800));
        assert_eq!(tags.len(), 2);
    }

    // ── Bypass ───────────────────────────────────────────────────────────────

    #[test]
    fn bypass_on_param_header_env_and_prefix() {
        let c = controller();
        assert!(c.should_bypass("/img/p.jpg", &["nocache".into()], None, "fp", None));
        assert!(c.should_bypass("/img/p.jpg", &[], Some("no-cache"), "fp", None));
        assert!(!c.should_bypass("/img/p.jpg", &["width".into()], None, "fp", Some(0)));

        let dev = CacheController::new(CacheSettings::default(), "development".into(), None);
        assert!(dev.should_bypass("/img/p.jpg", &[], None, "fp", Some(0)));

        let mut settings = CacheSettings::default();
        settings.transform_cache.disallowed_prefixes.push("/private/".into());
        let c = CacheController::new(settings, "production".into(), None);
        assert!(c.should_bypass("/private/p.jpg", &[], None, "fp", Some(0)));
    }

    #[test]
    fn huge_rarely_accessed_artifacts_are_bypassed() {
        let c = controller();
        // Never-seen fingerprint + 6 MiB body: 8 + 5 > 10.
        assert!(c.should_bypass("/img/p.jpg", &[], None, "cold", Some(6 * 1024 * 1024)));
        // Small body never trips the score.
        assert!(!c.should_bypass("/img/p.jpg", &[], None, "cold", Some(10 * 1024)));
    }

    // ── Read / write ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn write_then_lookup_round_trips() {
        let c = controller();
        let ctx = RequestContext::new(false);
        let key = "abc123";

        c.store_response(
            &ctx,
            key,
            bytes::Bytes::from_static(b"webp-bytes"),
            "image/webp",
            60,
            vec!["img-all".into()],
            "inputs".into(),
        );

        // The write is fire-and-forget; give it a tick.
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let (status, hit) = c.lookup(&ctx, key).await;
        assert_eq!(status, CacheStatus::Hit);
        assert_eq!(hit.unwrap().body.as_ref(), b"webp-bytes");
    }

    #[tokio::test]
    async fn oversized_bodies_are_not_written() {
        let mut settings = CacheSettings::default();
        settings.transform_cache.max_size = 8;
        let store = Arc::new(MemoryTransformCache::new());
        let dyn_store: Arc<dyn TransformCache> = store.clone();
        let c = CacheController::new(settings, "production".into(), Some(dyn_store));
        let ctx = RequestContext::new(false);

        c.store_response(
            &ctx,
            "big",
            bytes::Bytes::from_static(b"way-more-than-eight"),
            "image/webp",
            60,
            vec![],
            "inputs".into(),
        );
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(store.is_empty());
    }

    #[test]
    fn cache_control_renders_ttl_and_edge_directive() {
        let c = controller();
        assert_eq!(c.cache_control(3600), "public, max-age=3600, s-maxage=3600");
        assert_eq!(c.cache_control(0), "no-store");

        let mut settings = CacheSettings::default();
        settings.cache_everything = false;
        let c = CacheController::new(settings, "production".into(), None);
        assert_eq!(c.cache_control(3600), "public, max-age=3600");
    }
}
