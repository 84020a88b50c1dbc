//! Path routing: request path → storage profile + per-origin path rewrite.
//!
//! Profiles are materialized once at construction: every pattern-scoped
//! override is merged onto the default profile (field-level inheritance),
//! patterns are compiled, and the resulting table is immutable for the life
//! of the process. Matching walks the table in declaration order; first hit
//! wins, otherwise the default profile applies.
//!
//! Rewrites are deterministic (same inputs, same output) and cached in a
//! bounded LRU keyed by `(path, origin kind)` to avoid repeated string work
//! on hot paths.

use lru::LruCache;
use parking_lot::Mutex;
use refract_kernel::config::{StorageProfileConfig, StorageSettings};
use refract_kernel::storage::OriginKind;
use regex::Regex;
use std::num::NonZeroUsize;
use std::sync::Arc;
use thiserror::Error;

/// Rewrite-cache capacity. Hot paths repeat heavily; a small cache captures
/// most of the win.
const REWRITE_CACHE_CAPACITY: usize = 1024;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RouterError {
    #[error("pattern '{0}' is not a valid regex: {1}")]
    InvalidPattern(String, String),
}

// ─────────────────────────────────────────────────────────────────────────────
// Pattern matching
// ─────────────────────────────────────────────────────────────────────────────

/// A compiled override pattern: `re:`-prefixed strings compile to regexes,
/// everything else matches as a literal substring.
enum PatternMatcher {
    Literal(String),
    Regex(Regex),
}

impl PatternMatcher {
    fn compile(pattern: &str) -> Result<Self, RouterError> {
        match pattern.strip_prefix("re:") {
            Some(expr) => Regex::new(expr)
                .map(PatternMatcher::Regex)
                .map_err(|e| RouterError::InvalidPattern(pattern.to_string(), e.to_string())),
            None => Ok(PatternMatcher::Literal(pattern.to_string())),
        }
    }

    fn matches(&self, path: &str) -> bool {
        match self {
            PatternMatcher::Literal(needle) => path.contains(needle.as_str()),
            PatternMatcher::Regex(re) => re.is_match(path),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// PathRouter
// ─────────────────────────────────────────────────────────────────────────────

pub struct PathRouter {
    default: Arc<StorageProfileConfig>,
    patterns: Vec<(PatternMatcher, Arc<StorageProfileConfig>)>,
    rewrite_cache: Mutex<LruCache<(String, OriginKind), String>>,
}

impl PathRouter {
    /// Compile patterns and materialize merged profiles from settings.
    pub fn from_settings(storage: &StorageSettings) -> Result<Self, RouterError> {
        let default = Arc::new(storage.default.clone());

        let mut patterns = Vec::with_capacity(storage.overrides.len());
        for entry in &storage.overrides {
            let matcher = PatternMatcher::compile(&entry.pattern)?;
            let merged = Arc::new(storage.default.merged(&entry.profile));
            patterns.push((matcher, merged));
        }

        Ok(Self {
            default,
            patterns,
            rewrite_cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(REWRITE_CACHE_CAPACITY).expect("capacity is non-zero"),
            )),
        })
    }

    /// The profile for a request path: first matching override, else default.
    pub fn resolve(&self, path: &str) -> Arc<StorageProfileConfig> {
        for (matcher, profile) in &self.patterns {
            if matcher.matches(path) {
                return Arc::clone(profile);
            }
        }
        Arc::clone(&self.default)
    }

    /// The per-origin rewritten path.
    ///
    /// When the path's first segment names a configured transform and its
    /// rule says `remove_prefix`, the segment is stripped; the rule's prefix
    /// is then prepended. Paths without a matching segment pass through
    /// unchanged.
    pub fn origin_path(
        &self,
        profile: &StorageProfileConfig,
        kind: OriginKind,
        path: &str,
    ) -> String {
        let key = (path.to_string(), kind);
        if let Some(hit) = self.rewrite_cache.lock().get(&key) {
            return hit.clone();
        }

        let rewritten = rewrite(profile, kind, path);
        self.rewrite_cache.lock().put(key, rewritten.clone());
        rewritten
    }
}

fn rewrite(profile: &StorageProfileConfig, kind: OriginKind, path: &str) -> String {
    let trimmed = path.trim_start_matches('/');
    let (first, rest) = trimmed.split_once('/').unwrap_or((trimmed, ""));

    let Some(transform) = profile.path_transforms.get(first) else {
        return path.to_string();
    };
    let rule = transform.rule_for(kind);

    let remainder = if rule.remove_prefix { rest } else { trimmed };
    let mut out = String::with_capacity(1 + rule.prefix.len() + remainder.len());
    out.push('/');
    out.push_str(rule.prefix.trim_start_matches('/'));
    if !out.ends_with('/') && !remainder.is_empty() {
        out.push('/');
    }
    out.push_str(remainder);
    out
}

// =============================================================================
// Tests
// =============================================================================
