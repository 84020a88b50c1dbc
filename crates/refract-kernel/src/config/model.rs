//! Typed settings model.
//!
//! Everything the service reads from its configuration file lives here:
//! storage profiles with per-pattern overrides, cache policy tables, the
//! transform endpoint and its derivative presets, client-detection toggles,
//! and feature flags. [`Settings::validate`] checks all structural
//! invariants before any runtime resources are allocated; the loader in the
//! parent module calls it after deserialization.

use crate::storage::OriginKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Structural configuration failure, detected at startup.
#[derive(Debug, Error, PartialEq)]
#[non_exhaustive]
pub enum SettingsError {
    #[error("transform endpoint must be a non-empty http(s) URL, got '{0}'")]
    InvalidTransformEndpoint(String),

    #[error("storage priority list cannot be empty")]
    EmptyPriority,

    #[error("storage priority names '{0}' but no such origin is configured")]
    MissingOrigin(OriginKind),

    #[error("path override pattern cannot be empty")]
    EmptyPattern,

    #[error("path override pattern '{0}' is not a valid regex: {1}")]
    InvalidPattern(String, String),

    #[error("auth descriptor for '{origin}' is missing required field '{field}'")]
    IncompleteAuth {
        origin: &'static str,
        field: &'static str,
    },

    #[error("ttl_by_status key '{0}' must be one of 2xx, 3xx, 4xx, 5xx")]
    InvalidStatusClass(String),

    #[error("cache tags max_tags must be greater than 0")]
    ZeroMaxTags,

    #[error("detector max_dpr must be at least 1")]
    InvalidMaxDpr,

    #[error("responsive width list cannot be empty")]
    EmptyResponsiveWidths,
}

// ─────────────────────────────────────────────────────────────────────────────
// Top level
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub server: ServerSettings,
    pub auth: AuthSettings,
    pub storage: StorageSettings,
    pub cache: CacheSettings,
    pub transform: TransformSettings,
    pub detector: DetectorSettings,
    pub features: FeatureFlags,
}

impl Settings {
    /// Validate all structural invariants of this configuration.
    ///
    /// Checks performed (in order):
    /// 1. The transform endpoint is a non-empty http(s) URL.
    /// 2. The default storage profile's priority list is non-empty and every
    ///    named origin kind has a configuration block.
    /// 3. Every path override has a non-empty pattern, and `re:` patterns
    ///    compile.
    /// 4. Every auth descriptor carries the fields its kind requires.
    /// 5. `ttl_by_status` keys are status classes (`2xx` … `5xx`).
    /// 6. `tags.max_tags` and `detector.max_dpr` are positive.
    /// 7. The responsive width list is non-empty.
    ///
    /// Returns the *first* detected [`SettingsError`].
    pub fn validate(&self) -> Result<(), SettingsError> {
        // ── 1. Transform endpoint ────────────────────────────────────────────
        let endpoint = self.transform.endpoint.trim();
        if endpoint.is_empty()
            || !(endpoint.starts_with("http://") || endpoint.starts_with("https://"))
        {
            return Err(SettingsError::InvalidTransformEndpoint(
                self.transform.endpoint.clone(),
            ));
        }

        // ── 2. Default profile ───────────────────────────────────────────────
        self.storage.default.validate()?;

        // ── 3. Overrides ─────────────────────────────────────────────────────
        for entry in &self.storage.overrides {
            if entry.pattern.trim().is_empty() {
                return Err(SettingsError::EmptyPattern);
            }
            if let Some(expr) = entry.pattern.strip_prefix("re:") {
                regex::Regex::new(expr).map_err(|e| {
                    SettingsError::InvalidPattern(entry.pattern.clone(), e.to_string())
                })?;
            }
            // An override merged onto the default must still be coherent.
            self.storage.default.merged(&entry.profile).validate()?;
        }

        // ── 4. Auth descriptors ──────────────────────────────────────────────
        for (origin, remote) in [
            ("remote", &self.storage.default.remote),
            ("fallback", &self.storage.default.fallback),
        ] {
            if let Some(remote) = remote {
                remote.auth.validate(origin)?;
            }
        }
        for entry in &self.storage.overrides {
            for (origin, remote) in [
                ("remote", &entry.profile.remote),
                ("fallback", &entry.profile.fallback),
            ] {
                if let Some(remote) = remote {
                    remote.auth.validate(origin)?;
                }
            }
        }

        // ── 5. Status classes ────────────────────────────────────────────────
        for key in self.cache.ttl_by_status.keys() {
            if !matches!(key.as_str(), "2xx" | "3xx" | "4xx" | "5xx") {
                return Err(SettingsError::InvalidStatusClass(key.clone()));
            }
        }

        // ── 6. Positive knobs ────────────────────────────────────────────────
        if self.cache.tags.max_tags == 0 {
            return Err(SettingsError::ZeroMaxTags);
        }
        // The detector clamps reported DPR into [1, max_dpr]; a cap below 1
        // would invert that range.
        if self.detector.max_dpr < 1.0 {
            return Err(SettingsError::InvalidMaxDpr);
        }

        // ── 7. Responsive widths ─────────────────────────────────────────────
        if self.transform.responsive_widths.is_empty() {
            return Err(SettingsError::EmptyResponsiveWidths);
        }

        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Server / auth
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSettings {
    /// TCP port to listen on.
    pub port: u16,
    /// Deployment environment label (`development`, `staging`, `production`).
    /// Consulted by the cache bypass policy.
    pub environment: String,
    /// Prefix for diagnostic response headers emitted when `debug=true`.
    pub debug_header_prefix: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: 8080,
            environment: "development".to_string(),
            debug_header_prefix: "X-".to_string(),
        }
    }
}

/// How strictly origin authentication failures are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityLevel {
    /// Signing failures abort the origin try (surfaces as 502 if no origin
    /// succeeds).
    #[default]
    Strict,
    /// Signing failures downgrade to an unauthenticated fetch.
    Permissive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthSettings {
    /// Global switch. When off, the auth provider is never invoked.
    pub enabled: bool,
    pub security_level: SecurityLevel,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            security_level: SecurityLevel::Strict,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Storage profiles
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageSettings {
    /// Profile applied when no override pattern matches.
    pub default: StorageProfileConfig,
    /// Pattern-scoped profile overrides, matched in declaration order.
    pub overrides: Vec<PathPatternConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageProfileConfig {
    /// Origin kinds in the order they are tried.
    pub priority: Vec<OriginKind>,
    pub object_store: Option<ObjectStoreOriginConfig>,
    pub remote: Option<RemoteOriginConfig>,
    pub fallback: Option<RemoteOriginConfig>,
    /// Path rewriting rules keyed by leading path segment: a request whose
    /// first segment matches a key gets that rule (with optional per-origin
    /// overrides) applied.
    pub path_transforms: HashMap<String, PathTransformConfig>,
}

impl Default for StorageProfileConfig {
    fn default() -> Self {
        // Zero-config startup: a single object-store origin under the
        // default binding name. Remote/fallback tiers are opt-in.
        Self {
            priority: vec![OriginKind::ObjectStore],
            object_store: Some(ObjectStoreOriginConfig::default()),
            remote: None,
            fallback: None,
            path_transforms: HashMap::new(),
        }
    }
}

impl StorageProfileConfig {
    fn validate(&self) -> Result<(), SettingsError> {
        if self.priority.is_empty() {
            return Err(SettingsError::EmptyPriority);
        }
        for kind in &self.priority {
            let configured = match kind {
                OriginKind::ObjectStore => self.object_store.is_some(),
                OriginKind::Remote => self.remote.is_some(),
                OriginKind::Fallback => self.fallback.is_some(),
            };
            if !configured {
                return Err(SettingsError::MissingOrigin(*kind));
            }
        }
        Ok(())
    }

    /// Field-level inheritance: any field absent in `partial` is taken from
    /// `self`. Called once per override at startup; the merged profiles are
    /// immutable afterwards.
    pub fn merged(&self, partial: &PartialProfileConfig) -> StorageProfileConfig {
        StorageProfileConfig {
            priority: partial.priority.clone().unwrap_or_else(|| self.priority.clone()),
            object_store: partial
                .object_store
                .clone()
                .or_else(|| self.object_store.clone()),
            remote: partial.remote.clone().or_else(|| self.remote.clone()),
            fallback: partial.fallback.clone().or_else(|| self.fallback.clone()),
            path_transforms: partial
                .path_transforms
                .clone()
                .unwrap_or_else(|| self.path_transforms.clone()),
        }
    }
}

/// A pattern-scoped override. Fields absent here inherit from the default
/// profile. (`deny_unknown_fields` is incompatible with `flatten`, so this
/// pair of structs stays permissive.)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathPatternConfig {
    /// Literal substring, or a regex when prefixed with `re:`.
    pub pattern: String,
    #[serde(flatten)]
    pub profile: PartialProfileConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartialProfileConfig {
    pub priority: Option<Vec<OriginKind>>,
    pub object_store: Option<ObjectStoreOriginConfig>,
    pub remote: Option<RemoteOriginConfig>,
    pub fallback: Option<RemoteOriginConfig>,
    pub path_transforms: Option<HashMap<String, PathTransformConfig>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ObjectStoreOriginConfig {
    /// Name of the configured blob-store binding.
    pub binding: String,
}

impl Default for ObjectStoreOriginConfig {
    fn default() -> Self {
        Self {
            binding: "images".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RemoteOriginConfig {
    /// Base URL the per-origin path is appended to.
    pub url: String,
    pub auth: AuthDescriptor,
    /// Per-origin fetch deadline in milliseconds.
    pub timeout_ms: u64,
    pub user_agent: Option<String>,
    /// Extra headers injected into every fetch to this origin.
    pub headers: HashMap<String, String>,
}

impl Default for RemoteOriginConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            auth: AuthDescriptor::default(),
            timeout_ms: 5_000,
            user_agent: None,
            headers: HashMap::new(),
        }
    }
}

/// Rewrite rule for one routing segment: strip the segment, prepend a
/// prefix. `origins` carries per-origin-kind overrides; origins without an
/// entry use the top-level rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathTransformConfig {
    pub prefix: String,
    pub remove_prefix: bool,
    /// Overrides keyed by origin kind (`"object-store"`, `"remote"`,
    /// `"fallback"`).
    pub origins: HashMap<String, PathTransformRule>,
}

impl PathTransformConfig {
    /// The rule for a given origin kind, falling back to the default rule.
    pub fn rule_for(&self, kind: crate::storage::OriginKind) -> PathTransformRule {
        self.origins
            .get(kind.as_str())
            .cloned()
            .unwrap_or(PathTransformRule {
                prefix: self.prefix.clone(),
                remove_prefix: self.remove_prefix,
            })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathTransformRule {
    pub prefix: String,
    pub remove_prefix: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Auth descriptors
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthKind {
    #[default]
    None,
    Bearer,
    Header,
    QuerySigned,
    AwsV4,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthDescriptor {
    pub kind: AuthKind,
    /// Environment variable holding the shared secret (`bearer`,
    /// `query-signed`).
    pub token_env: Option<String>,
    /// Fixed headers injected verbatim (`header`).
    pub headers: HashMap<String, String>,
    /// SigV4 scope (`aws-v4`).
    pub region: Option<String>,
    pub service: Option<String>,
    pub access_key_env: Option<String>,
    pub secret_key_env: Option<String>,
    /// Signature query parameter name (`query-signed`).
    pub param_name: String,
    /// Signed-URL lifetime in seconds (`query-signed`).
    pub expiration_secs: u64,
}

impl Default for AuthDescriptor {
    fn default() -> Self {
        Self {
            kind: AuthKind::None,
            token_env: None,
            headers: HashMap::new(),
            region: None,
            service: None,
            access_key_env: None,
            secret_key_env: None,
            param_name: "sig".to_string(),
            expiration_secs: 300,
        }
    }
}

impl AuthDescriptor {
    fn validate(&self, origin: &'static str) -> Result<(), SettingsError> {
        let missing = |field: &'static str| SettingsError::IncompleteAuth { origin, field };
        match self.kind {
            AuthKind::None => Ok(()),
            AuthKind::Bearer | AuthKind::QuerySigned => {
                if self.token_env.is_none() {
                    return Err(missing("token_env"));
                }
                Ok(())
            }
            AuthKind::Header => {
                if self.headers.is_empty() {
                    return Err(missing("headers"));
                }
                Ok(())
            }
            AuthKind::AwsV4 => {
                if self.region.is_none() {
                    return Err(missing("region"));
                }
                if self.service.is_none() {
                    return Err(missing("service"));
                }
                if self.access_key_env.is_none() {
                    return Err(missing("access_key_env"));
                }
                if self.secret_key_env.is_none() {
                    return Err(missing("secret_key_env"));
                }
                Ok(())
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Cache settings
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheSettings {
    /// Fallback TTL in seconds when no table matches.
    pub default_ttl: u64,
    /// TTL by status class: keys `2xx`, `3xx`, `4xx`, `5xx`.
    pub ttl_by_status: HashMap<String, u64>,
    /// TTL by response content type.
    pub ttl_by_content_type: HashMap<String, u64>,
    /// TTL by request path prefix; the longest matching prefix wins.
    pub path_ttls: HashMap<String, u64>,
    /// CDN-layer cache-everything toggle, forwarded to the primitive.
    pub cache_everything: bool,
    pub tags: TagSettings,
    pub bypass: BypassSettings,
    pub transform_cache: TransformCacheSettings,
    /// Query parameters stripped before fingerprinting (cache busters).
    pub cache_buster_params: Vec<String>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            default_ttl: 86_400,
            ttl_by_status: HashMap::from([
                ("2xx".to_string(), 86_400),
                ("3xx".to_string(), 3_600),
                ("4xx".to_string(), 60),
                ("5xx".to_string(), 10),
            ]),
            ttl_by_content_type: HashMap::new(),
            path_ttls: HashMap::new(),
            cache_everything: true,
            tags: TagSettings::default(),
            bypass: BypassSettings::default(),
            transform_cache: TransformCacheSettings::default(),
            cache_buster_params: vec!["v".into(), "cb".into(), "t".into()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TagSettings {
    pub enabled: bool,
    pub prefix: String,
    pub max_tags: usize,
}

impl Default for TagSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            prefix: "img-".to_string(),
            max_tags: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BypassSettings {
    /// Query parameters whose presence bypasses the cache.
    pub params: Vec<String>,
    /// Request-path prefixes that always bypass.
    pub paths: Vec<String>,
    /// Deployment environments that always bypass.
    pub environments: Vec<String>,
    /// Bypass when the size/access score exceeds this value.
    pub score_threshold: f64,
}

impl Default for BypassSettings {
    fn default() -> Self {
        Self {
            params: vec!["nocache".into(), "bypass".into()],
            paths: Vec::new(),
            environments: vec!["development".into()],
            score_threshold: 10.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransformCacheSettings {
    pub enabled: bool,
    /// Largest response (bytes) eligible for the KV transform cache.
    pub max_size: usize,
    /// Largest response written synchronously when no background handle is
    /// available.
    pub sync_write_max: usize,
    /// Path prefixes excluded from the transform cache.
    pub disallowed_prefixes: Vec<String>,
}

impl Default for TransformCacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_size: 10 * 1024 * 1024,
            sync_write_max: 256 * 1024,
            disallowed_prefixes: Vec::new(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Transform / detector / features
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransformSettings {
    /// Base URL of the transform primitive.
    pub endpoint: String,
    pub timeout_ms: u64,
    pub user_agent: String,
    /// Named presets: derivative name → option name → value.
    pub derivatives: HashMap<String, HashMap<String, serde_json::Value>>,
    /// Responsive breakpoints; detector-suggested widths round up to these.
    pub responsive_widths: Vec<u32>,
    /// Per-format quality defaults.
    pub format_quality: HashMap<String, u8>,
}

impl Default for TransformSettings {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:9090".to_string(),
            timeout_ms: 10_000,
            user_agent: concat!("refract/", env!("CARGO_PKG_VERSION")).to_string(),
            derivatives: HashMap::new(),
            responsive_widths: vec![320, 640, 768, 960, 1024, 1440, 1920, 2048],
            format_quality: HashMap::from([
                ("avif".to_string(), 80),
                ("webp".to_string(), 85),
                ("jpeg".to_string(), 85),
            ]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DetectorSettings {
    pub enabled: bool,
    /// Cap applied to client-reported DPR.
    pub max_dpr: f64,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_dpr: 3.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FeatureFlags {
    /// Recognize the legacy third-party parameter family.
    pub legacy_compat: bool,
    /// Enable the advanced legacy forms (`im.if-dimension`, composites).
    pub legacy_advanced: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            legacy_compat: true,
            legacy_advanced: true,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
