//! Tiered origin fetching.
//!
//! [`StorageFetcher`] walks the resolved profile's priority list. Each
//! origin try runs a small state machine:
//!
//! ```text
//! idle → in-flight → ok            (return bytes)
//!                  → not-modified  (return 304 outcome)
//!                  → not-found     (record attempt, next origin)
//!                  → auth-error    (record attempt, next origin)
//!                  → transport-err (record attempt, next origin)
//! ```
//!
//! Terminal states `ok` and `not-modified` end the loop. HTTP origins race
//! the transformed path against its slash-normalized twin when they differ;
//! the first success wins and dropping the loser cancels it. Every try is
//! bounded by the origin's configured deadline.

use crate::auth::{AuthError, AuthOutcome, AuthProvider};
use crate::router::PathRouter;
use chrono::{DateTime, Utc};
use futures::future::select_ok;
use refract_kernel::config::RemoteOriginConfig;
use refract_kernel::context::RequestContext;
use refract_kernel::storage::{
    ByteRange, Conditions, FetchOutcome, GetOptions, ObjectGet, ObjectStore, OriginAttempt,
    OriginKind, StorageResult,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, warn};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    /// Every origin answered, none holds the object.
    #[error("no origin holds '{path}'")]
    Miss {
        path: String,
        attempts: Vec<OriginAttempt>,
    },

    /// At least one origin failed for transport or auth reasons.
    #[error("all origins failed for '{path}'")]
    Exhausted {
        path: String,
        attempts: Vec<OriginAttempt>,
    },
}

impl StorageError {
    pub fn attempts(&self) -> &[OriginAttempt] {
        match self {
            StorageError::Miss { attempts, .. } | StorageError::Exhausted { attempts, .. } => {
                attempts
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Request conditions
// ─────────────────────────────────────────────────────────────────────────────

/// Conditional and range state extracted from the inbound request, carried
/// through to whichever origin answers.
#[derive(Debug, Clone, Default)]
pub struct RequestConditions {
    pub if_none_match: Option<String>,
    pub if_modified_since: Option<DateTime<Utc>>,
    pub range: Option<ByteRange>,
    /// The `Range` header verbatim, for HTTP pass-through.
    pub raw_range: Option<String>,
}

impl RequestConditions {
    /// Build from raw header values.
    pub fn parse(
        if_none_match: Option<&str>,
        if_modified_since: Option<&str>,
        range: Option<&str>,
    ) -> Self {
        Self {
            if_none_match: if_none_match.map(|s| s.trim_matches('"').to_string()),
            if_modified_since: if_modified_since
                .and_then(|s| DateTime::parse_from_rfc2822(s).ok())
                .map(|dt| dt.with_timezone(&Utc)),
            range: range.and_then(parse_range_header),
            raw_range: range.map(str::to_string),
        }
    }

    pub fn is_conditional(&self) -> bool {
        self.if_none_match.is_some() || self.if_modified_since.is_some()
    }

    fn only_if(&self) -> Option<Conditions> {
        if !self.is_conditional() {
            return None;
        }
        Some(Conditions {
            etag_does_not_match: self.if_none_match.clone(),
            uploaded_after: self.if_modified_since,
        })
    }
}

/// Parse a single-range `Range` header (`bytes=0-99`, `bytes=100-`,
/// `bytes=-100`). Multi-range requests are not propagated.
pub fn parse_range_header(raw: &str) -> Option<ByteRange> {
    let ranges = raw.trim().strip_prefix("bytes=")?.trim();
    if ranges.contains(',') {
        return None;
    }
    if let Some(suffix) = ranges.strip_prefix('-') {
        return Some(ByteRange::Suffix {
            length: suffix.parse().ok()?,
        });
    }
    let (start, end) = ranges.split_once('-')?;
    let offset: u64 = start.parse().ok()?;
    let length = if end.is_empty() {
        None
    } else {
        let end: u64 = end.parse().ok()?;
        Some(end.checked_sub(offset)? + 1)
    };
    Some(ByteRange::Offset { offset, length })
}

// ─────────────────────────────────────────────────────────────────────────────
// StorageFetcher
// ─────────────────────────────────────────────────────────────────────────────

/// One failed origin try plus its error class.
struct TryFailure {
    attempt: OriginAttempt,
    /// Transport/auth-class failures surface as 502 on exhaustion; pure
    /// misses surface as 404.
    transport: bool,
}

impl TryFailure {
    fn not_found(origin: OriginKind, status: Option<u16>, reason: impl Into<String>) -> Self {
        Self {
            attempt: OriginAttempt {
                origin,
                status,
                reason: reason.into(),
            },
            transport: false,
        }
    }

    fn transport(origin: OriginKind, status: Option<u16>, reason: impl Into<String>) -> Self {
        Self {
            attempt: OriginAttempt {
                origin,
                status,
                reason: reason.into(),
            },
            transport: true,
        }
    }
}

pub struct StorageFetcher {
    router: Arc<PathRouter>,
    auth: Arc<AuthProvider>,
    object_store: Option<Arc<dyn ObjectStore>>,
    client: reqwest::Client,
}

impl StorageFetcher {
    pub fn new(
        router: Arc<PathRouter>,
        auth: Arc<AuthProvider>,
        object_store: Option<Arc<dyn ObjectStore>>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .build()
            .expect("failed to build reqwest client");
        Self {
            router,
            auth,
            object_store,
            client,
        }
    }

    /// Fetch `path` across the profile's origins, first success wins.
    #[instrument(skip(self, ctx, cond), fields(request_id = %ctx.id(), path))]
    pub async fn fetch(
        &self,
        ctx: &RequestContext,
        path: &str,
        cond: &RequestConditions,
    ) -> Result<FetchOutcome, StorageError> {
        let profile = self.router.resolve(path);
        let mut attempts: Vec<OriginAttempt> = Vec::new();
        let mut any_transport = false;

        for kind in profile.priority.iter().copied() {
            let origin_path = self.router.origin_path(&profile, kind, path);

            let result = match kind {
                OriginKind::ObjectStore => self.try_object_store(&origin_path, cond).await,
                OriginKind::Remote => {
                    self.try_http(kind, profile.remote.as_ref(), &origin_path, cond)
                        .await
                }
                OriginKind::Fallback => {
                    self.try_http(kind, profile.fallback.as_ref(), &origin_path, cond)
                        .await
                }
            };

            match result {
                Ok(outcome) => {
                    ctx.breadcrumb("storage", format!("{kind} hit for {origin_path}"));
                    return Ok(outcome);
                }
                Err(failure) => {
                    debug!(
                        origin = %kind,
                        status = ?failure.attempt.status,
                        reason = failure.attempt.reason.as_str(),
                        "origin try failed"
                    );
                    ctx.breadcrumb(
                        "storage",
                        format!("{kind} failed: {}", failure.attempt.reason),
                    );
                    any_transport |= failure.transport;
                    attempts.push(failure.attempt);
                }
            }
        }

        warn!(path, tried = attempts.len(), "storage resolution exhausted");
        if any_transport {
            Err(StorageError::Exhausted {
                path: path.to_string(),
                attempts,
            })
        } else {
            Err(StorageError::Miss {
                path: path.to_string(),
                attempts,
            })
        }
    }

    // ── Object store ─────────────────────────────────────────────────────────

    async fn try_object_store(
        &self,
        origin_path: &str,
        cond: &RequestConditions,
    ) -> Result<FetchOutcome, TryFailure> {
        let kind = OriginKind::ObjectStore;
        let Some(store) = &self.object_store else {
            return Err(TryFailure::not_found(kind, None, "no object store bound"));
        };

        let key = origin_path.trim_start_matches('/');
        let opts = GetOptions {
            only_if: cond.only_if(),
            range: cond.range,
        };

        match store.get(key, &opts).await {
            Ok(ObjectGet::Found(obj)) => {
                let (status, content_range) = match cond.range {
                    Some(range) => (206, Some(content_range(range, &obj))),
                    None => (200, None),
                };
                Ok(FetchOutcome::Fetched(StorageResult {
                    size: obj.size,
                    content_type: obj
                        .content_type
                        .unwrap_or_else(|| content_type_for_path(origin_path).to_string()),
                    path: origin_path.to_string(),
                    etag: obj.etag,
                    last_modified: obj.uploaded,
                    width: None,
                    height: None,
                    status,
                    content_range,
                    source: kind,
                    body: obj.body,
                }))
            }
            Ok(ObjectGet::NotModified { etag }) => {
                Ok(FetchOutcome::NotModified { source: kind, etag })
            }
            Ok(ObjectGet::Missing) => Err(TryFailure::not_found(kind, Some(404), "not found")),
            Err(err) => Err(TryFailure::transport(kind, None, err.to_string())),
        }
    }

    // ── HTTP origins ─────────────────────────────────────────────────────────

    async fn try_http(
        &self,
        kind: OriginKind,
        config: Option<&RemoteOriginConfig>,
        origin_path: &str,
        cond: &RequestConditions,
    ) -> Result<FetchOutcome, TryFailure> {
        let Some(config) = config else {
            return Err(TryFailure::not_found(kind, None, "origin not configured"));
        };

        let primary = join_origin_url(&config.url, origin_path);
        let normalized = normalize_url_path(&primary);

        if primary == normalized {
            self.send_http(kind, config, &primary, cond).await
        } else {
            // Race the transformed path against its normalized twin; the
            // first success cancels the other.
            let a = Box::pin(self.send_http(kind, config, &primary, cond));
            let b = Box::pin(self.send_http(kind, config, &normalized, cond));
            match select_ok([a, b]).await {
                Ok((outcome, _rest)) => Ok(outcome),
                Err(failure) => Err(failure),
            }
        }
    }

    async fn send_http(
        &self,
        kind: OriginKind,
        config: &RemoteOriginConfig,
        url: &str,
        cond: &RequestConditions,
    ) -> Result<FetchOutcome, TryFailure> {
        let parsed = url::Url::parse(url)
            .map_err(|e| TryFailure::transport(kind, None, format!("bad origin url: {e}")))?;

        // Fast path: with auth globally disabled the provider is never
        // invoked on the request path.
        let auth = if self.auth.enabled() {
            self.auth
                .authorize(&parsed, &config.auth)
                .map_err(|err: AuthError| {
                    TryFailure::transport(kind, None, format!("auth: {err}"))
                })?
        } else {
            AuthOutcome::default()
        };

        let target = auth.signed_url.as_deref().unwrap_or(url);
        let mut request = self
            .client
            .get(target)
            .timeout(Duration::from_millis(config.timeout_ms));

        if let Some(ua) = &config.user_agent {
            request = request.header("user-agent", ua.as_str());
        }
        for (name, value) in &config.headers {
            request = request.header(name, value);
        }
        for (name, value) in &auth.headers {
            request = request.header(name, value);
        }
        if let Some(etag) = &cond.if_none_match {
            request = request.header("if-none-match", format!("\"{etag}\""));
        }
        if let Some(since) = cond.if_modified_since {
            request = request.header("if-modified-since", http_date(since));
        }
        if let Some(range) = &cond.raw_range {
            request = request.header("range", range.as_str());
        }

        let response = request.send().await.map_err(|err| {
            if err.is_timeout() {
                TryFailure::transport(kind, None, "deadline exceeded")
            } else {
                TryFailure::transport(kind, None, err.to_string())
            }
        })?;

        let status = response.status().as_u16();
        match status {
            200 | 206 => {}
            304 => {
                let etag = header_string(&response, "etag").map(|e| e.trim_matches('"').to_string());
                return Ok(FetchOutcome::NotModified { source: kind, etag });
            }
            404 => return Err(TryFailure::not_found(kind, Some(404), "not found")),
            _ => {
                return Err(TryFailure::transport(
                    kind,
                    Some(status),
                    format!("unexpected status {status}"),
                ));
            }
        }

        let content_type = header_string(&response, "content-type")
            .unwrap_or_else(|| content_type_for_path(url).to_string());
        let etag = header_string(&response, "etag").map(|e| e.trim_matches('"').to_string());
        let last_modified = header_string(&response, "last-modified")
            .and_then(|s| DateTime::parse_from_rfc2822(&s).ok())
            .map(|dt| dt.with_timezone(&Utc));
        let content_range = header_string(&response, "content-range");
        let declared_size = content_range
            .as_deref()
            .and_then(|cr| cr.rsplit_once('/'))
            .and_then(|(_, total)| total.parse::<u64>().ok())
            .or(response.content_length());

        let body = response
            .bytes()
            .await
            .map_err(|e| TryFailure::transport(kind, Some(status), e.to_string()))?;

        Ok(FetchOutcome::Fetched(StorageResult {
            size: declared_size.unwrap_or(body.len() as u64),
            content_type,
            path: url.to_string(),
            etag,
            last_modified,
            width: None,
            height: None,
            status,
            content_range,
            source: kind,
            body,
        }))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn join_origin_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Collapse duplicate slashes in the path portion of a URL.
fn normalize_url_path(url: &str) -> String {
    let Some(scheme_end) = url.find("://") else {
        return url.to_string();
    };
    let (scheme, rest) = url.split_at(scheme_end + 3);
    let mut out = String::with_capacity(url.len());
    out.push_str(scheme);
    let mut prev_slash = false;
    for (i, c) in rest.char_indices() {
        // Only the path is normalized; the authority has no '//' and the
        // query is copied verbatim.
        if c == '?' {
            out.push_str(&rest[i..]);
            break;
        }
        if c == '/' && prev_slash {
            continue;
        }
        prev_slash = c == '/';
        out.push(c);
    }
    out
}

fn header_string(response: &reqwest::Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// HTTP-date rendering for conditional headers.
fn http_date(dt: DateTime<Utc>) -> String {
    dt.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// `Content-Range` for a satisfied range request against a stored object.
fn content_range(range: ByteRange, obj: &refract_kernel::storage::StoredObject) -> String {
    let start = match range {
        ByteRange::Offset { offset, .. } => offset,
        ByteRange::Suffix { length } => obj.size.saturating_sub(length),
    };
    let end = start + obj.body.len() as u64 - 1;
    format!("bytes {start}-{end}/{}", obj.size)
}

/// Extension-based content-type fallback for origins that do not declare
/// one.
fn content_type_for_path(path: &str) -> &'static str {
    let ext = path
        .rsplit('.')
        .next()
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "avif" => "image/avif",
        "svg" => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

// =============================================================================
// Tests
// =============================================================================
