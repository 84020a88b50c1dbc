//! Axum-based edge gateway server.
//!
//! [`GatewayServer`] wires the parameter engine, storage layer, transform
//! orchestrator, and cache controller into a running axum service.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Liveness check — always `200 OK`. |
//! | `GET`  | `/{source path}` | The image pipeline (everything else). |
//!
//! # Request pipeline
//!
//! ```text
//! parse ▸ process ▸ enrich ▸ fingerprint ▸ (revalidate | range | cache hit)
//!       ▸ fetch origin ▸ render ▸ background cache write ▸ respond
//! ```

use crate::cache::{CacheController, CacheStatus};
use crate::detector::ClientDetector;
use crate::error::GatewayError;
use crate::orchestrator::TransformOrchestrator;
use crate::state::AppState;
use crate::transform::HttpTransformBackend;
use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, Uri, header},
    response::{IntoResponse, Response},
    routing::get,
};
use refract_kernel::cache::TransformCache;
use refract_kernel::config::Settings;
use refract_kernel::context::RequestContext;
use refract_kernel::params::ResolvedOptions;
use refract_kernel::storage::{FetchOutcome, ObjectStore, StorageResult};
use refract_kernel::transform::TransformBackend;
use refract_params::parsers::parse_request;
use refract_params::processor::ParamProcessor;
use refract_params::request::RequestFacts;
use refract_storage::{
    AuthProvider, MemoryTransformCache, PathRouter, RequestConditions, RouterError, StorageFetcher,
};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::info;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Router(#[from] RouterError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

// ─────────────────────────────────────────────────────────────────────────────
// GatewayServer
// ─────────────────────────────────────────────────────────────────────────────

/// High-level server wrapping component assembly. Collaborators (object
/// store, transform cache, transform backend) are injectable; anything not
/// provided gets the default wiring.
pub struct GatewayServer {
    settings: Settings,
    object_store: Option<Arc<dyn ObjectStore>>,
    transform_cache: Option<Arc<dyn TransformCache>>,
    backend: Option<Arc<dyn TransformBackend>>,
}

impl GatewayServer {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            object_store: None,
            transform_cache: None,
            backend: None,
        }
    }

    /// Bind a concrete object store (the `object-store` origin kind).
    pub fn with_object_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.object_store = Some(store);
        self
    }

    /// Bind a concrete transform-cache store.
    pub fn with_transform_cache(mut self, cache: Arc<dyn TransformCache>) -> Self {
        self.transform_cache = Some(cache);
        self
    }

    /// Replace the HTTP transform backend (tests use scripted backends).
    pub fn with_backend(mut self, backend: Arc<dyn TransformBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Assemble the component graph and build the axum [`Router`].
    pub fn build_app(self) -> Result<Router, ServerError> {
        let settings = Arc::new(self.settings);

        let router = Arc::new(PathRouter::from_settings(&settings.storage)?);
        let auth = Arc::new(AuthProvider::new(settings.auth.clone()));
        let fetcher = Arc::new(StorageFetcher::new(router, auth, self.object_store));

        let backend: Arc<dyn TransformBackend> = self
            .backend
            .unwrap_or_else(|| Arc::new(HttpTransformBackend::new(&settings.transform)));
        let orchestrator = Arc::new(TransformOrchestrator::new(
            backend,
            ClientDetector::new(settings.detector.clone()),
            settings.transform.clone(),
        ));

        let transform_cache = self.transform_cache.or_else(|| {
            settings
                .cache
                .transform_cache
                .enabled
                .then(|| Arc::new(MemoryTransformCache::new()) as Arc<dyn TransformCache>)
        });
        let cache = Arc::new(CacheController::new(
            settings.cache.clone(),
            settings.server.environment.clone(),
            transform_cache,
        ));

        let state = AppState {
            processor: Arc::new(ParamProcessor::new(&settings.transform)),
            settings,
            fetcher,
            orchestrator,
            cache,
        };

        Ok(Router::new()
            .route("/health", get(health_handler))
            .fallback(image_handler)
            .layer(TraceLayer::new_for_http())
            .with_state(state))
    }

    /// Bind to `0.0.0.0:{port}` and serve until the process exits.
    pub async fn start(self) -> Result<(), ServerError> {
        let port = self.settings.server.port;
        let app = self.build_app()?;
        let addr = format!("0.0.0.0:{port}");
        info!(addr = %addr, "refract gateway starting");
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, app).await?;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// `GET /health` — liveness probe.
async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok", "service": "refract-gateway" }))
}

/// The image pipeline. Everything that is not `/health` lands here.
async fn image_handler(State(state): State<AppState>, uri: Uri, headers: HeaderMap) -> Response {
    let facts = RequestFacts::new(uri.path(), uri.query());
    let ctx = RequestContext::new(facts.debug_requested());

    // ── Parameter resolution ─────────────────────────────────────────────────
    let parsed = parse_request(&facts, &state.settings.features);
    let mut options = state.processor.process(parsed);
    ctx.breadcrumb(
        "params",
        format!("{} options, {} discarded", options.map.len(), options.discarded.len()),
    );

    state.orchestrator.enrich(&ctx, &headers, &mut options);

    // ── Cache identity ───────────────────────────────────────────────────────
    let output_format = options.map.format().unwrap_or("auto").to_string();
    let fingerprint =
        state
            .cache
            .fingerprint(&facts.clean_path, &facts.raw_query, &options.map, &output_format);
    let fingerprint_inputs = state.cache.fingerprint_inputs(
        &facts.clean_path,
        &facts.raw_query,
        &options.map,
        &output_format,
    );

    let cond = RequestConditions::parse(
        header_str(&headers, header::IF_NONE_MATCH.as_str()),
        header_str(&headers, header::IF_MODIFIED_SINCE.as_str()),
        header_str(&headers, header::RANGE.as_str()),
    );

    // Revalidation of a previously served transform: the fingerprint is the
    // entity tag.
    if cond.if_none_match.as_deref() == Some(fingerprint.as_str()) {
        ctx.breadcrumb("cache", "etag revalidation hit");
        let ttl = state.cache.ttl_for(&facts.clean_path, 200, "");
        return finish(
            &state,
            &ctx,
            &options,
            not_modified_response(&fingerprint, &state.cache.cache_control(ttl)),
            CacheStatus::Hit,
            &fingerprint,
        );
    }

    // ── Range requests: partial source pass-through, no transform ────────────
    if cond.range.is_some() {
        return match state.fetcher.fetch(&ctx, &facts.clean_path, &cond).await {
            Ok(FetchOutcome::Fetched(source)) => {
                let response = range_response(&source);
                finish(&state, &ctx, &options, response, CacheStatus::Bypass, &fingerprint)
            }
            Ok(FetchOutcome::NotModified { etag, .. }) => finish(
                &state,
                &ctx,
                &options,
                origin_not_modified_response(etag.as_deref()),
                CacheStatus::Bypass,
                &fingerprint,
            ),
            Err(err) => storage_error_response(&state, &ctx, &options, &facts.clean_path, err.into(), &fingerprint),
        };
    }

    // ── Transform cache read ─────────────────────────────────────────────────
    let query_keys: Vec<String> = facts.query.iter().map(|(k, _)| k.clone()).collect();
    let bypass = state.cache.should_bypass(
        &facts.clean_path,
        &query_keys,
        header_str(&headers, header::CACHE_CONTROL.as_str()),
        &fingerprint,
        None,
    );

    if !bypass {
        let (status, hit) = state.cache.lookup(&ctx, &fingerprint).await;
        if let Some(cached) = hit {
            let response = image_response(
                cached.body,
                &cached.metadata.content_type,
                &state.cache.cache_control(cached.metadata.ttl),
                &fingerprint,
                &cached.metadata.tags,
            );
            return finish(&state, &ctx, &options, response, status, &fingerprint);
        }
    } else {
        ctx.breadcrumb("cache", "bypass");
    }

    // ── Source fetch ─────────────────────────────────────────────────────────
    let source = match state.fetcher.fetch(&ctx, &facts.clean_path, &cond).await {
        Ok(FetchOutcome::Fetched(source)) => source,
        Ok(FetchOutcome::NotModified { etag, .. }) => {
            return finish(
                &state,
                &ctx,
                &options,
                origin_not_modified_response(etag.as_deref()),
                if bypass { CacheStatus::Bypass } else { CacheStatus::Miss },
                &fingerprint,
            );
        }
        Err(err) => {
            return storage_error_response(
                &state,
                &ctx,
                &options,
                &facts.clean_path,
                err.into(),
                &fingerprint,
            );
        }
    };

    // ── Transform ────────────────────────────────────────────────────────────
    let rendered = state
        .orchestrator
        .render(&ctx, &facts.clean_path, &source, &mut options)
        .await;

    let ttl = state
        .cache
        .ttl_for(&facts.clean_path, 200, &rendered.content_type);
    let tags = state.cache.tags_for(&facts.clean_path, &options.map);

    // ── Background cache write ───────────────────────────────────────────────
    let write_bypass = bypass
        || rendered.fallback
        || state.cache.should_bypass(
            &facts.clean_path,
            &query_keys,
            header_str(&headers, header::CACHE_CONTROL.as_str()),
            &fingerprint,
            Some(rendered.body.len() as u64),
        );
    if !write_bypass {
        state.cache.store_response(
            &ctx,
            &fingerprint,
            rendered.body.clone(),
            &rendered.content_type,
            ttl,
            tags.clone(),
            fingerprint_inputs,
        );
    }

    let response = image_response(
        rendered.body,
        &rendered.content_type,
        &state.cache.cache_control(ttl),
        &fingerprint,
        &tags,
    );
    let status = if bypass { CacheStatus::Bypass } else { CacheStatus::Miss };
    finish(&state, &ctx, &options, response, status, &fingerprint)
}

// ─────────────────────────────────────────────────────────────────────────────
// Response builders
// ─────────────────────────────────────────────────────────────────────────────

fn image_response(
    body: bytes::Bytes,
    content_type: &str,
    cache_control: &str,
    fingerprint: &str,
    tags: &[String],
) -> Response {
    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CACHE_CONTROL, cache_control)
        .header(header::ETAG, format!("\"{fingerprint}\""))
        .header(header::VARY, "accept");
    if !tags.is_empty() {
        builder = builder.header("cache-tag", tags.join(","));
    }
    builder
        .body(Body::from(body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// 304 for a revalidated *transformed* entity (our fingerprint etag).
fn not_modified_response(fingerprint: &str, cache_control: &str) -> Response {
    Response::builder()
        .status(StatusCode::NOT_MODIFIED)
        .header(header::ETAG, format!("\"{fingerprint}\""))
        .header(header::CACHE_CONTROL, cache_control)
        .body(Body::empty())
        .unwrap_or_else(|_| StatusCode::NOT_MODIFIED.into_response())
}

/// 304 relayed from an origin's conditional answer.
fn origin_not_modified_response(etag: Option<&str>) -> Response {
    let mut builder = Response::builder().status(StatusCode::NOT_MODIFIED);
    if let Some(etag) = etag {
        builder = builder.header(header::ETAG, format!("\"{etag}\""));
    }
    builder
        .body(Body::empty())
        .unwrap_or_else(|_| StatusCode::NOT_MODIFIED.into_response())
}

/// 206/200 pass-through of (possibly partial) source bytes.
fn range_response(source: &StorageResult) -> Response {
    let mut builder = Response::builder()
        .status(StatusCode::from_u16(source.status).unwrap_or(StatusCode::OK))
        .header(header::CONTENT_TYPE, source.content_type.as_str())
        .header(header::ACCEPT_RANGES, "bytes");
    if let Some(content_range) = &source.content_range {
        builder = builder.header(header::CONTENT_RANGE, content_range.as_str());
    }
    if let Some(etag) = &source.etag {
        builder = builder.header(header::ETAG, format!("\"{etag}\""));
    }
    builder
        .body(Body::from(source.body.clone()))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

fn storage_error_response(
    state: &AppState,
    ctx: &RequestContext,
    options: &ResolvedOptions,
    path: &str,
    err: GatewayError,
    fingerprint: &str,
) -> Response {
    ctx.breadcrumb("storage", format!("error: {err}"));
    let attempts = serde_json::to_string(err.attempts()).unwrap_or_default();
    let mut response = err.into_response();

    // Error responses get their status-class TTL so the edge does not
    // hammer a missing origin.
    let ttl = state
        .cache
        .ttl_for(path, response.status().as_u16(), "application/json");
    if let Ok(value) = HeaderValue::from_str(&state.cache.cache_control(ttl)) {
        response.headers_mut().insert(header::CACHE_CONTROL, value);
    }

    if ctx.debug() {
        let prefix = &state.settings.server.debug_header_prefix;
        append_header(&mut response, &format!("{prefix}Attempted-Origins"), &attempts);
    }
    finish(state, ctx, options, response, CacheStatus::Miss, fingerprint)
}

// ─────────────────────────────────────────────────────────────────────────────
// Debug surface
// ─────────────────────────────────────────────────────────────────────────────

/// Attach the diagnostic headers (when `debug=true`) and emit the terminal
/// breadcrumb trail at trace level.
fn finish(
    state: &AppState,
    ctx: &RequestContext,
    options: &ResolvedOptions,
    mut response: Response,
    cache_status: CacheStatus,
    fingerprint: &str,
) -> Response {
    tracing::trace!(
        request_id = ctx.id(),
        breadcrumbs = ?ctx.breadcrumbs(),
        "request trace"
    );

    if !ctx.debug() {
        return response;
    }

    let prefix = &state.settings.server.debug_header_prefix;
    let pairs = [
        ("Request-Id", ctx.id().to_string()),
        ("Elapsed-Ms", ctx.elapsed_ms().to_string()),
        ("Cache-Status", cache_status.as_str().to_string()),
        ("Cache-Key", fingerprint.to_string()),
        ("Options", options.map.canonical_string()),
        ("Discarded", options.discarded.len().to_string()),
        ("Breadcrumbs", ctx.breadcrumb_count().to_string()),
    ];
    for (name, value) in pairs {
        append_header(&mut response, &format!("{prefix}{name}"), &value);
    }
    response
}

fn append_header(response: &mut Response, name: &str, value: &str) {
    if let (Ok(name), Ok(value)) = (
        HeaderName::try_from(name.to_string()),
        HeaderValue::from_str(value),
    ) {
        response.headers_mut().insert(name, value);
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
