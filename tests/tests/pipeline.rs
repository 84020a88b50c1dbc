//! Pipeline-level integration tests.
//!
//! Each test drives the full axum app — parameter resolution, storage
//! fetch, orchestration, cache control — against in-memory collaborators.

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use refract_testing::{ScriptedTransformBackend, harness, hermetic_settings};
use tower::ServiceExt;

async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body is readable")
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request builds")
}

// ─────────────────────────────────────────────────────────────────────────────
// Basics
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn health_endpoint_answers() {
    let h = harness(hermetic_settings(), ScriptedTransformBackend::new());
    let response = h.app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_bytes(response).await;
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn plain_request_transforms_and_sets_cache_headers() {
    let h = harness(hermetic_settings(), ScriptedTransformBackend::new());
    let response = h.app.oneshot(get("/img.jpg?width=800")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "image/jpeg"
    );
    assert!(response.headers().contains_key(header::ETAG));
    assert!(
        response
            .headers()
            .get(header::CACHE_CONTROL)
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("public")
    );
    assert_eq!(response.headers().get(header::VARY).unwrap(), "accept");

    assert_eq!(h.backend.transform_calls(), 1);
    let seen = h.backend.options_seen(0).unwrap();
    assert_eq!(seen.width(), Some(800));

    let body = body_bytes(response).await;
    assert_eq!(body.as_ref(), b"transformed-pixels");
}

#[tokio::test]
async fn missing_source_returns_404_envelope() {
    let h = harness(hermetic_settings(), ScriptedTransformBackend::new());
    let response = h.app.oneshot(get("/absent.jpg")).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_bytes(response).await;
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["error"]["code"], "SOURCE_NOT_FOUND");
    assert_eq!(h.backend.transform_calls(), 0);
}

// ─────────────────────────────────────────────────────────────────────────────
// Parameter resolution end to end
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn size_code_and_explicit_height_reach_the_primitive() {
    let h = harness(hermetic_settings(), ScriptedTransformBackend::new());
    let response = h.app.oneshot(get("/img.jpg?f=xl&height=600")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let seen = h.backend.options_seen(0).unwrap();
    assert_eq!(seen.width(), Some(900));
    assert_eq!(seen.height(), Some(600));
    assert!(!seen.contains("f"));
}

#[tokio::test]
async fn path_segments_beat_query_parameters() {
    let h = harness(hermetic_settings(), ScriptedTransformBackend::new());
    let response = h
        .app
        .oneshot(get("/_width=300/_quality=80/img.jpg?quality=50"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let seen = h.backend.options_seen(0).unwrap();
    assert_eq!(seen.width(), Some(300));
    assert_eq!(seen.number("quality"), Some(80.0));
}

#[tokio::test]
async fn legacy_resize_translates_to_canonical_options() {
    let h = harness(hermetic_settings(), ScriptedTransformBackend::new());
    let response = h
        .app
        .oneshot(get("/img.jpg?im.resize=width:800,height:600,mode:fit&im.quality=70"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let seen = h.backend.options_seen(0).unwrap();
    assert_eq!(seen.width(), Some(800));
    assert_eq!(seen.height(), Some(600));
    assert_eq!(seen.fit(), Some("contain"));
    assert_eq!(seen.number("quality"), Some(70.0));
}

#[tokio::test]
async fn aspect_crop_probes_for_dimensions() {
    let h = harness(hermetic_settings(), ScriptedTransformBackend::new());
    let response = h.app.oneshot(get("/img.jpg?r=16-9&p=0.3,0.7")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(h.backend.probe_calls(), 1);
    let seen = h.backend.options_seen(0).unwrap();
    // The engine-internal names are translated before the wire call.
    assert!(!seen.contains("aspect"));
    assert!(!seen.contains("ctx"));
    assert_eq!(seen.fit(), Some("crop"));
    assert_eq!(
        seen.get("gravity").map(|g| g.canonical_string()),
        Some("0.3,0.7".to_string())
    );
}

#[tokio::test]
async fn accept_header_drives_output_format() {
    let h = harness(hermetic_settings(), ScriptedTransformBackend::new());
    let request = Request::builder()
        .uri("/img.jpg?width=400")
        .header("accept", "image/webp,*/*")
        .body(Body::empty())
        .unwrap();
    let response = h.app.oneshot(request).await.unwrap();

    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "image/webp"
    );
    let seen = h.backend.options_seen(0).unwrap();
    assert_eq!(seen.format(), Some("webp"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Cache behaviour
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn repeated_request_is_served_from_the_transform_cache() {
    let h = harness(hermetic_settings(), ScriptedTransformBackend::new());

    let first = h.app.clone().oneshot(get("/img.jpg?width=800")).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(h.backend.transform_calls(), 1);

    // The KV write is fire-and-forget; wait for it to land.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(h.kv.len(), 1);

    let second = h.app.oneshot(get("/img.jpg?width=800")).await.unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    // No new transform: the primitive was not invoked again.
    assert_eq!(h.backend.transform_calls(), 1);
    assert_eq!(body_bytes(second).await.as_ref(), b"transformed-pixels");
}

#[tokio::test]
async fn etag_revalidation_returns_304_without_any_work() {
    let h = harness(hermetic_settings(), ScriptedTransformBackend::new());

    let first = h.app.clone().oneshot(get("/img.jpg?width=800")).await.unwrap();
    let etag = first
        .headers()
        .get(header::ETAG)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();

    let request = Request::builder()
        .uri("/img.jpg?width=800")
        .header(header::IF_NONE_MATCH, &etag)
        .body(Body::empty())
        .unwrap();
    let response = h.app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
    // One transform from the first request, none from the revalidation.
    assert_eq!(h.backend.transform_calls(), 1);
}

#[tokio::test]
async fn bypass_parameter_skips_the_cache() {
    let h = harness(hermetic_settings(), ScriptedTransformBackend::new());

    let first = h
        .app
        .clone()
        .oneshot(get("/img.jpg?width=800&nocache=1"))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(h.kv.is_empty());

    let second = h.app.oneshot(get("/img.jpg?width=800&nocache=1")).await.unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(h.backend.transform_calls(), 2);
}

// ─────────────────────────────────────────────────────────────────────────────
// Degraded modes
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn primitive_failure_serves_original_bytes() {
    let h = harness(hermetic_settings(), ScriptedTransformBackend::failing());
    let response = h.app.oneshot(get("/img.jpg?width=800")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "image/jpeg"
    );
    assert_eq!(body_bytes(response).await.as_ref(), b"source-jpeg-bytes");
    // Fallback responses are not written to the transform cache.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(h.kv.is_empty());
}

#[tokio::test]
async fn range_requests_pass_source_bytes_through() {
    let h = harness(hermetic_settings(), ScriptedTransformBackend::new());
    let request = Request::builder()
        .uri("/img.jpg")
        .header(header::RANGE, "bytes=0-5")
        .body(Body::empty())
        .unwrap();
    let response = h.app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(
        response
            .headers()
            .get(header::CONTENT_RANGE)
            .unwrap()
            .to_str()
            .unwrap(),
        "bytes 0-5/17"
    );
    assert_eq!(h.backend.transform_calls(), 0);
    assert_eq!(body_bytes(response).await.as_ref(), b"source");
}

// ─────────────────────────────────────────────────────────────────────────────
// Debug surface
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn debug_toggle_surfaces_diagnostics() {
    let h = harness(hermetic_settings(), ScriptedTransformBackend::new());
    let response = h
        .app
        .oneshot(get("/img.jpg?width=800&debug=true"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert!(headers.contains_key("x-request-id"));
    assert!(headers.contains_key("x-cache-status"));
    assert!(headers.contains_key("x-cache-key"));
    let options = headers.get("x-options").unwrap().to_str().unwrap();
    assert!(options.contains("width=800"));
}

#[tokio::test]
async fn debug_headers_are_absent_by_default() {
    let h = harness(hermetic_settings(), ScriptedTransformBackend::new());
    let response = h.app.oneshot(get("/img.jpg?width=800")).await.unwrap();
    assert!(!response.headers().contains_key("x-request-id"));
}
