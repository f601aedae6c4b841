mod support;

use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};
use tower::ServiceExt;

use boa_render::application::render::{BrowserControl, HTML_FALLBACK_WARNING};
use boa_render::infra::artifacts::ArtifactStore;
use boa_render::infra::http::{self, ApiState, REQUEST_ID_HEADER};

use support::{BrokenTextPdf, FakeBackend, Harness};

struct TestApp {
    router: Router,
    artifacts: Arc<ArtifactStore>,
    _dir: tempfile::TempDir,
}

fn app(harness: &Harness) -> TestApp {
    let dir = tempfile::tempdir().expect("tempdir");
    let artifacts = Arc::new(ArtifactStore::new(dir.path().to_path_buf()).expect("store"));
    let browser: Arc<dyn BrowserControl> = Arc::new(harness.browser.clone());
    let state = ApiState {
        documents: harness.documents.clone(),
        artifacts: Arc::clone(&artifacts),
        browser,
        pages: harness.engine.page_counter(),
    };
    TestApp {
        router: http::build_router(state, 1024 * 1024),
        artifacts,
        _dir: dir,
    }
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).expect("request")
}

fn header_str<'a>(response: &'a axum::response::Response, name: &str) -> Option<&'a str> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}

#[tokio::test]
async fn health_is_no_content_with_request_id() {
    let harness = Harness::new(FakeBackend::healthy());
    let app = app(&harness);

    let response = app.router.oneshot(get("/health")).await.expect("response");

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(header_str(&response, REQUEST_ID_HEADER).is_some_and(|id| !id.is_empty()));
}

#[tokio::test]
async fn upstream_request_id_is_echoed() {
    let harness = Harness::new(FakeBackend::healthy());
    let app = app(&harness);
    let request = Request::builder()
        .uri("/health")
        .header(REQUEST_ID_HEADER, "lb-5e21c0")
        .body(Body::empty())
        .expect("request");

    let response = app.router.oneshot(request).await.expect("response");

    assert_eq!(header_str(&response, REQUEST_ID_HEADER), Some("lb-5e21c0"));
}

#[tokio::test]
async fn browser_health_reports_idle_before_first_render() {
    let harness = Harness::new(FakeBackend::healthy());
    let app = app(&harness);

    let response = app
        .router
        .oneshot(get("/health/browser"))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    insta::assert_json_snapshot!(body_json(response).await, @r#"
    {
      "open_pages": 0,
      "status": "idle"
    }
    "#);
}

#[tokio::test]
async fn render_endpoint_returns_pdf_download() {
    let harness = Harness::new(FakeBackend::healthy());
    let app = app(&harness);

    let response = app
        .router
        .oneshot(post_json(
            "/api/v1/render",
            json!({
                "template": "<html><body>{{NAME}}</body></html>",
                "tokens": { "NAME": "Dr. Singh" },
                "layout": { "pageFormat": "A4" },
                "filename": "Welcome Letter"
            }),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        header_str(&response, header::CONTENT_TYPE.as_str()),
        Some("application/pdf")
    );
    assert_eq!(
        header_str(&response, header::CONTENT_DISPOSITION.as_str()),
        Some("attachment; filename=\"welcome-letter.pdf\"")
    );
    assert!(header_str(&response, "x-render-warning").is_none());

    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    assert!(bytes.starts_with(b"%PDF"));
}

#[tokio::test]
async fn degraded_render_is_html_with_warning_and_escaped_tokens() {
    let harness = Harness::with_secondary(FakeBackend::unavailable(), Arc::new(BrokenTextPdf));
    let app = app(&harness);

    let response = app
        .router
        .oneshot(post_json(
            "/api/v1/render",
            json!({
                "template": "<html><body>{{NAME}}</body></html>",
                "tokens": { "NAME": "<b>Singh</b>" },
                "filename": "greeting"
            }),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        header_str(&response, header::CONTENT_TYPE.as_str()),
        Some("text/html; charset=utf-8")
    );
    assert_eq!(
        header_str(&response, "x-render-warning"),
        Some(HTML_FALLBACK_WARNING)
    );
    assert_eq!(
        header_str(&response, header::CONTENT_DISPOSITION.as_str()),
        Some("attachment; filename=\"greeting.html\"")
    );

    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let html = String::from_utf8(bytes.to_vec()).expect("utf8");
    assert!(html.contains("&lt;b&gt;Singh&lt;&#x2F;b&gt;"), "{html}");
    assert!(!html.contains("<b>Singh</b>"));
}

#[tokio::test]
async fn raw_tokens_are_inserted_verbatim() {
    let harness = Harness::with_secondary(FakeBackend::unavailable(), Arc::new(BrokenTextPdf));
    let app = app(&harness);

    let response = app
        .router
        .oneshot(post_json(
            "/api/v1/render",
            json!({
                "template": "<html><body>{{NAME}}</body></html>",
                "tokens": { "NAME": "<b>Singh</b>" },
                "raw": true
            }),
        ))
        .await
        .expect("response");

    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let html = String::from_utf8(bytes.to_vec()).expect("utf8");
    assert!(html.contains("<b>Singh</b>"), "{html}");
}

#[tokio::test]
async fn blank_template_is_unprocessable() {
    let harness = Harness::new(FakeBackend::healthy());
    let app = app(&harness);

    let response = app
        .router
        .oneshot(post_json(
            "/api/v1/render",
            json!({ "template": "   ", "tokens": {} }),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "template_error");
}

#[tokio::test]
async fn unknown_document_kind_is_not_found() {
    let harness = Harness::new(FakeBackend::healthy());
    let app = app(&harness);

    let response = app
        .router
        .oneshot(post_json(
            "/api/v1/documents/invoice",
            json!({ "record": {} }),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    insta::assert_json_snapshot!(body_json(response).await, @r#"
    {
      "error": {
        "code": "not_found",
        "hint": "invoice",
        "message": "Unknown document kind"
      }
    }
    "#);
}

#[tokio::test]
async fn invalid_record_is_bad_request() {
    let harness = Harness::new(FakeBackend::healthy());
    let app = app(&harness);

    let response = app
        .router
        .oneshot(post_json(
            "/api/v1/documents/membership-form",
            json!({ "record": { "applicant_name": "  " } }),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "invalid_record");
}

#[tokio::test]
async fn persisted_document_reports_artifact_path() {
    let harness = Harness::new(FakeBackend::healthy());
    let app = app(&harness);

    let response = app
        .router
        .oneshot(post_json(
            "/api/v1/documents/payment-receipt",
            json!({
                "record": {
                    "receipt_number": "BOA/2025/0042",
                    "payer_name": "Dr. Kavya Iyer",
                    "amount": "12500",
                    "paid_on": "2025-08-01"
                },
                "persist": true
            }),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        header_str(&response, header::CONTENT_DISPOSITION.as_str()),
        Some("attachment; filename=\"receipt-boa-2025-0042.pdf\"")
    );
    let stored_path = header_str(&response, "x-artifact-path")
        .expect("artifact header")
        .to_string();
    assert!(stored_path.contains("/payment_receipt_"), "{stored_path}");
    assert!(stored_path.ends_with(".pdf"));

    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let stored = app.artifacts.read(&stored_path).await.expect("stored");
    assert_eq!(stored, body);
}

#[tokio::test]
async fn stored_artifact_can_be_downloaded_and_deleted() {
    let harness = Harness::new(FakeBackend::healthy());
    let app = app(&harness);
    let stored = app
        .artifacts
        .store(
            boa_render::domain::types::DocumentKind::SeminarForm,
            "pdf",
            bytes::Bytes::from_static(b"%PDF-1.7 seminar"),
        )
        .await
        .expect("stored");
    let uri = format!("/api/v1/artifacts/{}", stored.stored_path);

    let response = app
        .router
        .clone()
        .oneshot(get(&uri))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        header_str(&response, header::CONTENT_TYPE.as_str()),
        Some("application/pdf")
    );
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    assert_eq!(body.as_ref(), b"%PDF-1.7 seminar");

    let delete = Request::builder()
        .method("DELETE")
        .uri(&uri)
        .body(Body::empty())
        .expect("request");
    let response = app.router.clone().oneshot(delete).await.expect("response");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app.router.oneshot(get(&uri)).await.expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn artifact_paths_outside_the_store_are_rejected() {
    let harness = Harness::new(FakeBackend::healthy());
    let app = app(&harness);

    let response = app
        .router
        .oneshot(get("/api/v1/artifacts/2026/../../secrets.pdf"))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["message"], "Invalid artifact path");
}
