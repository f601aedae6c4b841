mod support;

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use bytes::Bytes;

use boa_render::application::documents::{Branding, DocumentService};
use boa_render::application::render::{
    BrowserStatus, FallbackChain, FallbackPdfGenerator, LayoutOptions, LayoutOverrides,
    PageFormat, PdfRenderer, PdfSource, RenderError, RenderKind, RenderResult, TokenMap, compose,
};
use boa_render::domain::records::ElectionRecord;

use support::{BrokenTextPdf, FakeBackend, HANG_MARKER, Harness, LAUNCH_FAILURE};

#[derive(Default)]
struct CountingPrimary {
    calls: AtomicUsize,
    fail: bool,
    seen: Mutex<Vec<String>>,
}

#[async_trait]
impl PdfRenderer for CountingPrimary {
    async fn render_pdf(&self, html: &str, _layout: &LayoutOptions) -> Result<Bytes, RenderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(html.to_string());
        }
        if self.fail {
            Err(RenderError::engine("page crashed"))
        } else {
            Ok(Bytes::from_static(b"%PDF-1.7 primary"))
        }
    }
}

#[derive(Default)]
struct CountingSecondary {
    calls: AtomicUsize,
}

impl FallbackPdfGenerator for CountingSecondary {
    fn generate(&self, _html: &str, _layout: &LayoutOptions) -> Result<Bytes, RenderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Bytes::from_static(b"%PDF-1.3 secondary"))
    }
}

fn name_tokens() -> TokenMap {
    let mut tokens = TokenMap::new();
    tokens.insert_text("NAME", "Dr. Singh");
    tokens
}

fn a4() -> LayoutOverrides {
    LayoutOverrides {
        page_format: Some(PageFormat::A4),
        ..Default::default()
    }
}

#[tokio::test]
async fn happy_path_renders_pdf_through_browser() {
    let harness = Harness::new(FakeBackend::healthy());

    let rendered = harness
        .documents
        .render_template(
            "<html><body>{{NAME}}</body></html>",
            name_tokens(),
            Some(&a4()),
            Some("Greeting"),
        )
        .await
        .expect("rendered");

    assert_eq!(rendered.result.kind(), RenderKind::Pdf);
    assert!(matches!(
        rendered.result,
        RenderResult::Pdf {
            source: PdfSource::Browser,
            ..
        }
    ));
    assert!(rendered.result.bytes().is_some_and(|bytes| !bytes.is_empty()));
    assert_eq!(rendered.filename, "greeting.pdf");
    assert_eq!(harness.browser.status().await, BrowserStatus::Ready);
}

#[tokio::test]
async fn browser_unavailable_falls_back_to_text_pdf() {
    let harness = Harness::new(FakeBackend::unavailable());

    let rendered = harness
        .documents
        .render_template(
            "<html><head><title>Notice</title></head><body><p>{{NAME}}</p></body></html>",
            name_tokens(),
            None,
            None,
        )
        .await
        .expect("rendered");

    match &rendered.result {
        RenderResult::Pdf { bytes, source } => {
            assert_eq!(*source, PdfSource::TextFallback);
            assert!(bytes.starts_with(b"%PDF"));
        }
        other => panic!("expected text pdf, got {:?}", other.kind()),
    }
    assert_eq!(rendered.filename, "document.pdf");
}

#[tokio::test]
async fn browser_unavailable_and_text_failure_returns_composed_html() {
    let harness = Harness::with_secondary(FakeBackend::unavailable(), Arc::new(BrokenTextPdf));
    let template = "<html><body>{{NAME}}</body></html>";
    let expected = compose(template, &name_tokens()).expect("composed");

    let rendered = harness
        .documents
        .render_template(template, name_tokens(), None, Some("greeting"))
        .await
        .expect("rendered");

    match &rendered.result {
        RenderResult::Html { bytes, reason } => {
            assert_eq!(bytes.as_ref(), expected.as_bytes());
            assert!(reason.contains(LAUNCH_FAILURE), "{reason}");
            assert!(reason.contains("font table unavailable"), "{reason}");
        }
        other => panic!("expected html, got {:?}", other.kind()),
    }
    assert_eq!(rendered.filename, "greeting.html");
}

#[tokio::test]
async fn secondary_runs_only_after_primary_fails() {
    let primary = Arc::new(CountingPrimary {
        fail: true,
        ..Default::default()
    });
    let secondary = Arc::new(CountingSecondary::default());
    let chain = FallbackChain::new(primary.clone(), secondary.clone());

    let result = chain
        .render("<!DOCTYPE html><p>x</p>", &LayoutOptions::default())
        .await;

    assert!(matches!(
        result,
        RenderResult::Pdf {
            source: PdfSource::TextFallback,
            ..
        }
    ));
    assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
    assert_eq!(secondary.calls.load(Ordering::SeqCst), 1);

    let healthy = Arc::new(CountingPrimary::default());
    let untouched = Arc::new(CountingSecondary::default());
    let chain = FallbackChain::new(healthy.clone(), untouched.clone());

    let result = chain
        .render("<!DOCTYPE html><p>x</p>", &LayoutOptions::default())
        .await;

    assert_eq!(result.kind(), RenderKind::Pdf);
    assert_eq!(healthy.calls.load(Ordering::SeqCst), 1);
    assert_eq!(untouched.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn concurrent_renders_share_one_launch_and_close_every_page() {
    let harness = Harness::new(FakeBackend::healthy());

    let mut tasks = Vec::new();
    for index in 0..8 {
        let documents = harness.documents.clone();
        let template = if index % 2 == 0 {
            format!("<html><body><p>render {index}</p></body></html>")
        } else {
            format!("<html><body><p {HANG_MARKER}>render {index}</p></body></html>")
        };
        tasks.push(tokio::spawn(async move {
            documents
                .render_template(&template, TokenMap::new(), None, None)
                .await
        }));
    }

    let mut browser_pdfs = 0;
    let mut text_pdfs = 0;
    for task in tasks {
        let rendered = task.await.expect("join").expect("rendered");
        match rendered.result {
            RenderResult::Pdf {
                source: PdfSource::Browser,
                ..
            } => browser_pdfs += 1,
            RenderResult::Pdf {
                source: PdfSource::TextFallback,
                ..
            } => text_pdfs += 1,
            other => panic!("unexpected result {:?}", other.kind()),
        }
    }

    harness.settle().await;
    assert_eq!(browser_pdfs, 4);
    assert_eq!(text_pdfs, 4);
    assert_eq!(harness.backend.counters.launches.load(Ordering::SeqCst), 1);
    assert_eq!(harness.backend.counters.pages_opened.load(Ordering::SeqCst), 8);
    assert_eq!(harness.backend.counters.pages_open.load(Ordering::SeqCst), 0);
    assert_eq!(harness.engine.open_pages(), 0);
}

#[tokio::test]
async fn cancelled_render_still_closes_its_page() {
    let harness = Harness::new(FakeBackend::healthy());
    let documents = harness.documents.clone();

    let task = tokio::spawn(async move {
        documents
            .render_template(
                &format!("<html><body><p {HANG_MARKER}>stuck</p></body></html>"),
                TokenMap::new(),
                None,
                None,
            )
            .await
    });

    for _ in 0..50 {
        if harness.engine.open_pages() == 1 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    assert_eq!(harness.engine.open_pages(), 1);

    task.abort();
    let _ = task.await;
    harness.settle().await;

    assert_eq!(harness.engine.open_pages(), 0);
    assert_eq!(harness.backend.counters.pages_open.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn missing_template_is_synthesized_from_record() {
    let primary = Arc::new(CountingPrimary::default());
    let chain = FallbackChain::new(primary.clone(), Arc::new(CountingSecondary::default()));
    let documents = DocumentService::new(chain, Branding::default());

    let record: ElectionRecord = serde_json::from_value(serde_json::json!({
        "title": "BOA Election 2026",
        "deadline": "2026-01-01",
        "positions": [{ "title": "President", "seats": 1 }]
    }))
    .expect("record");

    let rendered = documents
        .render(&record, Some("   "), None)
        .await
        .expect("rendered");

    assert_eq!(rendered.result.kind(), RenderKind::Pdf);
    assert_eq!(rendered.filename, "boa-election-2026-nomination-form.pdf");

    let seen = primary.seen.lock().expect("seen").clone();
    assert_eq!(seen.len(), 1);
    let html = &seen[0];
    assert!(html.starts_with("<!DOCTYPE html>"));
    assert!(html.contains("BOA Election 2026"));
    assert!(html.contains("1 January 2026"));
    assert!(html.contains("President (1 seat)"));
}

#[tokio::test]
async fn invalid_record_is_rejected_before_rendering() {
    let primary = Arc::new(CountingPrimary::default());
    let chain = FallbackChain::new(primary.clone(), Arc::new(CountingSecondary::default()));
    let documents = DocumentService::new(chain, Branding::default());

    let record: ElectionRecord =
        serde_json::from_value(serde_json::json!({ "title": "  " })).expect("record");

    assert!(documents.render(&record, None, None).await.is_err());
    assert_eq!(primary.calls.load(Ordering::SeqCst), 0);
}
