//! In-process browser backend used by the integration tests.
#![allow(dead_code)]

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use boa_render::application::documents::{Branding, DocumentService};
use boa_render::application::render::{
    BrowserBackend, BrowserManager, BrowserPage, BrowserSession, FallbackChain,
    FallbackPdfGenerator, LayoutOptions, RenderEngine, RenderError, RenderTimeouts,
    TextPdfGenerator,
};

/// Pages whose content contains this marker never finish loading.
pub const HANG_MARKER: &str = "data-test-hang";

pub const LAUNCH_FAILURE: &str = "no chromium binary found";

#[derive(Debug, Default)]
pub struct Counters {
    pub launches: AtomicUsize,
    pub pages_opened: AtomicUsize,
    pub pages_open: AtomicUsize,
}

#[derive(Clone)]
pub struct FakeBackend {
    pub counters: Arc<Counters>,
    available: bool,
}

impl FakeBackend {
    pub fn healthy() -> Self {
        Self {
            counters: Arc::default(),
            available: true,
        }
    }

    pub fn unavailable() -> Self {
        Self {
            counters: Arc::default(),
            available: false,
        }
    }
}

#[async_trait]
impl BrowserBackend for FakeBackend {
    type Session = FakeSession;

    async fn launch(&self) -> Result<Self::Session, RenderError> {
        self.counters.launches.fetch_add(1, Ordering::SeqCst);
        // Give concurrent acquirers a chance to pile up on the launch.
        tokio::time::sleep(Duration::from_millis(20)).await;
        if !self.available {
            return Err(RenderError::browser_launch(LAUNCH_FAILURE));
        }
        Ok(FakeSession {
            counters: Arc::clone(&self.counters),
        })
    }
}

pub struct FakeSession {
    counters: Arc<Counters>,
}

#[async_trait]
impl BrowserSession for FakeSession {
    type Page = FakePage;

    fn is_alive(&self) -> bool {
        true
    }

    async fn new_page(&self) -> Result<Self::Page, RenderError> {
        self.counters.pages_opened.fetch_add(1, Ordering::SeqCst);
        self.counters.pages_open.fetch_add(1, Ordering::SeqCst);
        Ok(FakePage {
            counters: Arc::clone(&self.counters),
            html: Mutex::new(String::new()),
        })
    }

    async fn close(&self) -> Result<(), RenderError> {
        Ok(())
    }
}

pub struct FakePage {
    counters: Arc<Counters>,
    html: Mutex<String>,
}

#[async_trait]
impl BrowserPage for FakePage {
    async fn set_content(&self, html: &str) -> Result<(), RenderError> {
        if let Ok(mut content) = self.html.lock() {
            *content = html.to_string();
        }
        if html.contains(HANG_MARKER) {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn wait_for_network_idle(&self, _idle_window: Duration) -> Result<(), RenderError> {
        Ok(())
    }

    async fn print_pdf(&self, _layout: &LayoutOptions) -> Result<Bytes, RenderError> {
        let length = self.html.lock().map(|html| html.len()).unwrap_or_default();
        Ok(Bytes::from(format!("%PDF-1.7\n% fake page, {length} bytes of html\n%%EOF")))
    }

    async fn close(self) -> Result<(), RenderError> {
        self.counters.pages_open.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Secondary tier that always fails.
pub struct BrokenTextPdf;

impl FallbackPdfGenerator for BrokenTextPdf {
    fn generate(&self, _html: &str, _layout: &LayoutOptions) -> Result<Bytes, RenderError> {
        Err(RenderError::text_pdf("font table unavailable"))
    }
}

pub fn fast_timeouts() -> RenderTimeouts {
    RenderTimeouts {
        load: Duration::from_millis(200),
        print: Duration::from_millis(200),
        network_idle: Duration::from_millis(10),
    }
}

pub struct Harness {
    pub backend: FakeBackend,
    pub browser: BrowserManager<FakeBackend>,
    pub engine: RenderEngine<FakeBackend>,
    pub documents: DocumentService,
}

impl Harness {
    pub fn new(backend: FakeBackend) -> Self {
        Self::with_secondary(backend, Arc::new(TextPdfGenerator::default()))
    }

    pub fn with_secondary(backend: FakeBackend, secondary: Arc<dyn FallbackPdfGenerator>) -> Self {
        let browser = BrowserManager::new(backend.clone(), Duration::from_secs(2));
        let engine = RenderEngine::new(browser.clone(), fast_timeouts());
        let chain = FallbackChain::new(Arc::new(engine.clone()), secondary);
        let documents = DocumentService::new(chain, Branding::default());
        Self {
            backend,
            browser,
            engine,
            documents,
        }
    }

    /// Wait for page closes scheduled on background tasks to land.
    pub async fn settle(&self) {
        for _ in 0..100 {
            if self.engine.open_pages() == 0
                && self.backend.counters.pages_open.load(Ordering::SeqCst) == 0
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}
