//! Primary tier: drive the shared browser to print a PDF.

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use async_trait::async_trait;
use bytes::Bytes;
use metrics::{gauge, histogram};
use tracing::{debug, warn};

use super::{
    browser::{BrowserBackend, BrowserManager, BrowserPage, BrowserSession},
    types::{LayoutOptions, RenderError},
};

/// Produces a PDF from complete HTML.
#[async_trait]
pub trait PdfRenderer: Send + Sync {
    async fn render_pdf(&self, html: &str, layout: &LayoutOptions) -> Result<Bytes, RenderError>;
}

#[derive(Debug, Clone, Copy)]
pub struct RenderTimeouts {
    /// Upper bound for loading content and reaching network idle. Opening and
    /// closing a page get the same bound each.
    pub load: Duration,
    pub print: Duration,
    /// Quiet period that counts as network idle.
    pub network_idle: Duration,
}

impl Default for RenderTimeouts {
    fn default() -> Self {
        Self {
            load: Duration::from_secs(30),
            print: Duration::from_secs(30),
            network_idle: Duration::from_millis(500),
        }
    }
}

/// Number of browser pages currently open for renders.
#[derive(Debug, Clone, Default)]
pub struct PageCounter(Arc<AtomicUsize>);

impl PageCounter {
    pub fn current(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn opened(&self) {
        let open = self.0.fetch_add(1, Ordering::SeqCst) + 1;
        gauge!("boa_render_open_pages").set(open as f64);
    }

    fn closed(&self) {
        let open = self.0.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        gauge!("boa_render_open_pages").set(open as f64);
    }
}

/// Owns a page for one render. Closing is explicit; a lease dropped while
/// still open (caller cancelled) closes the page on a spawned task.
struct PageLease<P: BrowserPage> {
    page: Option<P>,
    counter: PageCounter,
}

impl<P: BrowserPage> PageLease<P> {
    fn open(page: P, counter: PageCounter) -> Self {
        counter.opened();
        Self {
            page: Some(page),
            counter,
        }
    }

    fn page(&self) -> Result<&P, RenderError> {
        self.page
            .as_ref()
            .ok_or_else(|| RenderError::engine("page was already closed"))
    }

    /// Close on a detached task and wait at most `limit` for it. A page that
    /// will not close stays counted as open until the task finishes.
    async fn close(mut self, limit: Duration) {
        let Some(page) = self.page.take() else {
            return;
        };
        let counter = self.counter.clone();
        let closing = tokio::spawn(async move {
            let outcome = page.close().await;
            counter.closed();
            outcome
        });

        let failure = match tokio::time::timeout(limit, closing).await {
            Ok(Ok(Ok(()))) => return,
            Ok(Ok(Err(err))) => err.to_string(),
            Ok(Err(err)) => format!("close task failed: {err}"),
            Err(_) => format!("page did not close within {}ms", limit.as_millis()),
        };
        warn!(
            target = "boa_render::engine",
            op = "close_page",
            result = "error",
            error = %failure,
            "failed to close browser page"
        );
    }
}

impl<P: BrowserPage> Drop for PageLease<P> {
    fn drop(&mut self) {
        let Some(page) = self.page.take() else {
            return;
        };
        let counter = self.counter.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    let _ = page.close().await;
                    counter.closed();
                });
            }
            Err(_) => counter.closed(),
        }
    }
}

/// Renders on pages of the shared browser session.
pub struct RenderEngine<B: BrowserBackend> {
    browser: BrowserManager<B>,
    timeouts: RenderTimeouts,
    pages: PageCounter,
}

impl<B: BrowserBackend> Clone for RenderEngine<B> {
    fn clone(&self) -> Self {
        Self {
            browser: self.browser.clone(),
            timeouts: self.timeouts,
            pages: self.pages.clone(),
        }
    }
}

impl<B: BrowserBackend> RenderEngine<B> {
    pub fn new(browser: BrowserManager<B>, timeouts: RenderTimeouts) -> Self {
        Self {
            browser,
            timeouts,
            pages: PageCounter::default(),
        }
    }

    pub fn browser(&self) -> &BrowserManager<B> {
        &self.browser
    }

    pub fn page_counter(&self) -> PageCounter {
        self.pages.clone()
    }

    pub fn open_pages(&self) -> usize {
        self.pages.current()
    }

    async fn drive(
        &self,
        page: &<B::Session as BrowserSession>::Page,
        html: &str,
        layout: &LayoutOptions,
    ) -> Result<Bytes, RenderError> {
        let load = self.timeouts.load;
        let loaded = tokio::time::timeout(load, async {
            page.set_content(html).await?;
            page.wait_for_network_idle(self.timeouts.network_idle).await
        })
        .await;
        match loaded {
            Ok(result) => result?,
            Err(_) => return Err(RenderError::timeout("loading content", load)),
        }

        let print = self.timeouts.print;
        let bytes = match tokio::time::timeout(print, page.print_pdf(layout)).await {
            Ok(result) => result?,
            Err(_) => return Err(RenderError::timeout("printing", print)),
        };

        if bytes.is_empty() {
            return Err(RenderError::engine("browser returned an empty PDF"));
        }
        Ok(bytes)
    }
}

#[async_trait]
impl<B: BrowserBackend> PdfRenderer for RenderEngine<B> {
    async fn render_pdf(&self, html: &str, layout: &LayoutOptions) -> Result<Bytes, RenderError> {
        layout.validate()?;
        let started = Instant::now();

        let session = self.browser.acquire().await?;
        let load = self.timeouts.load;
        let page = match tokio::time::timeout(load, session.new_page()).await {
            Ok(page) => page?,
            Err(_) => return Err(RenderError::timeout("opening page", load)),
        };
        let lease = PageLease::open(page, self.pages.clone());

        let outcome = match lease.page() {
            Ok(page) => self.drive(page, html, layout).await,
            Err(err) => Err(err),
        };
        lease.close(load).await;
        self.browser.release(session);

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &outcome {
            Ok(bytes) => {
                histogram!("boa_render_pdf_ms").record(elapsed_ms as f64);
                debug!(
                    target = "boa_render::engine",
                    op = "render_pdf",
                    result = "ok",
                    elapsed_ms,
                    bytes = bytes.len(),
                    "browser rendered pdf"
                );
            }
            Err(err) => debug!(
                target = "boa_render::engine",
                op = "render_pdf",
                result = "error",
                elapsed_ms,
                error = %err,
                "browser render failed"
            ),
        }
        outcome
    }
}
