//! Headless Chromium backend driven over the DevTools protocol.

use std::{
    fmt,
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use chromiumoxide::{
    Page,
    browser::{Browser, BrowserConfig},
    cdp::browser_protocol::page::PrintToPdfParams,
    error::CdpError,
};
use futures::{Stream, StreamExt};
use tempfile::TempDir;
use tokio::{sync::Mutex, task::JoinHandle};
use tracing::{debug, warn};

use crate::application::render::{
    BrowserBackend, BrowserPage, BrowserSession, LayoutOptions, RenderError,
};

const IDLE_PROBE: &str = r#"(() => {
    if (document.readyState !== 'complete') return false;
    for (const img of Array.from(document.images)) {
        if (!img.complete) return false;
    }
    return !document.fonts || document.fonts.status === 'loaded';
})()"#;

/// Polls that must report idle in a row before the page counts as settled.
const IDLE_POLLS_REQUIRED: u32 = 2;

#[derive(Debug, Clone, Default)]
pub struct ChromiumOptions {
    /// Browser binary; auto-detected when `None`.
    pub executable: Option<PathBuf>,
    /// Pass `--no-sandbox`; needed inside most containers.
    pub no_sandbox: bool,
    pub extra_args: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ChromiumBackend {
    options: ChromiumOptions,
}

impl ChromiumBackend {
    pub fn new(options: ChromiumOptions) -> Self {
        Self { options }
    }

    fn launch_args(&self) -> Vec<String> {
        let mut args = vec![
            "--disable-gpu".to_string(),
            "--disable-dev-shm-usage".to_string(),
        ];
        if self.options.no_sandbox {
            args.push("--no-sandbox".to_string());
        }
        args.extend(
            self.options
                .extra_args
                .iter()
                .map(|arg| arg.trim())
                .filter(|arg| !arg.is_empty())
                .map(str::to_string),
        );
        args
    }
}

#[async_trait]
impl BrowserBackend for ChromiumBackend {
    type Session = ChromiumSession;

    async fn launch(&self) -> Result<Self::Session, RenderError> {
        let profile = tempfile::Builder::new()
            .prefix("boa-render-profile-")
            .tempdir()
            .map_err(|err| {
                RenderError::browser_launch(format!("failed to create profile directory: {err}"))
            })?;

        let mut builder = BrowserConfig::builder()
            .user_data_dir(profile.path())
            .args(self.launch_args());
        if let Some(executable) = self.options.executable.as_ref() {
            builder = builder.chrome_executable(executable);
        }
        let config = builder.build().map_err(RenderError::browser_launch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|err| RenderError::browser_launch(err.to_string()))?;

        let alive = Arc::new(AtomicBool::new(true));
        let handler = tokio::spawn(drain_events(
            handler.map(|event| event.map(|_| ())),
            Arc::clone(&alive),
            connection_lost,
        ));

        Ok(ChromiumSession {
            browser: Mutex::new(browser),
            handler,
            alive,
            _profile: profile,
        })
    }
}

/// Errors after which the DevTools connection cannot recover. Event decoding
/// errors are not among them; chromiumoxide reports those for unknown events.
fn connection_lost(err: &CdpError) -> bool {
    matches!(
        err,
        CdpError::Ws(_) | CdpError::Io(_) | CdpError::ChannelSendError(_)
    )
}

/// Pump DevTools events until the stream ends or `fatal` flags an error.
/// The handler stream stays pending after the socket drops instead of
/// ending, so the fatal error is the only reliable sign of a dead browser.
async fn drain_events<S, E>(events: S, alive: Arc<AtomicBool>, fatal: fn(&E) -> bool)
where
    S: Stream<Item = Result<(), E>> + Unpin,
    E: fmt::Display,
{
    let mut events = events;
    while let Some(event) = events.next().await {
        let Err(err) = event else {
            continue;
        };
        if fatal(&err) {
            warn!(
                target = "boa_render::infra::browser",
                op = "devtools_events",
                result = "disconnected",
                error = %err,
                "devtools connection lost"
            );
            break;
        }
        debug!(
            target = "boa_render::infra::browser",
            error = %err,
            "devtools event error"
        );
    }
    alive.store(false, Ordering::SeqCst);
    debug!(target = "boa_render::infra::browser", "devtools handler finished");
}

/// A running Chromium process; the profile directory lives as long as the session.
pub struct ChromiumSession {
    browser: Mutex<Browser>,
    handler: JoinHandle<()>,
    alive: Arc<AtomicBool>,
    _profile: TempDir,
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    type Page = ChromiumPage;

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst) && !self.handler.is_finished()
    }

    async fn new_page(&self) -> Result<Self::Page, RenderError> {
        let browser = self.browser.lock().await;
        let page = browser.new_page("about:blank").await.map_err(|err| {
            if connection_lost(&err) {
                self.alive.store(false, Ordering::SeqCst);
            }
            RenderError::engine(format!("failed to open page: {err}"))
        })?;
        Ok(ChromiumPage { page })
    }

    async fn close(&self) -> Result<(), RenderError> {
        let mut browser = self.browser.lock().await;
        let closed = browser.close().await;
        if let Err(err) = browser.wait().await {
            warn!(
                target = "boa_render::infra::browser",
                error = %err,
                "browser process did not exit cleanly"
            );
        }
        self.handler.abort();
        self.alive.store(false, Ordering::SeqCst);
        closed
            .map(|_| ())
            .map_err(|err| RenderError::engine(format!("failed to close browser: {err}")))
    }
}

pub struct ChromiumPage {
    page: Page,
}

impl ChromiumPage {
    async fn is_idle(&self) -> Result<bool, RenderError> {
        self.page
            .evaluate(IDLE_PROBE)
            .await
            .map_err(|err| RenderError::engine(format!("failed to probe page state: {err}")))?
            .into_value::<bool>()
            .map_err(|err| RenderError::engine(format!("unexpected page state: {err}")))
    }
}

#[async_trait]
impl BrowserPage for ChromiumPage {
    async fn set_content(&self, html: &str) -> Result<(), RenderError> {
        self.page
            .set_content(html)
            .await
            .map(|_| ())
            .map_err(|err| RenderError::engine(format!("failed to load content: {err}")))
    }

    async fn wait_for_network_idle(&self, idle_window: Duration) -> Result<(), RenderError> {
        let mut idle_polls = 0;
        loop {
            if self.is_idle().await? {
                idle_polls += 1;
                if idle_polls >= IDLE_POLLS_REQUIRED {
                    return Ok(());
                }
            } else {
                idle_polls = 0;
            }
            tokio::time::sleep(idle_window).await;
        }
    }

    async fn print_pdf(&self, layout: &LayoutOptions) -> Result<Bytes, RenderError> {
        let (width, height) = layout.paper_size_in();
        let margins = layout.margin_inches()?;
        // Paper size is already rotated for landscape.
        let params = PrintToPdfParams::builder()
            .paper_width(width)
            .paper_height(height)
            .margin_top(margins.top)
            .margin_right(margins.right)
            .margin_bottom(margins.bottom)
            .margin_left(margins.left)
            .print_background(layout.print_background)
            .prefer_css_page_size(false)
            .build();

        self.page
            .pdf(params)
            .await
            .map(Bytes::from)
            .map_err(|err| RenderError::engine(format!("failed to print pdf: {err}")))
    }

    async fn close(self) -> Result<(), RenderError> {
        self.page
            .close()
            .await
            .map_err(|err| RenderError::engine(format!("failed to close page: {err}")))
    }
}
