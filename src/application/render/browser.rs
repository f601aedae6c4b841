//! Browser process manager.
//!
//! A single headless browser is shared by every render. The manager launches it
//! lazily, hands the same session to concurrent callers, relaunches it after a
//! crash and closes it on shutdown. All transitions of the shared slot happen
//! under one lock; a launch in progress is represented by a shared future so
//! that concurrent callers await the same launch instead of starting their own.

use std::{
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::{BoxFuture, FutureExt, Shared};
use metrics::counter;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::types::{LayoutOptions, RenderError};

/// Starts browser processes.
#[async_trait]
pub trait BrowserBackend: Send + Sync + 'static {
    type Session: BrowserSession;

    async fn launch(&self) -> Result<Self::Session, RenderError>;
}

/// A running browser process.
#[async_trait]
pub trait BrowserSession: Send + Sync + 'static {
    type Page: BrowserPage;

    /// `false` once the process crashed or the connection dropped.
    fn is_alive(&self) -> bool;

    async fn new_page(&self) -> Result<Self::Page, RenderError>;

    async fn close(&self) -> Result<(), RenderError>;
}

/// One tab, used by exactly one render call.
#[async_trait]
pub trait BrowserPage: Send + Sync + 'static {
    async fn set_content(&self, html: &str) -> Result<(), RenderError>;

    /// Resolve once the page has stopped loading resources for `idle_window`.
    async fn wait_for_network_idle(&self, idle_window: Duration) -> Result<(), RenderError>;

    async fn print_pdf(&self, layout: &LayoutOptions) -> Result<Bytes, RenderError>;

    async fn close(self) -> Result<(), RenderError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BrowserStatus {
    Idle,
    Launching,
    Ready,
    Stopped,
}

impl BrowserStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BrowserStatus::Idle => "idle",
            BrowserStatus::Launching => "launching",
            BrowserStatus::Ready => "ready",
            BrowserStatus::Stopped => "stopped",
        }
    }
}

/// Object-safe view of the manager for the HTTP layer and the shutdown path.
#[async_trait]
pub trait BrowserControl: Send + Sync {
    async fn status(&self) -> BrowserStatus;

    async fn shutdown(&self);

    async fn close_if_idle(&self, idle: Duration) -> bool;
}

type LaunchFuture<S> = Shared<BoxFuture<'static, Result<Arc<S>, RenderError>>>;

enum Slot<S> {
    Empty,
    Launching {
        generation: u64,
        launch: LaunchFuture<S>,
    },
    Ready(Arc<S>),
}

struct ManagerState<S> {
    slot: Slot<S>,
    generation: u64,
    last_used: Instant,
    stopped: bool,
}

struct ManagerInner<B: BrowserBackend> {
    backend: B,
    launch_timeout: Duration,
    state: Mutex<ManagerState<B::Session>>,
}

pub struct BrowserManager<B: BrowserBackend> {
    inner: Arc<ManagerInner<B>>,
}

impl<B: BrowserBackend> Clone for BrowserManager<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: BrowserBackend> fmt::Debug for BrowserManager<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrowserManager")
            .field("launch_timeout", &self.inner.launch_timeout)
            .finish_non_exhaustive()
    }
}

impl<B: BrowserBackend> BrowserManager<B> {
    pub fn new(backend: B, launch_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                backend,
                launch_timeout,
                state: Mutex::new(ManagerState {
                    slot: Slot::Empty,
                    generation: 0,
                    last_used: Instant::now(),
                    stopped: false,
                }),
            }),
        }
    }

    /// Return the live session, launching one if needed.
    pub async fn acquire(&self) -> Result<Arc<B::Session>, RenderError> {
        let launch = {
            let mut state = self.inner.state.lock().await;
            if state.stopped {
                return Err(RenderError::browser_launch("browser manager has been shut down"));
            }
            state.last_used = Instant::now();

            if let Slot::Ready(session) = &state.slot
                && session.is_alive()
            {
                return Ok(Arc::clone(session));
            }

            if let Slot::Launching { launch, .. } = &state.slot {
                launch.clone()
            } else {
                if let Slot::Ready(dead) = std::mem::replace(&mut state.slot, Slot::Empty) {
                    warn!(
                        target = "boa_render::browser",
                        op = "acquire",
                        result = "relaunch",
                        "browser session is no longer alive; relaunching"
                    );
                    tokio::spawn(async move {
                        let _ = dead.close().await;
                    });
                }
                self.start_launch(&mut state)
            }
        };

        launch.await
    }

    /// Sessions are shared; pages are the per-request unit.
    pub fn release(&self, session: Arc<B::Session>) {
        drop(session);
    }

    pub async fn status(&self) -> BrowserStatus {
        let state = self.inner.state.lock().await;
        if state.stopped {
            return BrowserStatus::Stopped;
        }
        match &state.slot {
            Slot::Empty => BrowserStatus::Idle,
            Slot::Launching { .. } => BrowserStatus::Launching,
            Slot::Ready(session) if session.is_alive() => BrowserStatus::Ready,
            Slot::Ready(_) => BrowserStatus::Idle,
        }
    }

    /// Close the browser. Safe to call repeatedly or before any launch.
    pub async fn shutdown(&self) {
        let session = {
            let mut state = self.inner.state.lock().await;
            state.stopped = true;
            match std::mem::replace(&mut state.slot, Slot::Empty) {
                Slot::Ready(session) => Some(session),
                Slot::Launching { .. } | Slot::Empty => None,
            }
        };

        match session {
            Some(session) => {
                let outcome = match session.close().await {
                    Ok(()) => "closed",
                    Err(_) => "error",
                };
                info!(
                    target = "boa_render::browser",
                    op = "shutdown",
                    result = outcome,
                    "browser shut down"
                );
            }
            None => info!(
                target = "boa_render::browser",
                op = "shutdown",
                result = "noop",
                "no browser session to close"
            ),
        }
    }

    /// Close the session when nobody acquired it within `idle` and no render
    /// still holds it.
    pub async fn close_if_idle(&self, idle: Duration) -> bool {
        let session = {
            let mut state = self.inner.state.lock().await;
            let unused = matches!(&state.slot, Slot::Ready(session) if Arc::strong_count(session) == 1);
            if !unused || state.last_used.elapsed() < idle {
                return false;
            }
            let Slot::Ready(session) = std::mem::replace(&mut state.slot, Slot::Empty) else {
                return false;
            };
            session
        };

        let _ = session.close().await;
        info!(
            target = "boa_render::browser",
            op = "close_if_idle",
            result = "closed",
            idle_ms = idle.as_millis() as u64,
            "closed idle browser session"
        );
        true
    }

    fn start_launch(&self, state: &mut ManagerState<B::Session>) -> LaunchFuture<B::Session> {
        state.generation += 1;
        let generation = state.generation;
        let handle = tokio::spawn(launch_task(Arc::clone(&self.inner), generation));
        let launch = async move {
            handle.await.unwrap_or_else(|err| {
                Err(RenderError::browser_launch(format!(
                    "browser launch task failed: {err}"
                )))
            })
        }
        .boxed()
        .shared();

        state.slot = Slot::Launching {
            generation,
            launch: launch.clone(),
        };
        launch
    }
}

/// Runs on its own task so a launch completes even if every waiter gives up.
async fn launch_task<B: BrowserBackend>(
    inner: Arc<ManagerInner<B>>,
    generation: u64,
) -> Result<Arc<B::Session>, RenderError> {
    let started = Instant::now();
    let outcome = match tokio::time::timeout(inner.launch_timeout, inner.backend.launch()).await {
        Ok(result) => result,
        Err(_) => Err(RenderError::browser_launch(format!(
            "browser did not start within {}ms",
            inner.launch_timeout.as_millis()
        ))),
    };
    let elapsed_ms = started.elapsed().as_millis() as u64;

    let mut state = inner.state.lock().await;
    let current = matches!(
        &state.slot,
        Slot::Launching { generation: active, .. } if *active == generation
    );

    match outcome {
        Ok(session) if current => {
            let session = Arc::new(session);
            state.slot = Slot::Ready(Arc::clone(&session));
            counter!("boa_render_browser_launch_total", "result" => "ok").increment(1);
            info!(
                target = "boa_render::browser",
                op = "launch",
                result = "ok",
                elapsed_ms,
                generation,
                "browser launched"
            );
            Ok(session)
        }
        Ok(session) => {
            drop(state);
            let _ = session.close().await;
            warn!(
                target = "boa_render::browser",
                op = "launch",
                result = "discarded",
                elapsed_ms,
                generation,
                "browser launched after shutdown; closed it"
            );
            Err(RenderError::browser_launch(
                "browser manager shut down during launch",
            ))
        }
        Err(err) => {
            if current {
                state.slot = Slot::Empty;
            }
            counter!("boa_render_browser_launch_total", "result" => "error").increment(1);
            warn!(
                target = "boa_render::browser",
                op = "launch",
                result = "error",
                elapsed_ms,
                generation,
                error = %err,
                "browser launch failed"
            );
            Err(err)
        }
    }
}

#[async_trait]
impl<B: BrowserBackend> BrowserControl for BrowserManager<B> {
    async fn status(&self) -> BrowserStatus {
        BrowserManager::status(self).await
    }

    async fn shutdown(&self) {
        BrowserManager::shutdown(self).await
    }

    async fn close_if_idle(&self, idle: Duration) -> bool {
        BrowserManager::close_if_idle(self, idle).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use super::*;

    #[derive(Debug, Default)]
    struct Counters {
        launches: AtomicUsize,
        closes: AtomicUsize,
    }

    struct FakeBackend {
        counters: Arc<Counters>,
        delay: Duration,
        fail: bool,
    }

    #[derive(Debug)]
    struct FakeSession {
        counters: Arc<Counters>,
        alive: Arc<AtomicBool>,
    }

    struct FakePage;

    #[async_trait]
    impl BrowserBackend for FakeBackend {
        type Session = FakeSession;

        async fn launch(&self) -> Result<FakeSession, RenderError> {
            self.counters.launches.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(RenderError::browser_launch("chromium not installed"));
            }
            Ok(FakeSession {
                counters: Arc::clone(&self.counters),
                alive: Arc::new(AtomicBool::new(true)),
            })
        }
    }

    #[async_trait]
    impl BrowserSession for FakeSession {
        type Page = FakePage;

        fn is_alive(&self) -> bool {
            self.alive.load(Ordering::SeqCst)
        }

        async fn new_page(&self) -> Result<FakePage, RenderError> {
            Ok(FakePage)
        }

        async fn close(&self) -> Result<(), RenderError> {
            self.counters.closes.fetch_add(1, Ordering::SeqCst);
            self.alive.store(false, Ordering::SeqCst);
            Ok(())
        }
    }

    #[async_trait]
    impl BrowserPage for FakePage {
        async fn set_content(&self, _html: &str) -> Result<(), RenderError> {
            Ok(())
        }

        async fn wait_for_network_idle(&self, _idle: Duration) -> Result<(), RenderError> {
            Ok(())
        }

        async fn print_pdf(&self, _layout: &LayoutOptions) -> Result<Bytes, RenderError> {
            Ok(Bytes::from_static(b"%PDF-1.4"))
        }

        async fn close(self) -> Result<(), RenderError> {
            Ok(())
        }
    }

    fn manager(delay: Duration, fail: bool) -> (BrowserManager<FakeBackend>, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        let backend = FakeBackend {
            counters: Arc::clone(&counters),
            delay,
            fail,
        };
        (BrowserManager::new(backend, Duration::from_secs(5)), counters)
    }

    #[tokio::test]
    async fn concurrent_acquires_share_one_launch() {
        let (manager, counters) = manager(Duration::from_millis(50), false);

        let sessions = futures::future::join_all((0..8).map(|_| manager.acquire())).await;

        assert_eq!(counters.launches.load(Ordering::SeqCst), 1);
        let first = sessions[0].as_ref().expect("session");
        for session in &sessions {
            assert!(Arc::ptr_eq(first, session.as_ref().expect("session")));
        }
        assert_eq!(manager.status().await, BrowserStatus::Ready);
    }

    #[tokio::test]
    async fn dead_session_is_relaunched() {
        let (manager, counters) = manager(Duration::ZERO, false);

        let session = manager.acquire().await.expect("first launch");
        session.alive.store(false, Ordering::SeqCst);
        drop(session);

        let relaunched = manager.acquire().await.expect("relaunch");

        assert!(relaunched.is_alive());
        assert_eq!(counters.launches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_launch_is_retried_on_next_acquire() {
        let (manager, counters) = manager(Duration::ZERO, true);

        let first = manager.acquire().await;
        let second = manager.acquire().await;

        assert!(matches!(first, Err(RenderError::BrowserLaunch { .. })));
        assert!(matches!(second, Err(RenderError::BrowserLaunch { .. })));
        assert_eq!(counters.launches.load(Ordering::SeqCst), 2);
        assert_eq!(manager.status().await, BrowserStatus::Idle);
    }

    #[tokio::test]
    async fn slow_launch_times_out() {
        let counters = Arc::new(Counters::default());
        let backend = FakeBackend {
            counters: Arc::clone(&counters),
            delay: Duration::from_secs(60),
            fail: false,
        };
        let manager = BrowserManager::new(backend, Duration::from_millis(20));

        let err = manager.acquire().await.expect_err("launch should time out");

        assert!(err.to_string().contains("did not start"));
    }

    #[tokio::test]
    async fn shutdown_is_idempotent_and_closes_session() {
        let (manager, counters) = manager(Duration::ZERO, false);

        manager.shutdown().await;
        assert_eq!(counters.closes.load(Ordering::SeqCst), 0);

        let (manager, counters) = self::manager(Duration::ZERO, false);
        drop(manager.acquire().await.expect("session"));
        manager.shutdown().await;
        manager.shutdown().await;

        assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
        assert_eq!(manager.status().await, BrowserStatus::Stopped);
        assert!(manager.acquire().await.is_err());
    }

    #[tokio::test]
    async fn launch_finishing_after_shutdown_is_closed() {
        let (manager, counters) = manager(Duration::from_millis(50), false);

        let pending = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.acquire().await })
        };
        while counters.launches.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        assert_eq!(manager.status().await, BrowserStatus::Launching);

        manager.shutdown().await;
        let outcome = pending.await.expect("acquire task");

        let err = outcome.err().expect("launch reported as failed");
        assert!(err.to_string().contains("shut down during launch"));
        assert_eq!(counters.launches.load(Ordering::SeqCst), 1);
        assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
        assert_eq!(manager.status().await, BrowserStatus::Stopped);
    }

    #[tokio::test]
    async fn idle_session_is_closed_only_when_unused() {
        let (manager, counters) = manager(Duration::ZERO, false);

        let held = manager.acquire().await.expect("session");
        assert!(!manager.close_if_idle(Duration::ZERO).await);

        drop(held);
        assert!(manager.close_if_idle(Duration::ZERO).await);
        assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
        assert_eq!(manager.status().await, BrowserStatus::Idle);

        manager.acquire().await.expect("relaunch after idle close");
        assert_eq!(counters.launches.load(Ordering::SeqCst), 2);
    }
}
