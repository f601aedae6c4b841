//! Fallback chain: browser PDF, then text PDF, then the HTML itself.
//!
//! Each tier runs only when the previous one failed. The chain is modelled as
//! an explicit state machine so every transition can be driven and inspected
//! on its own through [`FallbackChain::step`].

use std::{sync::Arc, time::Instant};

use bytes::Bytes;
use metrics::counter;
use tracing::{info, warn};

use super::{
    engine::PdfRenderer,
    text_pdf::FallbackPdfGenerator,
    types::{ErrorKind, LayoutOptions, PdfSource, RenderError, RenderResult},
};

/// Soft warning surfaced to users when the HTML tier was used.
pub const HTML_FALLBACK_WARNING: &str = "generated in printable HTML instead of PDF";

#[derive(Debug, Clone)]
pub enum FallbackState {
    AttemptPrimary,
    AttemptSecondary {
        primary_failure: RenderError,
    },
    AttemptTertiary {
        primary_failure: RenderError,
        secondary_failure: RenderError,
    },
    Done(RenderResult),
}

impl FallbackState {
    pub fn name(&self) -> &'static str {
        match self {
            FallbackState::AttemptPrimary => "attempt_primary",
            FallbackState::AttemptSecondary { .. } => "attempt_secondary",
            FallbackState::AttemptTertiary { .. } => "attempt_tertiary",
            FallbackState::Done(_) => "done",
        }
    }
}

#[derive(Clone)]
pub struct FallbackChain {
    primary: Arc<dyn PdfRenderer>,
    secondary: Arc<dyn FallbackPdfGenerator>,
}

impl FallbackChain {
    pub fn new(primary: Arc<dyn PdfRenderer>, secondary: Arc<dyn FallbackPdfGenerator>) -> Self {
        Self { primary, secondary }
    }

    /// Run the chain to completion. Always returns bytes unless packaging the
    /// HTML itself was impossible.
    pub async fn render(&self, html: &str, layout: &LayoutOptions) -> RenderResult {
        let started = Instant::now();
        let mut state = FallbackState::AttemptPrimary;
        loop {
            state = match state {
                FallbackState::Done(result) => {
                    record_outcome(&result, started);
                    return result;
                }
                pending => self.step(pending, html, layout).await,
            };
        }
    }

    /// Advance the machine by one transition.
    pub async fn step(
        &self,
        state: FallbackState,
        html: &str,
        layout: &LayoutOptions,
    ) -> FallbackState {
        match state {
            FallbackState::AttemptPrimary => match self.primary.render_pdf(html, layout).await {
                Ok(bytes) => FallbackState::Done(RenderResult::Pdf {
                    bytes,
                    source: PdfSource::Browser,
                }),
                Err(primary_failure) => {
                    counter!("boa_render_fallback_total", "from" => "browser").increment(1);
                    warn!(
                        target = "boa_render::fallback",
                        op = "primary",
                        result = "error",
                        error_kind = primary_failure.kind().as_str(),
                        error = %primary_failure,
                        "browser rendering failed; trying text pdf"
                    );
                    FallbackState::AttemptSecondary { primary_failure }
                }
            },
            FallbackState::AttemptSecondary { primary_failure } => {
                match self.render_secondary(html, layout).await {
                    Ok(bytes) => FallbackState::Done(RenderResult::Pdf {
                        bytes,
                        source: PdfSource::TextFallback,
                    }),
                    Err(secondary_failure) => {
                        counter!("boa_render_fallback_total", "from" => "text").increment(1);
                        warn!(
                            target = "boa_render::fallback",
                            op = "secondary",
                            result = "error",
                            error = %secondary_failure,
                            "text pdf failed; packaging html"
                        );
                        FallbackState::AttemptTertiary {
                            primary_failure,
                            secondary_failure,
                        }
                    }
                }
            }
            FallbackState::AttemptTertiary {
                primary_failure,
                secondary_failure,
            } => FallbackState::Done(package_html(html, &primary_failure, &secondary_failure)),
            done @ FallbackState::Done(_) => done,
        }
    }

    async fn render_secondary(
        &self,
        html: &str,
        layout: &LayoutOptions,
    ) -> Result<Bytes, RenderError> {
        let generator = Arc::clone(&self.secondary);
        let html = html.to_owned();
        let layout = layout.clone();
        tokio::task::spawn_blocking(move || generator.generate(&html, &layout))
            .await
            .unwrap_or_else(|err| Err(RenderError::text_pdf(format!("text pdf task failed: {err}"))))
    }
}

/// Final tier: hand back the composed HTML as a download.
fn package_html(
    html: &str,
    primary_failure: &RenderError,
    secondary_failure: &RenderError,
) -> RenderResult {
    if html.is_empty() {
        warn!(
            target = "boa_render::fallback",
            op = "tertiary",
            result = "error",
            "nothing to package; composed html is empty"
        );
        return RenderResult::Error {
            cause: ErrorKind::Packaging,
        };
    }

    let reason = format!(
        "PDF rendering failed: {primary_failure}; text fallback failed: {secondary_failure}"
    );
    warn!(
        target = "boa_render::fallback",
        op = "tertiary",
        result = "html",
        reason = %reason,
        "{HTML_FALLBACK_WARNING}"
    );
    RenderResult::Html {
        bytes: Bytes::copy_from_slice(html.as_bytes()),
        reason,
    }
}

fn record_outcome(result: &RenderResult, started: Instant) {
    let tier = match result {
        RenderResult::Pdf { source, .. } => source.as_str(),
        RenderResult::Html { .. } | RenderResult::Error { .. } => "html",
    };
    let kind = result.kind().as_str();
    counter!("boa_render_documents_total", "kind" => kind, "tier" => tier).increment(1);
    info!(
        target = "boa_render::fallback",
        op = "render",
        result = kind,
        tier,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "document rendered"
    );
}
