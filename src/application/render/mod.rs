//! HTML to PDF rendering pipeline.
//!
//! Templates are composed into complete documents, then handed to the
//! fallback chain: the headless browser first, a text-only PDF second and the
//! composed HTML as a last resort. Callers switch on [`RenderResult`] to pick
//! response headers.

pub mod browser;
pub mod compose;
pub mod engine;
pub mod fallback;
pub mod text_pdf;
mod types;

pub use browser::{
    BrowserBackend, BrowserControl, BrowserManager, BrowserPage, BrowserSession, BrowserStatus,
};
pub use compose::{
    ComposedDocument, CompositionError, DEFAULT_PRINT_STYLESHEET, RenderRequest, TokenMap, compose,
};
pub use engine::{PageCounter, PdfRenderer, RenderEngine, RenderTimeouts};
pub use fallback::{FallbackChain, FallbackState, HTML_FALLBACK_WARNING};
pub use text_pdf::{FallbackPdfGenerator, TextPdfGenerator};
pub use types::{
    ErrorKind, LayoutError, LayoutOptions, LayoutOverrides, MarginInches, MarginOverrides, Margins,
    PageFormat, PdfSource, RenderError, RenderKind, RenderResult, parse_length_inches,
};
