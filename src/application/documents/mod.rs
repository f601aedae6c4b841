//! Document use-case adapters.
//!
//! Each record type knows how to turn itself into placeholder tokens and, when
//! no admin template exists, into a default template. [`DocumentService`]
//! composes the result and runs it through the fallback chain.

mod election;
mod membership;
mod receipt;
mod seminar;
pub(crate) mod template;

use std::time::Instant;

use thiserror::Error;
use time::{Date, OffsetDateTime};
use tracing::{debug, info};

use crate::{
    application::render::{
        CompositionError, FallbackChain, LayoutError, LayoutOptions, LayoutOverrides,
        RenderRequest, RenderResult, TokenMap,
    },
    domain::{dates::display_date, error::DomainError, types::DocumentKind},
};

/// Placeholder for optional dates and places that are not fixed yet.
pub const TO_BE_ANNOUNCED: &str = "TBA";
/// Placeholder for optional contact or reference fields.
pub const NOT_AVAILABLE: &str = "N/A";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Branding {
    pub organisation_name: String,
}

impl Default for Branding {
    fn default() -> Self {
        Self {
            organisation_name: "BOA".to_string(),
        }
    }
}

/// A record that can be rendered as a downloadable document.
pub trait DocumentSource {
    fn kind(&self) -> DocumentKind;

    fn validate(&self) -> Result<(), DomainError>;

    /// Title used for the `DOCUMENT_TITLE` token and the download name.
    fn title(&self) -> String;

    /// Download file name without extension.
    fn file_stem(&self) -> String;

    fn fill_tokens(&self, tokens: &mut TokenMap);

    /// Template used when no admin template is configured.
    fn default_template(&self, branding: &Branding, generated_on: &str) -> String;
}

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error(transparent)]
    Record(#[from] DomainError),
    #[error(transparent)]
    Layout(#[from] LayoutError),
    #[error(transparent)]
    Composition(#[from] CompositionError),
}

#[derive(Debug, Clone)]
pub struct RenderedDocument {
    pub kind: DocumentKind,
    pub filename: String,
    pub result: RenderResult,
}

#[derive(Clone)]
pub struct DocumentService {
    chain: FallbackChain,
    branding: Branding,
}

impl DocumentService {
    pub fn new(chain: FallbackChain, branding: Branding) -> Self {
        Self { chain, branding }
    }

    pub fn branding(&self) -> &Branding {
        &self.branding
    }

    /// Render a record, using `template` when it is configured.
    pub async fn render<D: DocumentSource>(
        &self,
        record: &D,
        template: Option<&str>,
        overrides: Option<&LayoutOverrides>,
    ) -> Result<RenderedDocument, DocumentError> {
        record.validate()?;
        let layout = resolve_layout(overrides)?;
        let today = OffsetDateTime::now_utc().date();

        let tokens = document_tokens(record, &self.branding, today);
        let template = resolve_template(record, template, &self.branding, today);
        self.run(record.kind(), record.file_stem(), template, tokens, layout)
            .await
    }

    /// Render an arbitrary template with caller-built tokens.
    pub async fn render_template(
        &self,
        template: &str,
        tokens: TokenMap,
        overrides: Option<&LayoutOverrides>,
        file_stem: Option<&str>,
    ) -> Result<RenderedDocument, DocumentError> {
        let layout = resolve_layout(overrides)?;
        let stem = file_stem
            .map(slug::slugify)
            .filter(|stem| !stem.is_empty())
            .unwrap_or_else(|| DocumentKind::Custom.as_str().to_string());
        self.run(DocumentKind::Custom, stem, template.to_string(), tokens, layout)
            .await
    }

    async fn run(
        &self,
        kind: DocumentKind,
        stem: String,
        template: String,
        tokens: TokenMap,
        layout: LayoutOptions,
    ) -> Result<RenderedDocument, DocumentError> {
        let started = Instant::now();
        let composed = RenderRequest::new(template, tokens, layout).compose()?;
        debug!(
            target = "boa_render::documents",
            op = "compose",
            kind = kind.as_str(),
            bytes = composed.html.len(),
            "document composed"
        );

        let result = self.chain.render(&composed.html, &composed.layout).await;
        let filename = download_filename(&stem, &result);
        info!(
            target = "boa_render::documents",
            op = "render",
            kind = kind.as_str(),
            result = result.kind().as_str(),
            filename = %filename,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "document ready"
        );

        Ok(RenderedDocument {
            kind,
            filename,
            result,
        })
    }
}

fn resolve_layout(overrides: Option<&LayoutOverrides>) -> Result<LayoutOptions, LayoutError> {
    let layout = LayoutOptions::default().with_overrides(overrides);
    layout.validate()?;
    Ok(layout)
}

/// Common tokens plus the record's own.
pub fn document_tokens<D: DocumentSource>(record: &D, branding: &Branding, today: Date) -> TokenMap {
    let mut tokens = TokenMap::new();
    tokens
        .insert_text("ORGANISATION", &branding.organisation_name)
        .insert_text("GENERATED_ON", display_date(today))
        .insert_text("DOCUMENT_TITLE", record.title());
    record.fill_tokens(&mut tokens);
    tokens
}

/// The configured template, or one synthesized from the record when none is set.
pub fn resolve_template<D: DocumentSource>(
    record: &D,
    template: Option<&str>,
    branding: &Branding,
    today: Date,
) -> String {
    match template.filter(|template| !template.trim().is_empty()) {
        Some(template) => template.to_string(),
        None => {
            info!(
                target = "boa_render::documents",
                op = "resolve_template",
                kind = record.kind().as_str(),
                result = "synthesized",
                "no template configured; using built-in layout"
            );
            record.default_template(branding, &display_date(today))
        }
    }
}

pub fn download_filename(stem: &str, result: &RenderResult) -> String {
    format!("{stem}.{}", result.extension().unwrap_or("txt"))
}

/// Slug of `title` followed by `suffix`, falling back to the suffix alone.
pub(crate) fn file_stem(title: &str, suffix: &str) -> String {
    let title = slug::slugify(title);
    if title.is_empty() {
        suffix.to_string()
    } else {
        format!("{title}-{suffix}")
    }
}

pub(crate) fn date_or_tba(date: Option<Date>) -> String {
    date.map(display_date)
        .unwrap_or_else(|| TO_BE_ANNOUNCED.to_string())
}

pub(crate) fn text_or<'a>(value: Option<&'a str>, placeholder: &'a str) -> &'a str {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(placeholder)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use bytes::Bytes;
    use time::macros::date;

    use super::*;
    use crate::{
        application::render::{
            FallbackPdfGenerator, PdfRenderer, PdfSource, RenderError, RenderKind,
        },
        domain::records::ElectionRecord,
    };

    struct OfflineBrowser;

    #[async_trait]
    impl PdfRenderer for OfflineBrowser {
        async fn render_pdf(&self, _html: &str, _layout: &LayoutOptions) -> Result<Bytes, RenderError> {
            Err(RenderError::browser_launch("chromium not found"))
        }
    }

    struct EchoPdf;

    impl FallbackPdfGenerator for EchoPdf {
        fn generate(&self, html: &str, _layout: &LayoutOptions) -> Result<Bytes, RenderError> {
            Ok(Bytes::from(format!("%PDF-{}", html.len())))
        }
    }

    fn election() -> ElectionRecord {
        serde_json::from_value(serde_json::json!({
            "title": "BOA Election 2026",
            "deadline": "2026-01-01",
        }))
        .expect("record")
    }

    #[test]
    fn missing_template_is_synthesized_from_record() {
        let record = election();

        for configured in [None, Some(""), Some("  \n ")] {
            let template =
                resolve_template(&record, configured, &Branding::default(), date!(2025 - 12 - 01));
            assert!(!template.trim().is_empty());
            assert!(template.contains("BOA Election 2026"));
            assert!(template.contains("1 January 2026"));
        }
    }

    #[test]
    fn configured_template_is_used_verbatim() {
        let record = election();

        let template = resolve_template(
            &record,
            Some("<p>{{ELECTION_TITLE}}</p>"),
            &Branding::default(),
            date!(2025 - 12 - 01),
        );

        assert_eq!(template, "<p>{{ELECTION_TITLE}}</p>");
    }

    #[test]
    fn common_tokens_are_present() {
        let tokens = document_tokens(&election(), &Branding::default(), date!(2025 - 12 - 01));

        assert_eq!(tokens.get("ORGANISATION"), Some("BOA"));
        assert_eq!(tokens.get("GENERATED_ON"), Some("1 December 2025"));
        assert_eq!(tokens.get("DOCUMENT_TITLE"), Some("BOA Election 2026"));
    }

    #[tokio::test]
    async fn service_names_download_after_result_kind() {
        let chain = FallbackChain::new(Arc::new(OfflineBrowser), Arc::new(EchoPdf));
        let service = DocumentService::new(chain, Branding::default());

        let rendered = service
            .render(&election(), None, None)
            .await
            .expect("rendered");

        assert_eq!(rendered.kind, DocumentKind::ElectionForm);
        assert_eq!(rendered.filename, "boa-election-2026-nomination-form.pdf");
        assert_eq!(rendered.result.kind(), RenderKind::Pdf);
        assert!(matches!(
            rendered.result,
            RenderResult::Pdf {
                source: PdfSource::TextFallback,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn invalid_layout_is_rejected_before_rendering() {
        let chain = FallbackChain::new(Arc::new(OfflineBrowser), Arc::new(EchoPdf));
        let service = DocumentService::new(chain, Branding::default());
        let overrides: LayoutOverrides = serde_json::from_value(serde_json::json!({
            "margins": { "left": "lots" }
        }))
        .expect("overrides");

        let err = service
            .render(&election(), None, Some(&overrides))
            .await
            .expect_err("invalid margin");

        assert!(matches!(err, DocumentError::Layout(_)));
    }

    #[tokio::test]
    async fn custom_templates_fall_back_to_generic_stem() {
        let chain = FallbackChain::new(Arc::new(OfflineBrowser), Arc::new(EchoPdf));
        let service = DocumentService::new(chain, Branding::default());

        let rendered = service
            .render_template("<p>hello</p>", TokenMap::new(), None, Some("!!!"))
            .await
            .expect("rendered");

        assert_eq!(rendered.kind, DocumentKind::Custom);
        assert_eq!(rendered.filename, "document.pdf");
    }
}
