use std::{fmt, str::FromStr};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const MM_PER_INCH: f64 = 25.4;
const PX_PER_INCH: f64 = 96.0;
const PT_PER_INCH: f64 = 72.0;

/// Paper sizes understood by both PDF tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PageFormat {
    A3,
    #[default]
    A4,
    A5,
    Letter,
    Legal,
    Tabloid,
}

impl PageFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            PageFormat::A3 => "A3",
            PageFormat::A4 => "A4",
            PageFormat::A5 => "A5",
            PageFormat::Letter => "Letter",
            PageFormat::Legal => "Legal",
            PageFormat::Tabloid => "Tabloid",
        }
    }

    /// Portrait `(width, height)` in inches.
    pub fn dimensions_in(self) -> (f64, f64) {
        match self {
            PageFormat::A3 => (11.69, 16.54),
            PageFormat::A4 => (8.27, 11.69),
            PageFormat::A5 => (5.83, 8.27),
            PageFormat::Letter => (8.5, 11.0),
            PageFormat::Legal => (8.5, 14.0),
            PageFormat::Tabloid => (11.0, 17.0),
        }
    }
}

impl fmt::Display for PageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PageFormat {
    type Err = LayoutError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "a3" => Ok(PageFormat::A3),
            "a4" => Ok(PageFormat::A4),
            "a5" => Ok(PageFormat::A5),
            "letter" => Ok(PageFormat::Letter),
            "legal" => Ok(PageFormat::Legal),
            "tabloid" => Ok(PageFormat::Tabloid),
            _ => Err(LayoutError::UnknownFormat(value.to_string())),
        }
    }
}

impl TryFrom<String> for PageFormat {
    type Error = LayoutError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PageFormat> for String {
    fn from(value: PageFormat) -> Self {
        value.as_str().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    #[error("unknown page format `{0}`")]
    UnknownFormat(String),
    #[error("invalid {side} margin `{value}`")]
    InvalidMargin { side: &'static str, value: String },
}

/// Page margins as CSS-like length strings (`20mm`, `0.5in`, `12px`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Margins {
    pub top: String,
    pub right: String,
    pub bottom: String,
    pub left: String,
}

impl Margins {
    pub fn uniform(value: impl Into<String>) -> Self {
        let value = value.into();
        Self {
            top: value.clone(),
            right: value.clone(),
            bottom: value.clone(),
            left: value,
        }
    }

    pub fn to_inches(&self) -> Result<MarginInches, LayoutError> {
        Ok(MarginInches {
            top: side_inches("top", &self.top)?,
            right: side_inches("right", &self.right)?,
            bottom: side_inches("bottom", &self.bottom)?,
            left: side_inches("left", &self.left)?,
        })
    }
}

impl Default for Margins {
    fn default() -> Self {
        Self::uniform("20mm")
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarginInches {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

fn side_inches(side: &'static str, value: &str) -> Result<f64, LayoutError> {
    parse_length_inches(value).ok_or_else(|| LayoutError::InvalidMargin {
        side,
        value: value.to_string(),
    })
}

/// Convert a CSS-like length to inches. Bare numbers are pixels.
pub fn parse_length_inches(value: &str) -> Option<f64> {
    let trimmed = value.trim().to_ascii_lowercase();
    let split = trimmed
        .find(|ch: char| ch.is_ascii_alphabetic())
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split);
    let amount: f64 = number.trim().parse().ok()?;
    if !amount.is_finite() || amount < 0.0 {
        return None;
    }

    let inches = match unit.trim() {
        "mm" => amount / MM_PER_INCH,
        "cm" => amount * 10.0 / MM_PER_INCH,
        "in" => amount,
        "px" | "" => amount / PX_PER_INCH,
        "pt" => amount / PT_PER_INCH,
        _ => return None,
    };
    Some(inches)
}

/// Page layout handed to the PDF tiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutOptions {
    pub page_format: PageFormat,
    pub print_background: bool,
    pub margins: Margins,
    pub landscape: bool,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            page_format: PageFormat::A4,
            print_background: true,
            margins: Margins::default(),
            landscape: false,
        }
    }
}

impl LayoutOptions {
    /// Apply caller overrides field by field.
    pub fn with_overrides(mut self, overrides: Option<&LayoutOverrides>) -> Self {
        let Some(overrides) = overrides else {
            return self;
        };

        if let Some(format) = overrides.page_format {
            self.page_format = format;
        }
        if let Some(print_background) = overrides.print_background {
            self.print_background = print_background;
        }
        if let Some(landscape) = overrides.landscape {
            self.landscape = landscape;
        }
        if let Some(margins) = &overrides.margins {
            let target = &mut self.margins;
            for (slot, value) in [
                (&mut target.top, &margins.top),
                (&mut target.right, &margins.right),
                (&mut target.bottom, &margins.bottom),
                (&mut target.left, &margins.left),
            ] {
                if let Some(value) = value {
                    *slot = value.clone();
                }
            }
        }
        self
    }

    /// `(width, height)` in inches after orientation.
    pub fn paper_size_in(&self) -> (f64, f64) {
        let (width, height) = self.page_format.dimensions_in();
        if self.landscape {
            (height, width)
        } else {
            (width, height)
        }
    }

    pub fn margin_inches(&self) -> Result<MarginInches, LayoutError> {
        self.margins.to_inches()
    }

    /// Reject margins that cannot be printed on the chosen paper.
    pub fn validate(&self) -> Result<(), LayoutError> {
        let margins = self.margin_inches()?;
        let (width, height) = self.paper_size_in();
        if margins.left + margins.right >= width {
            return Err(LayoutError::InvalidMargin {
                side: "horizontal",
                value: format!("{} + {}", self.margins.left, self.margins.right),
            });
        }
        if margins.top + margins.bottom >= height {
            return Err(LayoutError::InvalidMargin {
                side: "vertical",
                value: format!("{} + {}", self.margins.top, self.margins.bottom),
            });
        }
        Ok(())
    }
}

/// Partial layout supplied by callers; unset fields keep the defaults.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutOverrides {
    #[serde(default)]
    pub page_format: Option<PageFormat>,
    #[serde(default)]
    pub print_background: Option<bool>,
    #[serde(default)]
    pub landscape: Option<bool>,
    #[serde(default)]
    pub margins: Option<MarginOverrides>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MarginOverrides {
    #[serde(default)]
    pub top: Option<String>,
    #[serde(default)]
    pub right: Option<String>,
    #[serde(default)]
    pub bottom: Option<String>,
    #[serde(default)]
    pub left: Option<String>,
}

/// Which tier produced a PDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PdfSource {
    Browser,
    TextFallback,
}

impl PdfSource {
    pub fn as_str(self) -> &'static str {
        match self {
            PdfSource::Browser => "browser",
            PdfSource::TextFallback => "text",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderKind {
    Pdf,
    Html,
    Error,
}

impl RenderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RenderKind::Pdf => "pdf",
            RenderKind::Html => "html",
            RenderKind::Error => "error",
        }
    }
}

impl fmt::Display for RenderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of failures across the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    BrowserLaunch,
    RenderTimeout,
    Render,
    TemplateComposition,
    Packaging,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::BrowserLaunch => "browser_launch",
            ErrorKind::RenderTimeout => "render_timeout",
            ErrorKind::Render => "render",
            ErrorKind::TemplateComposition => "template_composition",
            ErrorKind::Packaging => "packaging",
        }
    }
}

/// Outcome of the fallback chain. Only `bytes` of a `Pdf` are a PDF.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderResult {
    Pdf { bytes: Bytes, source: PdfSource },
    Html { bytes: Bytes, reason: String },
    Error { cause: ErrorKind },
}

impl RenderResult {
    pub fn kind(&self) -> RenderKind {
        match self {
            RenderResult::Pdf { .. } => RenderKind::Pdf,
            RenderResult::Html { .. } => RenderKind::Html,
            RenderResult::Error { .. } => RenderKind::Error,
        }
    }

    pub fn bytes(&self) -> Option<&Bytes> {
        match self {
            RenderResult::Pdf { bytes, .. } | RenderResult::Html { bytes, .. } => Some(bytes),
            RenderResult::Error { .. } => None,
        }
    }

    pub fn content_type(&self) -> Option<&'static str> {
        match self {
            RenderResult::Pdf { .. } => Some("application/pdf"),
            RenderResult::Html { .. } => Some("text/html; charset=utf-8"),
            RenderResult::Error { .. } => None,
        }
    }

    pub fn extension(&self) -> Option<&'static str> {
        match self {
            RenderResult::Pdf { .. } => Some("pdf"),
            RenderResult::Html { .. } => Some("html"),
            RenderResult::Error { .. } => None,
        }
    }
}

/// Failures raised by the PDF tiers. Clone so one launch outcome can be
/// handed to every waiter.
#[derive(Debug, Clone, Error)]
pub enum RenderError {
    #[error("browser launch failed: {message}")]
    BrowserLaunch { message: String },
    #[error("render timed out while {stage} after {timeout_ms}ms")]
    Timeout { stage: &'static str, timeout_ms: u64 },
    #[error("render failed: {message}")]
    Engine { message: String },
    #[error("text pdf generation failed: {message}")]
    TextPdf { message: String },
}

impl RenderError {
    pub fn browser_launch(message: impl Into<String>) -> Self {
        Self::BrowserLaunch {
            message: message.into(),
        }
    }

    pub fn timeout(stage: &'static str, timeout: std::time::Duration) -> Self {
        Self::Timeout {
            stage,
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub fn engine(message: impl Into<String>) -> Self {
        Self::Engine {
            message: message.into(),
        }
    }

    pub fn text_pdf(message: impl Into<String>) -> Self {
        Self::TextPdf {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RenderError::BrowserLaunch { .. } => ErrorKind::BrowserLaunch,
            RenderError::Timeout { .. } => ErrorKind::RenderTimeout,
            RenderError::Engine { .. } | RenderError::TextPdf { .. } => ErrorKind::Render,
        }
    }
}

impl From<LayoutError> for RenderError {
    fn from(error: LayoutError) -> Self {
        RenderError::engine(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(left: f64, right: f64) -> bool {
        (left - right).abs() < 1e-6
    }

    #[test]
    fn lengths_convert_to_inches() {
        assert!(approx(parse_length_inches("25.4mm").expect("mm"), 1.0));
        assert!(approx(parse_length_inches("2.54cm").expect("cm"), 1.0));
        assert!(approx(parse_length_inches("0.5in").expect("in"), 0.5));
        assert!(approx(parse_length_inches("96px").expect("px"), 1.0));
        assert!(approx(parse_length_inches("48").expect("bare"), 0.5));
        assert!(approx(parse_length_inches(" 72PT ").expect("pt"), 1.0));
        assert!(parse_length_inches("wide").is_none());
        assert!(parse_length_inches("-4mm").is_none());
        assert!(parse_length_inches("10em").is_none());
    }

    #[test]
    fn overrides_merge_field_by_field() {
        let overrides: LayoutOverrides = serde_json::from_value(serde_json::json!({
            "pageFormat": "letter",
            "margins": { "top": "1in" }
        }))
        .expect("overrides");

        let layout = LayoutOptions::default().with_overrides(Some(&overrides));

        assert_eq!(layout.page_format, PageFormat::Letter);
        assert!(layout.print_background);
        assert!(!layout.landscape);
        assert_eq!(layout.margins.top, "1in");
        assert_eq!(layout.margins.left, "20mm");
    }

    #[test]
    fn landscape_swaps_paper_dimensions() {
        let layout = LayoutOptions {
            landscape: true,
            ..LayoutOptions::default()
        };
        assert_eq!(layout.paper_size_in(), (11.69, 8.27));
    }

    #[test]
    fn validate_rejects_margins_wider_than_paper() {
        let layout = LayoutOptions {
            margins: Margins::uniform("5in"),
            ..LayoutOptions::default()
        };
        assert!(layout.validate().is_err());

        let layout = LayoutOptions {
            margins: Margins::uniform("banana"),
            ..LayoutOptions::default()
        };
        assert_eq!(
            layout.validate(),
            Err(LayoutError::InvalidMargin {
                side: "top",
                value: "banana".to_string()
            })
        );
    }

    #[test]
    fn unknown_page_format_fails_deserialization() {
        let result: Result<LayoutOverrides, _> =
            serde_json::from_value(serde_json::json!({ "pageFormat": "B5" }));
        assert!(result.is_err());
    }

    #[test]
    fn error_kinds_classify_render_errors() {
        assert_eq!(
            RenderError::browser_launch("missing binary").kind(),
            ErrorKind::BrowserLaunch
        );
        assert_eq!(
            RenderError::timeout("loading content", std::time::Duration::from_secs(30)).kind(),
            ErrorKind::RenderTimeout
        );
        assert_eq!(RenderError::engine("crash").kind(), ErrorKind::Render);
    }
}
