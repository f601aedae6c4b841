//! Secondary tier: a text-only PDF built without a browser.
//!
//! Layout fidelity is lost on purpose. The generator keeps the visible text of
//! the composed document, one paragraph per block element, and sets it in the
//! built-in Helvetica face on the requested paper size and margins.

use std::{cell::RefCell, rc::Rc};

use bytes::Bytes;
use lol_html::{RewriteStrSettings, element, html_content::ContentType, rewrite_str, text};
use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfLayerReference};

use super::types::{LayoutOptions, RenderError};

const MM_PER_INCH: f32 = 25.4;
const MM_PER_PT: f32 = MM_PER_INCH / 72.0;
/// Average Helvetica advance width as a fraction of the font size.
const HELVETICA_AVG_ADVANCE: f32 = 0.5;
const LINE_SPACING: f32 = 1.4;
const TITLE_SIZE: f32 = 16.0;

const INVISIBLE: &str = "head, style, script, noscript, template";
const BLOCKS: &str = "address, article, aside, blockquote, dd, div, dl, dt, fieldset, figcaption, figure, footer, form, h1, h2, h3, h4, h5, h6, header, hr, main, nav, ol, p, pre, section, table, tr, ul";

/// Produces a PDF without a browser.
pub trait FallbackPdfGenerator: Send + Sync {
    fn generate(&self, html: &str, layout: &LayoutOptions) -> Result<Bytes, RenderError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedText {
    pub title: Option<String>,
    /// Paragraphs separated by `\n`; blank lines mark section breaks.
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct TextPdfGenerator {
    font_size: f32,
}

impl Default for TextPdfGenerator {
    fn default() -> Self {
        Self { font_size: 11.0 }
    }
}

impl FallbackPdfGenerator for TextPdfGenerator {
    fn generate(&self, html: &str, layout: &LayoutOptions) -> Result<Bytes, RenderError> {
        let extracted = extract_text(html)?;
        if extracted.body.trim().is_empty() {
            return Err(RenderError::text_pdf("document has no printable text"));
        }

        let margins = layout.margin_inches()?;
        let (width_in, height_in) = layout.paper_size_in();
        let page = PageGeometry {
            width: width_in as f32 * MM_PER_INCH,
            height: height_in as f32 * MM_PER_INCH,
            left: margins.left as f32 * MM_PER_INCH,
            right: margins.right as f32 * MM_PER_INCH,
            top: margins.top as f32 * MM_PER_INCH,
            bottom: margins.bottom as f32 * MM_PER_INCH,
        };

        let title = extracted.title.as_deref().unwrap_or("Document");
        self.write_pdf(title, extracted.title.is_some(), &extracted.body, &page)
    }
}

struct PageGeometry {
    width: f32,
    height: f32,
    left: f32,
    right: f32,
    top: f32,
    bottom: f32,
}

impl PageGeometry {
    fn usable_width(&self) -> f32 {
        (self.width - self.left - self.right).max(10.0)
    }
}

impl TextPdfGenerator {
    fn write_pdf(
        &self,
        title: &str,
        print_title: bool,
        body: &str,
        page: &PageGeometry,
    ) -> Result<Bytes, RenderError> {
        let pdf_error = |err: printpdf::Error| RenderError::text_pdf(err.to_string());

        let (doc, first_page, first_layer) =
            PdfDocument::new(to_latin1(title), Mm(page.width), Mm(page.height), "Layer 1");
        let regular = doc.add_builtin_font(BuiltinFont::Helvetica).map_err(pdf_error)?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(pdf_error)?;

        let line_height = self.font_size * LINE_SPACING * MM_PER_PT;
        let max_chars =
            (page.usable_width() / (self.font_size * HELVETICA_AVG_ADVANCE * MM_PER_PT)) as usize;
        let lines = wrap_lines(body, max_chars.max(10));

        let mut layer = doc.get_page(first_page).get_layer(first_layer);
        let mut cursor = page.height - page.top - line_height;

        if print_title {
            let title_line = self.truncate_title(title, page);
            layer.use_text(title_line, TITLE_SIZE, Mm(page.left), Mm(cursor), &bold);
            cursor -= TITLE_SIZE * LINE_SPACING * MM_PER_PT + line_height * 0.5;
        }

        for line in &lines {
            if cursor < page.bottom {
                let (next_page, next_layer) =
                    doc.add_page(Mm(page.width), Mm(page.height), "Layer 1");
                layer = doc.get_page(next_page).get_layer(next_layer);
                cursor = page.height - page.top - line_height;
            }
            if !line.is_empty() {
                write_line(&layer, line, self.font_size, page.left, cursor, &regular);
            }
            cursor -= line_height;
        }

        doc.save_to_bytes().map(Bytes::from).map_err(pdf_error)
    }

    fn truncate_title(&self, title: &str, page: &PageGeometry) -> String {
        let max = (page.usable_width() / (TITLE_SIZE * HELVETICA_AVG_ADVANCE * MM_PER_PT)) as usize;
        let latin = to_latin1(title);
        if latin.chars().count() <= max {
            return latin;
        }
        let mut shortened: String = latin.chars().take(max.saturating_sub(3)).collect();
        shortened.push_str("...");
        shortened
    }
}

fn write_line(
    layer: &PdfLayerReference,
    line: &str,
    size: f32,
    x: f32,
    y: f32,
    font: &IndirectFontRef,
) {
    layer.use_text(to_latin1(line), size, Mm(x), Mm(y), font);
}

/// Pull the visible text and title out of an HTML document.
pub fn extract_text(html: &str) -> Result<ExtractedText, RenderError> {
    let title = extract_title(html)?;

    let marked = rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![
                element!(INVISIBLE, |el| {
                    el.remove();
                    Ok(())
                }),
                element!(BLOCKS, |el| {
                    el.before("\n", ContentType::Text);
                    el.after("\n", ContentType::Text);
                    Ok(())
                }),
                element!("br", |el| {
                    el.after("\n", ContentType::Text);
                    Ok(())
                }),
                element!("li", |el| {
                    el.before("\n- ", ContentType::Text);
                    Ok(())
                }),
                element!("td, th", |el| {
                    el.before("  ", ContentType::Text);
                    Ok(())
                }),
            ],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|err| RenderError::text_pdf(err.to_string()))?;

    let stripped = rewrite_str(
        &marked,
        RewriteStrSettings {
            element_content_handlers: vec![element!("*", |el| {
                el.remove_and_keep_content();
                Ok(())
            })],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|err| RenderError::text_pdf(err.to_string()))?;

    let decoded = html_escape::decode_html_entities(strip_markup_leftovers(&stripped).as_str())
        .into_owned();

    Ok(ExtractedText {
        title,
        body: normalize_whitespace(&decoded),
    })
}

fn extract_title(html: &str) -> Result<Option<String>, RenderError> {
    let title = Rc::new(RefCell::new(String::new()));
    let heading = Rc::new(RefCell::new(String::new()));
    let headings_seen = Rc::new(RefCell::new(0usize));

    rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![
                text!("title", {
                    let title = Rc::clone(&title);
                    move |chunk| {
                        title.borrow_mut().push_str(chunk.as_str());
                        Ok(())
                    }
                }),
                element!("h1", {
                    let headings_seen = Rc::clone(&headings_seen);
                    move |_el| {
                        *headings_seen.borrow_mut() += 1;
                        Ok(())
                    }
                }),
                text!("h1", {
                    let heading = Rc::clone(&heading);
                    let headings_seen = Rc::clone(&headings_seen);
                    move |chunk| {
                        if *headings_seen.borrow() == 1 {
                            heading.borrow_mut().push_str(chunk.as_str());
                        }
                        Ok(())
                    }
                }),
            ],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|err| RenderError::text_pdf(err.to_string()))?;

    let pick = |raw: &str| {
        let decoded = html_escape::decode_html_entities(raw);
        let collapsed = decoded.split_whitespace().collect::<Vec<_>>().join(" ");
        (!collapsed.is_empty()).then_some(collapsed)
    };

    let title = title.borrow();
    let heading = heading.borrow();
    Ok(pick(&title).or_else(|| pick(&heading)))
}

/// Doctype and comments survive the tag-stripping pass.
fn strip_markup_leftovers(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("<!") {
        output.push_str(&rest[..start]);
        let after = &rest[start..];
        let end = if after.starts_with("<!--") {
            after.find("-->").map(|end| end + 3)
        } else {
            after.find('>').map(|end| end + 1)
        };
        match end {
            Some(end) => rest = &after[end..],
            None => {
                rest = "";
            }
        }
    }
    output.push_str(rest);
    output
}

/// Collapse runs of whitespace inside lines and keep at most one blank line.
fn normalize_whitespace(text: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    for raw in text.lines() {
        let line = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        let previous_blank = lines.last().is_none_or(|last| last.is_empty());
        if line.is_empty() && previous_blank {
            continue;
        }
        lines.push(line);
    }
    while lines.last().is_some_and(|last| last.is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}

/// Greedy word wrap; words longer than a line are split.
fn wrap_lines(body: &str, max_chars: usize) -> Vec<String> {
    let mut wrapped = Vec::new();
    for paragraph in body.lines() {
        if paragraph.is_empty() {
            wrapped.push(String::new());
            continue;
        }

        let mut current = String::new();
        let mut current_len = 0usize;
        for word in paragraph.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();
            while word.len() > max_chars {
                if current_len > 0 {
                    wrapped.push(std::mem::take(&mut current));
                    current_len = 0;
                }
                let rest = word.split_off(max_chars);
                wrapped.push(word.into_iter().collect());
                word = rest;
            }

            let extra = if current_len == 0 { word.len() } else { word.len() + 1 };
            if current_len + extra > max_chars && current_len > 0 {
                wrapped.push(std::mem::take(&mut current));
                current_len = 0;
            }
            if current_len > 0 {
                current.push(' ');
                current_len += 1;
            }
            current.extend(word.iter());
            current_len += word.len();
        }
        if current_len > 0 {
            wrapped.push(current);
        }
    }
    wrapped
}

/// Map text onto the Latin-1 repertoire of the built-in fonts.
fn to_latin1(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\u{2018}' | '\u{2019}' | '\u{201a}' | '\u{2032}' => output.push('\''),
            '\u{201c}' | '\u{201d}' | '\u{201e}' | '\u{2033}' => output.push('"'),
            '\u{2013}' | '\u{2014}' | '\u{2212}' => output.push('-'),
            '\u{2026}' => output.push_str("..."),
            '\u{2022}' => output.push('-'),
            '\u{20b9}' => output.push_str("Rs."),
            '\u{a0}' => output.push(' '),
            ch if ch.is_control() => {}
            ch if u32::from(ch) <= 0xff => output.push(ch),
            _ => output.push('?'),
        }
    }
    output
}
