//! Template composition: token substitution plus print scaffolding.
//!
//! Composition is a pure function of its inputs. Tokens are replaced in a
//! single left-to-right pass, so a substituted value is never scanned again and
//! `{{NAME}}` sequences inside values survive verbatim. Tokens without a value
//! are left in place so missing data shows up in the output instead of
//! disappearing silently.

use std::collections::BTreeMap;

use thiserror::Error;

use super::types::{ErrorKind, LayoutOptions};

/// Print stylesheet injected into templates that carry no styling of their own.
pub const DEFAULT_PRINT_STYLESHEET: &str = r#"@page { margin: 0; }
* { box-sizing: border-box; }
body { font-family: "Helvetica Neue", Arial, sans-serif; font-size: 11pt; line-height: 1.45; color: #1c1c1c; margin: 0; }
h1, h2, h3 { color: #1f3b73; margin: 0 0 0.4em; }
h1 { font-size: 18pt; }
h2 { font-size: 13pt; border-bottom: 1px solid #c9d3e6; padding-bottom: 0.2em; }
.document-header { border-bottom: 3px solid #1f3b73; padding-bottom: 0.6em; margin-bottom: 1.2em; text-align: center; }
.document-header .organisation { font-size: 10pt; letter-spacing: 0.08em; text-transform: uppercase; color: #4a5a7a; }
.section { border: 1px solid #c9d3e6; border-radius: 4px; padding: 0.8em 1em; margin-bottom: 1em; page-break-inside: avoid; }
.field { display: flex; align-items: baseline; margin: 0.45em 0; }
.field-label { flex: 0 0 38%; font-weight: 600; color: #33415c; }
.field-value { flex: 1; }
.field-line { flex: 1; border-bottom: 1px dotted #7d8aa5; min-height: 1.3em; }
table { width: 100%; border-collapse: collapse; margin: 0.5em 0; }
th, td { border: 1px solid #c9d3e6; padding: 0.35em 0.5em; text-align: left; }
th { background: #eef2f9; color: #1f3b73; }
.amount { text-align: right; font-variant-numeric: tabular-nums; }
.signature-block { display: flex; justify-content: space-between; margin-top: 3em; }
.signature-block .field-line { flex: 0 0 40%; text-align: center; padding-top: 2.4em; }
.footer { margin-top: 2em; font-size: 9pt; color: #6b7689; text-align: center; }
"#;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompositionError {
    #[error("template is empty")]
    EmptyTemplate,
    #[error("template has unbalanced <{tag}> markup")]
    Unbalanced { tag: &'static str },
    #[error("template has an unterminated {construct}")]
    Unterminated { construct: &'static str },
}

impl CompositionError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::TemplateComposition
    }
}

/// Placeholder values keyed by token name (without braces).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenMap(BTreeMap<String, String>);

impl TokenMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value that is HTML-escaped before substitution.
    pub fn insert_text(&mut self, name: impl Into<String>, value: impl AsRef<str>) -> &mut Self {
        let escaped = html_escape::encode_safe(value.as_ref()).into_owned();
        self.0.insert(name.into(), escaped);
        self
    }

    /// Insert trusted markup verbatim.
    pub fn insert_raw(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, String)> for TokenMap {
    /// Collects values verbatim, matching [`TokenMap::insert_raw`].
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Everything needed to produce one document. Consumed by composition.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub html_template: String,
    pub tokens: TokenMap,
    pub layout: LayoutOptions,
}

/// A print-ready document and the layout it should be printed with.
#[derive(Debug, Clone)]
pub struct ComposedDocument {
    pub html: String,
    pub layout: LayoutOptions,
}

impl RenderRequest {
    pub fn new(html_template: impl Into<String>, tokens: TokenMap, layout: LayoutOptions) -> Self {
        Self {
            html_template: html_template.into(),
            tokens,
            layout,
        }
    }

    pub fn compose(self) -> Result<ComposedDocument, CompositionError> {
        let html = compose(&self.html_template, &self.tokens)?;
        Ok(ComposedDocument {
            html,
            layout: self.layout,
        })
    }
}

/// Substitute tokens and make sure the result is a complete, styled document.
pub fn compose(raw_template: &str, tokens: &TokenMap) -> Result<String, CompositionError> {
    if raw_template.trim().is_empty() {
        return Err(CompositionError::EmptyTemplate);
    }

    let substituted = substitute(raw_template, tokens);
    let lower = substituted.to_ascii_lowercase();
    check_markup(&lower)?;

    let needs_stylesheet = !has_stylesheet(&lower);
    let is_fragment = ["html", "head", "body"]
        .iter()
        .all(|tag| find_open_tag(&lower, tag, 0).is_none());

    let document = if is_fragment {
        wrap_fragment(strip_doctype(&substituted), needs_stylesheet)
    } else if needs_stylesheet {
        inject_stylesheet(&substituted, &lower)
    } else {
        substituted
    };

    Ok(ensure_doctype(document))
}

fn substitute(template: &str, tokens: &TokenMap) -> String {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        output.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let resolved = after
            .find("}}")
            .and_then(|end| tokens.get(&after[..end]).map(|value| (end, value)));
        match resolved {
            Some((end, value)) => {
                output.push_str(value);
                rest = &after[end + 2..];
            }
            None => {
                output.push_str("{{");
                rest = after;
            }
        }
    }

    output.push_str(rest);
    output
}

fn check_markup(lower: &str) -> Result<(), CompositionError> {
    let head_open = count_open_tags(lower, "head");
    if head_open != count_close_tags(lower, "head") || head_open > 1 {
        return Err(CompositionError::Unbalanced { tag: "head" });
    }
    for tag in ["html", "body"] {
        if count_close_tags(lower, tag) > count_open_tags(lower, tag) {
            return Err(CompositionError::Unbalanced { tag });
        }
    }
    for tag in ["style", "script"] {
        if count_open_tags(lower, tag) > count_close_tags(lower, tag) {
            return Err(CompositionError::Unterminated { construct: tag });
        }
    }

    let mut cursor = 0;
    while let Some(offset) = lower[cursor..].find("<!--") {
        let body = cursor + offset + 4;
        match lower[body..].find("-->") {
            Some(end) => cursor = body + end + 3,
            None => {
                return Err(CompositionError::Unterminated {
                    construct: "comment",
                });
            }
        }
    }
    Ok(())
}

fn has_stylesheet(lower: &str) -> bool {
    if find_open_tag(lower, "style", 0).is_some() {
        return true;
    }

    let mut cursor = 0;
    while let Some(start) = find_open_tag(lower, "link", cursor) {
        let end = lower[start..]
            .find('>')
            .map_or(lower.len(), |offset| start + offset);
        if lower[start..end].contains("stylesheet") {
            return true;
        }
        cursor = end;
    }
    false
}

fn stylesheet_block() -> String {
    format!("<style>\n{DEFAULT_PRINT_STYLESHEET}</style>\n")
}

fn wrap_fragment(content: &str, needs_stylesheet: bool) -> String {
    let style = if needs_stylesheet {
        stylesheet_block()
    } else {
        String::new()
    };
    format!(
        "<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n{style}</head>\n<body>\n{}\n</body>\n</html>\n",
        content.trim()
    )
}

fn inject_stylesheet(document: &str, lower: &str) -> String {
    let style = stylesheet_block();

    if let Some(position) = find_close_tag(lower, "head") {
        return splice(document, position, &style);
    }

    let head = format!("<head>\n<meta charset=\"utf-8\">\n{style}</head>\n");
    if let Some(start) = find_open_tag(lower, "html", 0) {
        let position = lower[start..]
            .find('>')
            .map_or(lower.len(), |offset| start + offset + 1);
        return splice(document, position, &format!("\n{head}"));
    }
    match find_open_tag(lower, "body", 0) {
        Some(position) => splice(document, position, &head),
        None => format!("{head}{document}"),
    }
}

fn ensure_doctype(document: String) -> String {
    if has_doctype(&document) {
        return document;
    }
    let lower = document.to_ascii_lowercase();
    if find_open_tag(&lower, "html", 0).is_some() {
        format!("<!DOCTYPE html>\n{document}")
    } else {
        format!("<!DOCTYPE html>\n<html lang=\"en\">\n{}\n</html>\n", document.trim())
    }
}

fn has_doctype(document: &str) -> bool {
    document
        .trim_start_matches('\u{feff}')
        .trim_start()
        .get(..9)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("<!doctype"))
}

fn strip_doctype(document: &str) -> &str {
    if !has_doctype(document) {
        return document;
    }
    let trimmed = document.trim_start_matches('\u{feff}').trim_start();
    match trimmed.find('>') {
        Some(end) => &trimmed[end + 1..],
        None => trimmed,
    }
}

fn splice(document: &str, position: usize, insert: &str) -> String {
    let mut output = String::with_capacity(document.len() + insert.len());
    output.push_str(&document[..position]);
    output.push_str(insert);
    output.push_str(&document[position..]);
    output
}

fn is_tag_boundary(lower: &str, index: usize) -> bool {
    lower[index..]
        .chars()
        .next()
        .is_none_or(|ch| ch == '>' || ch == '/' || ch.is_ascii_whitespace())
}

fn find_open_tag(lower: &str, tag: &str, from: usize) -> Option<usize> {
    let needle = format!("<{tag}");
    let mut cursor = from;
    while let Some(offset) = lower.get(cursor..)?.find(&needle) {
        let start = cursor + offset;
        if is_tag_boundary(lower, start + needle.len()) {
            return Some(start);
        }
        cursor = start + needle.len();
    }
    None
}

fn find_close_tag(lower: &str, tag: &str) -> Option<usize> {
    let needle = format!("</{tag}");
    let mut cursor = 0;
    while let Some(offset) = lower[cursor..].find(&needle) {
        let start = cursor + offset;
        if is_tag_boundary(lower, start + needle.len()) {
            return Some(start);
        }
        cursor = start + needle.len();
    }
    None
}

fn count_open_tags(lower: &str, tag: &str) -> usize {
    let mut count = 0;
    let mut cursor = 0;
    while let Some(start) = find_open_tag(lower, tag, cursor) {
        count += 1;
        cursor = start + tag.len() + 1;
    }
    count
}

fn count_close_tags(lower: &str, tag: &str) -> usize {
    let needle = format!("</{tag}");
    lower
        .match_indices(&needle)
        .filter(|(start, _)| is_tag_boundary(lower, start + needle.len()))
        .count()
}
