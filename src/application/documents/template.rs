//! Building blocks for templates synthesized from records.
//!
//! Values are embedded already escaped. Braces are encoded as well so record
//! text can never be mistaken for a placeholder during composition.

use super::Branding;

pub(crate) fn embed(value: &str) -> String {
    html_escape::encode_safe(value)
        .replace('{', "&#123;")
        .replace('}', "&#125;")
}

pub(crate) fn document(title: &str, parts: &[String]) -> String {
    let mut html = format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n</head>\n<body>\n",
        embed(title)
    );
    for part in parts {
        html.push_str(part);
        html.push('\n');
    }
    html.push_str("</body>\n</html>\n");
    html
}

pub(crate) fn header(branding: &Branding, heading: &str, subheading: Option<&str>) -> String {
    let subheading = subheading
        .map(|text| format!("<h2>{}</h2>", embed(text)))
        .unwrap_or_default();
    format!(
        "<div class=\"document-header\"><div class=\"organisation\">{}</div><h1>{}</h1>{subheading}</div>",
        embed(&branding.organisation_name),
        embed(heading)
    )
}

pub(crate) fn section(heading: &str, inner: &[String]) -> String {
    format!(
        "<div class=\"section\"><h2>{}</h2>{}</div>",
        embed(heading),
        inner.concat()
    )
}

pub(crate) fn field(label: &str, value: &str) -> String {
    format!(
        "<div class=\"field\"><span class=\"field-label\">{}</span><span class=\"field-value\">{}</span></div>",
        embed(label),
        embed(value)
    )
}

/// Labelled line left empty for handwriting.
pub(crate) fn blank_field(label: &str) -> String {
    format!(
        "<div class=\"field\"><span class=\"field-label\">{}</span><span class=\"field-line\"></span></div>",
        embed(label)
    )
}

/// Trusted admin markup, inserted as is.
pub(crate) fn raw_block(markup: &str) -> String {
    format!("<div class=\"section\">{markup}</div>")
}

pub(crate) fn signature_block(left: &str, right: &str) -> String {
    format!(
        "<div class=\"signature-block\"><span class=\"field-line\">{}</span><span class=\"field-line\">{}</span></div>",
        embed(left),
        embed(right)
    )
}

pub(crate) fn footer(generated_on: &str) -> String {
    format!(
        "<div class=\"footer\">Generated on {}</div>",
        embed(generated_on)
    )
}
