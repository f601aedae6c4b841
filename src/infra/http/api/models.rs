use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::application::render::{BrowserStatus, LayoutOverrides};

/// Body of `POST /api/v1/render`.
#[derive(Debug, Deserialize)]
pub struct RenderTemplateRequest {
    pub template: String,
    #[serde(default)]
    pub tokens: BTreeMap<String, String>,
    #[serde(default)]
    pub layout: Option<LayoutOverrides>,
    #[serde(default)]
    pub filename: Option<String>,
    /// Insert token values without HTML escaping.
    #[serde(default)]
    pub raw: bool,
}

/// Body of `POST /api/v1/documents/{kind}`.
#[derive(Debug, Deserialize)]
pub struct RenderDocumentRequest {
    pub record: serde_json::Value,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub layout: Option<LayoutOverrides>,
    #[serde(default)]
    pub persist: bool,
}

#[derive(Debug, Serialize)]
pub struct BrowserHealthResponse {
    pub status: BrowserStatus,
    pub open_pages: usize,
}
