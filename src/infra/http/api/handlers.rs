use std::str::FromStr;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderName, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::de::DeserializeOwned;
use tracing::{info, warn};

use crate::application::documents::{DocumentSource, RenderedDocument};
use crate::application::render::{HTML_FALLBACK_WARNING, RenderResult, TokenMap};
use crate::domain::records::{ElectionRecord, MembershipRecord, PaymentRecord, SeminarRecord};
use crate::domain::types::DocumentKind;
use crate::infra::artifacts::StoredArtifact;

use super::error::ApiError;
use super::models::{BrowserHealthResponse, RenderDocumentRequest, RenderTemplateRequest};
use super::state::ApiState;

pub const RENDER_WARNING_HEADER: &str = "x-render-warning";
pub const ARTIFACT_PATH_HEADER: &str = "x-artifact-path";

pub async fn render_template(
    State(state): State<ApiState>,
    Json(payload): Json<RenderTemplateRequest>,
) -> Result<Response, ApiError> {
    let mut tokens = TokenMap::new();
    for (name, value) in payload.tokens {
        if payload.raw {
            tokens.insert_raw(name, value);
        } else {
            tokens.insert_text(name, value);
        }
    }

    let rendered = state
        .documents
        .render_template(
            &payload.template,
            tokens,
            payload.layout.as_ref(),
            payload.filename.as_deref(),
        )
        .await?;

    download_response(rendered, None)
}

pub async fn render_document(
    State(state): State<ApiState>,
    Path(kind): Path<String>,
    Json(payload): Json<RenderDocumentRequest>,
) -> Result<Response, ApiError> {
    let kind = DocumentKind::from_str(&kind)
        .ok()
        .filter(|kind| *kind != DocumentKind::Custom)
        .ok_or_else(|| ApiError::not_found("Unknown document kind", Some(kind.clone())))?;

    let rendered = match kind {
        DocumentKind::MembershipForm => {
            render_record::<MembershipRecord>(&state, &payload).await?
        }
        DocumentKind::SeminarForm => render_record::<SeminarRecord>(&state, &payload).await?,
        DocumentKind::ElectionForm => render_record::<ElectionRecord>(&state, &payload).await?,
        DocumentKind::PaymentReceipt => render_record::<PaymentRecord>(&state, &payload).await?,
        DocumentKind::Custom => {
            return Err(ApiError::not_found("Unknown document kind", None));
        }
    };

    let artifact = match (payload.persist, &rendered.result) {
        (true, RenderResult::Pdf { bytes, .. } | RenderResult::Html { bytes, .. }) => {
            let extension = rendered.result.extension().unwrap_or("bin");
            Some(
                state
                    .artifacts
                    .store(rendered.kind, extension, bytes.clone())
                    .await?,
            )
        }
        _ => None,
    };

    download_response(rendered, artifact)
}

pub async fn download_artifact(
    State(state): State<ApiState>,
    Path(stored_path): Path<String>,
) -> Result<Response, ApiError> {
    let bytes = state.artifacts.read(&stored_path).await?;
    let filename = stored_path.rsplit('/').next().unwrap_or(&stored_path);
    let content_type = match filename.rsplit_once('.').map(|(_, ext)| ext) {
        Some("pdf") => "application/pdf",
        Some("html") => "text/html; charset=utf-8",
        _ => "application/octet-stream",
    };
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{filename}\""))
        .map_err(|err| ApiError::bad_request("Invalid file name", Some(err.to_string())))?;

    let mut response = (StatusCode::OK, bytes).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(header::CONTENT_DISPOSITION, disposition);
    Ok(response)
}

pub async fn delete_artifact(
    State(state): State<ApiState>,
    Path(stored_path): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.artifacts.delete(&stored_path).await?;
    info!(
        target = "boa_render::infra::http",
        stored_path = %stored_path,
        "artifact deleted"
    );
    Ok(StatusCode::NO_CONTENT)
}

pub async fn health() -> StatusCode {
    StatusCode::NO_CONTENT
}

pub async fn browser_health(State(state): State<ApiState>) -> Json<BrowserHealthResponse> {
    Json(BrowserHealthResponse {
        status: state.browser.status().await,
        open_pages: state.pages.current(),
    })
}

async fn render_record<D>(
    state: &ApiState,
    payload: &RenderDocumentRequest,
) -> Result<RenderedDocument, ApiError>
where
    D: DocumentSource + DeserializeOwned + Sync,
{
    let record: D = serde_json::from_value(payload.record.clone())
        .map_err(|err| ApiError::bad_request("Invalid record", Some(err.to_string())))?;

    Ok(state
        .documents
        .render(&record, payload.template.as_deref(), payload.layout.as_ref())
        .await?)
}

fn download_response(
    rendered: RenderedDocument,
    artifact: Option<StoredArtifact>,
) -> Result<Response, ApiError> {
    let RenderedDocument {
        kind,
        filename,
        result,
    } = rendered;

    let (bytes, content_type, warning) = match result {
        RenderResult::Pdf { bytes, source } => {
            info!(
                target = "boa_render::infra::http",
                document = kind.as_str(),
                source = source.as_str(),
                size_bytes = bytes.len(),
                "document rendered"
            );
            (bytes, "application/pdf", None)
        }
        RenderResult::Html { bytes, reason } => {
            warn!(
                target = "boa_render::infra::http",
                document = kind.as_str(),
                reason = %reason,
                "document delivered as html"
            );
            (bytes, "text/html; charset=utf-8", Some(HTML_FALLBACK_WARNING))
        }
        RenderResult::Error { cause } => return Err(ApiError::render_failed(cause)),
    };

    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{filename}\""))
        .map_err(|err| ApiError::bad_request("Invalid file name", Some(err.to_string())))?;

    let mut response = (StatusCode::OK, bytes).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(header::CONTENT_DISPOSITION, disposition);
    if let Some(warning) = warning {
        headers.insert(
            HeaderName::from_static(RENDER_WARNING_HEADER),
            HeaderValue::from_static(warning),
        );
    }
    if let Some(artifact) = artifact
        && let Ok(value) = HeaderValue::from_str(&artifact.stored_path)
    {
        headers.insert(HeaderName::from_static(ARTIFACT_PATH_HEADER), value);
    }

    Ok(response)
}
