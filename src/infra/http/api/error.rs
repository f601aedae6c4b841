use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::application::documents::DocumentError;
use crate::application::error::ErrorReport;
use crate::application::render::ErrorKind;
use crate::infra::artifacts::ArtifactStoreError;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorMessage,
}

pub mod codes {
    pub const BAD_REQUEST: &str = "bad_request";
    pub const NOT_FOUND: &str = "not_found";
    pub const INVALID_RECORD: &str = "invalid_record";
    pub const INVALID_LAYOUT: &str = "invalid_layout";
    pub const TEMPLATE: &str = "template_error";
    pub const RENDER: &str = "render_error";
    pub const ARTIFACT: &str = "artifact_error";
}

#[derive(Debug, Serialize)]
pub struct ApiErrorMessage {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: &'static str,
    hint: Option<String>,
}

impl ApiError {
    pub fn new(
        status: StatusCode,
        code: &'static str,
        message: &'static str,
        hint: Option<String>,
    ) -> Self {
        Self {
            status,
            code,
            message,
            hint,
        }
    }

    pub fn bad_request(message: &'static str, hint: Option<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, codes::BAD_REQUEST, message, hint)
    }

    pub fn not_found(message: &'static str, hint: Option<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, codes::NOT_FOUND, message, hint)
    }

    pub fn render_failed(cause: ErrorKind) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::RENDER,
            "Document could not be produced",
            Some(cause.as_str().to_string()),
        )
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<DocumentError> for ApiError {
    fn from(err: DocumentError) -> Self {
        match err {
            DocumentError::Record(err) => Self::new(
                StatusCode::BAD_REQUEST,
                codes::INVALID_RECORD,
                "Invalid record",
                Some(err.to_string()),
            ),
            DocumentError::Layout(err) => Self::new(
                StatusCode::BAD_REQUEST,
                codes::INVALID_LAYOUT,
                "Invalid layout",
                Some(err.to_string()),
            ),
            DocumentError::Composition(err) => Self::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                codes::TEMPLATE,
                "Template could not be composed",
                Some(err.to_string()),
            ),
        }
    }
}

impl From<ArtifactStoreError> for ApiError {
    fn from(err: ArtifactStoreError) -> Self {
        match err {
            ArtifactStoreError::InvalidPath => {
                Self::bad_request("Invalid artifact path", Some(err.to_string()))
            }
            ArtifactStoreError::Io(io) if io.kind() == std::io::ErrorKind::NotFound => {
                Self::not_found("Artifact not found", None)
            }
            other => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::ARTIFACT,
                "Artifact storage failed",
                Some(other.to_string()),
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let hint = self.hint.clone();
        let body = ApiErrorBody {
            error: ApiErrorMessage {
                code: self.code.to_string(),
                message: self.message.to_string(),
                hint: self.hint,
            },
        };
        let mut response = (self.status, Json(body)).into_response();
        ErrorReport::from_message(
            "infra::http::api",
            self.status,
            format!("{}: {}", self.code, hint.as_deref().unwrap_or(self.message)),
        )
        .attach(&mut response);
        response
    }
}
