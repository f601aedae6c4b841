pub mod error;
pub mod handlers;
pub mod models;
pub mod state;

pub use state::ApiState;

use axum::{
    Router,
    routing::{get, post},
};

pub fn build_api_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/health/browser", get(handlers::browser_health))
        .route("/api/v1/render", post(handlers::render_template))
        .route("/api/v1/documents/{kind}", post(handlers::render_document))
        .route(
            "/api/v1/artifacts/{*path}",
            get(handlers::download_artifact).delete(handlers::delete_artifact),
        )
        .with_state(state)
}
