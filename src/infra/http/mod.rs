//! HTTP surface: turns render results into downloads.

pub mod api;
mod middleware;

pub use api::{ApiState, build_api_router};
pub use middleware::REQUEST_ID_HEADER;

use axum::{Router, extract::DefaultBodyLimit, middleware as axum_middleware};

use middleware::{log_responses, set_request_context};

/// Full application router with body limit, request ids and response logging.
pub fn build_router(state: ApiState, max_request_bytes: usize) -> Router {
    build_api_router(state)
        .layer(DefaultBodyLimit::max(max_request_bytes))
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}
