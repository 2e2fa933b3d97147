//! REST API
//!
//! Routes: `POST /v1/evaluate`, `POST /v1/refresh/{source}`, `GET /health`.

mod handlers;
mod types;

pub use types::AppState;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

/// Build the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/v1/evaluate", post(handlers::evaluate))
        .route("/v1/refresh/:source", post(handlers::refresh))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
