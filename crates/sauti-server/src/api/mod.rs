//! API routes and handlers

mod health;
mod models;
mod transcribe;

use axum::extract::DefaultBodyLimit;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Maximum accepted upload size (64 MiB).
const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

/// Create the main API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/models", get(models::list_models))
        .route("/transcribe", post(transcribe::transcribe))
        .route("/transcribe-batch", post(transcribe::transcribe_batch))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
