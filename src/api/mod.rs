mod handlers;
mod types;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use crate::SharedState;

pub use types::{ErrorResponse, HealthResponse, MemeResponse};

/// Uploads above this size are rejected before the handler runs.
const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/health", get(handlers::health))
        .route("/ping", get(handlers::ping))
        .route("/api/generate-memes", post(handlers::generate_memes))
        .nest_service("/static", ServeDir::new(&state.config.upload_dir))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
