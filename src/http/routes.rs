use super::handlers;
use super::state::AppState;
use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Live streaming transport
        .route("/stream", get(handlers::stream))
        // Batch transcription
        .route(
            "/recordings/transcribe",
            post(handlers::transcribe_recording),
        )
        .route(
            "/recordings/:recording_id/access",
            get(handlers::recording_access),
        )
        .route(
            "/recordings/:recording_id",
            delete(handlers::delete_recording),
        )
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
