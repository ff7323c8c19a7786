use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Session state
        .route("/session", get(handlers::get_session))
        // Input
        .route("/messages", post(handlers::submit_message))
        .route("/transcribe", post(handlers::request_transcription))
        .route("/stop", post(handlers::stop_playback))
        // Display layers usually run on another origin
        .layer(CorsLayer::permissive())
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
