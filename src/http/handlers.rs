use super::state::AppState;
use crate::error::{SendError, SessionError};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SubmitMessageRequest {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct AcceptedResponse {
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct StopResponse {
    pub status: String,
    pub halted: bool,
    pub discarded: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn accepted() -> Response {
    (
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            status: "accepted".to_string(),
        }),
    )
        .into_response()
}

fn session_error(e: SessionError) -> Response {
    let status = match &e {
        SessionError::Send(SendError::NotConnected(_)) => StatusCode::SERVICE_UNAVAILABLE,
        SessionError::Send(SendError::EmptyMessage) => StatusCode::BAD_REQUEST,
        SessionError::Closed => StatusCode::GONE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status.is_server_error() {
        error!("Session request failed: {}", e);
    }

    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
        .into_response()
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /session
/// Current session snapshot
pub async fn get_session(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.session.snapshot()))
}

/// POST /messages
/// Send a typed user message
pub async fn submit_message(
    State(state): State<AppState>,
    Json(req): Json<SubmitMessageRequest>,
) -> Response {
    info!("Submitting message ({} chars)", req.text.len());

    match state.session.submit_text(req.text).await {
        Ok(()) => accepted(),
        Err(e) => session_error(e),
    }
}

/// POST /transcribe
/// Ask the backend to transcribe the audio sent so far
pub async fn request_transcription(State(state): State<AppState>) -> Response {
    match state.session.request_transcription().await {
        Ok(()) => accepted(),
        Err(e) => session_error(e),
    }
}

/// POST /stop
/// Stop speech playback
pub async fn stop_playback(State(state): State<AppState>) -> Response {
    match state.session.stop().await {
        Ok(outcome) => (
            StatusCode::ACCEPTED,
            Json(StopResponse {
                status: "stopped".to_string(),
                halted: outcome.halted,
                discarded: outcome.discarded,
            }),
        )
            .into_response(),
        Err(e) => session_error(e),
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
