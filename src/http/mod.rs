//! HTTP API for external display layers
//!
//! This module provides a small REST API over a running chat session:
//! - GET /session - Current session snapshot
//! - POST /messages - Send a typed message
//! - POST /transcribe - Request transcription of sent audio
//! - POST /stop - Stop speech playback
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
