//! Error taxonomy for the chat session core
//!
//! None of these are fatal to a session:
//! - `ConnectionError` feeds the reconnect loop and only shows up as the
//!   connectivity flag
//! - `SendError` is returned synchronously to whoever tried to send
//! - `ParseError` drops one inbound envelope
//! - `PlaybackError` abandons one queued audio segment
//! - `CaptureError` keeps a recording from starting

use crate::connection::ConnectionState;
use thiserror::Error;

/// Transport closed or unreachable
#[derive(Debug, Clone, Error)]
pub enum ConnectionError {
    /// The endpoint could not be reached or the handshake failed
    #[error("Connection failed: {0}")]
    Unreachable(String),

    /// The transport was closed by the peer or broke mid-stream
    #[error("Connection closed: {0}")]
    Closed(String),

    /// The configured endpoint is not a usable WebSocket URL
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

/// A frame could not be handed to the transport
#[derive(Debug, Clone, Error)]
pub enum SendError {
    #[error("Not connected (connection is {0})")]
    NotConnected(ConnectionState),

    /// The transport task is gone even though the manager still saw it open
    #[error("Transport is no longer accepting frames")]
    TransportGone,

    #[error("Failed to encode control frame: {0}")]
    Encode(String),

    #[error("Message is empty")]
    EmptyMessage,
}

/// Malformed inbound envelope
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Envelope has no \"type\" field")]
    MissingType,

    #[error("Invalid base64 audio payload: {0}")]
    Audio(#[from] base64::DecodeError),
}

/// One audio segment could not be played
#[derive(Debug, Clone, Error)]
pub enum PlaybackError {
    #[error("Failed to decode audio segment: {0}")]
    Decode(String),

    #[error("Audio output failed: {0}")]
    Output(String),
}

/// The audio input could not be opened
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Audio input unavailable: {0}")]
    Unavailable(String),

    #[error("Audio input I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors returned from `SessionHandle` calls
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Send(#[from] SendError),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    /// The session event loop has shut down
    #[error("Session has shut down")]
    Closed,
}

impl SessionError {
    /// True when the failure was a send attempted while disconnected
    pub fn is_not_connected(&self) -> bool {
        matches!(self, SessionError::Send(SendError::NotConnected(_)))
    }
}
