//! Chat session management
//!
//! This module provides the `ChatSession` event loop that manages:
//! - The connection lifecycle and reconnects
//! - Routing of inbound envelopes into the message history
//! - Merging streamed reply deltas into messages
//! - Barge-in between recording/typing and queued speech playback
//! - Publishing `SessionSnapshot`s for display layers

mod config;
mod router;
mod session;
mod state;
mod stats;
mod transcript;

pub use config::SessionConfig;
pub use router::{MessageRouter, RouteOutcome};
pub use session::{ChatSession, SessionHandle};
pub use state::{ActivityStatus, Message, MessageId, SessionSnapshot, SessionState};
pub use stats::SessionStats;
pub use transcript::{LatePartialPolicy, TranscriptAggregator};
