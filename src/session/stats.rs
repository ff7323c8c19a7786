use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Statistics about a chat session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    /// When the session started
    pub started_at: DateTime<Utc>,

    /// Time since start in seconds
    pub duration_secs: f64,

    /// Reconnect timers that fired and opened a new transport
    pub reconnect_attempts: u64,

    /// Inbound envelopes that reached a mutator
    pub envelopes_routed: u64,

    /// Inbound envelopes dropped as malformed or unknown
    pub envelopes_dropped: u64,

    /// Audio segments played to completion
    pub segments_played: u64,

    /// Audio segments abandoned after a decode/output failure
    pub segments_failed: u64,

    /// Messages in the history
    pub message_count: usize,
}

impl Default for SessionStats {
    fn default() -> Self {
        Self {
            started_at: Utc::now(),
            duration_secs: 0.0,
            reconnect_attempts: 0,
            envelopes_routed: 0,
            envelopes_dropped: 0,
            segments_played: 0,
            segments_failed: 0,
            message_count: 0,
        }
    }
}
