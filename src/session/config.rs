use super::transcript::LatePartialPolicy;
use crate::connection::DEFAULT_RECONNECT_DELAY;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a chat session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Client identifier appended to the endpoint (e.g., "session-3f2a...")
    pub client_id: String,

    /// Delay before each reconnect attempt
    /// Default: 3 seconds, no backoff
    pub reconnect_delay: Duration,

    /// Assistant greeting seeded into an empty history
    pub greeting: Option<String>,

    /// Handling of text deltas that arrive after a reply was finalized
    pub late_partial: LatePartialPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            client_id: format!("session-{}", uuid::Uuid::new_v4()),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            greeting: None,
            late_partial: LatePartialPolicy::default(),
        }
    }
}
