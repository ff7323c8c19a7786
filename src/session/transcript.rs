use super::state::{MessageId, SessionState};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// What to do with a text delta that arrives after the reply was finalized
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LatePartialPolicy {
    /// Drop it while no new user turn has started
    #[default]
    Ignore,
    /// Treat it as the start of a new assistant message
    OpenNew,
}

/// Merges streamed assistant deltas into the active message
///
/// The active message is tracked explicitly in `SessionState`; the list
/// position of a message never decides where a delta goes.
#[derive(Debug, Clone, Default)]
pub struct TranscriptAggregator {
    late_partial: LatePartialPolicy,
}

impl TranscriptAggregator {
    pub fn new(late_partial: LatePartialPolicy) -> Self {
        Self { late_partial }
    }

    /// Append a delta to the active message, opening one if needed
    ///
    /// Returns `None` when the delta was dropped under `LatePartialPolicy::Ignore`.
    pub fn append(&self, state: &mut SessionState, delta: &str) -> Option<MessageId> {
        if let Some(id) = state.active_stream() {
            if let Some(message) = state.message_mut(id) {
                message.text.push_str(delta);
                return Some(id);
            }
        }

        if state.turn_closed() && self.late_partial == LatePartialPolicy::Ignore {
            debug!("Ignoring text delta after the reply was finalized");
            return None;
        }

        let id = state.push_ai_message(delta.to_string(), false);
        state.set_active_stream(Some(id));
        debug!("Opened assistant message {}", id);
        Some(id)
    }

    /// Replace the active message's text with the authoritative reply and
    /// close it; with no active message the reply becomes a new message
    pub fn finalize(&self, state: &mut SessionState, text: &str) -> MessageId {
        let target = state.active_stream().and_then(|id| {
            state.message_mut(id).map(|message| {
                message.text = text.to_string();
                message.finalized = true;
                id
            })
        });

        let id = match target {
            Some(id) => id,
            None => state.push_ai_message(text.to_string(), true),
        };

        state.set_active_stream(None);
        state.set_turn_closed(true);
        debug!("Finalized assistant message {}", id);
        id
    }

    /// Freeze the active message with whatever it has accumulated
    ///
    /// Used when a turn is abandoned so later deltas cannot land in it.
    pub fn settle(&self, state: &mut SessionState) -> Option<MessageId> {
        let id = state.active_stream()?;
        if let Some(message) = state.message_mut(id) {
            message.finalized = true;
        }
        state.set_active_stream(None);
        debug!("Settled assistant message {}", id);
        Some(id)
    }
}
