use super::state::SessionState;
use super::transcript::TranscriptAggregator;
use crate::audio::AudioPlaybackQueue;
use crate::protocol::{decode_audio_payload, Envelope};
use tracing::{debug, warn};

/// Result of routing one inbound envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// A mutator ran
    Applied,
    /// Well-formed but intentionally discarded (stray delta)
    Ignored,
    /// Malformed or unknown; dropped
    Dropped,
    /// The backend reported an error for the current turn
    BackendError(String),
}

impl RouteOutcome {
    pub fn is_dropped(&self) -> bool {
        matches!(self, RouteOutcome::Dropped)
    }
}

/// Dispatches inbound envelopes to the state mutators
#[derive(Debug, Clone, Default)]
pub struct MessageRouter {
    aggregator: TranscriptAggregator,
}

impl MessageRouter {
    pub fn new(aggregator: TranscriptAggregator) -> Self {
        Self { aggregator }
    }

    pub fn aggregator(&self) -> &TranscriptAggregator {
        &self.aggregator
    }

    /// Parse and route one raw text frame
    pub fn route_frame(
        &self,
        raw: &str,
        state: &mut SessionState,
        playback: &mut AudioPlaybackQueue,
    ) -> RouteOutcome {
        match Envelope::parse(raw) {
            Ok(envelope) => self.route(envelope, state, playback),
            Err(e) => {
                warn!("Dropping malformed envelope: {}", e);
                RouteOutcome::Dropped
            }
        }
    }

    pub fn route(
        &self,
        envelope: Envelope,
        state: &mut SessionState,
        playback: &mut AudioPlaybackQueue,
    ) -> RouteOutcome {
        debug!("Routing {} envelope", envelope.kind());

        match envelope {
            Envelope::TranscriptPartial { text } => {
                state.set_live_transcript(text);
                RouteOutcome::Applied
            }

            Envelope::Transcript { text } => {
                // A new user turn: nothing may keep streaming into the old reply
                self.aggregator.settle(state);
                state.push_user_message(text);
                state.clear_live_transcript();
                state.set_last_error(None);
                state.set_typing(true);
                RouteOutcome::Applied
            }

            Envelope::ResponseTextPartial { text } => {
                state.set_typing(false);
                match self.aggregator.append(state, &text) {
                    Some(_) => RouteOutcome::Applied,
                    None => RouteOutcome::Ignored,
                }
            }

            Envelope::ResponseText { text } => {
                self.aggregator.finalize(state, &text);
                state.set_typing(false);
                RouteOutcome::Applied
            }

            Envelope::ResponseAudio {
                data,
                index,
                final_segment,
            } => match decode_audio_payload(&data) {
                Ok(payload) => {
                    playback.enqueue(payload, index, final_segment.unwrap_or(false));
                    RouteOutcome::Applied
                }
                Err(e) => {
                    warn!("Dropping audio segment {:?}: {}", index, e);
                    RouteOutcome::Dropped
                }
            },

            Envelope::Error { message } => {
                warn!("Backend error: {}", message);
                state.set_typing(false);
                self.aggregator.settle(state);
                state.set_last_error(Some(message.clone()));
                RouteOutcome::BackendError(message)
            }

            Envelope::Unknown { kind } => {
                warn!("Dropping envelope with unknown type '{}'", kind);
                RouteOutcome::Dropped
            }
        }
    }
}
