use super::stats::SessionStats;
use crate::connection::ConnectionState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Ordered message identifier, unique within a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(u64);

impl MessageId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One entry in the chat history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub text: String,
    pub is_user: bool,
    /// Content is authoritative and will not change again
    pub finalized: bool,
    pub created_at: DateTime<Utc>,
}

/// Coarse activity indicator for the display layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
    /// Not connected to the backend
    Connecting,
    /// Waiting for the assistant's first content
    Processing,
    /// The user is recording
    Listening,
    Online,
}

impl fmt::Display for ActivityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActivityStatus::Connecting => write!(f, "Connecting..."),
            ActivityStatus::Processing => write!(f, "Processing..."),
            ActivityStatus::Listening => write!(f, "Listening..."),
            ActivityStatus::Online => write!(f, "Online"),
        }
    }
}

/// Observable state of a chat session
///
/// Mutated only by the router, the transcript aggregator, and the session
/// event loop; everyone else reads `SessionSnapshot`s.
#[derive(Debug, Default)]
pub struct SessionState {
    connected: bool,
    typing: bool,
    listening: bool,
    /// Shared with published snapshots; only a changed message is copied
    messages: Vec<Arc<Message>>,
    live_transcript: String,

    /// The AI message currently receiving deltas
    active_stream: Option<MessageId>,
    /// A reply was finalized and no user message has arrived since
    turn_closed: bool,
    last_error: Option<String>,
    next_id: u64,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connected(&self) -> bool {
        self.connected
    }

    pub fn typing(&self) -> bool {
        self.typing
    }

    pub fn listening(&self) -> bool {
        self.listening
    }

    pub fn messages(&self) -> &[Arc<Message>] {
        &self.messages
    }

    pub fn live_transcript(&self) -> &str {
        &self.live_transcript
    }

    pub fn active_stream(&self) -> Option<MessageId> {
        self.active_stream
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last().map(Arc::as_ref)
    }

    pub fn message(&self, id: MessageId) -> Option<&Message> {
        self.messages
            .binary_search_by_key(&id, |m| m.id)
            .ok()
            .map(|i| self.messages[i].as_ref())
    }

    pub fn status(&self) -> ActivityStatus {
        if !self.connected {
            ActivityStatus::Connecting
        } else if self.typing {
            ActivityStatus::Processing
        } else if self.listening {
            ActivityStatus::Listening
        } else {
            ActivityStatus::Online
        }
    }

    pub(crate) fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    pub(crate) fn set_typing(&mut self, typing: bool) {
        self.typing = typing;
    }

    pub(crate) fn set_listening(&mut self, listening: bool) {
        self.listening = listening;
    }

    pub(crate) fn set_live_transcript(&mut self, text: String) {
        self.live_transcript = text;
    }

    pub(crate) fn clear_live_transcript(&mut self) {
        self.live_transcript.clear();
    }

    pub(crate) fn set_last_error(&mut self, error: Option<String>) {
        self.last_error = error;
    }

    pub(crate) fn set_active_stream(&mut self, id: Option<MessageId>) {
        self.active_stream = id;
    }

    pub(crate) fn turn_closed(&self) -> bool {
        self.turn_closed
    }

    pub(crate) fn set_turn_closed(&mut self, closed: bool) {
        self.turn_closed = closed;
    }

    pub(crate) fn message_mut(&mut self, id: MessageId) -> Option<&mut Message> {
        // The target is nearly always the newest message
        let index = if self.messages.last().is_some_and(|m| m.id == id) {
            self.messages.len() - 1
        } else {
            self.messages.binary_search_by_key(&id, |m| m.id).ok()?
        };
        Some(Arc::make_mut(&mut self.messages[index]))
    }

    /// Append a finalized user message; a new user turn opens
    pub(crate) fn push_user_message(&mut self, text: String) -> MessageId {
        self.turn_closed = false;
        self.push(text, true, true)
    }

    pub(crate) fn push_ai_message(&mut self, text: String, finalized: bool) -> MessageId {
        self.push(text, false, finalized)
    }

    fn push(&mut self, text: String, is_user: bool, finalized: bool) -> MessageId {
        self.next_id += 1;
        let id = MessageId(self.next_id);
        self.messages.push(Arc::new(Message {
            id,
            text,
            is_user,
            finalized,
            created_at: Utc::now(),
        }));
        id
    }

    pub fn snapshot(&self, connection: ConnectionState, stats: SessionStats) -> SessionSnapshot {
        SessionSnapshot {
            connected: self.connected,
            typing: self.typing,
            listening: self.listening,
            status: self.status(),
            connection,
            messages: self.messages.clone(),
            live_transcript: self.live_transcript.clone(),
            last_error: self.last_error.clone(),
            stats,
        }
    }
}

/// Read-only copy of the session state published to the display layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub connected: bool,
    pub typing: bool,
    pub listening: bool,
    pub status: ActivityStatus,
    pub connection: ConnectionState,
    pub messages: Vec<Arc<Message>>,
    pub live_transcript: String,
    /// Last error reported by the backend in the current turn
    pub last_error: Option<String>,
    pub stats: SessionStats,
}

impl SessionSnapshot {
    /// Most recent assistant message, if any
    pub fn last_reply(&self) -> Option<&Message> {
        self.messages
            .iter()
            .rev()
            .find(|m| !m.is_user)
            .map(Arc::as_ref)
    }
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        SessionState::default().snapshot(ConnectionState::Idle, SessionStats::default())
    }
}
