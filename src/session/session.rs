use super::config::SessionConfig;
use super::router::{MessageRouter, RouteOutcome};
use super::state::{SessionSnapshot, SessionState};
use super::stats::SessionStats;
use super::transcript::TranscriptAggregator;
use crate::audio::{AudioPlaybackQueue, PlaybackEvent, Player, StopOutcome};
use crate::connection::{
    ConnectionEvent, ConnectionManager, ConnectionState, ConnectionUpdate, Transport,
};
use crate::error::{SendError, SessionError};
use crate::protocol::OutboundFrame;
use bytes::Bytes;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

enum Command {
    Connect,
    SubmitText {
        text: String,
        reply: oneshot::Sender<Result<(), SendError>>,
    },
    SendAudio {
        chunk: Bytes,
        reply: oneshot::Sender<Result<(), SendError>>,
    },
    RequestTranscription {
        reply: oneshot::Sender<Result<(), SendError>>,
    },
    Stop {
        reply: oneshot::Sender<StopOutcome>,
    },
    RecordingStarted {
        reply: oneshot::Sender<StopOutcome>,
    },
    RecordingStopped {
        reply: oneshot::Sender<Result<(), SendError>>,
    },
    RecordingAborted {
        reply: oneshot::Sender<()>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// A realtime chat session: one transport, one history, one playback queue
///
/// All state lives in this struct and is only touched from `run`, which
/// processes handle commands, transport events and playback completions one
/// at a time.
pub struct ChatSession {
    config: SessionConfig,
    connection: ConnectionManager,
    router: MessageRouter,
    playback: AudioPlaybackQueue,
    state: SessionState,

    started_at: chrono::DateTime<Utc>,
    envelopes_routed: u64,
    envelopes_dropped: u64,

    commands: mpsc::UnboundedReceiver<Command>,
    connection_events: mpsc::UnboundedReceiver<ConnectionEvent>,
    playback_events: mpsc::UnboundedReceiver<PlaybackEvent>,
    snapshots: watch::Sender<SessionSnapshot>,
}

impl ChatSession {
    /// Create a session and the handle that controls it
    ///
    /// Nothing connects until `run` starts.
    pub fn new(
        config: SessionConfig,
        transport: Arc<dyn Transport>,
        player: Box<dyn Player>,
    ) -> (Self, SessionHandle) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (connection_tx, connection_rx) = mpsc::unbounded_channel();
        let (playback_tx, playback_rx) = mpsc::unbounded_channel();

        let connection = ConnectionManager::new(transport, config.reconnect_delay, connection_tx);
        let playback = AudioPlaybackQueue::new(player, playback_tx);
        let router = MessageRouter::new(TranscriptAggregator::new(config.late_partial));

        let mut state = SessionState::new();
        if let Some(greeting) = &config.greeting {
            state.push_ai_message(greeting.clone(), true);
        }

        let started_at = Utc::now();
        let initial = state.snapshot(
            ConnectionState::Idle,
            SessionStats {
                started_at,
                message_count: state.messages().len(),
                ..SessionStats::default()
            },
        );
        let (snapshot_tx, snapshot_rx) = watch::channel(initial);

        let session = Self {
            config,
            connection,
            router,
            playback,
            state,
            started_at,
            envelopes_routed: 0,
            envelopes_dropped: 0,
            commands: command_rx,
            connection_events: connection_rx,
            playback_events: playback_rx,
            snapshots: snapshot_tx,
        };

        let handle = SessionHandle {
            commands: command_tx,
            snapshots: snapshot_rx,
        };

        (session, handle)
    }

    /// Create a session and run it on a new task
    pub fn spawn(
        config: SessionConfig,
        transport: Arc<dyn Transport>,
        player: Box<dyn Player>,
    ) -> (SessionHandle, JoinHandle<()>) {
        let (session, handle) = Self::new(config, transport, player);
        let task = tokio::spawn(session.run());
        (handle, task)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Run the event loop until shutdown or until every handle is dropped
    pub async fn run(mut self) {
        info!("Chat session {} started", self.config.client_id);

        self.connection.connect();
        self.publish();

        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    let Some(command) = command else {
                        info!("All session handles dropped");
                        break;
                    };
                    if let Command::Shutdown { reply } = command {
                        self.teardown();
                        let _ = reply.send(());
                        return;
                    }
                    self.handle_command(command);
                }

                Some(event) = self.connection_events.recv() => {
                    self.handle_connection_event(event);
                    self.publish();
                }

                Some(event) = self.playback_events.recv() => {
                    self.playback.on_playback_event(event);
                    self.publish();
                }
            }
        }

        self.teardown();
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect => {
                self.connection.connect();
                self.publish();
            }

            Command::SubmitText { text, reply } => {
                let result = self.submit_text(text);
                self.publish();
                let _ = reply.send(result);
            }

            Command::SendAudio { chunk, reply } => {
                let result = self.connection.send(OutboundFrame::Audio(chunk));
                let _ = reply.send(result);
            }

            Command::RequestTranscription { reply } => {
                let result = self.connection.send(OutboundFrame::transcribe_request());
                let _ = reply.send(result);
            }

            Command::Stop { reply } => {
                let outcome = self.stop_playback();
                self.publish();
                let _ = reply.send(outcome);
            }

            Command::RecordingStarted { reply } => {
                // Barge-in: human speech preempts machine speech
                let outcome = self.stop_playback();
                self.state.clear_live_transcript();
                self.state.set_listening(true);
                self.publish();
                let _ = reply.send(outcome);
            }

            Command::RecordingStopped { reply } => {
                self.state.set_listening(false);
                let result = self.connection.send(OutboundFrame::transcribe_request());
                self.publish();
                let _ = reply.send(result);
            }

            Command::RecordingAborted { reply } => {
                self.state.set_listening(false);
                self.publish();
                let _ = reply.send(());
            }

            // Handled by the loop
            Command::Shutdown { reply } => {
                let _ = reply.send(());
            }
        }
    }

    fn submit_text(&mut self, text: String) -> Result<(), SendError> {
        if text.trim().is_empty() {
            return Err(SendError::EmptyMessage);
        }

        self.stop_playback();

        match self.connection.send(OutboundFrame::text_input(text)) {
            Ok(()) => {
                self.state.set_typing(true);
                Ok(())
            }
            Err(e) => {
                warn!("Message not sent: {}", e);
                if matches!(e, SendError::NotConnected(_)) {
                    self.connection.connect();
                }
                Err(e)
            }
        }
    }

    /// Halt local playback and ask the backend to stop producing audio
    fn stop_playback(&mut self) -> StopOutcome {
        let outcome = self.playback.stop();
        if let Err(e) = self.connection.send(OutboundFrame::stop()) {
            debug!("Stop signal not sent: {}", e);
        }
        outcome
    }

    fn handle_connection_event(&mut self, event: ConnectionEvent) {
        match self.connection.handle_event(event) {
            ConnectionUpdate::Frame(text) => {
                let outcome = self
                    .router
                    .route_frame(&text, &mut self.state, &mut self.playback);
                if outcome.is_dropped() {
                    self.envelopes_dropped += 1;
                } else {
                    self.envelopes_routed += 1;
                }
                if let RouteOutcome::BackendError(message) = outcome {
                    debug!("Turn ended with backend error: {}", message);
                }
            }

            ConnectionUpdate::StateChanged(state) => {
                let connected = state == ConnectionState::Open;
                if self.state.connected() && !connected {
                    // The backend cannot finish a turn over a dead transport
                    self.state.set_typing(false);
                    self.router.aggregator().settle(&mut self.state);
                }
                self.state.set_connected(connected);
            }

            ConnectionUpdate::Unchanged => {}
        }
    }

    fn teardown(&mut self) {
        info!("Shutting down chat session {}", self.config.client_id);
        self.playback.stop();
        self.connection.close();
        self.state.set_connected(false);
        self.state.set_typing(false);
        self.publish();
    }

    fn stats(&self) -> SessionStats {
        let duration = Utc::now().signed_duration_since(self.started_at);
        SessionStats {
            started_at: self.started_at,
            duration_secs: duration.num_milliseconds() as f64 / 1000.0,
            reconnect_attempts: self.connection.reconnect_attempts(),
            envelopes_routed: self.envelopes_routed,
            envelopes_dropped: self.envelopes_dropped,
            segments_played: self.playback.played(),
            segments_failed: self.playback.failed(),
            message_count: self.state.messages().len(),
        }
    }

    fn publish(&self) {
        let snapshot = self.state.snapshot(self.connection.state(), self.stats());
        self.snapshots.send_replace(snapshot);
    }
}

/// Cloneable handle to a running `ChatSession`
///
/// Calls are processed in the order they are made, interleaved with inbound
/// events; each call returns once the session has applied it.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<SessionSnapshot>,
}

impl SessionHandle {
    /// Send a typed user message; stops any playing speech first
    ///
    /// When disconnected this returns `SendError::NotConnected` and the
    /// session starts connecting.
    pub async fn submit_text(&self, text: impl Into<String>) -> Result<(), SessionError> {
        let text = text.into();
        self.request(|reply| Command::SubmitText { text, reply })
            .await?
            .map_err(SessionError::from)
    }

    /// Send one captured audio chunk as a binary frame
    pub async fn send_audio(&self, chunk: Bytes) -> Result<(), SessionError> {
        self.request(|reply| Command::SendAudio { chunk, reply })
            .await?
            .map_err(SessionError::from)
    }

    /// Ask the backend to finalize speech recognition of the audio sent so far
    pub async fn request_transcription(&self) -> Result<(), SessionError> {
        self.request(|reply| Command::RequestTranscription { reply })
            .await?
            .map_err(SessionError::from)
    }

    /// Halt playback, drop queued speech and tell the backend to stop
    pub async fn stop(&self) -> Result<StopOutcome, SessionError> {
        self.request(|reply| Command::Stop { reply }).await
    }

    /// Hook for the capture collaborator: recording is about to start
    pub async fn recording_started(&self) -> Result<StopOutcome, SessionError> {
        self.request(|reply| Command::RecordingStarted { reply })
            .await
    }

    /// Hook for the capture collaborator: recording ended, transcribe it
    pub async fn recording_stopped(&self) -> Result<(), SessionError> {
        self.request(|reply| Command::RecordingStopped { reply })
            .await?
            .map_err(SessionError::from)
    }

    /// Hook for the capture collaborator: recording ended early, nothing to
    /// transcribe
    pub async fn recording_aborted(&self) -> Result<(), SessionError> {
        self.request(|reply| Command::RecordingAborted { reply })
            .await
    }

    /// Connect now instead of waiting for the reconnect timer
    pub fn connect(&self) -> Result<(), SessionError> {
        self.commands
            .send(Command::Connect)
            .map_err(|_| SessionError::Closed)
    }

    /// Cancel the reconnect timer and playback, close the transport and end
    /// the session
    pub async fn shutdown(&self) -> Result<(), SessionError> {
        self.request(|reply| Command::Shutdown { reply }).await
    }

    /// Latest published state
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Receiver that is notified on every state change
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(command(tx))
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)
    }
}
