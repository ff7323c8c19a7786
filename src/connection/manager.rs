use super::transport::{ConnectionEvent, LinkEvents, Transport, TransportHandle};
use crate::error::SendError;
use crate::protocol::OutboundFrame;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Default delay before a reconnect attempt
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(3000);

/// Lifecycle of the session's single transport
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Never connected
    #[default]
    Idle,
    /// Transport opened, waiting for the handshake
    Connecting,
    /// Frames can be sent
    Open,
    /// Deliberate teardown in progress
    Closing,
    /// No transport; a reconnect may be pending
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Idle => write!(f, "idle"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Open => write!(f, "open"),
            ConnectionState::Closing => write!(f, "closing"),
            ConnectionState::Closed => write!(f, "closed"),
        }
    }
}

/// What a processed `ConnectionEvent` means for the session
#[derive(Debug, PartialEq)]
pub enum ConnectionUpdate {
    /// Nothing observable changed (stale event, duplicate close, ...)
    Unchanged,
    /// The connection moved to a new state
    StateChanged(ConnectionState),
    /// An inbound frame for the router
    Frame(String),
}

struct PendingReconnect {
    ticket: u64,
    task: JoinHandle<()>,
}

/// Owns the transport lifecycle and the fixed-delay reconnect loop
///
/// State only changes inside this type. Each transport incarnation gets a new
/// epoch and each scheduled reconnect a new ticket; events carrying an old
/// epoch or ticket are ignored.
pub struct ConnectionManager {
    transport: Arc<dyn Transport>,
    reconnect_delay: Duration,
    events: mpsc::UnboundedSender<ConnectionEvent>,

    state: ConnectionState,
    epoch: u64,
    link: Option<TransportHandle>,

    next_ticket: u64,
    pending_reconnect: Option<PendingReconnect>,

    /// Set by `close()`; suppresses reconnects until the next `connect()`
    shut_down: bool,

    reconnect_attempts: u64,
}

impl ConnectionManager {
    pub fn new(
        transport: Arc<dyn Transport>,
        reconnect_delay: Duration,
        events: mpsc::UnboundedSender<ConnectionEvent>,
    ) -> Self {
        Self {
            transport,
            reconnect_delay,
            events,
            state: ConnectionState::Idle,
            epoch: 0,
            link: None,
            next_ticket: 0,
            pending_reconnect: None,
            shut_down: false,
            reconnect_attempts: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    pub fn has_pending_reconnect(&self) -> bool {
        self.pending_reconnect.is_some()
    }

    pub fn reconnect_attempts(&self) -> u64 {
        self.reconnect_attempts
    }

    /// Open a transport unless one is already open or connecting
    pub fn connect(&mut self) {
        if matches!(
            self.state,
            ConnectionState::Open | ConnectionState::Connecting
        ) {
            debug!("connect() ignored, connection is {}", self.state);
            return;
        }

        self.shut_down = false;
        self.cancel_reconnect();

        self.epoch += 1;
        self.state = ConnectionState::Connecting;
        info!("Opening transport (epoch {})", self.epoch);

        let link = LinkEvents::new(self.epoch, self.events.clone());
        self.link = Some(self.transport.open(link));
    }

    /// Hand a frame to the open transport
    pub fn send(&self, frame: OutboundFrame) -> Result<(), SendError> {
        if self.state != ConnectionState::Open {
            return Err(SendError::NotConnected(self.state));
        }

        match &self.link {
            Some(link) => link.send(frame),
            None => Err(SendError::TransportGone),
        }
    }

    /// Tear down the transport and cancel any pending reconnect
    pub fn close(&mut self) {
        self.shut_down = true;
        self.cancel_reconnect();

        if let Some(link) = self.link.take() {
            self.state = ConnectionState::Closing;
            info!("Closing transport (epoch {})", self.epoch);
            link.close();
        }

        self.state = ConnectionState::Closed;
    }

    /// Apply one event from a transport or the reconnect timer
    pub fn handle_event(&mut self, event: ConnectionEvent) -> ConnectionUpdate {
        match event {
            ConnectionEvent::Opened { epoch } => {
                if !self.is_current(epoch) || self.state != ConnectionState::Connecting {
                    debug!("Ignoring stale open (epoch {})", epoch);
                    return ConnectionUpdate::Unchanged;
                }

                self.cancel_reconnect();
                self.state = ConnectionState::Open;
                info!("Connected (epoch {})", epoch);
                ConnectionUpdate::StateChanged(self.state)
            }

            ConnectionEvent::Frame { epoch, text } => {
                if !self.is_current(epoch) || self.state != ConnectionState::Open {
                    debug!("Dropping frame from stale transport (epoch {})", epoch);
                    return ConnectionUpdate::Unchanged;
                }
                ConnectionUpdate::Frame(text)
            }

            ConnectionEvent::Closed { epoch, reason } => {
                if !self.is_current(epoch) || self.state == ConnectionState::Closed {
                    debug!("Ignoring close from stale transport (epoch {})", epoch);
                    return ConnectionUpdate::Unchanged;
                }

                match &reason {
                    Some(e) => warn!("Disconnected: {}", e),
                    None => info!("Disconnected"),
                }

                self.link = None;
                self.state = ConnectionState::Closed;
                self.schedule_reconnect();
                ConnectionUpdate::StateChanged(self.state)
            }

            ConnectionEvent::ReconnectDue { ticket } => {
                let due = matches!(&self.pending_reconnect, Some(p) if p.ticket == ticket);
                if !due {
                    debug!("Ignoring superseded reconnect timer (ticket {})", ticket);
                    return ConnectionUpdate::Unchanged;
                }

                self.pending_reconnect = None;
                self.reconnect_attempts += 1;
                info!("Attempting to reconnect (attempt {})", self.reconnect_attempts);
                self.connect();
                ConnectionUpdate::StateChanged(self.state)
            }
        }
    }

    fn is_current(&self, epoch: u64) -> bool {
        epoch == self.epoch && self.epoch != 0
    }

    /// Start the reconnect timer unless one is already pending
    fn schedule_reconnect(&mut self) {
        if self.shut_down {
            debug!("Not scheduling reconnect after deliberate close");
            return;
        }
        if self.pending_reconnect.is_some() {
            debug!("Reconnect already pending");
            return;
        }

        self.next_ticket += 1;
        let ticket = self.next_ticket;
        let delay = self.reconnect_delay;
        let deadline = tokio::time::Instant::now() + delay;
        let events = self.events.clone();

        info!("Reconnecting in {}ms", delay.as_millis());

        let task = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let _ = events.send(ConnectionEvent::ReconnectDue { ticket });
        });

        self.pending_reconnect = Some(PendingReconnect { ticket, task });
    }

    fn cancel_reconnect(&mut self) {
        if let Some(pending) = self.pending_reconnect.take() {
            debug!("Cancelling pending reconnect (ticket {})", pending.ticket);
            pending.task.abort();
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.cancel_reconnect();
    }
}
