use crate::error::{ConnectionError, SendError};
use crate::protocol::{ControlFrame, OutboundFrame};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};
use url::Url;

/// How long a closing transport may take to say goodbye
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Event reported by a transport incarnation or by the reconnect timer
#[derive(Debug)]
pub enum ConnectionEvent {
    /// The transport finished its handshake
    Opened { epoch: u64 },
    /// One inbound text frame, in arrival order
    Frame { epoch: u64, text: String },
    /// The transport is gone (peer close, network error, or failed connect)
    Closed {
        epoch: u64,
        reason: Option<ConnectionError>,
    },
    /// The reconnect delay identified by `ticket` has elapsed
    ReconnectDue { ticket: u64 },
}

/// Sender a transport uses to report back to its `ConnectionManager`
///
/// Every event is stamped with the epoch of the transport it belongs to, so
/// events from a superseded transport can be told apart.
#[derive(Debug, Clone)]
pub struct LinkEvents {
    epoch: u64,
    tx: mpsc::UnboundedSender<ConnectionEvent>,
}

impl LinkEvents {
    pub fn new(epoch: u64, tx: mpsc::UnboundedSender<ConnectionEvent>) -> Self {
        Self { epoch, tx }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn opened(&self) {
        let _ = self.tx.send(ConnectionEvent::Opened { epoch: self.epoch });
    }

    pub fn frame(&self, text: impl Into<String>) {
        let _ = self.tx.send(ConnectionEvent::Frame {
            epoch: self.epoch,
            text: text.into(),
        });
    }

    pub fn closed(&self, reason: Option<ConnectionError>) {
        let _ = self.tx.send(ConnectionEvent::Closed {
            epoch: self.epoch,
            reason,
        });
    }
}

/// The one live transport owned by the `ConnectionManager`
///
/// Dropping the outbound sender asks the transport task to close its
/// connection and exit.
#[derive(Debug)]
pub struct TransportHandle {
    outbound: mpsc::UnboundedSender<OutboundFrame>,
    task: Option<JoinHandle<()>>,
}

impl TransportHandle {
    pub fn new(outbound: mpsc::UnboundedSender<OutboundFrame>, task: JoinHandle<()>) -> Self {
        Self {
            outbound,
            task: Some(task),
        }
    }

    /// Handle without a backing task (in-process transports)
    pub fn detached(outbound: mpsc::UnboundedSender<OutboundFrame>) -> Self {
        Self {
            outbound,
            task: None,
        }
    }

    pub fn send(&self, frame: OutboundFrame) -> Result<(), SendError> {
        self.outbound
            .send(frame)
            .map_err(|_| SendError::TransportGone)
    }

    /// Stop accepting frames and let the transport task wind down
    ///
    /// The task gets `CLOSE_GRACE` to send its close frame and is aborted
    /// after that, so a transport stuck in its handshake cannot outlive the
    /// session.
    pub fn close(self) {
        drop(self.outbound);
        if let Some(mut task) = self.task {
            tokio::spawn(async move {
                if tokio::time::timeout(CLOSE_GRACE, &mut task).await.is_err() {
                    debug!("Transport task did not exit within {:?}, aborting", CLOSE_GRACE);
                    task.abort();
                }
            });
        }
    }
}

/// Opens transports on behalf of the `ConnectionManager`
///
/// `open` must not block: it starts the connection in the background and
/// reports through `link` (`opened`, then any number of `frame`s, then exactly
/// one `closed`).
pub trait Transport: Send + Sync + 'static {
    fn open(&self, link: LinkEvents) -> TransportHandle;
}

/// WebSocket transport over tokio-tungstenite
pub struct WebSocketTransport {
    url: Url,
}

impl WebSocketTransport {
    pub fn new(url: Url) -> Result<Self, ConnectionError> {
        match url.scheme() {
            "ws" | "wss" => Ok(Self { url }),
            other => Err(ConnectionError::InvalidEndpoint(format!(
                "unsupported scheme '{}' in {}",
                other, url
            ))),
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    async fn run(
        url: Url,
        link: LinkEvents,
        mut outbound: mpsc::UnboundedReceiver<OutboundFrame>,
    ) {
        info!("Connecting to {} (epoch {})", url, link.epoch());

        let ws_stream = match tokio_tungstenite::connect_async(url.as_str()).await {
            Ok((stream, _response)) => stream,
            Err(e) => {
                warn!("Failed to connect to {}: {}", url, e);
                link.closed(Some(ConnectionError::Unreachable(e.to_string())));
                return;
            }
        };

        info!("WebSocket connected");
        link.opened();

        let (mut sink, mut stream) = ws_stream.split();

        let reason = loop {
            tokio::select! {
                frame = outbound.recv() => {
                    let Some(frame) = frame else {
                        // Handle dropped: deliberate close
                        if let Err(e) = sink.send(Message::Close(None)).await {
                            debug!("Failed to send close frame: {}", e);
                        }
                        break None;
                    };

                    let message = match encode_frame(&frame) {
                        Ok(message) => message,
                        Err(e) => {
                            error!("Dropping outbound {} frame: {}", frame.label(), e);
                            continue;
                        }
                    };

                    if let Err(e) = sink.send(message).await {
                        error!("Failed to send WebSocket message: {}", e);
                        break Some(ConnectionError::Closed(e.to_string()));
                    }
                }

                msg = stream.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => link.frame(text.as_str()),
                        Some(Ok(Message::Binary(data))) => {
                            debug!("Ignoring inbound binary frame ({} bytes)", data.len());
                        }
                        Some(Ok(Message::Ping(data))) => {
                            if let Err(e) = sink.send(Message::Pong(data)).await {
                                error!("Failed to send pong: {}", e);
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            info!("WebSocket closed by server");
                            let detail = frame
                                .map(|f| f.reason.as_str().to_string())
                                .unwrap_or_else(|| "closed by server".to_string());
                            break Some(ConnectionError::Closed(detail));
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            error!("WebSocket error: {}", e);
                            break Some(ConnectionError::Closed(e.to_string()));
                        }
                        None => break Some(ConnectionError::Closed("stream ended".to_string())),
                    }
                }
            }
        };

        link.closed(reason);
        info!("WebSocket transport task ended (epoch {})", link.epoch());
    }
}

impl Transport for WebSocketTransport {
    fn open(&self, link: LinkEvents) -> TransportHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(Self::run(self.url.clone(), link, rx));
        TransportHandle::new(tx, task)
    }
}

/// Map an outbound frame onto a WebSocket message
pub fn encode_frame(frame: &OutboundFrame) -> Result<Message, SendError> {
    match frame {
        OutboundFrame::Audio(bytes) => Ok(Message::Binary(bytes.clone())),
        OutboundFrame::Control(control) => {
            let json = encode_control(control)?;
            Ok(Message::Text(json.into()))
        }
    }
}

pub fn encode_control(control: &ControlFrame) -> Result<String, SendError> {
    serde_json::to_string(control).map_err(|e| SendError::Encode(e.to_string()))
}
