pub mod audio;
pub mod config;
pub mod connection;
pub mod error;
pub mod http;
pub mod protocol;
pub mod session;

pub use audio::{
    AudioCapture, AudioPlaybackQueue, AudioQueueEntry, DecodingPlayer, NullSink, PcmSink,
    PlaybackEvent, Player, Recorder, WavDirSink, WavFileCapture,
};
pub use config::Config;
pub use connection::{ConnectionManager, ConnectionState, Transport, WebSocketTransport};
pub use error::{CaptureError, ConnectionError, ParseError, PlaybackError, SendError, SessionError};
pub use http::{create_router, AppState};
pub use protocol::{ControlFrame, Envelope, OutboundFrame};
pub use session::{
    ActivityStatus, ChatSession, LatePartialPolicy, Message, MessageId, MessageRouter,
    SessionConfig, SessionHandle, SessionSnapshot, SessionState, SessionStats,
    TranscriptAggregator,
};
