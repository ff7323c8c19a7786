//! Transport lifecycle
//!
//! `ConnectionManager` owns the single transport handle and the reconnect
//! timer. `Transport` is the seam between the manager and the network; the
//! WebSocket implementation lives in `transport`.

mod manager;
mod transport;

pub use manager::{ConnectionManager, ConnectionState, ConnectionUpdate, DEFAULT_RECONNECT_DELAY};
pub use transport::{
    encode_control, encode_frame, ConnectionEvent, LinkEvents, Transport, TransportHandle,
    WebSocketTransport,
};
