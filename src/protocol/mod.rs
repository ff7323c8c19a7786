pub mod messages;

pub use messages::{decode_audio_payload, ControlFrame, Envelope, OutboundFrame};
