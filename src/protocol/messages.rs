use crate::error::ParseError;
use base64::Engine;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Inbound envelope from the chat backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Envelope {
    /// Interim speech recognition of the current utterance
    #[serde(rename = "transcript_partial")]
    TranscriptPartial { text: String },

    /// Final recognition of the user's utterance (also the echo of typed text)
    #[serde(rename = "transcript")]
    Transcript { text: String },

    /// Incremental fragment of the assistant's reply
    #[serde(rename = "response.text_partial")]
    ResponseTextPartial { text: String },

    /// Authoritative full text of the assistant's reply
    #[serde(rename = "response.text")]
    ResponseText { text: String },

    /// One synthesized speech segment
    #[serde(rename = "response.audio")]
    ResponseAudio {
        /// Base64-encoded compressed audio
        data: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        index: Option<u32>,
        #[serde(rename = "final", default, skip_serializing_if = "Option::is_none")]
        final_segment: Option<bool>,
    },

    #[serde(rename = "error")]
    Error { message: String },

    /// Any tag outside the set above
    #[serde(skip)]
    Unknown { kind: String },
}

const KNOWN_TYPES: &[&str] = &[
    "transcript_partial",
    "transcript",
    "response.text_partial",
    "response.text",
    "response.audio",
    "error",
];

impl Envelope {
    /// Parse one text frame
    ///
    /// Unrecognized `type` tags parse successfully as `Envelope::Unknown` so the
    /// router can log and drop them.
    pub fn parse(raw: &str) -> Result<Self, ParseError> {
        let value: Value = serde_json::from_str(raw)?;
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(ParseError::MissingType)?;

        if !KNOWN_TYPES.contains(&kind) {
            return Ok(Envelope::Unknown {
                kind: kind.to_string(),
            });
        }

        Ok(serde_json::from_value(value)?)
    }

    /// The wire tag of this envelope
    pub fn kind(&self) -> &str {
        match self {
            Envelope::TranscriptPartial { .. } => "transcript_partial",
            Envelope::Transcript { .. } => "transcript",
            Envelope::ResponseTextPartial { .. } => "response.text_partial",
            Envelope::ResponseText { .. } => "response.text",
            Envelope::ResponseAudio { .. } => "response.audio",
            Envelope::Error { .. } => "error",
            Envelope::Unknown { kind } => kind,
        }
    }
}

/// Decode a `response.audio` payload into raw encoded audio bytes
pub fn decode_audio_payload(data: &str) -> Result<Bytes, ParseError> {
    let bytes = base64::engine::general_purpose::STANDARD.decode(data.trim())?;
    Ok(Bytes::from(bytes))
}

/// Structured control frame sent to the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlFrame {
    /// The user typed a message
    TextInput { text: String },

    /// Finalize speech recognition for the audio sent so far
    TranscribeRequest,

    /// Cancel in-flight playback and generation
    Stop,
}

/// Anything the session sends over the transport
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundFrame {
    /// Raw captured audio, sent as a binary frame as-is
    Audio(Bytes),
    /// JSON control frame, sent as a text frame
    Control(ControlFrame),
}

impl OutboundFrame {
    pub fn text_input(text: impl Into<String>) -> Self {
        OutboundFrame::Control(ControlFrame::TextInput { text: text.into() })
    }

    pub fn transcribe_request() -> Self {
        OutboundFrame::Control(ControlFrame::TranscribeRequest)
    }

    pub fn stop() -> Self {
        OutboundFrame::Control(ControlFrame::Stop)
    }

    /// Short label for logging
    pub fn label(&self) -> &'static str {
        match self {
            OutboundFrame::Audio(_) => "audio",
            OutboundFrame::Control(ControlFrame::TextInput { .. }) => "text_input",
            OutboundFrame::Control(ControlFrame::TranscribeRequest) => "transcribe_request",
            OutboundFrame::Control(ControlFrame::Stop) => "stop",
        }
    }
}
