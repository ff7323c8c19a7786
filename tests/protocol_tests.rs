// Integration tests for the wire protocol
//
// These tests verify envelope parsing (including unknown and malformed
// frames) and the exact JSON of outbound control frames.

use anyhow::Result;
use bytes::Bytes;
use tokio_tungstenite::tungstenite::Message;
use voice_chat_client::connection::{encode_control, encode_frame};
use voice_chat_client::protocol::decode_audio_payload;
use voice_chat_client::{ControlFrame, Envelope, OutboundFrame, ParseError};

#[test]
fn test_parse_known_envelopes() -> Result<()> {
    assert_eq!(
        Envelope::parse(r#"{"type":"transcript_partial","text":"hel"}"#)?,
        Envelope::TranscriptPartial { text: "hel".to_string() }
    );
    assert_eq!(
        Envelope::parse(r#"{"type":"response.text","text":"Done.","extra":1}"#)?,
        Envelope::ResponseText { text: "Done.".to_string() }
    );
    assert_eq!(
        Envelope::parse(r#"{"type":"error","message":"rate limited"}"#)?,
        Envelope::Error { message: "rate limited".to_string() }
    );

    Ok(())
}

#[test]
fn test_parse_audio_envelope_fields() -> Result<()> {
    let envelope = Envelope::parse(r#"{"type":"response.audio","data":"AAEC","index":3,"final":true}"#)?;

    assert_eq!(
        envelope,
        Envelope::ResponseAudio {
            data: "AAEC".to_string(),
            index: Some(3),
            final_segment: Some(true),
        }
    );
    assert_eq!(envelope.kind(), "response.audio");

    let bare = Envelope::parse(r#"{"type":"response.audio","data":"AAEC"}"#)?;
    assert!(matches!(bare, Envelope::ResponseAudio { index: None, final_segment: None, .. }));

    Ok(())
}

#[test]
fn test_unknown_type_parses_as_unknown() -> Result<()> {
    let envelope = Envelope::parse(r#"{"type":"session.update","foo":"bar"}"#)?;

    assert_eq!(envelope, Envelope::Unknown { kind: "session.update".to_string() });
    assert_eq!(envelope.kind(), "session.update");

    Ok(())
}

#[test]
fn test_malformed_envelopes_fail_to_parse() {
    assert!(matches!(Envelope::parse("{oops"), Err(ParseError::Json(_))));
    assert!(matches!(Envelope::parse(r#"{"text":"x"}"#), Err(ParseError::MissingType)));
    assert!(matches!(Envelope::parse(r#"{"type":42}"#), Err(ParseError::MissingType)));
    assert!(matches!(
        Envelope::parse(r#"{"type":"transcript","text":7}"#),
        Err(ParseError::Json(_))
    ));
}

#[test]
fn test_decode_audio_payload() -> Result<()> {
    assert_eq!(decode_audio_payload("AAEC")?, Bytes::from_static(&[0, 1, 2]));
    assert!(matches!(decode_audio_payload("***"), Err(ParseError::Audio(_))));

    Ok(())
}

#[test]
fn test_control_frames_encode_with_type_tag() -> Result<()> {
    assert_eq!(
        encode_control(&ControlFrame::TextInput { text: "hi \"there\"".to_string() })?,
        r#"{"type":"text_input","text":"hi \"there\""}"#
    );
    assert_eq!(encode_control(&ControlFrame::TranscribeRequest)?, r#"{"type":"transcribe_request"}"#);
    assert_eq!(encode_control(&ControlFrame::Stop)?, r#"{"type":"stop"}"#);

    Ok(())
}

#[test]
fn test_outbound_frames_map_to_websocket_messages() -> Result<()> {
    let audio = encode_frame(&OutboundFrame::Audio(Bytes::from_static(b"\x1a\x45\xdf\xa3")))?;
    assert!(matches!(&audio, Message::Binary(data) if data.as_ref() == b"\x1a\x45\xdf\xa3"));

    let stop = encode_frame(&OutboundFrame::stop())?;
    assert!(matches!(&stop, Message::Text(text) if text.as_str() == r#"{"type":"stop"}"#));

    Ok(())
}
