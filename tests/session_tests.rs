// Integration tests for the chat session event loop
//
// These tests run a real ChatSession against in-process transport and player
// doubles and observe it only through its handle and published snapshots.

mod common;

use anyhow::Result;
use bytes::Bytes;
use common::{eventually, FakePlayer, FakeTransport};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use voice_chat_client::audio::StopOutcome;
use voice_chat_client::{
    ActivityStatus, ChatSession, ConnectionError, ConnectionState, SendError, SessionConfig,
    SessionError, SessionHandle, SessionSnapshot,
};

struct Running {
    session: SessionHandle,
    task: JoinHandle<()>,
    transport: FakeTransport,
    player: FakePlayer,
}

fn start(greeting: Option<&str>) -> Running {
    let transport = FakeTransport::default();
    let player = FakePlayer::default();
    let config = SessionConfig {
        client_id: "session-test".to_string(),
        greeting: greeting.map(str::to_string),
        ..SessionConfig::default()
    };

    let (session, task) = ChatSession::spawn(
        config,
        Arc::new(transport.clone()),
        Box::new(player.clone()),
    );

    Running {
        session,
        task,
        transport,
        player,
    }
}

async fn wait_for(
    session: &SessionHandle,
    condition: impl FnMut(&SessionSnapshot) -> bool,
) -> SessionSnapshot {
    let mut updates = session.subscribe();
    let snapshot = tokio::time::timeout(Duration::from_secs(10), updates.wait_for(condition))
        .await
        .expect("timed out waiting for session state")
        .expect("session ended");
    snapshot.clone()
}

/// Start a session and complete its first handshake
async fn start_connected() -> Running {
    let running = start(None);
    let transport = running.transport.clone();
    eventually(|| transport.open_count() == 1).await;
    running.transport.last_link().opened();
    wait_for(&running.session, |s| s.connected).await;
    running
}

const AUDIO_A: &str = r#"{"type":"response.audio","data":"QQ==","index":0}"#;
const AUDIO_B: &str = r#"{"type":"response.audio","data":"Qg==","index":1,"final":true}"#;

#[tokio::test]
async fn test_greeting_is_seeded_before_connecting() -> Result<()> {
    let running = start(Some("Hello! How can I help you today?"));

    let snapshot = running.session.snapshot();
    assert!(!snapshot.connected);
    assert_eq!(snapshot.status, ActivityStatus::Connecting);
    assert_eq!(snapshot.messages.len(), 1);
    assert_eq!(snapshot.messages[0].text, "Hello! How can I help you today?");
    assert!(!snapshot.messages[0].is_user);
    assert!(snapshot.messages[0].finalized);

    let transport = running.transport.clone();
    eventually(|| transport.open_count() == 1).await;
    running.transport.last_link().opened();

    let snapshot = wait_for(&running.session, |s| s.connected).await;
    assert_eq!(snapshot.status, ActivityStatus::Online);
    assert_eq!(snapshot.connection, ConnectionState::Open);

    Ok(())
}

#[tokio::test]
async fn test_streamed_reply_is_published() -> Result<()> {
    let running = start_connected().await;
    let link = running.transport.last_link();

    link.frame(r#"{"type":"transcript","text":"How is bitcoin doing?"}"#);
    link.frame(r#"{"type":"response.text_partial","text":"Bit"}"#);
    link.frame(r#"{"type":"response.text_partial","text":"coin"}"#);
    link.frame(r#"{"type":"response.thinking"}"#);
    link.frame(r#"{"type":"response.text","text":"Bitcoin is up 2% today."}"#);

    let snapshot = wait_for(&running.session, |s| {
        s.stats.envelopes_routed + s.stats.envelopes_dropped == 5
    })
    .await;

    assert_eq!(snapshot.messages.len(), 2);
    assert_eq!(snapshot.messages[0].text, "How is bitcoin doing?");
    assert!(snapshot.messages[0].is_user);
    assert_eq!(
        snapshot.last_reply().map(|m| m.text.as_str()),
        Some("Bitcoin is up 2% today.")
    );
    assert!(snapshot.messages.iter().all(|m| m.finalized));
    assert!(!snapshot.typing);
    assert_eq!(snapshot.stats.envelopes_dropped, 1);

    Ok(())
}

#[tokio::test]
async fn test_submit_text_stops_playback_first() -> Result<()> {
    let running = start_connected().await;
    let link = running.transport.last_link();

    link.frame(AUDIO_A);
    link.frame(AUDIO_B);
    let player = running.player.clone();
    eventually(|| player.started().len() == 1).await;
    wait_for(&running.session, |s| s.stats.envelopes_routed == 2).await;

    running.session.submit_text("Actually, never mind").await?;

    assert_eq!(running.transport.sent_labels(0), vec!["stop", "text_input"]);
    assert!(running.session.snapshot().typing);
    assert_eq!(
        running.session.snapshot().status,
        ActivityStatus::Processing
    );

    // Nothing left to stop
    let outcome = running.session.stop().await?;
    assert_eq!(outcome, StopOutcome::default());

    Ok(())
}

#[tokio::test]
async fn test_empty_message_is_rejected() -> Result<()> {
    let running = start_connected().await;

    let err = running.session.submit_text("   ").await.unwrap_err();

    assert!(matches!(err, SessionError::Send(SendError::EmptyMessage)));
    assert!(running.transport.sent(0).is_empty());

    Ok(())
}

#[tokio::test]
async fn test_submit_text_while_disconnected_reconnects() -> Result<()> {
    let running = start_connected().await;

    running
        .transport
        .last_link()
        .closed(Some(ConnectionError::Closed("server restart".to_string())));
    wait_for(&running.session, |s| !s.connected).await;

    let err = running.session.submit_text("hello?").await.unwrap_err();
    assert!(err.is_not_connected());

    // A send attempt while down connects right away instead of waiting
    assert_eq!(running.transport.open_count(), 2);
    assert_eq!(running.session.snapshot().connection, ConnectionState::Connecting);

    Ok(())
}

#[tokio::test]
async fn test_recording_hooks_barge_in_and_request_transcription() -> Result<()> {
    let running = start_connected().await;
    let link = running.transport.last_link();

    link.frame(AUDIO_A);
    link.frame(AUDIO_B);
    wait_for(&running.session, |s| s.stats.envelopes_routed == 2).await;

    let outcome = running.session.recording_started().await?;
    assert_eq!(outcome, StopOutcome { halted: true, discarded: 1 });

    let snapshot = running.session.snapshot();
    assert!(snapshot.listening);
    assert_eq!(snapshot.status, ActivityStatus::Listening);

    running
        .session
        .send_audio(Bytes::from_static(b"RIFF...."))
        .await?;
    running.session.recording_stopped().await?;

    assert_eq!(
        running.transport.sent_labels(0),
        vec!["stop", "audio", "transcribe_request"]
    );
    assert!(!running.session.snapshot().listening);

    // The queued segment B never played
    assert_eq!(running.player.started(), vec![1]);

    Ok(())
}

#[tokio::test]
async fn test_aborted_recording_clears_listening_without_sending() -> Result<()> {
    let running = start_connected().await;

    running.session.recording_started().await?;
    assert!(running.session.snapshot().listening);

    running.session.recording_aborted().await?;

    let snapshot = running.session.snapshot();
    assert!(!snapshot.listening);
    assert_eq!(snapshot.status, ActivityStatus::Online);
    assert_eq!(running.transport.sent_labels(0), vec!["stop"]);

    Ok(())
}

#[tokio::test]
async fn test_disconnect_settles_streaming_reply() -> Result<()> {
    let running = start_connected().await;
    let link = running.transport.last_link();

    link.frame(r#"{"type":"transcript","text":"Tell me a story"}"#);
    link.frame(r#"{"type":"response.text_partial","text":"Once upon"}"#);
    wait_for(&running.session, |s| s.messages.len() == 2).await;

    link.closed(None);
    let snapshot = wait_for(&running.session, |s| !s.connected).await;

    assert!(!snapshot.typing);
    assert_eq!(snapshot.messages[1].text, "Once upon");
    assert!(snapshot.messages[1].finalized);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_session_reconnects_after_drop() -> Result<()> {
    let running = start_connected().await;

    running.transport.last_link().closed(None);
    wait_for(&running.session, |s| !s.connected).await;

    let snapshot = wait_for(&running.session, |s| s.stats.reconnect_attempts == 1).await;
    assert_eq!(snapshot.connection, ConnectionState::Connecting);
    assert_eq!(running.transport.open_count(), 2);

    running.transport.link(1).opened();
    let snapshot = wait_for(&running.session, |s| s.connected).await;
    assert_eq!(snapshot.status, ActivityStatus::Online);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_cancels_reconnect_and_closes_handle() -> Result<()> {
    let running = start_connected().await;

    running.transport.last_link().closed(None);
    wait_for(&running.session, |s| !s.connected).await;

    running.session.shutdown().await?;
    running.task.await?;

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(running.transport.open_count(), 1, "no reconnect after shutdown");

    assert!(running.session.is_closed());
    let err = running.session.submit_text("anyone?").await.unwrap_err();
    assert!(matches!(err, SessionError::Closed));

    let snapshot = running.session.snapshot();
    assert!(!snapshot.connected);
    assert_eq!(snapshot.connection, ConnectionState::Closed);

    Ok(())
}
