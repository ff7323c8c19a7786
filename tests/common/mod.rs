// Shared in-process doubles for the transport and the audio player
//
// Both record what the session did to them and let a test drive the other
// side of the boundary (transport events, playback completions) by hand.

#![allow(dead_code)]

use bytes::Bytes;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use voice_chat_client::audio::{AudioQueueEntry, PlaybackHandle, PlaybackNotifier, Player};
use voice_chat_client::connection::{LinkEvents, Transport, TransportHandle};
use voice_chat_client::{OutboundFrame, PlaybackError};

#[derive(Default)]
struct TransportLog {
    links: Vec<LinkEvents>,
    outbound: Vec<mpsc::UnboundedReceiver<OutboundFrame>>,
}

/// Transport that never touches the network
///
/// Every `open` is recorded; tests report `opened`/`frame`/`closed` through
/// the recorded `LinkEvents` and read what was sent with `sent`.
#[derive(Clone, Default)]
pub struct FakeTransport {
    log: Arc<Mutex<TransportLog>>,
}

impl FakeTransport {
    pub fn open_count(&self) -> usize {
        self.log.lock().unwrap().links.len()
    }

    /// Link of the `n`th transport opened (0-based)
    pub fn link(&self, n: usize) -> LinkEvents {
        self.log.lock().unwrap().links[n].clone()
    }

    pub fn last_link(&self) -> LinkEvents {
        let log = self.log.lock().unwrap();
        log.links.last().cloned().expect("no transport opened yet")
    }

    /// Drain everything sent so far over the `n`th transport
    pub fn sent(&self, n: usize) -> Vec<OutboundFrame> {
        let mut log = self.log.lock().unwrap();
        let mut frames = Vec::new();
        while let Ok(frame) = log.outbound[n].try_recv() {
            frames.push(frame);
        }
        frames
    }

    /// Drop the receiving end of the `n`th transport, as if its task had
    /// died before reporting the close
    pub fn sever(&self, n: usize) {
        let (_tx, rx) = mpsc::unbounded_channel();
        self.log.lock().unwrap().outbound[n] = rx;
    }

    /// Labels of everything sent so far over the `n`th transport
    pub fn sent_labels(&self, n: usize) -> Vec<&'static str> {
        self.sent(n).iter().map(OutboundFrame::label).collect()
    }
}

impl Transport for FakeTransport {
    fn open(&self, link: LinkEvents) -> TransportHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut log = self.log.lock().unwrap();
        log.links.push(link);
        log.outbound.push(rx);
        TransportHandle::detached(tx)
    }
}

#[derive(Default)]
struct PlayerLog {
    started: Vec<u64>,
    payloads: Vec<Bytes>,
    pending: Vec<PlaybackNotifier>,
    reject: Option<Bytes>,
}

/// Player whose segments only finish when the test says so
#[derive(Clone, Default)]
pub struct FakePlayer {
    log: Arc<Mutex<PlayerLog>>,
}

impl FakePlayer {
    /// Refuse to start entries carrying exactly this payload
    pub fn reject(&self, payload: &'static [u8]) {
        self.log.lock().unwrap().reject = Some(Bytes::from_static(payload));
    }

    /// Entry ids in the order playback started
    pub fn started(&self) -> Vec<u64> {
        self.log.lock().unwrap().started.clone()
    }

    pub fn payloads(&self) -> Vec<Bytes> {
        self.log.lock().unwrap().payloads.clone()
    }

    /// Report entry `id` as played to the end
    ///
    /// Works for halted entries too, standing in for a completion that was
    /// already in flight when playback stopped.
    pub fn complete(&self, id: u64) {
        if let Some(notifier) = self.take(id) {
            notifier.finished();
        }
    }

    pub fn fail(&self, id: u64) {
        if let Some(notifier) = self.take(id) {
            notifier.failed(PlaybackError::Decode("corrupt segment".to_string()));
        }
    }

    fn take(&self, id: u64) -> Option<PlaybackNotifier> {
        let mut log = self.log.lock().unwrap();
        let pos = log.pending.iter().position(|n| n.entry_id() == id)?;
        Some(log.pending.remove(pos))
    }
}

impl Player for FakePlayer {
    fn start(
        &mut self,
        entry: &AudioQueueEntry,
        done: PlaybackNotifier,
    ) -> Result<PlaybackHandle, PlaybackError> {
        let mut log = self.log.lock().unwrap();
        if log.reject.as_ref() == Some(&entry.payload) {
            return Err(PlaybackError::Output("device busy".to_string()));
        }
        log.started.push(entry.id);
        log.payloads.push(entry.payload.clone());
        log.pending.push(done);
        Ok(PlaybackHandle::detached())
    }
}

/// Wait (up to a second) for `condition` to hold
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
