use super::player::{AudioQueueEntry, PlaybackEvent, PlaybackHandle, PlaybackNotifier, Player};
use bytes::Bytes;
use std::collections::VecDeque;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

struct Playing {
    entry_id: u64,
    handle: PlaybackHandle,
}

/// What `stop()` cleared
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StopOutcome {
    /// An entry was playing and got halted
    pub halted: bool,
    /// Queued entries that were discarded without playing
    pub discarded: usize,
}

/// FIFO of speech segments plus the single "currently playing" slot
///
/// Never queued-but-idle: whenever `queue` is non-empty, `current` is set.
pub struct AudioPlaybackQueue {
    player: Box<dyn Player>,
    events: mpsc::UnboundedSender<PlaybackEvent>,
    queue: VecDeque<AudioQueueEntry>,
    current: Option<Playing>,
    next_id: u64,

    played: u64,
    failed: u64,
}

impl AudioPlaybackQueue {
    pub fn new(player: Box<dyn Player>, events: mpsc::UnboundedSender<PlaybackEvent>) -> Self {
        Self {
            player,
            events,
            queue: VecDeque::new(),
            current: None,
            next_id: 0,
            played: 0,
            failed: 0,
        }
    }

    /// Append a segment and start playback if idle; returns the entry id
    pub fn enqueue(&mut self, payload: Bytes, index: Option<u32>, final_segment: bool) -> u64 {
        self.next_id += 1;
        let entry = AudioQueueEntry {
            id: self.next_id,
            payload,
            index,
            final_segment,
        };
        let id = entry.id;

        debug!(
            "Queued audio segment {} ({} bytes, index {:?})",
            id,
            entry.payload.len(),
            entry.index
        );

        self.queue.push_back(entry);
        if self.current.is_none() {
            self.advance();
        }
        id
    }

    /// Apply a completion report from the player
    pub fn on_playback_event(&mut self, event: PlaybackEvent) {
        let is_current = matches!(&self.current, Some(p) if p.entry_id == event.entry_id);
        if !is_current {
            debug!(
                "Ignoring completion for segment {} (no longer playing)",
                event.entry_id
            );
            return;
        }

        self.current = None;
        match event.outcome {
            Ok(()) => {
                self.played += 1;
                debug!("Segment {} finished", event.entry_id);
            }
            Err(e) => {
                self.failed += 1;
                warn!("Segment {} failed, skipping: {}", event.entry_id, e);
            }
        }

        self.advance();
    }

    /// Halt current playback and discard everything queued
    pub fn stop(&mut self) -> StopOutcome {
        let halted = match self.current.take() {
            Some(playing) => {
                playing.handle.halt();
                true
            }
            None => false,
        };
        let discarded = self.queue.len();
        self.queue.clear();

        if halted || discarded > 0 {
            info!(
                "Playback stopped ({} queued segment(s) discarded)",
                discarded
            );
        }

        StopOutcome { halted, discarded }
    }

    pub fn is_playing(&self) -> bool {
        self.current.is_some()
    }

    pub fn current_entry(&self) -> Option<u64> {
        self.current.as_ref().map(|p| p.entry_id)
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn played(&self) -> u64 {
        self.played
    }

    pub fn failed(&self) -> u64 {
        self.failed
    }

    /// Start the next entry; entries that fail to start count as completed
    fn advance(&mut self) {
        while let Some(entry) = self.queue.pop_front() {
            let notifier = PlaybackNotifier::new(entry.id, self.events.clone());
            match self.player.start(&entry, notifier) {
                Ok(handle) => {
                    self.current = Some(Playing {
                        entry_id: entry.id,
                        handle,
                    });
                    return;
                }
                Err(e) => {
                    self.failed += 1;
                    warn!("Segment {} could not start, skipping: {}", entry.id, e);
                }
            }
        }
    }
}

impl Drop for AudioPlaybackQueue {
    fn drop(&mut self) {
        if let Some(playing) = self.current.take() {
            playing.handle.halt();
        }
    }
}
