use super::decode::{decode_segment, DecodedAudio};
use crate::error::PlaybackError;
use bytes::Bytes;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// One queued speech segment
#[derive(Debug, Clone)]
pub struct AudioQueueEntry {
    /// Monotonic id assigned by the queue
    pub id: u64,
    /// Encoded audio exactly as received
    pub payload: Bytes,
    /// Segment index reported by the backend, if any
    pub index: Option<u32>,
    /// Whether the backend marked this as the last segment of the turn
    pub final_segment: bool,
}

/// Completion report for one entry
#[derive(Debug)]
pub struct PlaybackEvent {
    pub entry_id: u64,
    pub outcome: Result<(), PlaybackError>,
}

/// One-shot completion callback handed to a `Player`
///
/// Dropping it without calling `finished` or `failed` reports nothing, which
/// is what a halted playback does.
#[derive(Debug)]
pub struct PlaybackNotifier {
    entry_id: u64,
    tx: mpsc::UnboundedSender<PlaybackEvent>,
}

impl PlaybackNotifier {
    pub fn new(entry_id: u64, tx: mpsc::UnboundedSender<PlaybackEvent>) -> Self {
        Self { entry_id, tx }
    }

    pub fn entry_id(&self) -> u64 {
        self.entry_id
    }

    pub fn finished(self) {
        self.report(Ok(()));
    }

    pub fn failed(self, error: PlaybackError) {
        self.report(Err(error));
    }

    fn report(self, outcome: Result<(), PlaybackError>) {
        let _ = self.tx.send(PlaybackEvent {
            entry_id: self.entry_id,
            outcome,
        });
    }
}

/// The "currently playing" handle owned by the playback queue
#[derive(Debug, Default)]
pub struct PlaybackHandle {
    task: Option<JoinHandle<()>>,
    cancelled: Arc<AtomicBool>,
}

impl PlaybackHandle {
    /// `cancelled` is raised on halt for work that abort cannot reach,
    /// such as a blocking decode already running
    pub fn new(task: JoinHandle<()>, cancelled: Arc<AtomicBool>) -> Self {
        Self {
            task: Some(task),
            cancelled,
        }
    }

    /// Handle for players that have nothing to cancel
    pub fn detached() -> Self {
        Self::default()
    }

    pub fn is_halted(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Stop playback now; the entry's notifier never fires
    pub fn halt(self) {
        self.cancelled.store(true, Ordering::Release);
        if let Some(task) = self.task {
            task.abort();
        }
    }
}

/// Plays queued entries one at a time
///
/// `start` returns once playback has begun. Completion is reported through
/// the notifier; a synchronous `Err` means the entry never started.
pub trait Player: Send + 'static {
    fn start(
        &mut self,
        entry: &AudioQueueEntry,
        done: PlaybackNotifier,
    ) -> Result<PlaybackHandle, PlaybackError>;
}

/// Destination for decoded PCM
pub trait PcmSink: Send + Sync + 'static {
    fn write(&self, entry: &AudioQueueEntry, audio: &DecodedAudio) -> Result<(), PlaybackError>;

    fn name(&self) -> &str;
}

/// Discards audio; playback is only paced
#[derive(Debug, Default)]
pub struct NullSink;

impl PcmSink for NullSink {
    fn write(&self, _entry: &AudioQueueEntry, _audio: &DecodedAudio) -> Result<(), PlaybackError> {
        Ok(())
    }

    fn name(&self) -> &str {
        "null"
    }
}

/// Writes every played segment to `<dir>/segment-<id>.wav`
#[derive(Debug)]
pub struct WavDirSink {
    output_dir: PathBuf,
}

impl WavDirSink {
    pub fn new(output_dir: impl Into<PathBuf>) -> Result<Self, PlaybackError> {
        let output_dir = output_dir.into();
        fs::create_dir_all(&output_dir).map_err(|e| {
            PlaybackError::Output(format!(
                "failed to create {}: {}",
                output_dir.display(),
                e
            ))
        })?;

        info!("Playback segments will be written to {}", output_dir.display());

        Ok(Self { output_dir })
    }

    pub fn segment_path(&self, entry_id: u64) -> PathBuf {
        self.output_dir.join(format!("segment-{:05}.wav", entry_id))
    }
}

impl PcmSink for WavDirSink {
    fn write(&self, entry: &AudioQueueEntry, audio: &DecodedAudio) -> Result<(), PlaybackError> {
        let path = self.segment_path(entry.id);
        let spec = hound::WavSpec {
            channels: audio.channels,
            sample_rate: audio.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut writer = hound::WavWriter::create(&path, spec)
            .map_err(|e| PlaybackError::Output(format!("{}: {}", path.display(), e)))?;

        for &sample in &audio.samples {
            writer
                .write_sample(sample)
                .map_err(|e| PlaybackError::Output(e.to_string()))?;
        }

        writer
            .finalize()
            .map_err(|e| PlaybackError::Output(e.to_string()))?;

        debug!("Wrote segment {} to {}", entry.id, path.display());
        Ok(())
    }

    fn name(&self) -> &str {
        "wav-dir"
    }
}

/// Decodes each segment with symphonia, hands the PCM to a sink, then waits
/// out the segment's duration so completion lines up with real playback
pub struct DecodingPlayer {
    codec_hint: String,
    sink: Arc<dyn PcmSink>,
    pace: bool,
}

impl DecodingPlayer {
    pub fn new(codec_hint: impl Into<String>, sink: Arc<dyn PcmSink>) -> Self {
        Self {
            codec_hint: codec_hint.into(),
            sink,
            pace: true,
        }
    }

    /// Report completion as soon as the sink has the audio
    pub fn without_pacing(mut self) -> Self {
        self.pace = false;
        self
    }
}

impl Player for DecodingPlayer {
    fn start(
        &mut self,
        entry: &AudioQueueEntry,
        done: PlaybackNotifier,
    ) -> Result<PlaybackHandle, PlaybackError> {
        let entry = entry.clone();
        let hint = self.codec_hint.clone();
        let sink = Arc::clone(&self.sink);
        let pace = self.pace;

        debug!(
            "Playing segment {} ({} bytes) via {} sink",
            entry.id,
            entry.payload.len(),
            sink.name()
        );

        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);

        let task = tokio::spawn(async move {
            let rendered =
                tokio::task::spawn_blocking(move || render(&entry, &hint, sink.as_ref(), &flag))
                    .await;

            match rendered {
                Ok(Ok(None)) => {}
                Ok(Ok(Some(duration))) => {
                    if pace {
                        tokio::time::sleep(duration).await;
                    }
                    done.finished();
                }
                Ok(Err(e)) => done.failed(e),
                Err(e) => done.failed(PlaybackError::Output(format!(
                    "playback worker failed: {}",
                    e
                ))),
            }
        });

        Ok(PlaybackHandle::new(task, cancelled))
    }
}

/// Decode one entry and hand it to the sink unless playback was halted
/// meanwhile. `None` means halted; nothing was written.
fn render(
    entry: &AudioQueueEntry,
    codec_hint: &str,
    sink: &dyn PcmSink,
    cancelled: &AtomicBool,
) -> Result<Option<Duration>, PlaybackError> {
    if cancelled.load(Ordering::Acquire) {
        return Ok(None);
    }

    let audio = decode_segment(&entry.payload, codec_hint)?;

    if cancelled.load(Ordering::Acquire) {
        debug!("Segment {} halted before reaching the sink", entry.id);
        return Ok(None);
    }

    sink.write(entry, &audio)?;
    Ok(Some(audio.duration()))
}
