use crate::error::{CaptureError, SessionError};
use crate::session::SessionHandle;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Default capture timeslice, matching what browsers emit per recorder chunk
pub const DEFAULT_TIMESLICE: Duration = Duration::from_millis(250);

/// Audio input collaborator
///
/// Implementations:
/// - `WavFileCapture`: replays a WAV file as if it were being recorded
/// - anything else that can produce encoded audio chunks (microphone, pipe)
#[async_trait::async_trait]
pub trait AudioCapture: Send + Sync {
    /// Start capturing
    ///
    /// Returns a channel receiver that yields encoded audio chunks; the
    /// channel closes when capture ends.
    async fn start(&mut self) -> Result<mpsc::Receiver<Bytes>, CaptureError>;

    /// Stop capturing
    async fn stop(&mut self) -> Result<(), CaptureError>;

    /// Check if capture is currently running
    fn is_capturing(&self) -> bool;

    /// Get capture name for logging
    fn name(&self) -> &str;
}

/// Streams a WAV file's bytes in timeslice-sized chunks at real-time pace
///
/// Concatenating the chunks reproduces the file, the same way a browser
/// recorder's chunks concatenate into one container stream.
pub struct WavFileCapture {
    path: PathBuf,
    timeslice: Duration,
    capturing: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl WavFileCapture {
    pub fn new(path: impl AsRef<Path>, timeslice: Duration) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            timeslice,
            capturing: Arc::new(AtomicBool::new(false)),
            task: None,
        }
    }

    /// Bytes per timeslice for the file's PCM format
    fn chunk_len(spec: hound::WavSpec, timeslice: Duration) -> usize {
        let bytes_per_sec = spec.sample_rate as u64
            * spec.channels as u64
            * (spec.bits_per_sample as u64).div_ceil(8);
        let len = bytes_per_sec * timeslice.as_millis() as u64 / 1000;
        len.max(1) as usize
    }
}

#[async_trait::async_trait]
impl AudioCapture for WavFileCapture {
    async fn start(&mut self) -> Result<mpsc::Receiver<Bytes>, CaptureError> {
        if self.capturing.load(Ordering::SeqCst) {
            return Err(CaptureError::Unavailable(format!(
                "{} is already capturing",
                self.path.display()
            )));
        }

        let reader = hound::WavReader::open(&self.path).map_err(|e| {
            CaptureError::Unavailable(format!("{}: {}", self.path.display(), e))
        })?;
        let spec = reader.spec();
        drop(reader);

        let data = tokio::fs::read(&self.path).await?;
        let chunk_len = Self::chunk_len(spec, self.timeslice);

        info!(
            "Capturing from {} ({}Hz, {} channels, {} bytes per {}ms chunk)",
            self.path.display(),
            spec.sample_rate,
            spec.channels,
            chunk_len,
            self.timeslice.as_millis()
        );

        let (tx, rx) = mpsc::channel(16);
        let capturing = Arc::clone(&self.capturing);
        let timeslice = self.timeslice;
        capturing.store(true, Ordering::SeqCst);

        let task = tokio::spawn(async move {
            let data = Bytes::from(data);
            let mut offset = 0;

            while offset < data.len() {
                if !capturing.load(Ordering::SeqCst) {
                    break;
                }
                tokio::time::sleep(timeslice).await;

                let end = (offset + chunk_len).min(data.len());
                if tx.send(data.slice(offset..end)).await.is_err() {
                    break;
                }
                offset = end;
            }

            capturing.store(false, Ordering::SeqCst);
        });

        self.task = Some(task);
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<(), CaptureError> {
        self.capturing.store(false, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("Capture task panicked: {}", e);
            }
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "wav-file"
    }
}

/// Summary of one recording
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordingSummary {
    pub chunks_sent: usize,
    pub bytes_sent: usize,
    /// Chunks dropped because the connection was down
    pub chunks_dropped: usize,
    /// Whether the transcription request reached the transport
    pub transcription_requested: bool,
}

/// Drives an `AudioCapture` through a session's recording hooks
pub struct Recorder {
    session: SessionHandle,
}

impl Recorder {
    pub fn new(session: SessionHandle) -> Self {
        Self { session }
    }

    /// Record until the capture ends, then ask the backend to transcribe
    ///
    /// The capture is opened before anything else: if it fails, the error is
    /// returned and the session never enters the listening state.
    pub async fn record(
        &self,
        capture: &mut dyn AudioCapture,
    ) -> Result<RecordingSummary, SessionError> {
        let mut chunks = capture.start().await?;
        info!("Recording started ({})", capture.name());

        self.session.recording_started().await?;

        let mut summary = RecordingSummary::default();
        while let Some(chunk) = chunks.recv().await {
            let len = chunk.len();
            match self.session.send_audio(chunk).await {
                Ok(()) => {
                    summary.chunks_sent += 1;
                    summary.bytes_sent += len;
                }
                Err(e) if e.is_not_connected() => {
                    summary.chunks_dropped += 1;
                    warn!("Dropping audio chunk: {}", e);
                }
                Err(e) => {
                    if let Err(stop_err) = capture.stop().await {
                        error!("Failed to stop capture: {}", stop_err);
                    }
                    self.abort().await;
                    return Err(e);
                }
            }
        }

        if let Err(e) = capture.stop().await {
            error!("Failed to stop capture: {}", e);
        }

        match self.session.recording_stopped().await {
            Ok(()) => summary.transcription_requested = true,
            Err(e) if e.is_not_connected() => warn!("Transcription request not sent: {}", e),
            Err(e) => {
                self.abort().await;
                return Err(e);
            }
        }

        info!(
            "Recording finished: {} chunks ({} bytes) sent, {} dropped",
            summary.chunks_sent, summary.bytes_sent, summary.chunks_dropped
        );

        Ok(summary)
    }

    /// Leave the listening state after a failed recording
    async fn abort(&self) {
        if let Err(e) = self.session.recording_aborted().await {
            warn!("Could not end recording state: {}", e);
        }
    }
}
