pub mod capture;
pub mod decode;
pub mod playback;
pub mod player;

pub use capture::{AudioCapture, Recorder, RecordingSummary, WavFileCapture, DEFAULT_TIMESLICE};
pub use decode::{decode_segment, DecodedAudio};
pub use playback::{AudioPlaybackQueue, StopOutcome};
pub use player::{
    AudioQueueEntry, DecodingPlayer, NullSink, PcmSink, PlaybackEvent, PlaybackHandle,
    PlaybackNotifier, Player, WavDirSink,
};
