use crate::error::PlaybackError;
use std::io::Cursor;
use std::time::Duration;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// A decoded playback segment (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl DecodedAudio {
    /// Playback length of the segment
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 || self.channels == 0 {
            return Duration::ZERO;
        }
        let frames = self.samples.len() as f64 / self.channels as f64;
        Duration::from_secs_f64(frames / self.sample_rate as f64)
    }
}

/// Decode one compressed audio segment
///
/// `codec_hint` is a file extension ("mp3", "wav", "ogg", ...) that helps the
/// probe; an unknown hint falls back to content sniffing.
pub fn decode_segment(data: &[u8], codec_hint: &str) -> Result<DecodedAudio, PlaybackError> {
    if data.is_empty() {
        return Err(PlaybackError::Decode("empty segment".to_string()));
    }

    let cursor = Cursor::new(data.to_vec());
    let mss = MediaSourceStream::new(Box::new(cursor), Default::default());

    let mut hint = Hint::new();
    if !codec_hint.is_empty() {
        hint.with_extension(codec_hint);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| PlaybackError::Decode(format!("probe failed: {}", e)))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| PlaybackError::Decode("no audio track found".to_string()))?;

    let codec_params = track.codec_params.clone();
    let track_id = track.id;

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| PlaybackError::Decode(format!("codec init failed: {}", e)))?;

    let mut samples: Vec<i16> = Vec::new();
    let mut sample_rate = codec_params.sample_rate.unwrap_or(0);
    let mut channels = codec_params.channels.map_or(0, |c| c.count() as u16);

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(PlaybackError::Decode(format!("packet read: {}", e))),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            // A corrupt frame is skipped, not fatal for the segment
            Err(SymphoniaError::DecodeError(e)) => {
                tracing::debug!("Skipping undecodable packet: {}", e);
                continue;
            }
            Err(e) => return Err(PlaybackError::Decode(format!("decode: {}", e))),
        };

        let spec = *decoded.spec();
        sample_rate = spec.rate;
        channels = spec.channels.count() as u16;

        let mut buf = SampleBuffer::<i16>::new(decoded.capacity() as u64, spec);
        buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buf.samples());
    }

    if samples.is_empty() {
        return Err(PlaybackError::Decode("no audio samples decoded".to_string()));
    }

    Ok(DecodedAudio {
        samples,
        sample_rate,
        channels,
    })
}
