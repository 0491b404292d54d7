//! PCM payload decoder for narration audio.
//!
//! The speech service returns **raw** interleaved little-endian signed 16-bit
//! PCM, base64-encoded, with no container header.  [`decode_pcm16`] turns the
//! raw bytes into a [`DecodedAudio`] buffer of normalised `f32` samples, one
//! `Vec` per channel.
//!
//! # Example
//!
//! ```rust
//! use citylens::audio::{decode_pcm16, AudioFormat};
//!
//! // Two mono frames: 0x4000 (16384) and 0x8000 (-32768)
//! let bytes = [0x00, 0x40, 0x00, 0x80];
//! let audio = decode_pcm16(&bytes, AudioFormat::new(24_000, 1)).unwrap();
//! assert_eq!(audio.frame_count(), 2);
//! assert_eq!(audio.channel(0), &[0.5, -1.0]);
//! ```

use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Bytes per 16-bit sample.
const BYTES_PER_SAMPLE: usize = 2;

/// Divisor that maps `i16` onto `[-1.0, 1.0)`.
const PCM16_SCALE: f32 = 32_768.0;

// ---------------------------------------------------------------------------
// AudioFormat
// ---------------------------------------------------------------------------

/// Sample rate and channel layout of a PCM stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Frames per second.
    pub sample_rate: u32,
    /// Interleaved channel count.
    pub channels: u16,
}

impl AudioFormat {
    pub const fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }
}

impl Default for AudioFormat {
    /// 24 kHz mono, the layout produced by the narration voice.
    fn default() -> Self {
        Self::new(24_000, 1)
    }
}

// ---------------------------------------------------------------------------
// DecodeError
// ---------------------------------------------------------------------------

/// Errors raised while decoding a narration payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("audio payload is not valid base64: {0}")]
    Base64(String),

    #[error("channel count must be at least 1")]
    NoChannels,

    #[error("sample rate must be greater than 0 Hz")]
    ZeroSampleRate,
}

// ---------------------------------------------------------------------------
// DecodedAudio
// ---------------------------------------------------------------------------

/// A de-interleaved, normalised sample buffer ready for playback.
///
/// Every channel holds exactly [`frame_count`](Self::frame_count) samples.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    format: AudioFormat,
    channel_data: Vec<Vec<f32>>,
}

impl DecodedAudio {
    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn sample_rate(&self) -> u32 {
        self.format.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.format.channels
    }

    /// Number of frames (samples per channel).
    pub fn frame_count(&self) -> usize {
        self.channel_data.first().map_or(0, Vec::len)
    }

    /// Playback length in seconds: `frame_count / sample_rate`.
    pub fn duration_secs(&self) -> f64 {
        self.frame_count() as f64 / self.format.sample_rate as f64
    }

    /// Samples of a single channel.
    ///
    /// # Panics
    ///
    /// Panics if `index >= channels()`.
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channel_data[index]
    }

    /// Average all channels into one mono track.
    pub fn to_mono(&self) -> Vec<f32> {
        if self.channel_data.len() == 1 {
            return self.channel_data[0].clone();
        }
        let n = self.channel_data.len() as f32;
        (0..self.frame_count())
            .map(|i| self.channel_data.iter().map(|ch| ch[i]).sum::<f32>() / n)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decode raw interleaved little-endian PCM16 `bytes` into a [`DecodedAudio`].
///
/// The frame count is `bytes.len() / (2 * channels)`, rounded down; trailing
/// bytes that do not form a whole frame are dropped.
pub fn decode_pcm16(bytes: &[u8], format: AudioFormat) -> Result<DecodedAudio, DecodeError> {
    if format.channels == 0 {
        return Err(DecodeError::NoChannels);
    }
    if format.sample_rate == 0 {
        return Err(DecodeError::ZeroSampleRate);
    }

    let channels = format.channels as usize;
    let frame_bytes = BYTES_PER_SAMPLE * channels;
    let frame_count = bytes.len() / frame_bytes;

    let mut channel_data = vec![Vec::with_capacity(frame_count); channels];
    for frame in bytes.chunks_exact(frame_bytes) {
        for (ch, sample) in frame.chunks_exact(BYTES_PER_SAMPLE).enumerate() {
            let value = i16::from_le_bytes([sample[0], sample[1]]);
            channel_data[ch].push(value as f32 / PCM16_SCALE);
        }
    }

    Ok(DecodedAudio {
        format,
        channel_data,
    })
}

/// Decode a base64-encoded PCM16 payload.
///
/// Surrounding whitespace is ignored.
pub fn decode_base64_pcm16(payload: &str, format: AudioFormat) -> Result<DecodedAudio, DecodeError> {
    let bytes = general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| DecodeError::Base64(e.to_string()))?;
    decode_pcm16(&bytes, format)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
