//! Narration audio — payload decoding → device conversion → transport.
//!
//! # Pipeline
//!
//! ```text
//! base64 PCM16 → decode_base64_pcm16 → DecodedAudio (24 kHz mono)
//!             → PlaybackTransport::play → CpalOutput (resample + fan-out)
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use citylens::audio::{decode_base64_pcm16, AudioFormat, CpalOutputFactory, PlaybackTransport};
//!
//! let audio = decode_base64_pcm16("AAAAAA==", AudioFormat::default()).unwrap();
//! let mut transport = PlaybackTransport::new(CpalOutputFactory);
//! transport.load(Arc::new(audio));
//! transport.play().unwrap();
//! ```

pub mod decode;
pub mod output;
pub mod resample;
pub mod transport;

pub use decode::{decode_base64_pcm16, decode_pcm16, AudioFormat, DecodeError, DecodedAudio};
pub use output::{CpalOutput, CpalOutputFactory, OutputError};
pub use resample::{interleave_mono, resample_linear};
pub use transport::{OutputContext, OutputFactory, PlaybackStatus, PlaybackTransport};
