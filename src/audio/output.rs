//! Speaker output via `cpal`.
//!
//! [`CpalOutput`] is the production [`OutputContext`]: it keeps one cpal
//! output stream open on the system default device and renders whatever
//! [`Voice`] is currently installed.  Installing `None` outputs silence, so
//! pausing never tears the stream down.  Dropping the [`CpalOutput`] drops
//! the stream and frees the device.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};
use thiserror::Error;

use super::decode::DecodedAudio;
use super::resample::{interleave_mono, resample_linear};
use super::transport::{OutputContext, OutputFactory};

// ---------------------------------------------------------------------------
// OutputError
// ---------------------------------------------------------------------------

/// Errors that can occur while opening or driving the audio output.
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("no output device found on the default audio host")]
    NoDevice,

    #[error("failed to query default output config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to build output stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("unsupported output sample format: {0}")]
    UnsupportedFormat(String),

    #[error("no narration loaded")]
    NothingLoaded,
}

// ---------------------------------------------------------------------------
// Voice
// ---------------------------------------------------------------------------

/// Samples already converted to the device layout, plus a read cursor.
struct Voice {
    samples: Arc<[f32]>,
    pos: usize,
}

type SharedVoice = Arc<Mutex<Option<Voice>>>;

// ---------------------------------------------------------------------------
// CpalOutput
// ---------------------------------------------------------------------------

/// An open cpal output stream on the default device.
pub struct CpalOutput {
    _stream: cpal::Stream,
    voice: SharedVoice,
    sample_rate: u32,
    channels: u16,
    opened_at: Instant,
    /// Last converted buffer, keyed by the source `Arc`, so resuming does not
    /// resample again.
    prepared: Option<(Arc<DecodedAudio>, Arc<[f32]>)>,
}

impl CpalOutput {
    /// Open the system default output device and start a silent stream.
    pub fn open() -> Result<Self, OutputError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(OutputError::NoDevice)?;

        let supported = device.default_output_config()?;
        let sample_format = supported.sample_format();
        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels();
        let config: cpal::StreamConfig = supported.into();

        log::info!(
            "audio output: {} ({} Hz, {} ch, {:?})",
            device.name().unwrap_or_else(|_| "unknown".into()),
            sample_rate,
            channels,
            sample_format
        );

        let voice: SharedVoice = Arc::new(Mutex::new(None));
        let stream = match sample_format {
            cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, Arc::clone(&voice))?,
            cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, Arc::clone(&voice))?,
            cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config, Arc::clone(&voice))?,
            other => return Err(OutputError::UnsupportedFormat(format!("{other:?}"))),
        };
        stream.play()?;

        Ok(Self {
            _stream: stream,
            voice,
            sample_rate,
            channels,
            opened_at: Instant::now(),
            prepared: None,
        })
    }

    /// Device sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Device channel count.
    pub fn channels(&self) -> u16 {
        self.channels
    }

    fn prepare(&mut self, audio: &Arc<DecodedAudio>) -> Arc<[f32]> {
        if let Some((source, samples)) = &self.prepared {
            if Arc::ptr_eq(source, audio) {
                return Arc::clone(samples);
            }
        }
        let mono = audio.to_mono();
        let resampled = resample_linear(&mono, audio.sample_rate(), self.sample_rate);
        let samples: Arc<[f32]> = interleave_mono(&resampled, self.channels).into();
        self.prepared = Some((Arc::clone(audio), Arc::clone(&samples)));
        samples
    }

    fn install(&self, voice: Option<Voice>) {
        match self.voice.lock() {
            Ok(mut slot) => *slot = voice,
            Err(poisoned) => *poisoned.into_inner() = voice,
        }
    }
}

impl OutputContext for CpalOutput {
    fn now(&self) -> f64 {
        self.opened_at.elapsed().as_secs_f64()
    }

    fn start(&mut self, audio: &Arc<DecodedAudio>, offset_secs: f64) -> Result<(), OutputError> {
        let samples = self.prepare(audio);
        let frame = (offset_secs.max(0.0) * self.sample_rate as f64) as usize;
        let pos = (frame * self.channels as usize).min(samples.len());
        self.install(Some(Voice { samples, pos }));
        Ok(())
    }

    fn stop(&mut self) {
        self.install(None);
    }
}

/// Opens [`CpalOutput`] on the default device.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpalOutputFactory;

impl OutputFactory for CpalOutputFactory {
    type Context = CpalOutput;

    fn open(&self) -> Result<CpalOutput, OutputError> {
        CpalOutput::open()
    }
}

// ---------------------------------------------------------------------------
// Stream callback
// ---------------------------------------------------------------------------

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    voice: SharedVoice,
) -> Result<cpal::Stream, OutputError>
where
    T: SizedSample + FromSample<f32>,
{
    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| render(&voice, data),
        |err: cpal::StreamError| {
            log::error!("cpal output stream error: {err}");
        },
        None,
    )?;
    Ok(stream)
}

/// Fill `out` from the installed voice, padding with silence.
fn render<T: SizedSample + FromSample<f32>>(voice: &SharedVoice, out: &mut [T]) {
    let silence = T::from_sample(0.0f32);

    // Never block the audio thread; a contended lock renders one silent period.
    let Ok(mut slot) = voice.try_lock() else {
        out.fill(silence);
        return;
    };

    match slot.as_mut() {
        Some(v) => {
            for sample in out.iter_mut() {
                *sample = match v.samples.get(v.pos) {
                    Some(&s) => {
                        v.pos += 1;
                        T::from_sample(s)
                    }
                    None => silence,
                };
            }
        }
        None => out.fill(silence),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn shared(samples: &[f32], pos: usize) -> SharedVoice {
        Arc::new(Mutex::new(Some(Voice {
            samples: samples.to_vec().into(),
            pos,
        })))
    }

    #[test]
    fn render_copies_then_pads_with_silence() {
        let voice = shared(&[0.1, 0.2, 0.3], 0);
        let mut out = [9.0_f32; 5];
        render(&voice, &mut out);
        assert_eq!(out, [0.1, 0.2, 0.3, 0.0, 0.0]);
    }

    #[test]
    fn render_advances_cursor_across_callbacks() {
        let voice = shared(&[0.1, 0.2, 0.3, 0.4], 1);
        let mut out = [0.0_f32; 2];
        render(&voice, &mut out);
        assert_eq!(out, [0.2, 0.3]);
        render(&voice, &mut out);
        assert_eq!(out, [0.4, 0.0]);
    }

    #[test]
    fn render_without_voice_is_silent() {
        let voice: SharedVoice = Arc::new(Mutex::new(None));
        let mut out = [1.0_f32; 4];
        render(&voice, &mut out);
        assert_eq!(out, [0.0; 4]);
    }

    #[test]
    fn render_converts_to_i16() {
        let voice = shared(&[1.0, -1.0], 0);
        let mut out = [0_i16; 2];
        render(&voice, &mut out);
        assert!(out[0] >= i16::MAX - 1);
        assert_eq!(out[1], i16::MIN);
    }

    #[test]
    fn factory_is_copy() {
        fn assert_copy<T: Copy>() {}
        assert_copy::<CpalOutputFactory>();
    }
}
