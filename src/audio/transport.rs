//! Play / pause transport over a single narration buffer.
//!
//! [`PlaybackTransport`] owns the one output context a session is allowed to
//! hold.  The context is opened lazily on the first [`play`] and closed on
//! [`release`] (or drop).  Platforms cap the number of simultaneously open
//! output contexts, so a reset must always go through [`release`].
//!
//! # Offset bookkeeping
//!
//! ```text
//! play():   offset     = paused_at mod duration
//!           started_at = now - offset
//! pause():  paused_at  = now - started_at
//! poll():   now - started_at >= duration  →  stopped, paused_at = 0
//! ```
//!
//! [`play`]: PlaybackTransport::play
//! [`release`]: PlaybackTransport::release

use std::sync::Arc;

use super::decode::DecodedAudio;
use super::output::OutputError;

// ---------------------------------------------------------------------------
// OutputContext / OutputFactory
// ---------------------------------------------------------------------------

/// An open audio output with its own monotonic clock.
pub trait OutputContext {
    /// Seconds elapsed on this context's clock.
    fn now(&self) -> f64;

    /// Begin rendering `audio` from `offset_secs`, replacing anything that
    /// was playing.
    fn start(&mut self, audio: &Arc<DecodedAudio>, offset_secs: f64) -> Result<(), OutputError>;

    /// Silence output.  The context stays open.
    fn stop(&mut self);
}

/// Opens [`OutputContext`]s.  Called at most once per transport lifetime
/// between releases.
pub trait OutputFactory {
    type Context: OutputContext;

    fn open(&self) -> Result<Self::Context, OutputError>;
}

// ---------------------------------------------------------------------------
// PlaybackStatus
// ---------------------------------------------------------------------------

/// Result of a [`PlaybackTransport::poll`] tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStatus {
    /// Nothing is playing.
    Stopped,
    /// Output is running.
    Playing,
    /// Output reached the end of the buffer during this tick.
    Finished,
}

// ---------------------------------------------------------------------------
// PlaybackTransport
// ---------------------------------------------------------------------------

/// Transport controls for one [`DecodedAudio`] buffer.
pub struct PlaybackTransport<F: OutputFactory> {
    factory: F,
    context: Option<F::Context>,
    audio: Option<Arc<DecodedAudio>>,
    /// Context time that corresponds to offset 0 of the running buffer.
    started_at: f64,
    /// Offset to resume from on the next `play()`.
    paused_at: f64,
    playing: bool,
}

impl<F: OutputFactory> PlaybackTransport<F> {
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            context: None,
            audio: None,
            started_at: 0.0,
            paused_at: 0.0,
            playing: false,
        }
    }

    /// Attach the buffer to play.  Stops any current output and rewinds to 0.
    pub fn load(&mut self, audio: Arc<DecodedAudio>) {
        self.stop_output();
        self.paused_at = 0.0;
        self.audio = Some(audio);
    }

    /// Whether a buffer is attached.
    pub fn is_loaded(&self) -> bool {
        self.audio.is_some()
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Whether the output context is currently open.
    pub fn has_context(&self) -> bool {
        self.context.is_some()
    }

    /// Duration of the attached buffer, or 0 when nothing is loaded.
    pub fn duration_secs(&self) -> f64 {
        self.audio.as_ref().map_or(0.0, |a| a.duration_secs())
    }

    /// Current playback position in seconds.
    pub fn position_secs(&self) -> f64 {
        match (&self.context, self.playing) {
            (Some(ctx), true) => (ctx.now() - self.started_at).min(self.duration_secs()),
            _ => self.paused_at,
        }
    }

    /// Start (or resume) output.  Opens the context on first use.
    ///
    /// A no-op while already playing.
    pub fn play(&mut self) -> Result<(), OutputError> {
        if self.playing {
            return Ok(());
        }
        let audio = self.audio.clone().ok_or(OutputError::NothingLoaded)?;

        if self.context.is_none() {
            let ctx = self.factory.open()?;
            log::info!("playback: output context opened");
            self.context = Some(ctx);
        }
        let Some(ctx) = self.context.as_mut() else {
            return Err(OutputError::NothingLoaded);
        };

        let duration = audio.duration_secs();
        let offset = if duration > 0.0 {
            self.paused_at % duration
        } else {
            0.0
        };

        ctx.start(&audio, offset)?;
        self.started_at = ctx.now() - offset;
        self.playing = true;
        log::debug!("playback: started at offset {offset:.3}s of {duration:.3}s");
        Ok(())
    }

    /// Stop output and remember the position for the next `play()`.
    pub fn pause(&mut self) {
        if !self.playing {
            return;
        }
        if let Some(ctx) = self.context.as_mut() {
            ctx.stop();
            self.paused_at = ctx.now() - self.started_at;
        }
        self.playing = false;
        log::debug!("playback: paused at {:.3}s", self.paused_at);
    }

    /// Play when paused, pause when playing.
    pub fn toggle(&mut self) -> Result<(), OutputError> {
        if self.playing {
            self.pause();
            Ok(())
        } else {
            self.play()
        }
    }

    /// Detect natural end of playback.  Call once per UI frame.
    ///
    /// On completion the resume offset is reset to 0 so the next `play()`
    /// starts from the beginning.
    pub fn poll(&mut self) -> PlaybackStatus {
        if !self.playing {
            return PlaybackStatus::Stopped;
        }
        let duration = self.duration_secs();
        let Some(ctx) = self.context.as_mut() else {
            self.playing = false;
            return PlaybackStatus::Stopped;
        };

        if ctx.now() - self.started_at >= duration {
            ctx.stop();
            self.playing = false;
            self.paused_at = 0.0;
            log::debug!("playback: reached end of buffer");
            PlaybackStatus::Finished
        } else {
            PlaybackStatus::Playing
        }
    }

    /// Stop output, close the context and drop the buffer.
    pub fn release(&mut self) {
        self.stop_output();
        if self.context.take().is_some() {
            log::info!("playback: output context closed");
        }
        self.audio = None;
        self.paused_at = 0.0;
        self.started_at = 0.0;
    }

    fn stop_output(&mut self) {
        if self.playing {
            if let Some(ctx) = self.context.as_mut() {
                ctx.stop();
            }
            self.playing = false;
        }
    }
}

impl<F: OutputFactory> Drop for PlaybackTransport<F> {
    fn drop(&mut self) {
        self.release();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
