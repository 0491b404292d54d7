//! Scan session state machine and shared session handle.
//!
//! [`SessionState`] is a sum type: each variant carries exactly the payload
//! that is valid for it, so "ready without audio" or "error without a
//! message" cannot be represented.  Transitions always replace the whole
//! value.
//!
//! [`StageBoard`] holds the three per-stage progress rows shown on the
//! loading overlay.  The rows are allocated once and only ever reset.
//!
//! [`SharedSession`] is a type alias for `Arc<Mutex<Session>>` — cheap to
//! clone and safe to share between the UI thread and the pipeline task.
//!
//! ```text
//! Idle ──scan──▶ Analyzing ──identify/enrich/narrate ok──▶ Ready
//!                   │
//!                   └──any failure──▶ Error
//! Ready / Error ──scan──▶ Analyzing      (stages reset first)
//! any ──reset──▶ Idle
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::audio::DecodedAudio;
use crate::gateway::{Enrichment, Source};
use crate::photo::Photo;

use super::runner::ScanError;

// ---------------------------------------------------------------------------
// LandmarkRecord
// ---------------------------------------------------------------------------

/// What the card shows.  Built once per successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LandmarkRecord {
    pub name: String,
    pub description: String,
    pub sources: Vec<Source>,
}

impl LandmarkRecord {
    pub fn new(name: impl Into<String>, enrichment: Enrichment) -> Self {
        Self {
            name: name.into(),
            description: enrichment.description,
            sources: enrichment.sources,
        }
    }

    /// At most `max` citations, in service order.
    pub fn top_sources(&self, max: usize) -> &[Source] {
        &self.sources[..self.sources.len().min(max)]
    }
}

// ---------------------------------------------------------------------------
// Stage / PipelineStage / StageBoard
// ---------------------------------------------------------------------------

/// The three pipeline steps, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Identify,
    Enrich,
    Narrate,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Identify, Stage::Enrich, Stage::Narrate];

    pub fn index(self) -> usize {
        match self {
            Stage::Identify => 0,
            Stage::Enrich => 1,
            Stage::Narrate => 2,
        }
    }

    /// Progress label shown on the loading overlay.
    pub fn label(self) -> &'static str {
        match self {
            Stage::Identify => "Analyzing visual features...",
            Stage::Enrich => "Consulting knowledge base...",
            Stage::Narrate => "Synthesizing guide narration...",
        }
    }

    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Identify => Some(Stage::Enrich),
            Stage::Enrich => Some(Stage::Narrate),
            Stage::Narrate => None,
        }
    }
}

/// One progress row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineStage {
    pub label: &'static str,
    pub active: bool,
    pub completed: bool,
}

/// The three progress rows, in [`Stage`] order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageBoard {
    stages: [PipelineStage; 3],
}

impl StageBoard {
    /// All rows inactive and incomplete.
    pub fn new() -> Self {
        Self {
            stages: Stage::ALL.map(|s| PipelineStage {
                label: s.label(),
                active: false,
                completed: false,
            }),
        }
    }

    /// Back to all-inactive.
    pub fn reset(&mut self) {
        for row in &mut self.stages {
            row.active = false;
            row.completed = false;
        }
    }

    /// Reset, then mark the first stage active.
    pub fn start_run(&mut self) {
        self.reset();
        self.stages[Stage::Identify.index()].active = true;
    }

    /// Mark `stage` done and activate the one after it.
    pub fn complete(&mut self, stage: Stage) {
        let row = &mut self.stages[stage.index()];
        row.active = false;
        row.completed = true;
        if let Some(next) = stage.next() {
            self.stages[next.index()].active = true;
        }
    }

    pub fn get(&self, stage: Stage) -> &PipelineStage {
        &self.stages[stage.index()]
    }

    pub fn rows(&self) -> &[PipelineStage; 3] {
        &self.stages
    }

    /// The currently active stage, if any.
    pub fn current(&self) -> Option<Stage> {
        Stage::ALL.into_iter().find(|s| self.get(*s).active)
    }
}

impl Default for StageBoard {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// What the session is doing, with exactly the data valid for that phase.
#[derive(Debug, Clone, Default)]
pub enum SessionState {
    /// Waiting for a photo.
    #[default]
    Idle,

    /// A run is in flight for `photo`.
    Analyzing { photo: Photo },

    /// The run succeeded.
    Ready {
        photo: Photo,
        landmark: LandmarkRecord,
        audio: Arc<DecodedAudio>,
    },

    /// The run (or loading the photo) failed.
    Error {
        photo: Option<Photo>,
        error: ScanError,
    },
}

impl SessionState {
    /// Returns `true` while a run is in flight.
    ///
    /// ```
    /// use citylens::pipeline::SessionState;
    ///
    /// assert!(!SessionState::Idle.is_busy());
    /// ```
    pub fn is_busy(&self) -> bool {
        matches!(self, SessionState::Analyzing { .. })
    }

    /// A short human-readable label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Analyzing { .. } => "analyzing",
            SessionState::Ready { .. } => "ready",
            SessionState::Error { .. } => "error",
        }
    }

    /// The photo being shown, if any.
    pub fn photo(&self) -> Option<&Photo> {
        match self {
            SessionState::Idle => None,
            SessionState::Analyzing { photo } | SessionState::Ready { photo, .. } => Some(photo),
            SessionState::Error { photo, .. } => photo.as_ref(),
        }
    }

    /// User-facing error message in the `Error` state.
    pub fn error_message(&self) -> Option<String> {
        match self {
            SessionState::Error { error, .. } => Some(error.to_string()),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Identifies one pipeline run.  Updates carrying an older ticket are
/// ignored, so a reset invalidates whatever was in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunTicket(u64);

/// The single per-user session: current state plus stage progress.
#[derive(Debug, Default)]
pub struct Session {
    state: SessionState,
    stages: StageBoard,
    run_id: u64,
    /// Bumped on every transition so the UI can detect changes cheaply.
    revision: u64,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn stages(&self) -> &StageBoard {
        &self.stages
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Enter `Analyzing` for `photo`.  Accepted from idle, ready or error.
    pub fn begin_scan(&mut self, photo: Photo) -> Result<RunTicket, ScanError> {
        if self.state.is_busy() {
            return Err(ScanError::Busy);
        }
        self.run_id += 1;
        self.stages.start_run();
        self.transition(SessionState::Analyzing { photo });
        Ok(RunTicket(self.run_id))
    }

    /// Whether `run` is still the live run.
    pub fn is_current(&self, run: RunTicket) -> bool {
        run.0 == self.run_id && self.state.is_busy()
    }

    /// Record that `stage` finished.  Returns `false` for a stale run.
    pub fn complete_stage(&mut self, run: RunTicket, stage: Stage) -> bool {
        if !self.is_current(run) {
            return false;
        }
        self.stages.complete(stage);
        self.revision += 1;
        true
    }

    /// Enter `Ready`.  Returns `false` for a stale run.
    pub fn finish(&mut self, run: RunTicket, landmark: LandmarkRecord, audio: Arc<DecodedAudio>) -> bool {
        if !self.is_current(run) {
            return false;
        }
        let SessionState::Analyzing { photo } = std::mem::take(&mut self.state) else {
            return false;
        };
        self.transition(SessionState::Ready {
            photo,
            landmark,
            audio,
        });
        true
    }

    /// Enter `Error`.  Stage rows are left as they were.  Returns `false` for
    /// a stale run.
    pub fn fail(&mut self, run: RunTicket, error: ScanError) -> bool {
        if !self.is_current(run) {
            return false;
        }
        let photo = self.state.photo().cloned();
        self.transition(SessionState::Error { photo, error });
        true
    }

    /// Enter `Error` for a failure that happened before any run started
    /// (e.g. the photo could not be read).  Ignored while a run is in flight.
    pub fn report(&mut self, error: ScanError) {
        if self.state.is_busy() {
            return;
        }
        self.stages.reset();
        self.transition(SessionState::Error { photo: None, error });
    }

    /// Back to `Idle`, dropping the photo, record and audio.  Any in-flight
    /// run becomes stale.
    pub fn reset(&mut self) {
        self.run_id += 1;
        self.stages.reset();
        self.transition(SessionState::Idle);
    }

    fn transition(&mut self, next: SessionState) {
        log::debug!("session: {} → {}", self.state.label(), next.label());
        self.state = next;
        self.revision += 1;
    }
}

// ---------------------------------------------------------------------------
// SharedSession
// ---------------------------------------------------------------------------

/// Thread-safe handle to [`Session`].
///
/// Cheap to clone (`Arc` clone).  Lock for a short critical section; do
/// **not** hold the lock across `.await` points.
pub type SharedSession = Arc<Mutex<Session>>;

/// Construct a new [`SharedSession`] in the `Idle` state.
pub fn new_shared_session() -> SharedSession {
    Arc::new(Mutex::new(Session::new()))
}

/// Lock a [`SharedSession`], recovering the data if a holder panicked.
pub fn lock_session(session: &SharedSession) -> MutexGuard<'_, Session> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
