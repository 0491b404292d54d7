//! Scan orchestrator — drives the identify → enrich → narrate sequence.
//!
//! [`ScanOrchestrator`] owns a [`SharedSession`] handle and responds to
//! [`ScanCommand`]s received over a `tokio::sync::mpsc` channel.
//!
//! # Pipeline flow
//!
//! ```text
//! ScanCommand::Scan(photo)
//!   └─▶ begin_scan (stages reset, stage 1 active)       [Analyzing]
//!         └─▶ gateway.identify ── "Unknown" ──▶ UnrecognizedLandmark
//!               └─▶ stage 1 done, stage 2 active
//!                     └─▶ gateway.enrich
//!                           └─▶ stage 2 done, stage 3 active
//!                                 └─▶ gateway.narrate → spawn_blocking(decode)
//!                                       └─▶ stage 3 done           [Ready]
//!   any failure ─────────────────────────────────────────▶         [Error]
//! ```
//!
//! The session lock is only taken for short transitions, never across an
//! `.await`.

use std::sync::{Arc, MutexGuard};

use thiserror::Error;
use tokio::sync::mpsc;

use crate::audio::{decode_base64_pcm16, AudioFormat, DecodeError, DecodedAudio};
use crate::gateway::{is_unknown_label, GatewayError, LandmarkGateway};
use crate::photo::{Photo, PhotoError};

use super::state::{lock_session, LandmarkRecord, RunTicket, Session, SharedSession, Stage};

// ---------------------------------------------------------------------------
// ScanError
// ---------------------------------------------------------------------------

/// Why the narration step failed.
#[derive(Debug, Clone, Error)]
pub enum NarrationFailure {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("audio payload could not be decoded: {0}")]
    Decode(#[from] DecodeError),

    /// The decode task panicked or was cancelled.
    #[error("decode task failed: {0}")]
    Internal(String),
}

/// Errors that can end a scan.
///
/// The `Display` text is the message shown on the error card; the wrapped
/// cause is available through [`std::error::Error::source`].
#[derive(Debug, Clone, Error)]
pub enum ScanError {
    #[error("Failed to identify landmark.")]
    Identification(#[source] GatewayError),

    #[error("Could not identify a landmark in this image.")]
    UnrecognizedLandmark,

    #[error("Failed to get landmark details.")]
    Enrichment(#[source] GatewayError),

    #[error("Failed to generate narration.")]
    Narration(#[source] NarrationFailure),

    /// A run is already in flight.  Returned to the caller only.
    #[error("A scan is already in progress.")]
    Busy,

    /// The session was reset while this run was in flight.  Returned to the
    /// caller only.
    #[error("The scan was discarded.")]
    Superseded,

    #[error("Could not open the photo: {0}")]
    Photo(#[from] PhotoError),
}

impl ScanError {
    /// Underlying cause, for a secondary line under the main message.
    pub fn detail(&self) -> Option<String> {
        match self {
            ScanError::Identification(e) | ScanError::Enrichment(e) => Some(e.to_string()),
            ScanError::Narration(e) => Some(e.to_string()),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// ScanCommand
// ---------------------------------------------------------------------------

/// Requests accepted by [`ScanOrchestrator::run`].
#[derive(Debug)]
pub enum ScanCommand {
    /// Run the full pipeline for this photo.
    Scan(Photo),
}

// ---------------------------------------------------------------------------
// ScanOrchestrator
// ---------------------------------------------------------------------------

/// Drives the complete scan pipeline.
///
/// Create with [`ScanOrchestrator::new`], then either call
/// [`run`](Self::run) inside a tokio task or [`scan`](Self::scan) directly.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use citylens::audio::AudioFormat;
/// use citylens::config::AppConfig;
/// use citylens::gateway::{GeminiGateway, LandmarkGateway};
/// use citylens::pipeline::{new_shared_session, ScanCommand, ScanOrchestrator};
/// use citylens::photo::Photo;
///
/// # async fn example() {
/// let config = AppConfig::default();
/// let session = new_shared_session();
/// let gateway: Arc<dyn LandmarkGateway> = Arc::new(GeminiGateway::from_config(&config.gateway));
///
/// let (scan_tx, scan_rx) = tokio::sync::mpsc::channel(4);
/// let orchestrator = ScanOrchestrator::new(session.clone(), gateway, AudioFormat::default());
/// tokio::spawn(orchestrator.run(scan_rx));
///
/// let photo = Photo::load("tower.jpg".as_ref()).unwrap();
/// scan_tx.send(ScanCommand::Scan(photo)).await.unwrap();
/// # }
/// ```
pub struct ScanOrchestrator {
    session: SharedSession,
    gateway: Arc<dyn LandmarkGateway>,
    format: AudioFormat,
}

impl ScanOrchestrator {
    /// Create a new orchestrator.
    ///
    /// # Arguments
    ///
    /// * `session` — shared session (also read by the UI).
    /// * `gateway` — generative-AI backend (e.g. `GeminiGateway`).
    /// * `format`  — PCM layout of the narration payload.
    pub fn new(session: SharedSession, gateway: Arc<dyn LandmarkGateway>, format: AudioFormat) -> Self {
        Self {
            session,
            gateway,
            format,
        }
    }

    // -----------------------------------------------------------------------
    // Main async loop
    // -----------------------------------------------------------------------

    /// Run the orchestrator until `rx` is closed.
    ///
    /// Commands are handled one at a time, so a scan sent while another is
    /// in flight waits in the channel instead of being rejected.
    pub async fn run(self, mut rx: mpsc::Receiver<ScanCommand>) {
        while let Some(command) = rx.recv().await {
            match command {
                ScanCommand::Scan(photo) => {
                    if let Err(e) = self.scan(photo).await {
                        log::debug!("pipeline: scan ended with {e:?}");
                    }
                }
            }
        }

        log::info!("pipeline: command channel closed, orchestrator shutting down");
    }

    // -----------------------------------------------------------------------
    // Single run
    // -----------------------------------------------------------------------

    /// Run one full pipeline for `photo`.
    ///
    /// On success the session ends in `Ready`; on any failure it ends in
    /// `Error` carrying the same error that is returned here.  `Busy` is
    /// returned without touching the session.  If the session was reset
    /// mid-run, the outcome is dropped and `Superseded` is returned.
    pub async fn scan(&self, photo: Photo) -> Result<(), ScanError> {
        let run = self.lock().begin_scan(photo.clone())?;
        log::info!("pipeline: scanning {}", photo.label());

        match self.execute(run, &photo).await {
            Ok((landmark, audio)) => {
                log::info!(
                    "pipeline: ready — {} ({} sources, {:.1}s narration)",
                    landmark.name,
                    landmark.sources.len(),
                    audio.duration_secs()
                );
                if self.lock().finish(run, landmark, audio) {
                    Ok(())
                } else {
                    Err(ScanError::Superseded)
                }
            }
            Err(ScanError::Superseded) => {
                log::info!("pipeline: run discarded after session reset");
                Err(ScanError::Superseded)
            }
            Err(e) => {
                if !self.lock().fail(run, e.clone()) {
                    log::info!("pipeline: run discarded after session reset ({e})");
                    return Err(ScanError::Superseded);
                }
                match e.detail() {
                    Some(detail) => log::error!("pipeline error: {e} ({detail})"),
                    None => log::error!("pipeline error: {e}"),
                }
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        run: RunTicket,
        photo: &Photo,
    ) -> Result<(LandmarkRecord, Arc<DecodedAudio>), ScanError> {
        // ── 1. Identify ──────────────────────────────────────────────────
        let label = self
            .gateway
            .identify(photo)
            .await
            .map_err(ScanError::Identification)?;
        if is_unknown_label(&label) {
            return Err(ScanError::UnrecognizedLandmark);
        }
        self.complete(run, Stage::Identify)?;

        // ── 2. Enrich ────────────────────────────────────────────────────
        let enrichment = self
            .gateway
            .enrich(&label)
            .await
            .map_err(ScanError::Enrichment)?;
        self.complete(run, Stage::Enrich)?;

        // ── 3. Narrate + decode (blocking → thread pool) ─────────────────
        let payload = self
            .gateway
            .narrate(&enrichment.description)
            .await
            .map_err(|e| ScanError::Narration(e.into()))?;

        let format = self.format;
        let audio = tokio::task::spawn_blocking(move || decode_base64_pcm16(&payload, format))
            .await
            .map_err(|e| ScanError::Narration(NarrationFailure::Internal(e.to_string())))?
            .map_err(|e| ScanError::Narration(e.into()))?;
        self.complete(run, Stage::Narrate)?;

        Ok((LandmarkRecord::new(label, enrichment), Arc::new(audio)))
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn complete(&self, run: RunTicket, stage: Stage) -> Result<(), ScanError> {
        if self.lock().complete_stage(run, stage) {
            log::debug!("pipeline: {:?} done", stage);
            Ok(())
        } else {
            Err(ScanError::Superseded)
        }
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        lock_session(&self.session)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{Enrichment, Source};
    use crate::pipeline::state::{new_shared_session, PipelineStage, SessionState};
    use async_trait::async_trait;
    use base64::Engine as _;
    use std::sync::Mutex;

    // -----------------------------------------------------------------------
    // Test doubles
    // -----------------------------------------------------------------------

    /// Canned gateway.  Records which calls were made and snapshots the stage
    /// rows at the start of each call.
    struct MockGateway {
        session: SharedSession,
        label: Result<String, GatewayError>,
        enrichment: Result<Enrichment, GatewayError>,
        audio: Result<String, GatewayError>,
        /// Reset the session from inside `enrich`, as a user would by
        /// starting over mid-run.
        reset_during_enrich: bool,
        calls: Mutex<Vec<(&'static str, [PipelineStage; 3])>>,
    }

    impl MockGateway {
        fn ok(session: &SharedSession) -> Self {
            Self {
                session: Arc::clone(session),
                label: Ok("Eiffel Tower, Paris".into()),
                enrichment: Ok(Enrichment {
                    description: "A wrought-iron lattice tower built for the 1889 World's Fair.".into(),
                    sources: vec![Source::new("A", "http://a"), Source::new("B", "http://b")],
                }),
                // 1 second of 24 kHz mono silence.
                audio: Ok(base64::engine::general_purpose::STANDARD.encode(vec![0u8; 48_000])),
                reset_during_enrich: false,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn record(&self, name: &'static str) {
            let rows = *lock_session(&self.session).stages().rows();
            self.calls.lock().unwrap().push((name, rows));
        }

        fn call_names(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().iter().map(|(n, _)| *n).collect()
        }

        fn rows_at(&self, name: &str) -> [(bool, bool); 3] {
            let calls = self.calls.lock().unwrap();
            let (_, rows) = calls
                .iter()
                .find(|(n, _)| *n == name)
                .unwrap_or_else(|| panic!("{name} was not called"));
            rows.map(|r| (r.active, r.completed))
        }
    }

    #[async_trait]
    impl LandmarkGateway for MockGateway {
        async fn identify(&self, _photo: &Photo) -> Result<String, GatewayError> {
            self.record("identify");
            self.label.clone()
        }

        async fn enrich(&self, _landmark: &str) -> Result<Enrichment, GatewayError> {
            self.record("enrich");
            if self.reset_during_enrich {
                lock_session(&self.session).reset();
            }
            self.enrichment.clone()
        }

        async fn narrate(&self, _text: &str) -> Result<String, GatewayError> {
            self.record("narrate");
            self.audio.clone()
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn photo() -> Photo {
        Photo::from_bytes(vec![0xFF, 0xD8, 0xFF, 0xE0], "tower.jpg").unwrap()
    }

    fn orchestrator(session: &SharedSession, gateway: MockGateway) -> (ScanOrchestrator, Arc<MockGateway>) {
        let gateway = Arc::new(gateway);
        let dyn_gateway: Arc<dyn LandmarkGateway> = gateway.clone();
        let orc = ScanOrchestrator::new(Arc::clone(session), dyn_gateway, AudioFormat::default());
        (orc, gateway)
    }

    fn flags(session: &SharedSession) -> [(bool, bool); 3] {
        lock_session(session).stages().rows().map(|r| (r.active, r.completed))
    }

    fn error_of(session: &SharedSession) -> ScanError {
        match lock_session(session).state() {
            SessionState::Error { error, .. } => error.clone(),
            other => panic!("expected Error, got {}", other.label()),
        }
    }

    // -----------------------------------------------------------------------
    // Tests
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn successful_scan_reaches_ready() {
        let session = new_shared_session();
        let (orc, gateway) = orchestrator(&session, MockGateway::ok(&session));

        orc.scan(photo()).await.unwrap();

        let guard = lock_session(&session);
        match guard.state() {
            SessionState::Ready { landmark, audio, photo } => {
                assert_eq!(landmark.name, "Eiffel Tower, Paris");
                assert_eq!(
                    landmark.sources,
                    vec![Source::new("A", "http://a"), Source::new("B", "http://b")]
                );
                assert!(landmark.description.contains("1889"));
                assert_eq!(audio.sample_rate(), 24_000);
                assert_eq!(audio.frame_count(), 24_000);
                assert!((audio.duration_secs() - 1.0).abs() < 1e-9);
                assert_eq!(photo.label(), "tower.jpg");
            }
            other => panic!("expected Ready, got {}", other.label()),
        }
        assert_eq!(guard.stages().rows().map(|r| r.completed), [true; 3]);
        assert_eq!(gateway.call_names(), ["identify", "enrich", "narrate"]);
    }

    #[tokio::test]
    async fn stage_rows_advance_between_calls() {
        let session = new_shared_session();
        let (orc, gateway) = orchestrator(&session, MockGateway::ok(&session));

        orc.scan(photo()).await.unwrap();

        assert_eq!(
            gateway.rows_at("identify"),
            [(true, false), (false, false), (false, false)]
        );
        assert_eq!(
            gateway.rows_at("enrich"),
            [(false, true), (true, false), (false, false)]
        );
        assert_eq!(
            gateway.rows_at("narrate"),
            [(false, true), (false, true), (true, false)]
        );
    }

    #[tokio::test]
    async fn unknown_label_is_terminal() {
        let session = new_shared_session();
        let mut mock = MockGateway::ok(&session);
        mock.label = Ok("Unknown".into());
        let (orc, gateway) = orchestrator(&session, mock);

        let err = orc.scan(photo()).await.unwrap_err();

        assert!(matches!(err, ScanError::UnrecognizedLandmark));
        assert_eq!(
            lock_session(&session).state().error_message().as_deref(),
            Some("Could not identify a landmark in this image.")
        );
        assert_eq!(gateway.call_names(), ["identify"]);
        assert!(lock_session(&session).state().photo().is_some());
    }

    #[tokio::test]
    async fn identify_failure_sets_error() {
        let session = new_shared_session();
        let mut mock = MockGateway::ok(&session);
        mock.label = Err(GatewayError::Timeout);
        let (orc, _gateway) = orchestrator(&session, mock);

        orc.scan(photo()).await.unwrap_err();

        let err = error_of(&session);
        assert!(matches!(err, ScanError::Identification(GatewayError::Timeout)));
        assert_eq!(err.to_string(), "Failed to identify landmark.");
        assert_eq!(err.detail().as_deref(), Some("request timed out"));
    }

    #[tokio::test]
    async fn enrich_failure_stops_before_narration() {
        let session = new_shared_session();
        let mut mock = MockGateway::ok(&session);
        mock.enrichment = Err(GatewayError::Status {
            status: 500,
            body: "boom".into(),
        });
        let (orc, gateway) = orchestrator(&session, mock);

        orc.scan(photo()).await.unwrap_err();

        assert_eq!(error_of(&session).to_string(), "Failed to get landmark details.");
        let rows = flags(&session);
        assert!(!rows[1].1, "stage 2 must not be completed");
        assert_eq!(rows[2], (false, false), "stage 3 must never activate");
        assert_eq!(gateway.call_names(), ["identify", "enrich"]);
    }

    #[tokio::test]
    async fn missing_audio_is_narration_failure() {
        let session = new_shared_session();
        let mut mock = MockGateway::ok(&session);
        mock.audio = Err(GatewayError::EmptyResponse);
        let (orc, _gateway) = orchestrator(&session, mock);

        orc.scan(photo()).await.unwrap_err();

        let err = error_of(&session);
        assert!(matches!(
            err,
            ScanError::Narration(NarrationFailure::Gateway(GatewayError::EmptyResponse))
        ));
        assert_eq!(err.to_string(), "Failed to generate narration.");
        assert!(!flags(&session)[2].1);
    }

    #[tokio::test]
    async fn undecodable_audio_is_narration_failure() {
        let session = new_shared_session();
        let mut mock = MockGateway::ok(&session);
        mock.audio = Ok("!!! not base64 !!!".into());
        let (orc, _gateway) = orchestrator(&session, mock);

        orc.scan(photo()).await.unwrap_err();

        assert!(matches!(
            error_of(&session),
            ScanError::Narration(NarrationFailure::Decode(DecodeError::Base64(_)))
        ));
    }

    #[tokio::test]
    async fn scan_while_busy_is_rejected() {
        let session = new_shared_session();
        lock_session(&session).begin_scan(photo()).unwrap();
        let (orc, gateway) = orchestrator(&session, MockGateway::ok(&session));

        let err = orc.scan(photo()).await.unwrap_err();

        assert!(matches!(err, ScanError::Busy));
        assert!(gateway.call_names().is_empty());
        assert!(lock_session(&session).state().is_busy());
    }

    #[tokio::test]
    async fn rescan_after_error_succeeds() {
        let session = new_shared_session();
        let mut mock = MockGateway::ok(&session);
        mock.label = Ok("unknown".into());
        let (orc, _) = orchestrator(&session, mock);
        orc.scan(photo()).await.unwrap_err();

        let (orc, gateway) = orchestrator(&session, MockGateway::ok(&session));
        orc.scan(photo()).await.unwrap();

        assert_eq!(lock_session(&session).state().label(), "ready");
        assert_eq!(
            gateway.rows_at("identify"),
            [(true, false), (false, false), (false, false)]
        );
    }

    #[tokio::test]
    async fn reset_mid_run_discards_results() {
        let session = new_shared_session();
        let mut mock = MockGateway::ok(&session);
        mock.reset_during_enrich = true;
        let (orc, gateway) = orchestrator(&session, mock);

        let err = orc.scan(photo()).await.unwrap_err();

        assert!(matches!(err, ScanError::Superseded));
        assert!(matches!(lock_session(&session).state(), SessionState::Idle));
        assert_eq!(flags(&session), [(false, false); 3]);
        assert_eq!(gateway.call_names(), ["identify", "enrich"]);
    }

    #[tokio::test]
    async fn failure_after_reset_is_discarded() {
        let session = new_shared_session();
        let mut mock = MockGateway::ok(&session);
        mock.reset_during_enrich = true;
        mock.enrichment = Err(GatewayError::Timeout);
        let (orc, gateway) = orchestrator(&session, mock);

        let err = orc.scan(photo()).await.unwrap_err();

        assert!(matches!(err, ScanError::Superseded));
        assert!(matches!(lock_session(&session).state(), SessionState::Idle));
        assert_eq!(flags(&session), [(false, false); 3]);
        assert_eq!(gateway.call_names(), ["identify", "enrich"]);
    }

    #[tokio::test]
    async fn run_loop_processes_commands_until_closed() {
        let session = new_shared_session();
        let (orc, gateway) = orchestrator(&session, MockGateway::ok(&session));

        let (tx, rx) = mpsc::channel(4);
        tx.send(ScanCommand::Scan(photo())).await.unwrap();
        tx.send(ScanCommand::Scan(photo())).await.unwrap();
        drop(tx); // close channel so run() returns

        orc.run(rx).await;

        assert_eq!(lock_session(&session).state().label(), "ready");
        assert_eq!(gateway.call_names().len(), 6);
    }

    #[test]
    fn user_messages_match_error_card() {
        assert_eq!(
            ScanError::Enrichment(GatewayError::Timeout).to_string(),
            "Failed to get landmark details."
        );
        assert_eq!(
            ScanError::Narration(NarrationFailure::Internal("x".into())).to_string(),
            "Failed to generate narration."
        );
        assert_eq!(ScanError::UnrecognizedLandmark.detail(), None);
    }
}
