//! CityLens viewer — egui/eframe application.
//!
//! # Architecture
//!
//! [`CityLensApp`] is the top-level [`eframe::App`].  It reads the
//! [`SharedSession`] once per frame, sends [`ScanCommand`]s to the
//! orchestrator task, and owns the narration [`PlaybackTransport`].
//!
//! # Views
//!
//! | State | Visual |
//! |-------|--------|
//! | `Idle` | Title, tagline, path field, "Start Scanning" |
//! | `Analyzing` | Dimmed photo, "Exploring..." and three stage rows |
//! | `Ready` | Photo, "← New Scan", info card after a short reveal delay |
//! | `Error` | "Scan Failed" card with "Try Again" |

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use eframe::egui;
use tokio::sync::mpsc;

use crate::audio::{CpalOutputFactory, OutputFactory, PlaybackStatus, PlaybackTransport};
use crate::config::AppConfig;
use crate::photo::Photo;
use crate::pipeline::{
    lock_session, PipelineStage, ScanCommand, ScanError, SessionState, SharedSession, StageBoard,
};

const ACCENT: egui::Color32 = egui::Color32::from_rgb(56, 189, 248);
const DONE: egui::Color32 = egui::Color32::from_rgb(80, 200, 120);
const FAILED: egui::Color32 = egui::Color32::from_rgb(248, 113, 113);
const MUTED: egui::Color32 = egui::Color32::from_rgb(140, 140, 150);
const CARD_FILL: egui::Color32 = egui::Color32::from_rgba_premultiplied(18, 18, 24, 230);

// ---------------------------------------------------------------------------
// CityLensApp
// ---------------------------------------------------------------------------

/// eframe application — the CityLens viewer.
///
/// Generic over the audio output so the playback lifecycle can be driven
/// without a sound device.
pub struct CityLensApp<F: OutputFactory = CpalOutputFactory> {
    // ── Pipeline ─────────────────────────────────────────────────────────
    session: SharedSession,
    scan_tx: mpsc::Sender<ScanCommand>,

    // ── Per-frame snapshot of the session ────────────────────────────────
    view: SessionState,
    stages: StageBoard,
    seen_revision: Option<u64>,

    // ── Presentation ─────────────────────────────────────────────────────
    transport: PlaybackTransport<F>,
    /// Uploaded photo plus the address of the bytes it was built from.
    photo_texture: Option<(usize, egui::TextureHandle)>,
    /// When the session entered `Ready` (drives the card reveal).
    ready_since: Option<Instant>,
    path_input: String,
    playback_error: Option<String>,

    config: AppConfig,
}

impl CityLensApp<CpalOutputFactory> {
    /// Create a new [`CityLensApp`] playing through the default device.
    ///
    /// * `session` — shared session, also written by the orchestrator.
    /// * `scan_tx` — sender end of the orchestrator command channel.
    /// * `config`  — loaded application configuration.
    pub fn new(session: SharedSession, scan_tx: mpsc::Sender<ScanCommand>, config: AppConfig) -> Self {
        Self::with_output(session, scan_tx, config, CpalOutputFactory)
    }
}

impl<F: OutputFactory> CityLensApp<F> {
    /// Create a new [`CityLensApp`] with an explicit audio output.
    pub fn with_output(
        session: SharedSession,
        scan_tx: mpsc::Sender<ScanCommand>,
        config: AppConfig,
        output: F,
    ) -> Self {
        Self {
            session,
            scan_tx,
            view: SessionState::Idle,
            stages: StageBoard::new(),
            seen_revision: None,
            transport: PlaybackTransport::new(output),
            photo_texture: None,
            ready_since: None,
            path_input: String::new(),
            playback_error: None,
            config,
        }
    }

    // ── Session sync ─────────────────────────────────────────────────────

    /// Copy the session into the frame snapshot when it changed, and react
    /// to transitions (audio load / release).  Returns `true` on a change.
    fn sync_session(&mut self) -> bool {
        let (state, stages) = {
            let session = lock_session(&self.session);
            if self.seen_revision == Some(session.revision()) {
                return false;
            }
            self.seen_revision = Some(session.revision());
            (session.state().clone(), session.stages().clone())
        };
        log::debug!("ui: session is {}", state.label());

        let was_ready = matches!(self.view, SessionState::Ready { .. });
        match &state {
            SessionState::Ready { audio, .. } if !was_ready => {
                self.transport.load(Arc::clone(audio));
                self.ready_since = Some(Instant::now());
                self.playback_error = None;
            }
            SessionState::Ready { .. } => {}
            _ => {
                if self.transport.is_loaded() {
                    self.transport.release();
                }
                self.ready_since = None;
            }
        }

        self.view = state;
        self.stages = stages;
        true
    }

    /// Upload (or drop) the background texture for the current photo.
    fn sync_texture(&mut self, ctx: &egui::Context) {
        match self.view.photo().cloned() {
            Some(photo) => self.ensure_texture(ctx, &photo),
            None => self.photo_texture = None,
        }
    }

    fn ensure_texture(&mut self, ctx: &egui::Context, photo: &Photo) {
        let key = photo.bytes().as_ptr() as usize;
        if matches!(&self.photo_texture, Some((k, _)) if *k == key) {
            return;
        }
        self.photo_texture = match photo.decode_rgba() {
            Ok((w, h, rgba)) => {
                let image = egui::ColorImage::from_rgba_unmultiplied([w as usize, h as usize], &rgba);
                let handle = ctx.load_texture(photo.label().to_string(), image, egui::TextureOptions::LINEAR);
                Some((key, handle))
            }
            Err(e) => {
                log::warn!("ui: cannot display {}: {e}", photo.label());
                None
            }
        };
    }

    // ── Actions ──────────────────────────────────────────────────────────

    fn start_scan(&mut self, photo: Photo) {
        if self.view.is_busy() {
            return;
        }
        log::info!("ui: scan requested for {}", photo.label());
        if let Err(e) = self.scan_tx.try_send(ScanCommand::Scan(photo)) {
            log::error!("ui: could not queue scan: {e}");
        }
    }

    fn scan_path(&mut self, path: &Path) {
        match Photo::load(path) {
            Ok(photo) => self.start_scan(photo),
            Err(e) => {
                log::warn!("ui: {e}");
                lock_session(&self.session).report(ScanError::Photo(e));
            }
        }
    }

    /// Start a scan from the first file dropped on the window this frame.
    fn handle_dropped_files(&mut self, ctx: &egui::Context) {
        let dropped = ctx.input(|i| i.raw.dropped_files.first().cloned());
        let Some(file) = dropped else {
            return;
        };
        if let Some(bytes) = file.bytes {
            let label = if file.name.is_empty() { "dropped image".to_string() } else { file.name };
            match Photo::from_bytes(bytes, label) {
                Ok(photo) => self.start_scan(photo),
                Err(e) => lock_session(&self.session).report(ScanError::Photo(e)),
            }
        } else if let Some(path) = file.path {
            self.scan_path(&path);
        }
    }

    /// Back to idle.  Releases the output context and the decoded audio.
    fn reset(&mut self) {
        self.transport.release();
        self.playback_error = None;
        lock_session(&self.session).reset();
    }

    /// Release the output context on teardown.
    fn shutdown(&mut self) {
        self.transport.release();
    }

    fn toggle_playback(&mut self) {
        if let Err(e) = self.transport.toggle() {
            log::error!("ui: playback failed: {e}");
            self.playback_error = Some(e.to_string());
        }
    }

    // ── Background ───────────────────────────────────────────────────────

    /// Paint the photo over `rect`, cropped to fill, tinted by `shade`.
    fn draw_photo(&self, ui: &egui::Ui, rect: egui::Rect, shade: u8) {
        let Some((_, texture)) = &self.photo_texture else {
            return;
        };
        let uv = cover_uv(texture.size_vec2(), rect.size());
        ui.painter()
            .image(texture.id(), rect, uv, egui::Color32::from_gray(shade));
    }

    // ── State-specific panel renderers ───────────────────────────────────

    /// Render the Idle view: title, tagline, path field.
    fn draw_idle(&mut self, ui: &mut egui::Ui) {
        let mut submitted = false;
        ui.vertical_centered(|ui| {
            ui.add_space(ui.available_height() * 0.25);
            ui.label(egui::RichText::new("CityLens").size(36.0).strong().color(ACCENT));
            ui.add_space(8.0);
            ui.label(
                egui::RichText::new("Point your camera at any landmark to reveal its hidden history.")
                    .size(14.0)
                    .color(egui::Color32::from_gray(200)),
            );
            ui.add_space(24.0);

            let field = ui.add(
                egui::TextEdit::singleline(&mut self.path_input)
                    .hint_text("Path to a photo…")
                    .desired_width(280.0),
            );
            let entered = field.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));

            ui.add_space(8.0);
            let button = egui::Button::new(egui::RichText::new("Start Scanning").size(16.0))
                .min_size(egui::vec2(200.0, 40.0));
            let clicked = ui
                .add_enabled(!self.path_input.trim().is_empty(), button)
                .clicked();
            submitted = clicked || entered;

            ui.add_space(12.0);
            ui.label(egui::RichText::new("or drop an image onto this window").size(11.0).color(MUTED));
        });

        if submitted && !self.path_input.trim().is_empty() {
            let path = self.path_input.trim().to_string();
            self.scan_path(Path::new(&path));
        }
    }

    /// Render the Analyzing view: heading and stage rows.
    fn draw_analyzing(&self, ui: &mut egui::Ui, ctx: &egui::Context) {
        let pulse = pulse(ctx.input(|i| i.time));
        ui.vertical_centered(|ui| {
            ui.add_space(ui.available_height() * 0.35);
            ui.add(egui::Spinner::new().size(28.0).color(ACCENT));
            ui.add_space(12.0);
            ui.label(egui::RichText::new("Exploring...").size(24.0).strong().color(egui::Color32::WHITE));
            ui.add_space(16.0);

            for row in self.stages.rows() {
                let look = stage_look(row, pulse);
                ui.label(
                    egui::RichText::new(format!("{}  {}", look.icon, row.label))
                        .size(14.0)
                        .color(look.color),
                );
                ui.add_space(4.0);
            }
        });
        // ~30 fps for the pulse and spinner
        ctx.request_repaint_after(Duration::from_millis(33));
    }

    /// Render the Ready view: back button and the info card.
    fn draw_ready(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) {
        let SessionState::Ready { landmark, .. } = &self.view else {
            return;
        };
        let landmark = landmark.clone();

        if ui
            .add(egui::Button::new(egui::RichText::new("← New Scan").size(13.0)))
            .clicked()
        {
            self.reset();
            return;
        }

        let delay = Duration::from_millis(self.config.ui.reveal_delay_ms);
        let Some(since) = self.ready_since else {
            return;
        };
        if !is_revealed(since.elapsed(), delay) {
            ctx.request_repaint_after(delay.saturating_sub(since.elapsed()));
            return;
        }

        let max_sources = self.config.ui.max_sources;
        let playing = self.transport.is_playing();
        let mut toggle = false;

        ui.with_layout(egui::Layout::bottom_up(egui::Align::Min), |ui| {
            egui::Frame::new()
                .fill(CARD_FILL)
                .corner_radius(egui::CornerRadius::same(16))
                .inner_margin(egui::Margin::same(16))
                .show(ui, |ui| {
                    ui.set_width(ui.available_width());
                    ui.with_layout(egui::Layout::top_down(egui::Align::Min), |ui| {
                        ui.horizontal(|ui| {
                            ui.vertical(|ui| {
                                ui.label(
                                    egui::RichText::new(&landmark.name)
                                        .size(20.0)
                                        .strong()
                                        .color(egui::Color32::WHITE),
                                );
                                ui.label(egui::RichText::new("LIVE KNOWLEDGE").size(10.0).strong().color(ACCENT));
                            });
                            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                                let button = egui::Button::new(egui::RichText::new(play_label(playing)).size(18.0))
                                    .min_size(egui::vec2(48.0, 48.0))
                                    .corner_radius(egui::CornerRadius::same(24));
                                if ui.add(button).clicked() {
                                    toggle = true;
                                }
                            });
                        });

                        if let Some(err) = &self.playback_error {
                            ui.label(egui::RichText::new(err).size(11.0).color(FAILED));
                        }

                        ui.add_space(8.0);
                        egui::ScrollArea::vertical().max_height(180.0).show(ui, |ui| {
                            ui.label(
                                egui::RichText::new(&landmark.description)
                                    .size(14.0)
                                    .color(egui::Color32::from_gray(220)),
                            );
                        });

                        let sources = landmark.top_sources(max_sources);
                        if !sources.is_empty() {
                            ui.add_space(8.0);
                            ui.separator();
                            ui.label(egui::RichText::new("Sources").size(11.0).strong().color(MUTED));
                            for source in sources {
                                ui.hyperlink_to(egui::RichText::new(&source.title).size(12.0), &source.uri);
                            }
                        }
                    });
                });
        });

        if toggle {
            self.toggle_playback();
        }
    }

    /// Render the Error view: message and "Try Again".
    fn draw_error(&mut self, ui: &mut egui::Ui) {
        let SessionState::Error { error, .. } = &self.view else {
            return;
        };
        let message = error.to_string();
        let detail = error.detail();

        let mut retry = false;
        ui.vertical_centered(|ui| {
            ui.add_space(ui.available_height() * 0.3);
            egui::Frame::new()
                .fill(CARD_FILL)
                .corner_radius(egui::CornerRadius::same(16))
                .inner_margin(egui::Margin::same(20))
                .show(ui, |ui| {
                    ui.vertical_centered(|ui| {
                        ui.label(egui::RichText::new("Scan Failed").size(20.0).strong().color(FAILED));
                        ui.add_space(8.0);
                        ui.label(egui::RichText::new(message).size(14.0).color(egui::Color32::WHITE));
                        if let Some(detail) = detail {
                            ui.label(egui::RichText::new(detail).size(11.0).color(MUTED));
                        }
                        ui.add_space(12.0);
                        retry = ui
                            .add(egui::Button::new("Try Again").min_size(egui::vec2(140.0, 32.0)))
                            .clicked();
                    });
                });
        });

        if retry {
            self.reset();
        }
    }
}

// ---------------------------------------------------------------------------
// eframe::App impl
// ---------------------------------------------------------------------------

impl<F: OutputFactory> eframe::App for CityLensApp<F> {
    /// Called every frame by eframe.  Syncs the session, advances playback,
    /// then renders the current view.
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        if self.sync_session() {
            self.sync_texture(ctx);
        }

        if !self.view.is_busy() {
            self.handle_dropped_files(ctx);
        }

        match self.transport.poll() {
            PlaybackStatus::Playing => ctx.request_repaint_after(Duration::from_millis(100)),
            PlaybackStatus::Finished => log::info!("ui: narration finished"),
            PlaybackStatus::Stopped => {}
        }

        // The orchestrator does not wake the UI; poll while a run is active.
        if self.view.is_busy() {
            ctx.request_repaint_after(Duration::from_millis(100));
        } else if matches!(self.view, SessionState::Idle) {
            ctx.request_repaint_after(Duration::from_millis(250));
        }

        let frame = egui::Frame::new()
            .fill(egui::Color32::from_rgb(10, 10, 14))
            .inner_margin(egui::Margin::same(16));

        egui::CentralPanel::default().frame(frame).show(ctx, |ui| {
            let full = ui.max_rect().expand(16.0);

            let view = self.view.clone();
            match view {
                SessionState::Idle => self.draw_idle(ui),
                SessionState::Analyzing { .. } => {
                    self.draw_photo(ui, full, 70);
                    self.draw_analyzing(ui, ctx);
                }
                SessionState::Ready { .. } => {
                    self.draw_photo(ui, full, 220);
                    self.draw_ready(ui, ctx);
                }
                SessionState::Error { .. } => {
                    self.draw_photo(ui, full, 50);
                    self.draw_error(ui);
                }
            }
        });
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        self.shutdown();
        log::info!("CityLens closing");
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Icon and colour for one stage row.
#[derive(Debug, Clone, Copy, PartialEq)]
struct StageLook {
    icon: &'static str,
    color: egui::Color32,
}

fn stage_look(row: &PipelineStage, pulse: f32) -> StageLook {
    if row.completed {
        StageLook { icon: "✓", color: DONE }
    } else if row.active {
        StageLook {
            icon: "●",
            color: egui::Color32::WHITE.gamma_multiply(pulse),
        }
    } else {
        StageLook {
            icon: "○",
            color: MUTED.gamma_multiply(0.5),
        }
    }
}

/// Brightness in `[0.35, 1.0]` oscillating once per second.
fn pulse(time: f64) -> f32 {
    let wave = 0.5 + 0.5 * (time * std::f64::consts::TAU).sin();
    (0.35 + 0.65 * wave) as f32
}

fn is_revealed(elapsed: Duration, delay: Duration) -> bool {
    elapsed >= delay
}

fn play_label(playing: bool) -> &'static str {
    if playing {
        "⏸"
    } else {
        "▶"
    }
}

/// Texture coordinates that crop an image of `image` size so it fills
/// `target` without distortion.
fn cover_uv(image: egui::Vec2, target: egui::Vec2) -> egui::Rect {
    let full = egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0));
    if image.x <= 0.0 || image.y <= 0.0 || target.x <= 0.0 || target.y <= 0.0 {
        return full;
    }
    let image_aspect = image.x / image.y;
    let target_aspect = target.x / target.y;
    if image_aspect > target_aspect {
        // Wider than the target: crop left and right.
        let visible = target_aspect / image_aspect;
        let margin = (1.0 - visible) / 2.0;
        egui::Rect::from_min_max(egui::pos2(margin, 0.0), egui::pos2(1.0 - margin, 1.0))
    } else {
        let visible = image_aspect / target_aspect;
        let margin = (1.0 - visible) / 2.0;
        egui::Rect::from_min_max(egui::pos2(0.0, margin), egui::pos2(1.0, 1.0 - margin))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::transport::tests::{Event, FakeOutputFactory};
    use crate::audio::{decode_pcm16, AudioFormat};
    use crate::gateway::{Enrichment, Source};
    use crate::pipeline::{new_shared_session, LandmarkRecord, Stage};

    // ---- Playback lifecycle ---

    fn app_with_fake_output() -> (CityLensApp<FakeOutputFactory>, FakeOutputFactory, SharedSession) {
        let session = new_shared_session();
        let (scan_tx, _scan_rx) = mpsc::channel(4);
        let output = FakeOutputFactory::default();
        let app = CityLensApp::with_output(Arc::clone(&session), scan_tx, AppConfig::default(), output.clone());
        (app, output, session)
    }

    fn photo() -> Photo {
        Photo::from_bytes(vec![0xFF, 0xD8, 0xFF, 0xE0], "tower.jpg").unwrap()
    }

    /// Drive the session straight to `Ready` with one second of narration.
    fn reach_ready(session: &SharedSession) {
        let mut guard = lock_session(session);
        let run = guard.begin_scan(photo()).unwrap();
        for stage in Stage::ALL {
            guard.complete_stage(run, stage);
        }
        let landmark = LandmarkRecord::new(
            "Eiffel Tower, Paris",
            Enrichment {
                description: "Iron lattice tower.".into(),
                sources: vec![Source::new("A", "http://a")],
            },
        );
        let audio = Arc::new(decode_pcm16(&[0u8; 48_000], AudioFormat::default()).unwrap());
        assert!(guard.finish(run, landmark, audio));
    }

    /// Sync into `Ready` and start playback, opening the output context.
    fn playing_app() -> (CityLensApp<FakeOutputFactory>, FakeOutputFactory, SharedSession) {
        let (mut app, output, session) = app_with_fake_output();
        reach_ready(&session);
        assert!(app.sync_session());
        assert!(app.transport.is_loaded());
        app.toggle_playback();
        assert!(app.transport.is_playing());
        assert_eq!(output.events(), vec![Event::Open, Event::Start(0.0)]);
        (app, output, session)
    }

    #[test]
    fn sync_is_a_no_op_without_session_changes() {
        let (mut app, _output, session) = app_with_fake_output();
        assert!(app.sync_session());
        assert!(!app.sync_session());
        reach_ready(&session);
        assert!(app.sync_session());
        assert!(!app.sync_session());
    }

    #[test]
    fn new_scan_releases_output_context() {
        let (mut app, output, session) = playing_app();

        app.reset();
        app.sync_session();

        assert_eq!(output.events().last(), Some(&Event::Close));
        assert!(!app.transport.has_context());
        assert!(!app.transport.is_loaded());
        assert!(matches!(lock_session(&session).state(), SessionState::Idle));
        assert!(matches!(app.view, SessionState::Idle));
    }

    #[test]
    fn rescan_from_ready_releases_output_context() {
        let (mut app, output, session) = playing_app();

        lock_session(&session).begin_scan(photo()).unwrap();
        assert!(app.sync_session());

        assert_eq!(output.events().last(), Some(&Event::Close));
        assert!(!app.transport.has_context());
        assert!(app.view.is_busy());
        assert!(app.ready_since.is_none());
    }

    #[test]
    fn shutdown_releases_output_context() {
        let (mut app, output, _session) = playing_app();

        app.shutdown();

        assert_eq!(output.events().last(), Some(&Event::Close));
        assert!(!app.transport.has_context());
    }

    #[test]
    fn dropping_app_releases_output_context() {
        let (app, output, _session) = playing_app();
        drop(app);
        assert_eq!(output.events().last(), Some(&Event::Close));
    }

    // ---- Helpers ---

    fn row(active: bool, completed: bool) -> PipelineStage {
        PipelineStage {
            label: "x",
            active,
            completed,
        }
    }

    #[test]
    fn stage_rows_render_by_flags() {
        assert_eq!(stage_look(&row(false, true), 1.0).icon, "✓");
        assert_eq!(stage_look(&row(true, false), 1.0).icon, "●");
        assert_eq!(stage_look(&row(false, false), 1.0).icon, "○");
    }

    #[test]
    fn pulse_stays_in_range() {
        for i in 0..100 {
            let p = pulse(i as f64 * 0.037);
            assert!((0.35..=1.0001).contains(&p), "pulse {p} out of range");
        }
    }

    #[test]
    fn card_reveals_after_delay() {
        let delay = Duration::from_millis(500);
        assert!(!is_revealed(Duration::from_millis(499), delay));
        assert!(is_revealed(Duration::from_millis(500), delay));
        assert!(is_revealed(Duration::from_millis(0), Duration::ZERO));
    }

    #[test]
    fn play_button_reflects_state() {
        assert_eq!(play_label(false), "▶");
        assert_eq!(play_label(true), "⏸");
    }

    #[test]
    fn cover_uv_crops_wide_image() {
        let uv = cover_uv(egui::vec2(200.0, 100.0), egui::vec2(100.0, 100.0));
        assert!((uv.min.x - 0.25).abs() < 1e-6);
        assert!((uv.max.x - 0.75).abs() < 1e-6);
        assert_eq!(uv.min.y, 0.0);
        assert_eq!(uv.max.y, 1.0);
    }

    #[test]
    fn cover_uv_crops_tall_image() {
        let uv = cover_uv(egui::vec2(100.0, 400.0), egui::vec2(100.0, 200.0));
        assert_eq!(uv.min.x, 0.0);
        assert!((uv.min.y - 0.25).abs() < 1e-6);
        assert!((uv.max.y - 0.75).abs() < 1e-6);
    }

    #[test]
    fn cover_uv_degenerate_sizes_use_full_image() {
        let uv = cover_uv(egui::vec2(0.0, 0.0), egui::vec2(100.0, 100.0));
        assert_eq!(uv, egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)));
    }
}
