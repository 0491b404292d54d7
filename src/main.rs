//! Application entry point — CityLens.
//!
//! # Startup sequence
//!
//! 1. Parse the command line.
//! 2. Initialise logging.
//! 3. Load [`AppConfig`]; on first run write the defaults to `settings.toml`.
//! 4. Create the [`tokio`] runtime (multi-thread, 2 workers).
//! 5. Build the Gemini gateway and the shared session.
//! 6. Either run one scan headless and print the card, or spawn the
//!    orchestrator and run [`eframe::run_native`] until the window closes.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use clap::Parser;
use tokio::sync::mpsc;

use citylens::{
    app::CityLensApp,
    audio::{CpalOutputFactory, PlaybackStatus, PlaybackTransport},
    config::{AppConfig, AppPaths},
    gateway::{GeminiGateway, LandmarkGateway},
    photo::Photo,
    pipeline::{lock_session, new_shared_session, ScanCommand, ScanOrchestrator, SessionState, SharedSession},
};

use eframe::egui;

// ---------------------------------------------------------------------------
// Command line
// ---------------------------------------------------------------------------

#[derive(Debug, Parser)]
#[command(name = "citylens", version, about = "Identify a landmark in a photo and hear its story")]
struct Cli {
    /// Photo to scan on startup.
    #[arg(long, short)]
    image: Option<PathBuf>,

    /// Settings file to use instead of the platform default.
    #[arg(long, env = "CITYLENS_CONFIG")]
    config: Option<PathBuf>,

    /// Scan `--image` without opening a window and print the result.
    #[arg(long, requires = "image")]
    headless: bool,

    /// With `--headless`, play the narration to completion.
    #[arg(long, requires = "headless")]
    play: bool,
}

// ---------------------------------------------------------------------------
// Native options builder
// ---------------------------------------------------------------------------

fn native_options(config: &AppConfig) -> eframe::NativeOptions {
    let (w, h) = config.ui.window_size;
    let vp = egui::ViewportBuilder::default()
        .with_title("CityLens")
        .with_inner_size([w, h])
        .with_min_inner_size([320.0, 480.0])
        .with_drag_and_drop(true);

    eframe::NativeOptions {
        viewport: vp,
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------
// Headless
// ---------------------------------------------------------------------------

fn run_headless(
    rt: &tokio::runtime::Runtime,
    orchestrator: &ScanOrchestrator,
    session: &SharedSession,
    photo: Photo,
    config: &AppConfig,
    play: bool,
) -> anyhow::Result<()> {
    let outcome = rt.block_on(orchestrator.scan(photo));

    let state = lock_session(session).state().clone();
    let SessionState::Ready { landmark, audio, .. } = state else {
        let err = outcome.err().map(|e| match e.detail() {
            Some(detail) => format!("{e} ({detail})"),
            None => e.to_string(),
        });
        return Err(anyhow!(err.unwrap_or_else(|| "scan did not complete".into())));
    };

    println!("{}", landmark.name);
    println!();
    println!("{}", landmark.description);
    let sources = landmark.top_sources(config.ui.max_sources);
    if !sources.is_empty() {
        println!();
        println!("Sources:");
        for source in sources {
            println!("  - {} <{}>", source.title, source.uri);
        }
    }
    println!();
    println!("Narration: {:.1}s", audio.duration_secs());

    if play {
        let mut transport = PlaybackTransport::new(CpalOutputFactory);
        transport.load(audio);
        transport.play().context("failed to start playback")?;
        while transport.poll() == PlaybackStatus::Playing {
            std::thread::sleep(Duration::from_millis(50));
        }
        transport.release();
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> anyhow::Result<()> {
    // 1. Command line
    let cli = Cli::parse();

    // 2. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("CityLens starting up");

    // 3. Configuration (first run writes the defaults as an editable template)
    let first_run = cli.config.is_none() && !AppPaths::new().settings_file.exists();
    let loaded = match &cli.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    };
    let config = loaded.unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e}); using defaults");
        AppConfig::default()
    });
    if first_run {
        match config.save() {
            Ok(()) => log::info!("Wrote default settings to {}", AppPaths::new().settings_file.display()),
            Err(e) => log::warn!("Could not write default settings: {e}"),
        }
    }

    // 4. Tokio runtime (network calls + one decode task at a time)
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    // 5. Gateway + session
    let gateway: Arc<dyn LandmarkGateway> = Arc::new(GeminiGateway::from_config(&config.gateway));
    let session = new_shared_session();
    let orchestrator = ScanOrchestrator::new(Arc::clone(&session), gateway, config.audio.format());

    let initial_photo = match &cli.image {
        Some(path) => Some(Photo::load(path).with_context(|| format!("cannot open {}", path.display()))?),
        None => None,
    };

    // 6a. Headless: one scan, print, optionally play
    if cli.headless {
        let photo = initial_photo.ok_or_else(|| anyhow!("--headless needs --image"))?;
        return run_headless(&rt, &orchestrator, &session, photo, &config, cli.play);
    }

    // 6b. Windowed: orchestrator task + egui (blocks until the window closes)
    let (scan_tx, scan_rx) = mpsc::channel::<ScanCommand>(4);
    rt.spawn(orchestrator.run(scan_rx));

    if let Some(photo) = initial_photo {
        scan_tx
            .try_send(ScanCommand::Scan(photo))
            .map_err(|e| anyhow!("could not queue initial scan: {e}"))?;
    }

    let app = CityLensApp::new(session, scan_tx, config.clone());
    eframe::run_native(
        "CityLens",
        native_options(&config),
        Box::new(move |_cc| Ok(Box::new(app))),
    )
    .map_err(|e| anyhow!("window error: {e}"))?;

    log::info!("CityLens shut down");
    Ok(())
}
