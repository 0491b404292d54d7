//! Scan pipeline for CityLens.
//!
//! This module sequences the three gateway calls for one photo and exposes
//! the shared session that the UI reads every frame.
//!
//! # Architecture
//!
//! ```text
//! ScanCommand (mpsc)
//!        │
//!        ▼
//! ScanOrchestrator::run()  ← async tokio task
//!        │
//!        └─ Scan(photo)
//!              ├─ LandmarkGateway::identify   → stage 1
//!              ├─ LandmarkGateway::enrich     → stage 2
//!              └─ LandmarkGateway::narrate
//!                   + spawn_blocking(decode)  → stage 3 → Ready
//!
//! SharedSession (Arc<Mutex<Session>>) ←─── read by egui update() each frame
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//! use citylens::config::AppConfig;
//! use citylens::gateway::{GeminiGateway, LandmarkGateway};
//! use citylens::pipeline::{new_shared_session, ScanOrchestrator};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AppConfig::default();
//!     let session = new_shared_session();
//!     let gateway: Arc<dyn LandmarkGateway> =
//!         Arc::new(GeminiGateway::from_config(&config.gateway));
//!
//!     let (scan_tx, scan_rx) = mpsc::channel(4);
//!     let orchestrator = ScanOrchestrator::new(session.clone(), gateway, config.audio.format());
//!
//!     tokio::spawn(async move { orchestrator.run(scan_rx).await });
//!
//!     // scan_tx is handed to the UI
//!     # drop(scan_tx);
//! }
//! ```

pub mod runner;
pub mod state;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use runner::{NarrationFailure, ScanCommand, ScanError, ScanOrchestrator};
pub use state::{
    lock_session, new_shared_session, LandmarkRecord, PipelineStage, RunTicket, Session,
    SessionState, SharedSession, Stage, StageBoard,
};
