//! CityLens — photograph a landmark, learn its history, hear it narrated.
//!
//! ```text
//! Photo ─▶ gateway::identify ─▶ gateway::enrich ─▶ gateway::narrate
//!                                                      │
//!                                   audio::decode ◀────┘
//!                                        │
//!        app (egui card) ◀── pipeline::Session ──▶ audio::PlaybackTransport
//! ```

pub mod app;
pub mod audio;
pub mod config;
pub mod gateway;
pub mod photo;
pub mod pipeline;
