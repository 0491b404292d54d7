//! Generative-AI gateway for CityLens.
//!
//! This module provides:
//! * [`LandmarkGateway`] — async trait with the three scan operations
//!   (identify, enrich, narrate).
//! * [`GeminiGateway`] — implementation over the Gemini REST API.
//! * [`GatewayError`] — error variants for a single request.
//! * Prompt / request-body builders and response extractors.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use citylens::config::AppConfig;
//! use citylens::gateway::{GeminiGateway, LandmarkGateway};
//! use citylens::photo::Photo;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AppConfig::default();
//!     let gateway = GeminiGateway::from_config(&config.gateway);
//!
//!     let photo = Photo::load("tower.jpg".as_ref()).unwrap();
//!     let label = gateway.identify(&photo).await.unwrap();
//!     let details = gateway.enrich(&label).await.unwrap();
//!     let _pcm_base64 = gateway.narrate(&details.description).await.unwrap();
//! }
//! ```

pub mod client;
pub mod prompt;
pub mod response;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use client::{GatewayError, GeminiGateway, LandmarkGateway};
pub use prompt::{is_unknown_label, UNKNOWN_LANDMARK};
pub use response::{parse_description, Enrichment, GenerateContentResponse, Source, NO_DESCRIPTION};
