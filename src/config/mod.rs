//! Configuration module for CityLens.
//!
//! Provides `AppConfig` (top-level settings), sub-configs for the gateway,
//! narration audio and UI, `AppPaths` for the cross-platform config
//! directory, and TOML persistence via `AppConfig::load` / `AppConfig::save`.

pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{AppConfig, AudioConfig, GatewayConfig, UiConfig, API_KEY_ENV_VARS};
