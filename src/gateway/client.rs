//! Core `LandmarkGateway` trait and the `GeminiGateway` implementation.
//!
//! `GeminiGateway` calls the Gemini `generateContent` REST endpoint once per
//! stage.  All connection details come from [`GatewayConfig`]; nothing is
//! hardcoded.  There is no retry at this layer.

use async_trait::async_trait;
use thiserror::Error;

use crate::config::GatewayConfig;
use crate::gateway::prompt::{enrich_body, identify_body, narrate_body, UNKNOWN_LANDMARK};
use crate::gateway::response::{parse_description, Enrichment, GenerateContentResponse};
use crate::photo::Photo;

/// Longest error body kept in [`GatewayError::Status`].
const MAX_ERROR_BODY: usize = 512;

// ---------------------------------------------------------------------------
// GatewayError
// ---------------------------------------------------------------------------

/// Errors that can occur during a single gateway request.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// HTTP transport or connection error.
    #[error("HTTP request failed: {0}")]
    Request(String),

    /// The request did not complete within the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// The service answered with a non-success status.
    #[error("service returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The HTTP response could not be parsed as expected JSON.
    #[error("failed to parse response: {0}")]
    Parse(String),

    /// The response held no usable payload.
    #[error("service returned an empty response")]
    EmptyResponse,

    /// No API key in settings or the environment.
    #[error("no API key configured (set GEMINI_API_KEY)")]
    MissingApiKey,
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GatewayError::Timeout
        } else {
            GatewayError::Request(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// LandmarkGateway trait
// ---------------------------------------------------------------------------

/// The three generative-AI operations the scan pipeline is built from.
///
/// Implementors must be `Send + Sync` so they can be shared across threads
/// (e.g. wrapped in `Arc<dyn LandmarkGateway>`).
#[async_trait]
pub trait LandmarkGateway: Send + Sync {
    /// Name the landmark and city in `photo`, or return `"Unknown"`.
    async fn identify(&self, photo: &Photo) -> Result<String, GatewayError>;

    /// Short summary of `landmark` plus grounding citations.
    async fn enrich(&self, landmark: &str) -> Result<Enrichment, GatewayError>;

    /// Synthesise `text`; returns the base64 PCM16 payload.
    async fn narrate(&self, text: &str) -> Result<String, GatewayError>;
}

// ---------------------------------------------------------------------------
// GeminiGateway
// ---------------------------------------------------------------------------

/// Calls the Gemini REST API.
pub struct GeminiGateway {
    client: reqwest::Client,
    config: GatewayConfig,
    api_key: Option<String>,
}

impl GeminiGateway {
    /// Build a `GeminiGateway` from application config.
    ///
    /// The API key is resolved once here (settings first, then environment).
    /// A missing key is not an error until the first request.
    pub fn from_config(config: &GatewayConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        let api_key = config.resolve_api_key();
        if api_key.is_none() {
            log::warn!("gateway: no API key found; scans will fail until one is configured");
        }

        Self {
            client,
            config: config.clone(),
            api_key,
        }
    }

    /// Whether a credential is available.
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// `generateContent` URL for `model`.
    pub fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            model
        )
    }

    async fn generate(
        &self,
        model: &str,
        body: &serde_json::Value,
    ) -> Result<GenerateContentResponse, GatewayError> {
        let key = self.api_key.as_deref().ok_or(GatewayError::MissingApiKey)?;

        let response = self
            .client
            .post(self.endpoint(model))
            .header("x-goog-api-key", key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body: truncate(&text, MAX_ERROR_BODY),
            });
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| {
            log::debug!(
                "gateway: unparseable {model} response: {}",
                String::from_utf8_lossy(&bytes)
            );
            GatewayError::Parse(e.to_string())
        })
    }
}

#[async_trait]
impl LandmarkGateway for GeminiGateway {
    async fn identify(&self, photo: &Photo) -> Result<String, GatewayError> {
        log::debug!("gateway: identify {:?}", photo);
        let response = self
            .generate(&self.config.identify_model, &identify_body(photo))
            .await?;

        let label = response
            .text()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| UNKNOWN_LANDMARK.to_string());
        log::info!("gateway: landmark identified: {label}");
        Ok(label)
    }

    async fn enrich(&self, landmark: &str) -> Result<Enrichment, GatewayError> {
        let response = self
            .generate(&self.config.enrich_model, &enrich_body(landmark))
            .await?;

        let description = parse_description(response.text().as_deref());
        let sources = response.grounding_sources();
        log::info!(
            "gateway: enrichment for {landmark}: {} chars, {} sources",
            description.len(),
            sources.len()
        );
        Ok(Enrichment {
            description,
            sources,
        })
    }

    async fn narrate(&self, text: &str) -> Result<String, GatewayError> {
        let response = self
            .generate(
                &self.config.narrate_model,
                &narrate_body(text, &self.config.voice_name),
            )
            .await?;

        let payload = response
            .inline_data()
            .ok_or(GatewayError::EmptyResponse)?
            .to_string();
        log::info!("gateway: narration payload {} bytes (base64)", payload.len());
        Ok(payload)
    }
}

/// Cut `text` to at most `max` bytes on a char boundary.
fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &text[..end])
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
