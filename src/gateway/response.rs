//! `generateContent` response shapes and the extractors the gateway needs.
//!
//! Every field is optional: the service omits empty arrays and objects, and
//! a missing field must degrade to "no data" rather than a parse error.

use serde::{Deserialize, Serialize};

/// Description used when the model returns no text at all.
pub const NO_DESCRIPTION: &str = "No description available.";

// ---------------------------------------------------------------------------
// Domain values
// ---------------------------------------------------------------------------

/// One grounding citation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub title: String,
    pub uri: String,
}

impl Source {
    pub fn new(title: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            uri: uri.into(),
        }
    }
}

/// Output of the enrichment step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enrichment {
    pub description: String,
    pub sources: Vec<Source>,
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Default, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    text: Option<String>,
    inline_data: Option<InlineData>,
    #[serde(default)]
    thought: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    #[allow(dead_code)]
    mime_type: Option<String>,
    data: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Default, Deserialize)]
struct GroundingChunk {
    web: Option<WebChunk>,
}

#[derive(Debug, Default, Deserialize)]
struct WebChunk {
    uri: Option<String>,
    title: Option<String>,
}

impl GenerateContentResponse {
    fn first_parts(&self) -> &[Part] {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| c.parts.as_slice())
            .unwrap_or_default()
    }

    /// Concatenated non-thought text parts of the first candidate, or `None`
    /// when there are none.
    pub fn text(&self) -> Option<String> {
        let mut texts = self
            .first_parts()
            .iter()
            .filter(|p| !p.thought)
            .filter_map(|p| p.text.as_deref())
            .peekable();
        texts.peek()?;
        Some(texts.collect())
    }

    /// First non-empty inline data payload of the first candidate.
    pub fn inline_data(&self) -> Option<&str> {
        self.first_parts()
            .iter()
            .filter_map(|p| p.inline_data.as_ref())
            .filter_map(|d| d.data.as_deref())
            .find(|d| !d.is_empty())
    }

    /// Web citations of the first candidate, in order, keeping only those
    /// with both a title and a URI.
    pub fn grounding_sources(&self) -> Vec<Source> {
        self.candidates
            .first()
            .and_then(|c| c.grounding_metadata.as_ref())
            .map(|m| {
                m.grounding_chunks
                    .iter()
                    .filter_map(|chunk| chunk.web.as_ref())
                    .filter_map(|web| match (web.title.as_deref(), web.uri.as_deref()) {
                        (Some(title), Some(uri)) if !title.is_empty() && !uri.is_empty() => {
                            Some(Source::new(title, uri))
                        }
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Description parsing
// ---------------------------------------------------------------------------

/// Pull the summary out of an enrichment response body.
///
/// The model is asked for `{"description": "..."}` but may answer with plain
/// prose, fenced JSON, or JSON without the field.  Anything that is not a
/// JSON object with a string `description` is used verbatim.
pub fn parse_description(text: Option<&str>) -> String {
    let Some(raw) = text.filter(|t| !t.trim().is_empty()) else {
        return NO_DESCRIPTION.to_string();
    };

    match serde_json::from_str::<serde_json::Value>(strip_code_fence(raw)) {
        Ok(value) => match value.get("description").and_then(|d| d.as_str()) {
            Some(description) => description.trim().to_string(),
            None => {
                log::warn!("enrich: JSON response has no description field, using raw text");
                raw.trim().to_string()
            }
        },
        Err(e) => {
            log::warn!("enrich: failed to parse JSON description ({e}), using raw text");
            raw.trim().to_string()
        }
    }
}

/// Remove a surrounding Markdown code fence (```` ```json ... ``` ````).
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") on the opening line.
    match body.split_once('\n') {
        Some((_, inner)) => inner.trim(),
        None => body.trim(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
