//! Prompts and `generateContent` request bodies for the three stages.

use serde_json::{json, Value};

use crate::photo::Photo;

/// Sentinel the vision model returns when nothing is recognisable.
pub const UNKNOWN_LANDMARK: &str = "Unknown";

const IDENTIFY_INSTRUCTION: &str = "Identify the main landmark in this photo. \
Return ONLY the name of the landmark and the city. \
If there is no recognizable landmark, return 'Unknown'.";

/// Whether an identification result is the "nothing found" sentinel.
///
/// Tolerates surrounding whitespace, quotes, a trailing period and case,
/// since models do not always echo the sentinel verbatim.
pub fn is_unknown_label(label: &str) -> bool {
    let cleaned = label.trim_matches(|c: char| c.is_whitespace() || matches!(c, '\'' | '"' | '.'));
    cleaned.is_empty() || cleaned.eq_ignore_ascii_case(UNKNOWN_LANDMARK)
}

pub fn enrich_instruction(landmark: &str) -> String {
    format!(
        "Find interesting historical facts and tourist information about {landmark}. \
         Write a short, engaging 3-sentence summary suitable for a narration."
    )
}

/// Vision request: inline image followed by the instruction.
pub fn identify_body(photo: &Photo) -> Value {
    json!({
        "contents": [{
            "parts": [
                {
                    "inlineData": {
                        "mimeType": photo.mime_type(),
                        "data": photo.to_base64()
                    }
                },
                { "text": IDENTIFY_INSTRUCTION }
            ]
        }]
    })
}

/// Search-grounded summary request with a JSON response schema.
pub fn enrich_body(landmark: &str) -> Value {
    json!({
        "contents": [{
            "parts": [{ "text": enrich_instruction(landmark) }]
        }],
        "tools": [{ "googleSearch": {} }],
        "generationConfig": {
            "responseMimeType": "application/json",
            "responseSchema": {
                "type": "OBJECT",
                "properties": {
                    "description": {
                        "type": "STRING",
                        "description": "A 3-sentence engaging summary of the landmark history."
                    }
                }
            }
        }
    })
}

/// Text-to-speech request with a prebuilt voice.
pub fn narrate_body(text: &str, voice_name: &str) -> Value {
    json!({
        "contents": [{
            "parts": [{ "text": text }]
        }],
        "generationConfig": {
            "responseModalities": ["AUDIO"],
            "speechConfig": {
                "voiceConfig": {
                    "prebuiltVoiceConfig": { "voiceName": voice_name }
                }
            }
        }
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_variants_are_unknown() {
        for label in [
            "Unknown",
            "unknown",
            " Unknown.\n",
            "'Unknown'",
            "\"UNKNOWN\"",
            "'Unknown'.",
            "\"Unknown.\"",
            "",
        ] {
            assert!(is_unknown_label(label), "{label:?} should be unknown");
        }
    }

    #[test]
    fn real_labels_are_not_unknown() {
        for label in ["Eiffel Tower, Paris", "Unknown Soldier Memorial, Ottawa"] {
            assert!(!is_unknown_label(label), "{label:?} should be known");
        }
    }

    #[test]
    fn identify_body_carries_image_then_instruction() {
        let photo = Photo::from_bytes(vec![0xFF, 0xD8, 0xFF, 0xE0], "p.jpg").unwrap();
        let body = identify_body(&photo);
        let parts = &body["contents"][0]["parts"];
        assert_eq!(parts[0]["inlineData"]["mimeType"], "image/jpeg");
        assert_eq!(parts[0]["inlineData"]["data"], "/9j/4A==");
        assert!(parts[1]["text"].as_str().unwrap().contains("'Unknown'"));
    }

    #[test]
    fn enrich_body_enables_search_and_schema() {
        let body = enrich_body("Colosseum, Rome");
        let text = body["contents"][0]["parts"][0]["text"].as_str().unwrap();
        assert!(text.contains("Colosseum, Rome"));
        assert!(text.contains("3-sentence"));
        assert!(body["tools"][0].get("googleSearch").is_some());
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(
            body["generationConfig"]["responseSchema"]["properties"]["description"]["type"],
            "STRING"
        );
    }

    #[test]
    fn narrate_body_requests_audio_with_voice() {
        let body = narrate_body("Hello there.", "Kore");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "Hello there.");
        assert_eq!(body["generationConfig"]["responseModalities"][0], "AUDIO");
        assert_eq!(
            body["generationConfig"]["speechConfig"]["voiceConfig"]["prebuiltVoiceConfig"]["voiceName"],
            "Kore"
        );
    }
}
