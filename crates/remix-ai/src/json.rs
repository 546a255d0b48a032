//! JSON extraction from free-form model output.

use std::sync::LazyLock;

use regex::Regex;
use serde::de::DeserializeOwned;

use crate::error::{AiError, AiResult};

static JSON_OBJECT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)\{.*\}").unwrap());

/// The outermost `{...}` span of `text`, ignoring markdown code fences.
pub fn extract_json(text: &str) -> Option<String> {
    let stripped = text.replace("```json", "").replace("```", "");
    JSON_OBJECT.find(&stripped).map(|m| m.as_str().to_string())
}

/// Extract and deserialize the JSON object embedded in `text`.
pub fn parse_embedded<T: DeserializeOwned>(text: &str) -> AiResult<T> {
    let json = extract_json(text)
        .ok_or_else(|| AiError::invalid_response(format!("no JSON object in: {}", preview(text))))?;
    serde_json::from_str(&json)
        .map_err(|e| AiError::invalid_response(format!("malformed JSON ({}): {}", e, preview(&json))))
}

fn preview(text: &str) -> String {
    text.chars().take(120).collect()
}
