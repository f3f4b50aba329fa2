//! Character card file parser.
//!
//! Reads the card payload embedded in a PNG text chunk (`ccv3` preferred,
//! then `chara`), detects its schema, and normalizes it into a
//! [`ParsedCard`]. Every failure is a [`ParseError`]; callers log and skip.

mod png;
mod schema;

pub use png::{read_text_chunks, TextChunk};
pub use schema::{normalize_tags, CardSchema};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use thiserror::Error;

/// Text chunk keywords carrying card payloads, in preference order.
pub const PAYLOAD_KEYWORDS: &[&str] = &["ccv3", "chara"];

/// Why a file could not be read as a card.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("failed to read file: {0}")]
    Io(String),
    #[error("not a PNG file")]
    NotPng,
    #[error("corrupt PNG container: {0}")]
    CorruptContainer(String),
    #[error("no embedded card payload")]
    MissingMarker,
    #[error("invalid card payload: {0}")]
    InvalidPayload(String),
    #[error("unrecognized card schema: {0}")]
    UnknownSchema(String),
}

/// Schema version a card was parsed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaVersion {
    V1,
    V2,
    V3,
}

impl SchemaVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaVersion::V1 => "v1",
            SchemaVersion::V2 => "v2",
            SchemaVersion::V3 => "v3",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "v1" => Some(SchemaVersion::V1),
            "v2" => Some(SchemaVersion::V2),
            "v3" => Some(SchemaVersion::V3),
            _ => None,
        }
    }
}

/// Normalized card record, independent of the source schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedCard {
    pub name: String,
    pub description: String,
    pub personality: String,
    pub scenario: String,
    pub first_message: String,
    pub alternate_greetings: Vec<String>,
    pub example_dialogue: String,
    pub creator_notes: String,
    pub system_prompt: String,
    pub post_history_instructions: String,
    pub creator: String,
    pub character_version: String,
    pub tags: Vec<String>,
    pub lorebook: Option<Value>,
    pub extensions: Value,
    pub schema: SchemaVersion,
    /// The decoded payload exactly as embedded.
    pub raw: Value,
}

impl ParsedCard {
    /// Searchable text, one field per line.
    pub fn search_text(&self) -> String {
        let mut parts: Vec<&str> = vec![
            &self.name,
            &self.description,
            &self.personality,
            &self.scenario,
            &self.first_message,
        ];
        parts.extend(self.alternate_greetings.iter().map(String::as_str));
        parts.extend([
            self.example_dialogue.as_str(),
            self.creator_notes.as_str(),
            self.system_prompt.as_str(),
            self.post_history_instructions.as_str(),
            self.creator.as_str(),
        ]);
        parts.extend(self.tags.iter().map(String::as_str));
        parts
            .into_iter()
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Parse a card file from disk.
pub fn parse_card_file(path: impl AsRef<Path>) -> Result<ParsedCard, ParseError> {
    let bytes = std::fs::read(path.as_ref()).map_err(|e| ParseError::Io(e.to_string()))?;
    parse_card_bytes(&bytes)
}

/// Parse a card from PNG bytes.
pub fn parse_card_bytes(bytes: &[u8]) -> Result<ParsedCard, ParseError> {
    let chunks = read_text_chunks(bytes)?;
    let payload = extract_payload(&chunks)?;
    let schema = CardSchema::detect(&payload)?;
    Ok(schema.normalize(&payload))
}

/// Decode the preferred payload chunk into JSON.
///
/// A `ccv3` chunk that fails to decode falls back to `chara`.
pub fn extract_payload(chunks: &[TextChunk]) -> Result<Value, ParseError> {
    let mut last_error = None;
    for keyword in PAYLOAD_KEYWORDS {
        let Some(chunk) = chunks
            .iter()
            .find(|c| c.keyword.eq_ignore_ascii_case(keyword))
        else {
            continue;
        };
        match decode_payload(&chunk.text) {
            Ok(value) => return Ok(value),
            Err(e) => last_error = Some(e),
        }
    }
    Err(last_error.unwrap_or(ParseError::MissingMarker))
}

fn decode_payload(text: &str) -> Result<Value, ParseError> {
    let trimmed = text.trim();

    if let Ok(bytes) = STANDARD.decode(trimmed) {
        let json = String::from_utf8(bytes)
            .map_err(|_| ParseError::InvalidPayload("payload is not UTF-8".to_string()))?;
        return serde_json::from_str(&json)
            .map_err(|e| ParseError::InvalidPayload(format!("bad JSON: {e}")));
    }

    // A few exporters embed the JSON without base64.
    if trimmed.starts_with('{') {
        return serde_json::from_str(trimmed)
            .map_err(|e| ParseError::InvalidPayload(format!("bad JSON: {e}")));
    }

    Err(ParseError::InvalidPayload("payload is not base64".to_string()))
}
