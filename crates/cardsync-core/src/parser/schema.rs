//! Card schema detection and per-version normalization.
//!
//! Each historical shape is detected once into a [`CardSchema`] variant and
//! normalized by its own function; nothing downstream looks at versions.

use super::{ParseError, ParsedCard, SchemaVersion};
use serde_json::{Map, Value};

const SPEC_V2: &str = "chara_card_v2";
const SPEC_V3: &str = "chara_card_v3";

/// A payload tagged with the schema it was detected as.
#[derive(Debug, Clone)]
pub enum CardSchema<'a> {
    /// Flat legacy object: fields at the top level.
    V1(&'a Map<String, Value>),
    /// `chara_card_v2`: fields under `data`.
    V2 {
        root: &'a Map<String, Value>,
        data: &'a Map<String, Value>,
    },
    /// `chara_card_v3`: v2 plus multilingual notes and extra greetings.
    V3 {
        root: &'a Map<String, Value>,
        data: &'a Map<String, Value>,
    },
}

impl<'a> CardSchema<'a> {
    /// Classify a decoded payload.
    pub fn detect(payload: &'a Value) -> Result<Self, ParseError> {
        let root = payload
            .as_object()
            .ok_or_else(|| ParseError::UnknownSchema("payload is not an object".to_string()))?;

        match root.get("spec").and_then(Value::as_str) {
            Some(SPEC_V3) => Ok(CardSchema::V3 {
                root,
                data: data_object(root, SPEC_V3)?,
            }),
            Some(SPEC_V2) => Ok(CardSchema::V2 {
                root,
                data: data_object(root, SPEC_V2)?,
            }),
            Some(other) => Err(ParseError::UnknownSchema(format!("unsupported spec {other:?}"))),
            None if root.get("name").map(Value::is_string).unwrap_or(false) => {
                Ok(CardSchema::V1(root))
            }
            None => Err(ParseError::UnknownSchema(
                "no spec marker and no name field".to_string(),
            )),
        }
    }

    pub fn version(&self) -> SchemaVersion {
        match self {
            CardSchema::V1(_) => SchemaVersion::V1,
            CardSchema::V2 { .. } => SchemaVersion::V2,
            CardSchema::V3 { .. } => SchemaVersion::V3,
        }
    }

    /// Produce the unified record. `raw` is kept verbatim on the result.
    pub fn normalize(&self, raw: &Value) -> ParsedCard {
        match self {
            CardSchema::V1(root) => normalize_v1(root, raw),
            CardSchema::V2 { root, data } => normalize_v2(root, data, raw, SchemaVersion::V2),
            CardSchema::V3 { root, data } => normalize_v3(root, data, raw),
        }
    }
}

fn data_object<'a>(
    root: &'a Map<String, Value>,
    spec: &str,
) -> Result<&'a Map<String, Value>, ParseError> {
    root.get("data")
        .and_then(Value::as_object)
        .ok_or_else(|| ParseError::UnknownSchema(format!("{spec} payload without data object")))
}

fn normalize_v1(root: &Map<String, Value>, raw: &Value) -> ParsedCard {
    let fields = Fields {
        primary: root,
        fallback: None,
    };

    ParsedCard {
        name: fields.text("name"),
        description: fields.text("description"),
        personality: fields.text("personality"),
        scenario: fields.text("scenario"),
        first_message: fields.text("first_mes"),
        alternate_greetings: Vec::new(),
        example_dialogue: fields.text("mes_example"),
        creator_notes: first_non_empty([
            fields.text("creator_notes"),
            fields.text("creatorcomment"),
        ]),
        system_prompt: String::new(),
        post_history_instructions: String::new(),
        creator: fields.text("creator"),
        character_version: fields.text("character_version"),
        tags: fields.tags("tags"),
        lorebook: None,
        extensions: Value::Object(Map::new()),
        schema: SchemaVersion::V1,
        raw: raw.clone(),
    }
}

fn normalize_v2(
    root: &Map<String, Value>,
    data: &Map<String, Value>,
    raw: &Value,
    schema: SchemaVersion,
) -> ParsedCard {
    // Some exporters also mirror v1 fields at the top level; `data` wins.
    let fields = Fields {
        primary: data,
        fallback: Some(root),
    };

    ParsedCard {
        name: fields.text("name"),
        description: fields.text("description"),
        personality: fields.text("personality"),
        scenario: fields.text("scenario"),
        first_message: fields.text("first_mes"),
        alternate_greetings: fields.string_list("alternate_greetings"),
        example_dialogue: fields.text("mes_example"),
        creator_notes: creator_notes(data, &fields),
        system_prompt: fields.text("system_prompt"),
        post_history_instructions: fields.text("post_history_instructions"),
        creator: fields.text("creator"),
        character_version: fields.text("character_version"),
        tags: fields.tags("tags"),
        lorebook: data
            .get("character_book")
            .filter(|book| book.is_object())
            .cloned(),
        extensions: data
            .get("extensions")
            .filter(|ext| ext.is_object())
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new())),
        schema,
        raw: raw.clone(),
    }
}

fn normalize_v3(root: &Map<String, Value>, data: &Map<String, Value>, raw: &Value) -> ParsedCard {
    let mut card = normalize_v2(root, data, raw, SchemaVersion::V3);
    let fields = Fields {
        primary: data,
        fallback: None,
    };
    for greeting in fields.string_list("group_only_greetings") {
        if !card.alternate_greetings.contains(&greeting) {
            card.alternate_greetings.push(greeting);
        }
    }
    card
}

/// Prefer the English multilingual note, then the generic note field.
fn creator_notes(data: &Map<String, Value>, fields: &Fields<'_>) -> String {
    let english = data
        .get("creator_notes_multilingual")
        .and_then(Value::as_object)
        .and_then(|notes| notes.get("en"))
        .map(value_text)
        .unwrap_or_default();
    first_non_empty([english, fields.text("creator_notes")])
}

fn first_non_empty<const N: usize>(candidates: [String; N]) -> String {
    candidates
        .into_iter()
        .find(|c| !c.trim().is_empty())
        .unwrap_or_default()
}

struct Fields<'a> {
    primary: &'a Map<String, Value>,
    fallback: Option<&'a Map<String, Value>>,
}

impl Fields<'_> {
    fn get(&self, key: &str) -> Option<&Value> {
        self.primary
            .get(key)
            .filter(|v| !v.is_null())
            .or_else(|| self.fallback.and_then(|f| f.get(key)).filter(|v| !v.is_null()))
    }

    fn text(&self, key: &str) -> String {
        self.get(key).map(value_text).unwrap_or_default()
    }

    fn string_list(&self, key: &str) -> Vec<String> {
        match self.get(key) {
            Some(Value::Array(items)) => items
                .iter()
                .map(value_text)
                .filter(|s| !s.trim().is_empty())
                .collect(),
            Some(Value::String(s)) if !s.trim().is_empty() => vec![s.clone()],
            _ => Vec::new(),
        }
    }

    fn tags(&self, key: &str) -> Vec<String> {
        let raw: Vec<String> = match self.get(key) {
            Some(Value::Array(items)) => items.iter().map(value_text).collect(),
            Some(Value::String(s)) => s.split([',', ';']).map(str::to_string).collect(),
            _ => Vec::new(),
        };
        normalize_tags(raw)
    }
}

/// Trim, drop empties and de-duplicate case-insensitively (first spelling wins).
pub fn normalize_tags(raw: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for tag in raw {
        let tag = tag.trim();
        if tag.is_empty() {
            continue;
        }
        if seen.insert(tag.to_lowercase()) {
            out.push(tag.to_string());
        }
    }
    out
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_detects_each_version() {
        let v1 = json!({"name": "A", "first_mes": "hi"});
        let v2 = json!({"spec": "chara_card_v2", "spec_version": "2.0", "data": {"name": "A"}});
        let v3 = json!({"spec": "chara_card_v3", "spec_version": "3.0", "data": {"name": "A"}});

        assert_eq!(CardSchema::detect(&v1).unwrap().version(), SchemaVersion::V1);
        assert_eq!(CardSchema::detect(&v2).unwrap().version(), SchemaVersion::V2);
        assert_eq!(CardSchema::detect(&v3).unwrap().version(), SchemaVersion::V3);
    }

    #[test]
    fn test_rejects_unknown_shapes() {
        assert!(CardSchema::detect(&json!([1, 2])).is_err());
        assert!(CardSchema::detect(&json!({"spec": "chara_card_v2"})).is_err());
        assert!(CardSchema::detect(&json!({"spec": "something_else", "data": {}})).is_err());
        assert!(CardSchema::detect(&json!({"description": "no name"})).is_err());
    }

    #[test]
    fn test_all_versions_normalize_to_same_shape() {
        let v1 = json!({
            "name": "Aria", "description": "d", "personality": "p", "scenario": "s",
            "first_mes": "hello", "mes_example": "<START>", "creatorcomment": "notes",
            "tags": "fantasy, elf"
        });
        let v2 = json!({"spec": "chara_card_v2", "data": {
            "name": "Aria", "description": "d", "personality": "p", "scenario": "s",
            "first_mes": "hello", "mes_example": "<START>", "creator_notes": "notes",
            "tags": ["fantasy", "elf"]
        }});

        let a = CardSchema::detect(&v1).unwrap().normalize(&v1);
        let b = CardSchema::detect(&v2).unwrap().normalize(&v2);

        assert_eq!(a.name, b.name);
        assert_eq!(a.first_message, b.first_message);
        assert_eq!(a.example_dialogue, b.example_dialogue);
        assert_eq!(a.creator_notes, b.creator_notes);
        assert_eq!(a.tags, b.tags);
    }

    #[test]
    fn test_v3_prefers_english_notes() {
        let v3 = json!({"spec": "chara_card_v3", "data": {
            "name": "Aria",
            "creator_notes": "generic",
            "creator_notes_multilingual": {"ja": "日本語", "en": "english"}
        }});
        let card = CardSchema::detect(&v3).unwrap().normalize(&v3);
        assert_eq!(card.creator_notes, "english");

        let fallback = json!({"spec": "chara_card_v3", "data": {
            "name": "Aria",
            "creator_notes": "generic",
            "creator_notes_multilingual": {"ja": "日本語"}
        }});
        let card = CardSchema::detect(&fallback).unwrap().normalize(&fallback);
        assert_eq!(card.creator_notes, "generic");
    }

    #[test]
    fn test_v2_lorebook_and_extensions() {
        let v2 = json!({"spec": "chara_card_v2", "data": {
            "name": "Aria",
            "character_book": {"entries": [{"keys": ["k"], "content": "c"}]},
            "extensions": {"depth_prompt": {"depth": 4}},
            "alternate_greetings": ["hey", "", "yo"]
        }});
        let card = CardSchema::detect(&v2).unwrap().normalize(&v2);
        assert!(card.lorebook.is_some());
        assert_eq!(card.extensions["depth_prompt"]["depth"], 4);
        assert_eq!(card.alternate_greetings, vec!["hey", "yo"]);
    }

    #[test]
    fn test_v2_falls_back_to_top_level_fields() {
        let v2 = json!({"spec": "chara_card_v2", "description": "top", "data": {"name": "Aria"}});
        let card = CardSchema::detect(&v2).unwrap().normalize(&v2);
        assert_eq!(card.description, "top");
    }

    #[test]
    fn test_missing_optional_fields_are_empty() {
        let v2 = json!({"spec": "chara_card_v2", "data": {"name": "Bare", "tags": null}});
        let card = CardSchema::detect(&v2).unwrap().normalize(&v2);
        assert_eq!(card.description, "");
        assert!(card.tags.is_empty());
        assert!(card.lorebook.is_none());
        assert!(card.extensions.as_object().unwrap().is_empty());
    }

    #[test]
    fn test_tag_normalization() {
        let tags = normalize_tags(
            ["Elf", " elf ", "", "Fantasy", "fantasy;"]
                .into_iter()
                .map(String::from),
        );
        assert_eq!(tags, vec!["Elf", "Fantasy", "fantasy;"]);

        let v1 = json!({"name": "A", "tags": "a; b ,c,,"});
        let card = CardSchema::detect(&v1).unwrap().normalize(&v1);
        assert_eq!(card.tags, vec!["a", "b", "c"]);
    }
}
