//! Content identity for card payloads.
//!
//! Payloads are canonicalized (object keys sorted at every depth, volatile
//! bookkeeping fields dropped) and hashed with SHA-256, so two files carrying
//! the same character collapse to one Card no matter how the exporter
//! ordered keys or stamped dates.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Field names ignored for identity wherever they appear.
pub const VOLATILE_FIELDS: &[&str] = &[
    "avatar",
    "chat",
    "create_date",
    "creation_date",
    "fav",
    "modification_date",
];

/// Rebuild `value` with sorted keys and volatile fields removed.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map
                .keys()
                .filter(|k| !VOLATILE_FIELDS.contains(&k.as_str()))
                .collect();
            keys.sort();

            let mut out = Map::with_capacity(keys.len());
            for key in keys {
                out.insert(key.clone(), canonicalize(&map[key.as_str()]));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// SHA-256 (lowercase hex) of the canonical form of `value`.
pub fn content_hash(value: &Value) -> String {
    let mut hasher = Sha256::new();
    write_canonical(&canonicalize(value), &mut hasher);
    hex::encode(hasher.finalize())
}

// Keys are already sorted by `canonicalize`; emit them in that order instead of
// relying on the map's iteration order.
fn write_canonical(value: &Value, hasher: &mut Sha256) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            hasher.update(b"{");
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    hasher.update(b",");
                }
                hasher.update(Value::String(key.clone()).to_string().as_bytes());
                hasher.update(b":");
                write_canonical(&map[key.as_str()], hasher);
            }
            hasher.update(b"}");
        }
        Value::Array(items) => {
            hasher.update(b"[");
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    hasher.update(b",");
                }
                write_canonical(item, hasher);
            }
            hasher.update(b"]");
        }
        scalar => hasher.update(scalar.to_string().as_bytes()),
    }
}
