//! Canonical JSON encoding and content addressing.
//!
//! Canonical form: object keys sorted by UTF-8 bytes, no insignificant
//! whitespace, strings escaped minimally, numbers in serde_json's shortest
//! round-trip rendering. The encoder walks a [`serde_json::Value`] itself and
//! never relies on the map ordering serde_json happens to be built with.

use std::fmt::{self, Write as _};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Number, Value};
use sha2::{Digest, Sha256};

/// Number of hex characters kept from a digest when minting a stable id.
const STABLE_ID_HEX_LEN: usize = 12;

/// Render `value` as a canonical JSON string.
pub fn to_canonical_string(value: &Value) -> String {
    let mut out = String::new();
    emit_value(value, &mut out);
    out
}

/// Canonical JSON as UTF-8 bytes.
pub fn to_canonical_bytes(value: &Value) -> Vec<u8> {
    to_canonical_string(value).into_bytes()
}

fn emit_value(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(n) => emit_number(n, out),
        Value::String(s) => emit_string(s, out),
        Value::Array(items) => emit_array(items, out),
        Value::Object(map) => emit_object(map, out),
    }
}

fn emit_number(n: &Number, out: &mut String) {
    // serde_json cannot hold NaN or infinities, so Display is always valid JSON.
    let _ = write!(out, "{n}");
}

fn emit_string(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{0008}' => out.push_str("\\b"),
            '\u{000C}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c <= '\u{001F}' => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

fn emit_array(items: &[Value], out: &mut String) {
    out.push('[');
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        emit_value(item, out);
    }
    out.push(']');
}

fn emit_object(map: &Map<String, Value>, out: &mut String) {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort_unstable_by(|a, b| a.as_bytes().cmp(b.as_bytes()));

    out.push('{');
    for (i, key) in keys.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        emit_string(key, out);
        out.push(':');
        emit_value(&map[key], out);
    }
    out.push('}');
}

// ---------------------------------------------------------------------------
// Hashing
// ---------------------------------------------------------------------------

/// SHA-256 digest of a canonical payload, rendered as lowercase hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    pub fn of(bytes: &[u8]) -> Self {
        Self(Sha256::digest(bytes).into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Failure to parse a hex digest.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("expected 64 lowercase hex characters, got {input:?}")]
pub struct ParseHashError {
    pub input: String,
}

impl FromStr for ContentHash {
    type Err = ParseHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseHashError {
            input: s.to_string(),
        };
        if s.len() != 64 || !s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            return Err(err());
        }
        let mut out = [0u8; 32];
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16).map_err(|_| err())?;
        }
        Ok(Self(out))
    }
}

impl Serialize for ContentHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Hash raw canonical bytes.
pub fn content_hash(bytes: &[u8]) -> ContentHash {
    ContentHash::of(bytes)
}

/// Deterministic identifier for a named entity: `<kind>_<12 hex>`.
///
/// The label is trimmed and lowercased first, so `"Water"` and `" water"`
/// mint the same id.
pub fn stable_id(kind: &str, label: &str) -> String {
    let normalized = label.trim().to_lowercase();
    let digest = ContentHash::of(format!("{kind}::{normalized}").as_bytes()).to_string();
    format!("{kind}_{}", &digest[..STABLE_ID_HEX_LEN])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keys_are_sorted_recursively() {
        let v = json!({"b": 1, "a": {"z": true, "m": null}, "c": [3, {"y": 1, "x": 2}]});
        assert_eq!(
            to_canonical_string(&v),
            r#"{"a":{"m":null,"z":true},"b":1,"c":[3,{"x":2,"y":1}]}"#
        );
    }

    #[test]
    fn floats_keep_their_fraction_marker() {
        let v = json!({"magnitude": 150.0, "ratio": 0.1});
        assert_eq!(to_canonical_string(&v), r#"{"magnitude":150.0,"ratio":0.1}"#);
    }

    #[test]
    fn strings_use_minimal_escapes() {
        let v = json!("tab\there \"q\" \u{0001} é");
        assert_eq!(to_canonical_string(&v), "\"tab\\there \\\"q\\\" \\u0001 é\"");
    }

    #[test]
    fn canonical_output_reparses_to_the_same_value() {
        let v = json!({"k": [1.5, -2, "s"], "e": {}});
        let s = to_canonical_string(&v);
        let back: Value = serde_json::from_str(&s).unwrap();
        assert_eq!(back, v);
        assert_eq!(to_canonical_string(&back), s);
    }

    #[test]
    fn hash_hex_round_trip() {
        let h = content_hash(b"labgraph");
        let hex = h.to_string();
        assert_eq!(hex.len(), 64);
        assert_eq!(hex.parse::<ContentHash>().unwrap(), h);

        let json = serde_json::to_string(&h).unwrap();
        assert_eq!(json, format!("\"{hex}\""));
        assert!("ABC".parse::<ContentHash>().is_err());
        assert!(hex.to_uppercase().parse::<ContentHash>().is_err());
    }

    #[test]
    fn known_digest() {
        assert_eq!(
            content_hash(b"").to_string(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn stable_ids_normalize_labels() {
        let a = stable_id("matter", "Water");
        assert_eq!(a, stable_id("matter", "  water "));
        assert!(a.starts_with("matter_"));
        assert_eq!(a.len(), "matter_".len() + 12);
        assert_ne!(a, stable_id("protocol", "water"));
    }
}
