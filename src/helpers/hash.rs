//! Deterministic hashing across named fields (spec §4.10, C12).
//!
//! Mirrors the original's "hash" segment: pick a stable textual
//! serialization of a subset of an item's fields, then hash it with a
//! configurable algorithm.

use crate::helpers::field_extract::extract_field_or;
use md5::Md5;
use serde_json::Value;
use sha2::{Digest, Sha256, Sha512};
use std::fmt;

/// The digest algorithm to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Md5,
    Sha256,
    Sha512,
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashAlgorithm::Md5 => write!(f, "md5"),
            HashAlgorithm::Sha256 => write!(f, "sha256"),
            HashAlgorithm::Sha512 => write!(f, "sha512"),
        }
    }
}

impl std::str::FromStr for HashAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "md5" => Ok(HashAlgorithm::Md5),
            "sha256" => Ok(HashAlgorithm::Sha256),
            "sha512" => Ok(HashAlgorithm::Sha512),
            other => Err(format!("unknown hash algorithm '{other}'")),
        }
    }
}

/// How to flatten a field's value into text before hashing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashSerialization {
    /// `serde_json`'s canonical-ish compact rendering of the value.
    Json,
    /// Plain string rendering: strings are used verbatim, everything else
    /// falls back to its JSON form.
    Repr,
}

/// Hash the values at `fields` (dotted paths, resolved against `value`,
/// missing fields hash as JSON `null`) concatenated with `\u{1}` as a
/// separator, using `algorithm` and `serialization`.
pub fn hash_fields(
    value: &Value,
    fields: &[String],
    algorithm: HashAlgorithm,
    serialization: HashSerialization,
) -> String {
    let mut buf = String::new();
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            buf.push('\u{1}');
        }
        let extracted = extract_field_or(value, field, Value::Null);
        buf.push_str(&render(&extracted, serialization));
    }
    digest(&buf, algorithm)
}

fn render(value: &Value, serialization: HashSerialization) -> String {
    match (serialization, value) {
        (HashSerialization::Repr, Value::String(s)) => s.clone(),
        _ => value.to_string(),
    }
}

fn digest(input: &str, algorithm: HashAlgorithm) -> String {
    match algorithm {
        HashAlgorithm::Md5 => {
            let mut hasher = Md5::new();
            hasher.update(input.as_bytes());
            hex::encode(hasher.finalize())
        }
        HashAlgorithm::Sha256 => {
            let mut hasher = Sha256::new();
            hasher.update(input.as_bytes());
            hex::encode(hasher.finalize())
        }
        HashAlgorithm::Sha512 => {
            let mut hasher = Sha512::new();
            hasher.update(input.as_bytes());
            hex::encode(hasher.finalize())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn same_fields_hash_identically() {
        let v = json!({"a": 1, "b": "x"});
        let fields = vec!["a".to_string(), "b".to_string()];
        let h1 = hash_fields(&v, &fields, HashAlgorithm::Sha256, HashSerialization::Json);
        let h2 = hash_fields(&v, &fields, HashAlgorithm::Sha256, HashSerialization::Json);
        assert_eq!(h1, h2);
    }

    #[test]
    fn different_algorithms_produce_different_lengths() {
        let v = json!({"a": 1});
        let fields = vec!["a".to_string()];
        let md5 = hash_fields(&v, &fields, HashAlgorithm::Md5, HashSerialization::Json);
        let sha256 = hash_fields(&v, &fields, HashAlgorithm::Sha256, HashSerialization::Json);
        assert_eq!(md5.len(), 32);
        assert_eq!(sha256.len(), 64);
    }

    #[test]
    fn repr_serialization_strips_string_quotes() {
        let v = json!({"a": "hello"});
        let fields = vec!["a".to_string()];
        let json_mode = hash_fields(&v, &fields, HashAlgorithm::Sha256, HashSerialization::Json);
        let repr_mode = hash_fields(&v, &fields, HashAlgorithm::Sha256, HashSerialization::Repr);
        assert_ne!(json_mode, repr_mode);
    }

    #[test]
    fn missing_field_hashes_as_null() {
        let v = json!({});
        let fields = vec!["missing".to_string()];
        let h = hash_fields(&v, &fields, HashAlgorithm::Sha256, HashSerialization::Json);
        let expected = digest("null", HashAlgorithm::Sha256);
        assert_eq!(h, expected);
    }
}
