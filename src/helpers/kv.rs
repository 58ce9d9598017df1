//! Key/value string parsing helper (spec §4.10, C12), used by segments and
//! the compiler to parse parameter strings like `"k1:v1,k2,k3:v3"`.

use crate::error::CompileError;
use std::collections::HashMap;

/// Parse a comma-separated `key:value` list. A bare `key` (no colon) maps
/// to itself: `"a,b:c"` -> `{"a": "a", "b": "c"}`.
///
/// In `strict` mode, a value containing an unescaped `:` (ambiguous split)
/// is rejected; in non-strict mode the first colon always wins.
pub fn parse_key_value_str(input: &str, strict: bool) -> Result<HashMap<String, String>, CompileError> {
    let mut map = HashMap::new();
    for raw in input.split(',') {
        let part = raw.trim();
        if part.is_empty() {
            continue;
        }
        let mut colons = part.match_indices(':');
        let Some((first_idx, _)) = colons.next() else {
            map.insert(part.to_string(), part.to_string());
            continue;
        };
        if strict && colons.next().is_some() {
            return Err(CompileError::Parse(format!(
                "ambiguous key:value entry {part:?} (more than one ':')"
            )));
        }
        let key = part[..first_idx].trim().to_string();
        let value = part[first_idx + 1..].trim().to_string();
        if key.is_empty() {
            return Err(CompileError::Parse(format!("empty key in entry {part:?}")));
        }
        map.insert(key, value);
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_keys_map_to_themselves() {
        let parsed = parse_key_value_str("a,b:c", false).unwrap();
        assert_eq!(parsed.get("a").unwrap(), "a");
        assert_eq!(parsed.get("b").unwrap(), "c");
    }

    #[test]
    fn strict_mode_rejects_ambiguous_value() {
        assert!(parse_key_value_str("k:v1:v2", true).is_err());
    }

    #[test]
    fn non_strict_mode_splits_on_first_colon() {
        let parsed = parse_key_value_str("k:v1:v2", false).unwrap();
        assert_eq!(parsed.get("k").unwrap(), "v1:v2");
    }

    #[test]
    fn blank_entries_are_skipped() {
        let parsed = parse_key_value_str("a:1,,b:2", false).unwrap();
        assert_eq!(parsed.len(), 2);
    }
}
