//! Field extraction/assignment by dotted path (spec §4.10, C12).
//!
//! Items are represented as [`serde_json::Value`], so the capability set
//! from spec's design notes — index-by-string, index-by-int, get-attribute,
//! call-zero-arg — collapses to: object-key lookup and array-index lookup,
//! resolved left to right over the dotted path.

use crate::error::RuntimeDataError;
use serde_json::Value;

/// Extract the value at `path` (e.g. `"user.address.0.city"`) from `value`.
/// Returns `Err` if any path segment is missing or the container kind
/// doesn't match (object vs. array).
pub fn extract_field(value: &Value, path: &str) -> Result<Value, RuntimeDataError> {
    let mut current = value;
    for part in path.split('.') {
        current = match current {
            Value::Object(map) => map
                .get(part)
                .ok_or_else(|| RuntimeDataError::MissingField(path.to_string()))?,
            Value::Array(items) => {
                let idx: usize = part
                    .parse()
                    .map_err(|_| RuntimeDataError::MissingField(path.to_string()))?;
                items.get(idx).ok_or_else(|| RuntimeDataError::MissingField(path.to_string()))?
            }
            _ => return Err(RuntimeDataError::MissingField(path.to_string())),
        };
    }
    Ok(current.clone())
}

/// Like [`extract_field`] but returns `default` instead of erroring when the
/// path cannot be resolved (the "configurable fail-on-missing vs. default
/// value" behavior from spec §4.10).
pub fn extract_field_or(value: &Value, path: &str, default: Value) -> Value {
    extract_field(value, path).unwrap_or(default)
}

/// Write `new_value` at `path` inside `target`, creating intermediate
/// objects as needed. Only object-keyed (dotted) paths are supported for
/// assignment; array indices are not auto-vivified.
pub fn assign_field(target: &mut Value, path: &str, new_value: Value) {
    let parts: Vec<&str> = path.split('.').collect();
    assign_recursive(target, &parts, new_value);
}

fn assign_recursive(target: &mut Value, parts: &[&str], new_value: Value) {
    if !target.is_object() {
        *target = Value::Object(serde_json::Map::new());
    }
    let map = target.as_object_mut().expect("coerced to object above");

    if parts.len() == 1 {
        map.insert(parts[0].to_string(), new_value);
        return;
    }

    let entry = map.entry(parts[0].to_string()).or_insert_with(|| Value::Object(serde_json::Map::new()));
    assign_recursive(entry, &parts[1..], new_value);
}
