//! Universal payload type (spec §3, C1).
//!
//! Items are opaque to the engine except where a segment chooses to
//! interpret them. The engine recognises exactly one distinguished variant,
//! metadata, carrying a [`MetadataKind`]; everything else is a data item.

use serde_json::Value;
use std::fmt;

/// A metadata kind recognised by the engine.
///
/// `Flush` is the sole built-in kind: it carries no payload and signals
/// "commit buffered work, then continue".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataKind {
    Flush,
}

impl fmt::Display for MetadataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataKind::Flush => write!(f, "Flush"),
        }
    }
}

/// A single value flowing through the engine.
///
/// Typical data payloads are strings, numbers, or JSON objects/arrays
/// (scalar or nested mapping keyed by string), represented with
/// [`serde_json::Value`] so they compose cleanly with field extraction,
/// templating, and the session server's JSON surface.
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Data(Value),
    Metadata(MetadataKind),
}

impl Item {
    pub fn data(value: impl Into<Value>) -> Self {
        Item::Data(value.into())
    }

    pub fn flush() -> Self {
        Item::Metadata(MetadataKind::Flush)
    }

    pub fn is_metadata(&self) -> bool {
        matches!(self, Item::Metadata(_))
    }

    pub fn as_data(&self) -> Option<&Value> {
        match self {
            Item::Data(v) => Some(v),
            Item::Metadata(_) => None,
        }
    }

    pub fn into_data(self) -> Option<Value> {
        match self {
            Item::Data(v) => Some(v),
            Item::Metadata(_) => None,
        }
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Item::Data(Value::String(s)) => write!(f, "{s}"),
            Item::Data(v) => write!(f, "{v}"),
            Item::Metadata(kind) => write!(f, "<{kind}>"),
        }
    }
}

impl From<Value> for Item {
    fn from(value: Value) -> Self {
        Item::Data(value)
    }
}

impl From<&str> for Item {
    fn from(value: &str) -> Self {
        Item::Data(Value::String(value.to_string()))
    }
}

impl From<String> for Item {
    fn from(value: String) -> Self {
        Item::Data(Value::String(value))
    }
}

impl From<i64> for Item {
    fn from(value: i64) -> Self {
        Item::Data(Value::Number(value.into()))
    }
}

impl From<f64> for Item {
    fn from(value: f64) -> Self {
        Item::Data(serde_json::Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_is_recognised() {
        assert!(Item::flush().is_metadata());
        assert!(!Item::from("x").is_metadata());
    }

    #[test]
    fn data_round_trips() {
        let item = Item::from(42i64);
        assert_eq!(item.as_data().unwrap().as_i64(), Some(42));
    }
}
