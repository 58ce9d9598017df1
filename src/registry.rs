//! Name -> factory registry for sources and segments (spec §4.2), grounded
//! in the teacher's `processors/factory.rs` `OnceLock<Mutex<HashMap<...>>>`
//! singleton pattern, generalised to ChatterLang's two node kinds.

use crate::error::CompileError;
use crate::node::{Segment, Source};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

/// A node's fully-resolved DSL parameters (identifiers already substituted
/// with their constant values).
#[derive(Debug, Clone, Default)]
pub struct ResolvedParams(pub HashMap<String, Value>);

impl ResolvedParams {
    pub fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.0.get(key).and_then(|v| serde_json::from_value(v.clone()).ok()).unwrap_or(default)
    }

    pub fn get_opt<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.0.get(key).and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

type SourceFactory = Box<dyn Fn(&ResolvedParams) -> anyhow::Result<Box<dyn Source>> + Send + Sync>;
type SegmentFactory = Box<dyn Fn(&ResolvedParams) -> anyhow::Result<Box<dyn Segment>> + Send + Sync>;

static SOURCE_REGISTRY: OnceLock<Mutex<HashMap<String, SourceFactory>>> = OnceLock::new();
static SEGMENT_REGISTRY: OnceLock<Mutex<HashMap<String, SegmentFactory>>> = OnceLock::new();

fn source_registry() -> &'static Mutex<HashMap<String, SourceFactory>> {
    SOURCE_REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

fn segment_registry() -> &'static Mutex<HashMap<String, SegmentFactory>> {
    SEGMENT_REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Register (or replace) a source factory under `name`.
pub fn register_source(name: &str, factory: SourceFactory) {
    source_registry().lock().expect("source registry poisoned").insert(name.to_string(), factory);
}

/// Register (or replace) a segment factory under `name`.
pub fn register_segment(name: &str, factory: SegmentFactory) {
    segment_registry().lock().expect("segment registry poisoned").insert(name.to_string(), factory);
}

pub fn list_sources() -> Vec<String> {
    ensure_default_nodes();
    source_registry().lock().expect("source registry poisoned").keys().cloned().collect()
}

pub fn list_segments() -> Vec<String> {
    ensure_default_nodes();
    segment_registry().lock().expect("segment registry poisoned").keys().cloned().collect()
}

pub fn create_source(name: &str, params: &ResolvedParams) -> Result<Box<dyn Source>, CompileError> {
    ensure_default_nodes();
    let registry = source_registry().lock().expect("source registry poisoned");
    let factory = registry.get(name).ok_or_else(|| CompileError::UnknownSource(name.to_string()))?;
    factory(params).map_err(|e| CompileError::Structural(format!("source '{name}' failed to build: {e}")))
}

pub fn create_segment(name: &str, params: &ResolvedParams) -> Result<Box<dyn Segment>, CompileError> {
    ensure_default_nodes();
    let registry = segment_registry().lock().expect("segment registry poisoned");
    let factory = registry.get(name).ok_or_else(|| CompileError::UnknownSegment(name.to_string()))?;
    factory(params).map_err(|e| CompileError::Structural(format!("segment '{name}' failed to build: {e}")))
}

/// One-time registration of the standard library carried in `src/segments/`.
fn ensure_default_nodes() {
    static INITIALIZED: OnceLock<()> = OnceLock::new();
    INITIALIZED.get_or_init(|| {
        use crate::helpers::hash::HashAlgorithm;
        use crate::segments::basic::*;
        use crate::segments::metadata::{CollectMetadata, FlushEveryN, FlushEveryT, FlushTicker};
        use std::time::Duration;

        register_source(
            "echo",
            Box::new(|p: &ResolvedParams| {
                let data: String = p.get("data", String::new());
                let delimiter: Option<String> = p.get_opt("delimiter");
                Ok(Box::new(Echo::new(data, delimiter)) as Box<dyn Source>)
            }),
        );
        register_source(
            "range",
            Box::new(|p: &ResolvedParams| {
                let lower: i64 = p.get("lower", 0);
                let upper: i64 = p.get("upper", 0);
                Ok(Box::new(Range::new(lower, upper)) as Box<dyn Source>)
            }),
        );
        register_source(
            "flushT",
            Box::new(|p: &ResolvedParams| {
                let seconds: f64 = p.get("period", 1.0);
                Ok(Box::new(FlushTicker::new(Duration::from_secs_f64(seconds))) as Box<dyn Source>)
            }),
        );

        register_segment(
            "cast",
            Box::new(|p: &ResolvedParams| {
                let cast_type: String = p.get("cast_type", "str".to_string());
                let fail_silently: bool = p.get("fail_silently", true);
                Ok(Box::new(Cast::new(cast_type, fail_silently)) as Box<dyn Segment>)
            }),
        );
        register_segment(
            "print",
            Box::new(|p: &ResolvedParams| {
                let prefix: Option<String> = p.get_opt("prefix");
                Ok(Box::new(Print::new(prefix)) as Box<dyn Segment>)
            }),
        );
        register_segment(
            "scale",
            Box::new(|p: &ResolvedParams| {
                let multiplier: f64 = p.get("multiplier", 1.0);
                let field: Option<String> = p.get_opt("field");
                Ok(Box::new(Scale::new(multiplier, field)) as Box<dyn Segment>)
            }),
        );
        register_segment(
            "firstN",
            Box::new(|p: &ResolvedParams| {
                let n: i64 = p.get("n", 0);
                Ok(Box::new(FirstN::new(n.max(0) as usize)) as Box<dyn Segment>)
            }),
        );
        register_segment(
            "everyN",
            Box::new(|p: &ResolvedParams| {
                let n: i64 = p.get("n", 1);
                Ok(Box::new(EveryN::new(n.max(1) as usize)) as Box<dyn Segment>)
            }),
        );
        register_segment(
            "slice",
            Box::new(|p: &ResolvedParams| {
                let start: i64 = p.get("start", 0);
                let stop: Option<i64> = p.get_opt("stop");
                Ok(Box::new(Slice::new(start.max(0) as usize, stop.map(|s| s.max(0) as usize)))
                    as Box<dyn Segment>)
            }),
        );
        register_segment(
            "isIn",
            Box::new(|p: &ResolvedParams| {
                let values: Vec<Value> = p.get("values", Vec::new());
                let field: Option<String> = p.get_opt("field");
                Ok(Box::new(IsIn::new(values, false, field)) as Box<dyn Segment>)
            }),
        );
        register_segment(
            "isNotIn",
            Box::new(|p: &ResolvedParams| {
                let values: Vec<Value> = p.get("values", Vec::new());
                let field: Option<String> = p.get_opt("field");
                Ok(Box::new(IsIn::new(values, true, field)) as Box<dyn Segment>)
            }),
        );
        register_segment("flatten", Box::new(|_: &ResolvedParams| Ok(Box::new(Flatten::new()) as Box<dyn Segment>)));
        register_segment(
            "concat",
            Box::new(|p: &ResolvedParams| {
                let separator: Option<String> = p.get_opt("separator");
                Ok(Box::new(Concat::new(separator)) as Box<dyn Segment>)
            }),
        );
        register_segment(
            "hash",
            Box::new(|p: &ResolvedParams| {
                let fields: Vec<String> = p.get("fields", Vec::new());
                let algorithm: String = p.get("algorithm", "sha256".to_string());
                let algorithm: HashAlgorithm =
                    algorithm.parse().map_err(|e: String| anyhow::anyhow!(e))?;
                Ok(Box::new(Hash::new(fields, algorithm)) as Box<dyn Segment>)
            }),
        );
        register_segment(
            "fillTemplate",
            Box::new(|p: &ResolvedParams| {
                let template: String = p.get("template", String::new());
                Ok(Box::new(FillTemplate::new(template)) as Box<dyn Segment>)
            }),
        );
        register_segment(
            "accum",
            Box::new(|p: &ResolvedParams| {
                let variable: Option<String> = p.get_opt("variable");
                let reset: bool = p.get("reset", false);
                Ok(Box::new(crate::segments::accum::Accum::new(variable, reset)) as Box<dyn Segment>)
            }),
        );
        register_segment(
            "snippet",
            Box::new(|p: &ResolvedParams| {
                let file: String = p.get("file", String::new());
                Ok(Box::new(crate::segments::snippet::Snippet::new(file)?) as Box<dyn Segment>)
            }),
        );
        register_segment(
            "flushN",
            Box::new(|p: &ResolvedParams| {
                let n: i64 = p.get("n", 1);
                Ok(Box::new(FlushEveryN::new(n.max(1) as usize)) as Box<dyn Segment>)
            }),
        );
        register_segment(
            "flushT",
            Box::new(|p: &ResolvedParams| {
                let seconds: f64 = p.get("period", 1.0);
                Ok(Box::new(FlushEveryT::new(Duration::from_secs_f64(seconds))) as Box<dyn Segment>)
            }),
        );
        register_segment(
            "collectMetadata",
            Box::new(|p: &ResolvedParams| {
                let variable: String = p.get("variable", "metadata_count".to_string());
                Ok(Box::new(CollectMetadata::new(variable)) as Box<dyn Segment>)
            }),
        );

        tracing::info!("Default ChatterLang sources/segments registered");
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_sources_and_segments_are_discoverable() {
        assert!(list_sources().contains(&"echo".to_string()));
        assert!(list_segments().contains(&"print".to_string()));
    }

    #[test]
    fn unknown_names_are_compile_errors() {
        let params = ResolvedParams::default();
        assert!(create_source("does-not-exist", &params).is_err());
        assert!(create_segment("does-not-exist", &params).is_err());
    }
}
