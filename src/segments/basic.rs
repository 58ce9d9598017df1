//! Minimal built-in segment/source library (spec §4.10/C12), ported in
//! Rust idiom from the original's `pipe/basic.py`.

use crate::context::SharedRuntime;
use crate::error::RuntimeDataError;
use crate::helpers::field_extract::extract_field;
use crate::helpers::hash::{hash_fields, HashAlgorithm, HashSerialization};
use crate::helpers::template::fill_template;
use crate::item::Item;
use crate::node::field::{FieldSegment, ValueFn};
use crate::node::{HasRuntime, ItemIter, MetadataDisposition, RuntimeCell, Segment, Source};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// `echo[data, delimiter?]`: splits `data` on `delimiter` (no split if
/// absent) and yields each piece as its own item.
pub struct Echo {
    cell: RuntimeCell,
    data: String,
    delimiter: Option<String>,
}

impl Echo {
    pub fn new(data: impl Into<String>, delimiter: Option<String>) -> Self {
        Self { cell: RuntimeCell::new(), data: data.into(), delimiter }
    }
}

impl HasRuntime for Echo {
    fn runtime_cell(&self) -> &RuntimeCell {
        &self.cell
    }
}

impl Source for Echo {
    fn generate(&self) -> ItemIter {
        let pieces: Vec<Item> = match &self.delimiter {
            Some(delim) => self.data.split(delim.as_str()).map(Item::from).collect(),
            None => vec![Item::from(self.data.clone())],
        };
        Box::new(pieces.into_iter())
    }

    fn name(&self) -> &str {
        "echo"
    }
}

/// `range[lower, upper]`: yields `lower..upper`.
pub struct Range {
    cell: RuntimeCell,
    lower: i64,
    upper: i64,
}

impl Range {
    pub fn new(lower: i64, upper: i64) -> Self {
        Self { cell: RuntimeCell::new(), lower, upper }
    }
}

impl HasRuntime for Range {
    fn runtime_cell(&self) -> &RuntimeCell {
        &self.cell
    }
}

impl Source for Range {
    fn generate(&self) -> ItemIter {
        Box::new((self.lower..self.upper).map(Item::from))
    }

    fn name(&self) -> &str {
        "range"
    }
}

/// `cast[cast_type, fail_silently?]`: parses each item's string form as
/// `int`/`float`/`str`/`bool`. A failed cast is dropped from the stream when
/// `fail_silently` is true (the default); otherwise it panics with the
/// underlying `RuntimeDataError`, matching `Cast(cast_type,
/// fail_silently=True)`'s `raise` path when strict mode is requested.
pub struct Cast {
    cell: RuntimeCell,
    cast_type: String,
    fail_silently: bool,
}

impl Cast {
    pub fn new(cast_type: impl Into<String>, fail_silently: bool) -> Self {
        Self { cell: RuntimeCell::new(), cast_type: cast_type.into(), fail_silently }
    }

    fn cast_one(&self, value: &Value) -> Result<Value, RuntimeDataError> {
        let text = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        match self.cast_type.as_str() {
            "int" => text
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| RuntimeDataError::CastFailed("int".to_string())),
            "float" => text
                .trim()
                .parse::<f64>()
                .map(|f| serde_json::Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null))
                .map_err(|_| RuntimeDataError::CastFailed("float".to_string())),
            "str" => Ok(Value::String(text)),
            "bool" => match text.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(Value::Bool(true)),
                "false" | "0" | "no" => Ok(Value::Bool(false)),
                _ => Err(RuntimeDataError::CastFailed("bool".to_string())),
            },
            other => Err(RuntimeDataError::CastFailed(other.to_string())),
        }
    }
}

impl HasRuntime for Cast {
    fn runtime_cell(&self) -> &RuntimeCell {
        &self.cell
    }
}

impl Segment for Cast {
    fn transform(&self, input: ItemIter) -> ItemIter {
        let fail_silently = self.fail_silently;
        Box::new(input.filter_map(move |item| {
            let data = item.as_data()?;
            match self.cast_one(data) {
                Ok(value) => Some(Item::Data(value)),
                Err(_) if fail_silently => None,
                Err(e) => panic!("{e}"),
            }
        }))
    }

    fn name(&self) -> &str {
        "cast"
    }
}

/// `print[prefix?]`: logs (and echoes to stdout) each item, passing it
/// through unchanged.
pub struct Print {
    cell: RuntimeCell,
    prefix: Option<String>,
}

impl Print {
    pub fn new(prefix: Option<String>) -> Self {
        Self { cell: RuntimeCell::new(), prefix }
    }
}

impl HasRuntime for Print {
    fn runtime_cell(&self) -> &RuntimeCell {
        &self.cell
    }
}

impl Segment for Print {
    fn transform(&self, input: ItemIter) -> ItemIter {
        let prefix = self.prefix.clone();
        Box::new(input.inspect(move |item| {
            let line = match &prefix {
                Some(p) => format!("{p}{item}"),
                None => item.to_string(),
            };
            tracing::info!("{}", line);
            println!("{line}");
        }))
    }

    fn name(&self) -> &str {
        "print"
    }
}

/// `scale[multiplier, field?]`: multiplies a numeric item (or a field of
/// it) by `multiplier`.
pub struct Scale {
    cell: RuntimeCell,
    multiplier: f64,
    field: Option<String>,
}

impl Scale {
    pub fn new(multiplier: f64, field: Option<String>) -> Self {
        Self { cell: RuntimeCell::new(), multiplier, field }
    }
}

impl HasRuntime for Scale {
    fn runtime_cell(&self) -> &RuntimeCell {
        &self.cell
    }
}

// Rides the shared field-extract/multi-emit bookkeeping (spec §4.1's
// "field-mapping variant") instead of redoing it inline.
impl FieldSegment for Scale {
    fn field(&self) -> Option<String> {
        self.field.clone()
    }

    fn set_as(&self) -> Option<String> {
        self.field.clone()
    }

    fn value_fn(&self) -> ValueFn {
        let multiplier = self.multiplier;
        Arc::new(move |v| Ok(vec![Value::from(v.as_f64().unwrap_or(0.0) * multiplier)]))
    }

    fn name(&self) -> &str {
        "scale"
    }
}

/// `firstN[n]`: yields only the first `n` items.
pub struct FirstN {
    cell: RuntimeCell,
    n: usize,
}

impl FirstN {
    pub fn new(n: usize) -> Self {
        Self { cell: RuntimeCell::new(), n }
    }
}

impl HasRuntime for FirstN {
    fn runtime_cell(&self) -> &RuntimeCell {
        &self.cell
    }
}

impl Segment for FirstN {
    fn transform(&self, input: ItemIter) -> ItemIter {
        Box::new(input.take(self.n))
    }

    fn name(&self) -> &str {
        "first_n"
    }
}

/// `everyN[n]`: yields every `n`th item (1-indexed: the `n`th, `2n`th, ...).
pub struct EveryN {
    cell: RuntimeCell,
    n: usize,
}

impl EveryN {
    pub fn new(n: usize) -> Self {
        Self { cell: RuntimeCell::new(), n: n.max(1) }
    }
}

impl HasRuntime for EveryN {
    fn runtime_cell(&self) -> &RuntimeCell {
        &self.cell
    }
}

impl Segment for EveryN {
    fn transform(&self, input: ItemIter) -> ItemIter {
        let n = self.n;
        Box::new(input.enumerate().filter_map(move |(i, item)| if (i + 1) % n == 0 { Some(item) } else { None }))
    }

    fn name(&self) -> &str {
        "every_n"
    }
}

/// `slice[start, stop?]`: yields items `[start, stop)`, `stop` absent
/// meaning "to the end".
pub struct Slice {
    cell: RuntimeCell,
    start: usize,
    stop: Option<usize>,
}

impl Slice {
    pub fn new(start: usize, stop: Option<usize>) -> Self {
        Self { cell: RuntimeCell::new(), start, stop }
    }
}

impl HasRuntime for Slice {
    fn runtime_cell(&self) -> &RuntimeCell {
        &self.cell
    }
}

impl Segment for Slice {
    fn transform(&self, input: ItemIter) -> ItemIter {
        let iter = input.skip(self.start);
        match self.stop {
            Some(stop) => Box::new(iter.take(stop.saturating_sub(self.start))),
            None => Box::new(iter),
        }
    }

    fn name(&self) -> &str {
        "slice"
    }
}

/// `isIn[values]` / `isNotIn[values]`: filters items whose (optional field)
/// value is / isn't in `values`.
pub struct IsIn {
    cell: RuntimeCell,
    values: Vec<Value>,
    negate: bool,
    field: Option<String>,
}

impl IsIn {
    pub fn new(values: Vec<Value>, negate: bool, field: Option<String>) -> Self {
        Self { cell: RuntimeCell::new(), values, negate, field }
    }
}

impl HasRuntime for IsIn {
    fn runtime_cell(&self) -> &RuntimeCell {
        &self.cell
    }
}

impl Segment for IsIn {
    fn transform(&self, input: ItemIter) -> ItemIter {
        let values = self.values.clone();
        let negate = self.negate;
        let field = self.field.clone();
        Box::new(input.filter(move |item| {
            let Some(data) = item.as_data() else { return true };
            let probe = match &field {
                Some(path) => extract_field(data, path).unwrap_or(Value::Null),
                None => data.clone(),
            };
            let contained = values.contains(&probe);
            contained != negate
        }))
    }

    fn name(&self) -> &str {
        "is_in"
    }
}

/// `flatten`: flattens each JSON array item into its elements; non-array
/// items pass through unchanged.
pub struct Flatten {
    cell: RuntimeCell,
}

impl Flatten {
    pub fn new() -> Self {
        Self { cell: RuntimeCell::new() }
    }
}

impl Default for Flatten {
    fn default() -> Self {
        Self::new()
    }
}

impl HasRuntime for Flatten {
    fn runtime_cell(&self) -> &RuntimeCell {
        &self.cell
    }
}

impl Segment for Flatten {
    fn transform(&self, input: ItemIter) -> ItemIter {
        Box::new(input.flat_map(|item| -> Vec<Item> {
            match item {
                Item::Data(Value::Array(values)) => values.into_iter().map(Item::Data).collect(),
                other => vec![other],
            }
        }))
    }

    fn name(&self) -> &str {
        "flatten"
    }
}

/// `concat[separator?]`: joins the whole stream's string forms into a
/// single item once the stream ends.
pub struct Concat {
    cell: RuntimeCell,
    separator: String,
}

impl Concat {
    pub fn new(separator: Option<String>) -> Self {
        Self { cell: RuntimeCell::new(), separator: separator.unwrap_or_default() }
    }
}

impl HasRuntime for Concat {
    fn runtime_cell(&self) -> &RuntimeCell {
        &self.cell
    }
}

impl Segment for Concat {
    fn transform(&self, input: ItemIter) -> ItemIter {
        let separator = self.separator.clone();
        let pieces: Vec<String> = input.filter_map(|item| item.as_data().map(|v| v.to_string())).collect();
        Box::new(std::iter::once(Item::from(pieces.join(&separator))))
    }

    fn name(&self) -> &str {
        "concat"
    }
}

/// `hash[fields?, algorithm?]`: replaces each item with the hex digest of
/// its named fields (or the whole item if `fields` is empty).
pub struct Hash {
    cell: RuntimeCell,
    fields: Vec<String>,
    algorithm: HashAlgorithm,
}

impl Hash {
    pub fn new(fields: Vec<String>, algorithm: HashAlgorithm) -> Self {
        Self { cell: RuntimeCell::new(), fields, algorithm }
    }
}

impl HasRuntime for Hash {
    fn runtime_cell(&self) -> &RuntimeCell {
        &self.cell
    }
}

impl Segment for Hash {
    fn transform(&self, input: ItemIter) -> ItemIter {
        let algorithm = self.algorithm;
        let fields = self.fields.clone();
        Box::new(input.filter_map(move |item| {
            let data = item.into_data()?;
            let fields = if fields.is_empty() { vec![String::new()] } else { fields.clone() };
            let digest = if fields == [String::new()] {
                hash_fields(&data, &[], algorithm, HashSerialization::Json)
            } else {
                hash_fields(&data, &fields, algorithm, HashSerialization::Json)
            };
            Some(Item::from(digest))
        }))
    }

    fn name(&self) -> &str {
        "hash"
    }
}

/// `fillTemplate[template]`: renders `template` against each item's fields
/// (treating the item as the `{name: value}` map when it's a JSON object).
pub struct FillTemplate {
    cell: RuntimeCell,
    template: String,
}

impl FillTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self { cell: RuntimeCell::new(), template: template.into() }
    }
}

impl HasRuntime for FillTemplate {
    fn runtime_cell(&self) -> &RuntimeCell {
        &self.cell
    }
}

impl Segment for FillTemplate {
    fn transform(&self, input: ItemIter) -> ItemIter {
        let template = self.template.clone();
        Box::new(input.filter_map(move |item| {
            let data = item.as_data()?;
            let values: HashMap<String, String> = match data {
                Value::Object(map) => {
                    map.iter().map(|(k, v)| (k.clone(), value_as_text(v))).collect()
                }
                other => HashMap::from([("value".to_string(), value_as_text(other))]),
            };
            Some(Item::from(fill_template(&template, &values)))
        }))
    }

    fn name(&self) -> &str {
        "fill_template"
    }
}

fn value_as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RuntimeContext;
    use crate::node::iter_from_vec;

    fn attach<T: HasRuntime>(node: &T) {
        node.set_runtime(RuntimeContext::new());
    }

    #[test]
    fn echo_splits_on_delimiter() {
        let echo = Echo::new("a,b,c", Some(",".to_string()));
        attach(&echo);
        let out: Vec<String> =
            echo.generate().map(|i| i.into_data().unwrap().as_str().unwrap().to_string()).collect();
        assert_eq!(out, vec!["a", "b", "c"]);
    }

    #[test]
    fn cast_parses_numbers() {
        let cast = Cast::new("int", true);
        attach(&cast);
        let out: Vec<i64> = cast
            .transform(iter_from_vec(vec![Item::from("42")]))
            .map(|i| i.into_data().unwrap().as_i64().unwrap())
            .collect();
        assert_eq!(out, vec![42]);
    }

    #[test]
    fn cast_drops_bad_input_when_fail_silently() {
        let cast = Cast::new("int", true);
        attach(&cast);
        let out: Vec<Item> =
            cast.transform(iter_from_vec(vec![Item::from("42"), Item::from("not a number")])).collect();
        assert_eq!(out.len(), 1);
    }

    #[test]
    #[should_panic(expected = "could not cast value to int")]
    fn cast_panics_on_bad_input_when_not_fail_silently() {
        let cast = Cast::new("int", false);
        attach(&cast);
        cast.transform(iter_from_vec(vec![Item::from("not a number")])).for_each(drop);
    }

    #[test]
    fn scale_multiplies_whole_item() {
        let seg = Scale::new(2.0, None);
        attach(&seg);
        let out: Vec<i64> = seg
            .transform(iter_from_vec(vec![Item::from(3i64), Item::from(5i64)]))
            .map(|i| i.into_data().unwrap().as_i64().unwrap())
            .collect();
        assert_eq!(out, vec![6, 10]);
    }

    #[test]
    fn scale_multiplies_a_named_field_in_place() {
        let seg = Scale::new(10.0, Some("amount".to_string()));
        attach(&seg);
        let input = iter_from_vec(vec![Item::data(serde_json::json!({"amount": 2, "label": "x"}))]);
        let out: Vec<Value> = seg.transform(input).map(|i| i.into_data().unwrap()).collect();
        assert_eq!(out, vec![serde_json::json!({"amount": 20.0, "label": "x"})]);
    }

    #[test]
    fn first_n_truncates() {
        let seg = FirstN::new(2);
        attach(&seg);
        let out: Vec<Item> = seg.transform(iter_from_vec((0..10).map(Item::from).collect())).collect();
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn every_n_keeps_multiples() {
        let seg = EveryN::new(3);
        attach(&seg);
        let out: Vec<i64> = seg
            .transform(iter_from_vec((1..=9).map(Item::from).collect()))
            .map(|i| i.into_data().unwrap().as_i64().unwrap())
            .collect();
        assert_eq!(out, vec![3, 6, 9]);
    }

    #[test]
    fn is_in_filters_by_membership() {
        let seg = IsIn::new(vec![Value::from(1), Value::from(2)], false, None);
        attach(&seg);
        let out: Vec<i64> = seg
            .transform(iter_from_vec(vec![Item::from(1i64), Item::from(2i64), Item::from(3i64)]))
            .map(|i| i.into_data().unwrap().as_i64().unwrap())
            .collect();
        assert_eq!(out, vec![1, 2]);
    }

    #[test]
    fn flatten_expands_arrays() {
        let seg = Flatten::new();
        attach(&seg);
        let input = iter_from_vec(vec![Item::data(serde_json::json!([1, 2])), Item::from(3i64)]);
        let out: Vec<i64> = seg.transform(input).map(|i| i.into_data().unwrap().as_i64().unwrap()).collect();
        assert_eq!(out, vec![1, 2, 3]);
    }

    #[test]
    fn concat_joins_whole_stream() {
        let seg = Concat::new(Some("-".to_string()));
        attach(&seg);
        let out: Vec<Item> = seg.transform(iter_from_vec(vec![Item::from("a"), Item::from("b")])).collect();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].as_data().unwrap().as_str(), Some("a-b"));
    }

    #[test]
    fn fill_template_uses_object_fields() {
        let seg = FillTemplate::new("Hello, {name}!");
        attach(&seg);
        let input = iter_from_vec(vec![Item::data(serde_json::json!({"name": "Ada"}))]);
        let out: Vec<Item> = seg.transform(input).collect();
        assert_eq!(out[0].as_data().unwrap().as_str(), Some("Hello, Ada!"));
    }
}
