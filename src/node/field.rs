//! Field-mapping convenience segment (spec §4.1: "field-mapping variant").
//!
//! On each input item, extract a named field (dotted path), apply a value
//! function, and either replace the item or assign the result back under
//! another field. Supports "multi-emit": the value function returns a
//! sequence, and the engine emits one copy of the item per element, with the
//! assigned field substituted.

use super::runtime_cell::HasRuntime;
use super::segment::Segment;
use super::ItemIter;
use crate::helpers::field_extract::{assign_field, extract_field};
use crate::item::Item;
use serde_json::Value;
use std::sync::Arc;

/// A boxed value function: extracted field value (or whole item) in,
/// zero-or-more replacement values out.
pub type ValueFn = Arc<dyn Fn(&Value) -> anyhow::Result<Vec<Value>> + Send + Sync>;

/// Implemented by the small convenience segments generated for `scale`,
/// `cast`, and similar single-field transforms. A blanket [`Segment`] impl
/// below does the extraction/substitution bookkeeping described in spec
/// §4.1 so individual segments only need to supply `value_fn`.
pub trait FieldSegment: HasRuntime + Send + Sync {
    /// Dotted path to extract, or `None` to use the whole item.
    fn field(&self) -> Option<String> {
        None
    }

    /// Field name to write the result back under, or `None` to replace the
    /// item outright with the (single) result.
    fn set_as(&self) -> Option<String> {
        None
    }

    /// The function applied to the extracted value. Always returns a
    /// `Vec`; a non-multi-emitting segment simply always returns a
    /// single-element vec.
    fn value_fn(&self) -> ValueFn;

    /// Segment name reported to the engine (spec §4.1's node naming).
    fn name(&self) -> &str {
        "field_segment"
    }
}

impl<T: FieldSegment> Segment for T {
    fn transform(&self, input: ItemIter) -> ItemIter {
        let field = self.field();
        let set_as = self.set_as();
        let f = self.value_fn();

        Box::new(input.flat_map(move |item| -> Vec<Item> {
            let original = match item {
                Item::Data(v) => v,
                Item::Metadata(kind) => {
                    // Passthrough segments never see metadata; defensively
                    // forward it unchanged if they somehow do.
                    return vec![Item::Metadata(kind)];
                }
            };

            let value = match &field {
                Some(path) => extract_field(&original, path).unwrap_or(Value::Null),
                None => original.clone(),
            };

            let results = f(&value).unwrap_or_else(|e| panic!("{e}"));

            results
                .into_iter()
                .map(|result| {
                    if let Some(set_as) = &set_as {
                        let mut obj = original.clone();
                        assign_field(&mut obj, set_as, result);
                        Item::Data(obj)
                    } else {
                        Item::Data(result)
                    }
                })
                .collect()
        }))
    }

    fn name(&self) -> &str {
        FieldSegment::name(self)
    }
}
