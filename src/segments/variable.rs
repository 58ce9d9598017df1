//! `@variable` read/write segments, used internally by the compiler for the
//! `@name` syntax (spec §4.11), grounded in the original's `VariableSource`
//! and `VariableSetSegment`.

use crate::context::SharedRuntime;
use crate::item::Item;
use crate::node::{HasRuntime, ItemIter, MetadataDisposition, RuntimeCell, Segment, Source};

/// Replays whatever sequence is currently stored under `name` in the shared
/// `VariableStore`. Used when a script reads `@name` as a source.
pub struct VariableSource {
    cell: RuntimeCell,
    name: String,
}

impl VariableSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self { cell: RuntimeCell::new(), name: name.into() }
    }
}

impl HasRuntime for VariableSource {
    fn runtime_cell(&self) -> &RuntimeCell {
        &self.cell
    }
}

impl Source for VariableSource {
    fn generate(&self) -> ItemIter {
        let items = self.runtime().variable_store.get(&self.name);
        Box::new(items.into_iter())
    }

    fn name(&self) -> &str {
        "variable_source"
    }
}

/// Buffers the whole input stream and writes it into the shared
/// `VariableStore` under `name` (last-writer-wins), passing every item
/// through unchanged. Used when a script writes `@name` inline in a
/// pipeline.
pub struct VariableSetSegment {
    cell: RuntimeCell,
    name: String,
}

impl VariableSetSegment {
    pub fn new(name: impl Into<String>) -> Self {
        Self { cell: RuntimeCell::new(), name: name.into() }
    }
}

impl HasRuntime for VariableSetSegment {
    fn runtime_cell(&self) -> &RuntimeCell {
        &self.cell
    }

    fn set_runtime(&self, runtime: SharedRuntime) {
        self.runtime_cell().set(runtime);
    }
}

impl Segment for VariableSetSegment {
    fn disposition(&self) -> MetadataDisposition {
        MetadataDisposition::Aware
    }

    fn transform(&self, input: ItemIter) -> ItemIter {
        let items: Vec<Item> = input.collect();
        self.runtime().variable_store.set(&self.name, items.clone());
        Box::new(items.into_iter())
    }

    fn name(&self) -> &str {
        "variable_set_segment"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RuntimeContext;
    use crate::node::iter_from_vec;

    #[test]
    fn round_trips_through_a_variable() {
        let runtime = RuntimeContext::new();

        let setter = VariableSetSegment::new("words");
        setter.set_runtime(runtime.clone());
        let passed: Vec<Item> =
            setter.transform(iter_from_vec(vec![Item::from("a"), Item::from("b")])).collect();
        assert_eq!(passed.len(), 2);

        let source = VariableSource::new("words");
        source.set_runtime(runtime);
        let replayed: Vec<Item> = source.generate().collect();
        assert_eq!(replayed.len(), 2);
    }

    #[test]
    fn unset_variable_replays_as_empty() {
        let runtime = RuntimeContext::new();
        let source = VariableSource::new("missing");
        source.set_runtime(runtime);
        assert_eq!(source.generate().count(), 0);
    }
}
