//! `accum[variable?, reset]`: buffers the stream across repeated runs
//! (e.g. successive `Loop` iterations) and optionally mirrors the running
//! buffer into a named variable, ported from `chatterlang/compiler.py`'s
//! `accum` built-in.

use crate::item::Item;
use crate::node::{HasRuntime, ItemIter, MetadataDisposition, RuntimeCell, Segment};
use std::sync::Mutex;

pub struct Accum {
    cell: RuntimeCell,
    variable: Option<String>,
    reset: bool,
    buffer: Mutex<Vec<Item>>,
}

impl Accum {
    pub fn new(variable: Option<String>, reset: bool) -> Self {
        Self { cell: RuntimeCell::new(), variable, reset, buffer: Mutex::new(Vec::new()) }
    }
}

impl HasRuntime for Accum {
    fn runtime_cell(&self) -> &RuntimeCell {
        &self.cell
    }
}

impl Segment for Accum {
    fn disposition(&self) -> MetadataDisposition {
        MetadataDisposition::Aware
    }

    fn transform(&self, input: ItemIter) -> ItemIter {
        let mut buffer = self.buffer.lock().expect("accum buffer poisoned");
        if self.reset {
            buffer.clear();
        }
        buffer.extend(input);

        let snapshot = buffer.clone();
        if let Some(name) = &self.variable {
            self.runtime().variable_store.set(name, snapshot.clone());
        }
        Box::new(snapshot.into_iter())
    }

    fn name(&self) -> &str {
        "accum"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RuntimeContext;
    use crate::node::iter_from_vec;

    #[test]
    fn accumulates_across_successive_calls() {
        let accum = Accum::new(Some("buf".to_string()), false);
        accum.set_runtime(RuntimeContext::new());

        let first: Vec<Item> = accum.transform(iter_from_vec(vec![Item::from(1i64)])).collect();
        assert_eq!(first.len(), 1);

        let second: Vec<Item> = accum.transform(iter_from_vec(vec![Item::from(2i64)])).collect();
        assert_eq!(second.len(), 2);
        assert_eq!(accum.runtime().variable_store.get("buf").len(), 2);
    }

    #[test]
    fn reset_clears_buffer_before_extending() {
        let accum = Accum::new(None, true);
        accum.set_runtime(RuntimeContext::new());
        accum.transform(iter_from_vec(vec![Item::from(1i64)])).for_each(drop);
        let second: Vec<Item> = accum.transform(iter_from_vec(vec![Item::from(2i64)])).collect();
        assert_eq!(second.len(), 1);
    }
}
