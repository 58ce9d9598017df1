//! The `Source` contract (spec §4.1).

use super::runtime_cell::HasRuntime;
use super::ItemIter;

/// A node that produces a (finite or infinite) lazy sequence of items; it
/// takes no stream input.
pub trait Source: HasRuntime + Send + Sync {
    /// Generate items for the pipeline. May be finite or infinite.
    fn generate(&self) -> ItemIter;

    fn name(&self) -> &str {
        "source"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RuntimeContext;
    use crate::item::Item;
    use crate::node::RuntimeCell;

    struct Counter {
        cell: RuntimeCell,
        upto: i64,
    }

    impl HasRuntime for Counter {
        fn runtime_cell(&self) -> &RuntimeCell {
            &self.cell
        }
    }

    impl Source for Counter {
        fn generate(&self) -> ItemIter {
            Box::new((0..self.upto).map(Item::from))
        }
    }

    #[test]
    fn source_generates_without_input() {
        let src = Counter { cell: RuntimeCell::new(), upto: 3 };
        src.set_runtime(RuntimeContext::new());
        let items: Vec<Item> = src.generate().collect();
        assert_eq!(items.len(), 3);
    }
}
