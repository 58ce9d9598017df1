//! Metadata-producing and metadata-observing helpers (spec §4.11), grounded
//! in the original's `pipe/metadata.py` (`flushN`, `flushT`, `collectMetadata`).

use crate::item::{Item, MetadataKind};
use crate::node::{HasRuntime, ItemIter, MetadataDisposition, RuntimeCell, Segment, Source};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Inserts a `Flush` after every `n`th data item.
pub struct FlushEveryN {
    cell: RuntimeCell,
    n: usize,
    count: AtomicUsize,
}

impl FlushEveryN {
    pub fn new(n: usize) -> Self {
        Self { cell: RuntimeCell::new(), n: n.max(1), count: AtomicUsize::new(0) }
    }
}

impl HasRuntime for FlushEveryN {
    fn runtime_cell(&self) -> &RuntimeCell {
        &self.cell
    }
}

impl Segment for FlushEveryN {
    fn disposition(&self) -> MetadataDisposition {
        MetadataDisposition::Aware
    }

    fn transform(&self, input: ItemIter) -> ItemIter {
        let n = self.n;
        Box::new(input.flat_map(move |item| {
            let mut out = vec![item];
            if matches!(out[0], Item::Data(_)) {
                let seen = self.count.fetch_add(1, Ordering::SeqCst) + 1;
                if seen % n == 0 {
                    out.push(Item::flush());
                }
            }
            out
        }))
    }

    fn name(&self) -> &str {
        "flush_every_n"
    }
}

/// Inserts a `Flush` before the next item once at least `period` has
/// elapsed since the previous one (or since the segment started).
pub struct FlushEveryT {
    cell: RuntimeCell,
    period: Duration,
    last: Mutex<Instant>,
}

impl FlushEveryT {
    pub fn new(period: Duration) -> Self {
        Self { cell: RuntimeCell::new(), period, last: Mutex::new(Instant::now()) }
    }
}

impl HasRuntime for FlushEveryT {
    fn runtime_cell(&self) -> &RuntimeCell {
        &self.cell
    }
}

impl Segment for FlushEveryT {
    fn disposition(&self) -> MetadataDisposition {
        MetadataDisposition::Aware
    }

    fn transform(&self, input: ItemIter) -> ItemIter {
        Box::new(input.flat_map(move |item| {
            let mut out = Vec::with_capacity(2);
            if matches!(item, Item::Data(_)) {
                let mut last = self.last.lock().expect("flush timer poisoned");
                if last.elapsed() >= self.period {
                    out.push(Item::flush());
                    *last = Instant::now();
                }
            }
            out.push(item);
            out
        }))
    }

    fn name(&self) -> &str {
        "flush_every_t"
    }
}

/// A standalone source emitting `Flush` every `period`, indefinitely.
/// Typically broadcast-forked alongside a data pipeline so flushes interleave
/// with data on a wall-clock cadence rather than an item-count cadence.
pub struct FlushTicker {
    cell: RuntimeCell,
    period: Duration,
}

impl FlushTicker {
    pub fn new(period: Duration) -> Self {
        Self { cell: RuntimeCell::new(), period }
    }
}

impl HasRuntime for FlushTicker {
    fn runtime_cell(&self) -> &RuntimeCell {
        &self.cell
    }
}

impl Source for FlushTicker {
    fn generate(&self) -> ItemIter {
        let period = self.period;
        Box::new(std::iter::from_fn(move || {
            std::thread::sleep(period);
            Some(Item::flush())
        }))
    }

    fn name(&self) -> &str {
        "flush_ticker"
    }
}

/// Counts `Flush` metadata items seen so far and mirrors the running count
/// into a named variable, passing every item (data and metadata) through
/// unchanged.
pub struct CollectMetadata {
    cell: RuntimeCell,
    variable: String,
    count: AtomicUsize,
}

impl CollectMetadata {
    pub fn new(variable: impl Into<String>) -> Self {
        Self { cell: RuntimeCell::new(), variable: variable.into(), count: AtomicUsize::new(0) }
    }
}

impl HasRuntime for CollectMetadata {
    fn runtime_cell(&self) -> &RuntimeCell {
        &self.cell
    }
}

impl Segment for CollectMetadata {
    fn disposition(&self) -> MetadataDisposition {
        MetadataDisposition::Aware
    }

    fn transform(&self, input: ItemIter) -> ItemIter {
        let variable = self.variable.clone();
        Box::new(input.map(move |item| {
            if matches!(item, Item::Metadata(MetadataKind::Flush)) {
                let seen = self.count.fetch_add(1, Ordering::SeqCst) + 1;
                self.runtime().variable_store.set(&variable, vec![Item::from(seen as i64)]);
            }
            item
        }))
    }

    fn name(&self) -> &str {
        "collect_metadata"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RuntimeContext;
    use crate::node::iter_from_vec;

    #[test]
    fn flush_every_n_inserts_after_every_nth_item() {
        let seg = FlushEveryN::new(2);
        seg.set_runtime(RuntimeContext::new());
        let input = iter_from_vec((0..4).map(Item::from).collect());
        let out: Vec<Item> = seg.transform(input).collect();
        assert_eq!(out.len(), 6);
        assert!(out[1].is_metadata());
        assert!(out[3].is_metadata());
    }

    #[test]
    fn collect_metadata_mirrors_count_into_variable() {
        let runtime = RuntimeContext::new();
        let seg = CollectMetadata::new("flushes");
        seg.set_runtime(runtime.clone());

        let input = iter_from_vec(vec![Item::from(1i64), Item::flush(), Item::from(2i64), Item::flush()]);
        let out: Vec<Item> = seg.transform(input).collect();
        assert_eq!(out.len(), 4);
        assert_eq!(runtime.variable_store.get("flushes"), vec![Item::from(2i64)]);
    }
}
