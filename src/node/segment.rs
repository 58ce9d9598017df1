//! The `Segment` contract and its metadata policy (spec §4.1).

use super::runtime_cell::HasRuntime;
use super::ItemIter;
use crate::item::Item;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// A segment's disposition toward metadata items (spec §3/§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataDisposition {
    /// The engine filters metadata items out of the input presented to
    /// `transform` and re-injects them into the output stream in the same
    /// relative order, before the next data item produced after them. This
    /// is the default.
    Passthrough,
    /// `transform` receives the raw interleaved stream and is responsible
    /// for handling or forwarding metadata itself.
    Aware,
}

/// A node that consumes a lazy sequence of items and produces a lazy
/// sequence of items. Cardinality is unconstrained (1→1, 1→N, N→1,
/// filtering, expansion).
pub trait Segment: HasRuntime + Send + Sync {
    /// Declares this segment's metadata policy. Defaults to passthrough.
    fn disposition(&self) -> MetadataDisposition {
        MetadataDisposition::Passthrough
    }

    /// Transform input items into output items. For a passthrough segment
    /// this sees only data items; for a metadata-aware segment it sees the
    /// raw interleaved stream.
    fn transform(&self, input: ItemIter) -> ItemIter;

    /// A human-readable name, used in compile errors and tracing.
    fn name(&self) -> &str {
        "segment"
    }
}

/// Run `segment` over `input`, applying its metadata policy.
///
/// For `Aware` segments this is exactly `segment.transform(input)`. For
/// `Passthrough` segments, metadata items are filtered out of the stream
/// `transform` sees and spliced back into its output, preserving their
/// relative order and appearing before the next data item produced after
/// them (spec's adopted resolution for the cardinality-change open
/// question: a segment's fan-out/fan-in ratio against metadata positions
/// is implementation-defined, so we flush buffered metadata immediately
/// before the next data output, and flush what remains when the segment's
/// output ends).
pub fn run_segment(segment: &dyn Segment, input: ItemIter) -> ItemIter {
    match segment.disposition() {
        MetadataDisposition::Aware => segment.transform(input),
        MetadataDisposition::Passthrough => {
            let pending = Arc::new(Mutex::new(VecDeque::new()));
            let data_only = DataOnlyIter { inner: input, pending: Arc::clone(&pending) };
            let output = segment.transform(Box::new(data_only));
            Box::new(Reinjector { inner: output, pending, flush: VecDeque::new() })
        }
    }
}

struct DataOnlyIter {
    inner: ItemIter,
    pending: Arc<Mutex<VecDeque<Item>>>,
}

impl Iterator for DataOnlyIter {
    type Item = Item;

    fn next(&mut self) -> Option<Item> {
        loop {
            match self.inner.next()? {
                Item::Metadata(kind) => {
                    self.pending.lock().expect("metadata queue poisoned").push_back(Item::Metadata(kind));
                }
                data => return Some(data),
            }
        }
    }
}

struct Reinjector {
    inner: ItemIter,
    pending: Arc<Mutex<VecDeque<Item>>>,
    flush: VecDeque<Item>,
}

impl Iterator for Reinjector {
    type Item = Item;

    fn next(&mut self) -> Option<Item> {
        if let Some(item) = self.flush.pop_front() {
            return Some(item);
        }

        match self.inner.next() {
            Some(item) => {
                let mut pending = self.pending.lock().expect("metadata queue poisoned");
                while let Some(m) = pending.pop_front() {
                    self.flush.push_back(m);
                }
                drop(pending);
                self.flush.push_back(item);
                self.flush.pop_front()
            }
            None => {
                let mut pending = self.pending.lock().expect("metadata queue poisoned");
                while let Some(m) = pending.pop_front() {
                    self.flush.push_back(m);
                }
                drop(pending);
                self.flush.pop_front()
            }
        }
    }
}
