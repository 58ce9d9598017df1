//! Segment & Source abstraction (spec §4.1, C4).

pub mod field;
pub mod runtime_cell;
pub mod segment;
pub mod source;

pub use field::FieldSegment;
pub use runtime_cell::{HasRuntime, RuntimeCell};
pub use segment::{run_segment, MetadataDisposition, Segment};
pub use source::Source;

use crate::item::Item;

/// Alias used throughout the engine for a lazily-pulled stream of items.
///
/// `Send` is required because forks and arrow-forks move these across OS
/// thread boundaries; within a single `Pipeline`/`Script`/`Loop` execution
/// stays on one thread regardless.
pub type ItemIter = Box<dyn Iterator<Item = Item> + Send>;

pub fn empty_iter() -> ItemIter {
    Box::new(std::iter::empty())
}

pub fn iter_from_vec(items: Vec<Item>) -> ItemIter {
    Box::new(items.into_iter())
}

/// Something that can be driven end-to-end: a [`Source`] ignoring its input,
/// or a [`Segment`] run through its metadata policy. Used by `as_function`
/// and by the composers, which store a mix of sources and segments.
pub trait Runnable: HasRuntime + Send {
    fn run(&self, input: ItemIter) -> ItemIter;
}

impl<T: Source> Runnable for T {
    fn run(&self, _input: ItemIter) -> ItemIter {
        self.generate()
    }
}

/// The single output of an `as_function(single_out=true)` call, or the
/// `Vec` collected otherwise. Mirrors `AbstractSegment.as_function`.
pub enum FunctionOutput {
    Single(Item),
    Many(Vec<Item>),
}

/// Execute `node` over `input`, honouring `single_in`/`single_out` exactly as
/// `talkpipe`'s `AbstractSegment.as_function` does.
///
/// - `single_in`: wrap `input` (expected to hold exactly one item) as the
///   sole element of the iterator presented to the node, rather than
///   treating `input` as the full stream.
/// - `single_out`: require the node to produce exactly one item; error
///   otherwise.
pub fn as_function(
    node: &dyn Runnable,
    input: Vec<Item>,
    single_in: bool,
    single_out: bool,
) -> anyhow::Result<FunctionOutput> {
    let feed: ItemIter = if single_in {
        if input.len() != 1 {
            anyhow::bail!("single_in expects exactly one input item, got {}", input.len());
        }
        iter_from_vec(input)
    } else {
        iter_from_vec(input)
    };

    let results: Vec<Item> = node.run(feed).collect();

    if single_out {
        let mut results = results;
        if results.len() != 1 {
            anyhow::bail!("expected 1 result, got {}", results.len());
        }
        Ok(FunctionOutput::Single(results.remove(0)))
    } else {
        Ok(FunctionOutput::Many(results))
    }
}
