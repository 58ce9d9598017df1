//! Pipeline/Script/Loop composers (spec §4.2-§4.4, C5-C7).
//!
//! These are the three ways a ChatterLang script wires nodes into an
//! executable graph, short of forking. All three are themselves `Segment`s,
//! so they nest: a `Script` holds `Pipeline`s, a `Loop` holds a `Script`.

use crate::item::Item;
use crate::node::{run_segment, HasRuntime, ItemIter, MetadataDisposition, Runnable, RuntimeCell, Segment, Source};
use crate::context::SharedRuntime;

/// One link in a `Pipeline`: either a data-generating `Source` (only
/// meaningful as the first stage; later stages ignore their upstream input
/// by construction if they're sources too, matching the teacher's "a stage
/// can restart the stream" tolerance) or a transforming `Segment`.
pub enum Stage {
    Source(Box<dyn Source>),
    Segment(Box<dyn Segment>),
}

impl Stage {
    fn run(&self, input: ItemIter) -> ItemIter {
        match self {
            Stage::Source(s) => s.generate(),
            Stage::Segment(s) => run_segment(s.as_ref(), input),
        }
    }

    fn attach_runtime(&self, runtime: SharedRuntime) {
        match self {
            Stage::Source(s) => s.set_runtime(runtime),
            Stage::Segment(s) => s.set_runtime(runtime),
        }
    }
}

/// A lazy serial chain of stages (spec §4.2): each stage's output feeds the
/// next stage's input, with no stage reordering and no eager draining.
pub struct Pipeline {
    cell: RuntimeCell,
    stages: Vec<Stage>,
    name: String,
}

impl Pipeline {
    pub fn new(stages: Vec<Stage>) -> Self {
        Self { cell: RuntimeCell::new(), stages, name: "pipeline".to_string() }
    }

    pub fn named(name: impl Into<String>, stages: Vec<Stage>) -> Self {
        Self { cell: RuntimeCell::new(), stages, name: name.into() }
    }

    fn execute(&self, input: ItemIter) -> ItemIter {
        let mut current = input;
        for stage in &self.stages {
            current = stage.run(current);
        }
        current
    }
}

impl HasRuntime for Pipeline {
    fn runtime_cell(&self) -> &RuntimeCell {
        &self.cell
    }

    fn set_runtime(&self, runtime: SharedRuntime) {
        self.runtime_cell().set(runtime.clone());
        for stage in &self.stages {
            stage.attach_runtime(runtime.clone());
        }
    }
}

impl Runnable for Pipeline {
    fn run(&self, input: ItemIter) -> ItemIter {
        self.execute(input)
    }
}

impl Segment for Pipeline {
    fn disposition(&self) -> MetadataDisposition {
        // A pipeline's own stages already apply their individual metadata
        // policies; the pipeline as a whole must see the raw stream so it
        // isn't filtered twice.
        MetadataDisposition::Aware
    }

    fn transform(&self, input: ItemIter) -> ItemIter {
        self.execute(input)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// A sequence of independently-run pipelines (spec §4.3): every pipeline but
/// the last is fully drained and its output discarded before the next one
/// starts; the last pipeline's output is the `Script`'s lazy result.
///
/// Earlier pipelines exist for side effects — typically setting `@variable`s
/// in the shared `RuntimeContext` that later pipelines read back via a
/// `VariableSource`.
pub struct Script {
    cell: RuntimeCell,
    pipelines: Vec<Pipeline>,
    name: String,
}

impl Script {
    pub fn new(pipelines: Vec<Pipeline>) -> Self {
        Self { cell: RuntimeCell::new(), pipelines, name: "script".to_string() }
    }

    fn execute(&self, input: ItemIter) -> ItemIter {
        let Some((last, rest)) = self.pipelines.split_last() else {
            return crate::node::empty_iter();
        };

        // Only the very first pipeline sees the incoming stream; every
        // pipeline after it (drained or not) runs on an empty iterator, per
        // `Script.transform`'s `current_iter = None` after each drain.
        let mut current = input;
        for pipeline in rest {
            pipeline.run(current).for_each(drop);
            current = crate::node::empty_iter();
        }

        last.run(current)
    }
}

impl HasRuntime for Script {
    fn runtime_cell(&self) -> &RuntimeCell {
        &self.cell
    }

    fn set_runtime(&self, runtime: SharedRuntime) {
        self.runtime_cell().set(runtime.clone());
        for pipeline in &self.pipelines {
            pipeline.set_runtime(runtime.clone());
        }
    }
}

impl Runnable for Script {
    fn run(&self, input: ItemIter) -> ItemIter {
        self.execute(input)
    }
}

impl Segment for Script {
    fn disposition(&self) -> MetadataDisposition {
        MetadataDisposition::Aware
    }

    fn transform(&self, input: ItemIter) -> ItemIter {
        self.execute(input)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Re-runs a `Script` a fixed number of times (spec §4.4). Only the first
/// iteration sees the real input; every other iteration (including
/// intermediate ones) runs against an empty stream. All iterations but the
/// last are fully drained and discarded; the last iteration's output is the
/// `Loop`'s lazy result.
pub struct Loop {
    cell: RuntimeCell,
    script: Script,
    times: usize,
    name: String,
}

impl Loop {
    pub fn new(script: Script, times: usize) -> Self {
        Self { cell: RuntimeCell::new(), script, times, name: "loop".to_string() }
    }

    fn execute(&self, input: ItemIter) -> ItemIter {
        if self.times == 0 {
            return crate::node::empty_iter();
        }

        let mut seed: Vec<Item> = input.collect();

        for i in 0..self.times {
            let fed = if i == 0 { std::mem::take(&mut seed) } else { Vec::new() };
            let out = self.script.run(crate::node::iter_from_vec(fed));

            if i == self.times - 1 {
                return out;
            }
            out.for_each(drop);
        }

        unreachable!("times > 0 guarantees the loop above returns on its last iteration")
    }
}

impl HasRuntime for Loop {
    fn runtime_cell(&self) -> &RuntimeCell {
        &self.cell
    }

    fn set_runtime(&self, runtime: SharedRuntime) {
        self.runtime_cell().set(runtime.clone());
        self.script.set_runtime(runtime);
    }
}

impl Runnable for Loop {
    fn run(&self, input: ItemIter) -> ItemIter {
        self.execute(input)
    }
}

impl Segment for Loop {
    fn disposition(&self) -> MetadataDisposition {
        MetadataDisposition::Aware
    }

    fn transform(&self, input: ItemIter) -> ItemIter {
        self.execute(input)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RuntimeContext;
    use crate::node::field::{FieldSegment, ValueFn};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Range {
        cell: RuntimeCell,
        upto: i64,
    }

    impl HasRuntime for Range {
        fn runtime_cell(&self) -> &RuntimeCell {
            &self.cell
        }
    }

    impl Source for Range {
        fn generate(&self) -> ItemIter {
            Box::new((0..self.upto).map(Item::from))
        }
    }

    struct Double {
        cell: RuntimeCell,
        calls: Arc<AtomicUsize>,
    }

    impl HasRuntime for Double {
        fn runtime_cell(&self) -> &RuntimeCell {
            &self.cell
        }
    }

    impl FieldSegment for Double {
        fn value_fn(&self) -> ValueFn {
            let calls = Arc::clone(&self.calls);
            Arc::new(move |v| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(vec![serde_json::Value::from(v.as_i64().unwrap_or(0) * 2)])
            })
        }
    }

    fn range_stage(upto: i64) -> Stage {
        Stage::Source(Box::new(Range { cell: RuntimeCell::new(), upto }))
    }

    #[test]
    fn pipeline_chains_stages_lazily() {
        let calls = Arc::new(AtomicUsize::new(0));
        let double = Double { cell: RuntimeCell::new(), calls: Arc::clone(&calls) };
        let pipeline = Pipeline::new(vec![range_stage(3), Stage::Segment(Box::new(double))]);
        pipeline.set_runtime(RuntimeContext::new());

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        let out: Vec<i64> = pipeline
            .run(crate::node::empty_iter())
            .map(|i| i.into_data().unwrap().as_i64().unwrap())
            .collect();
        assert_eq!(out, vec![0, 2, 4]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn script_drains_all_but_last_pipeline() {
        let side_effect_calls = Arc::new(AtomicUsize::new(0));
        let side_effect = Double { cell: RuntimeCell::new(), calls: Arc::clone(&side_effect_calls) };
        let first = Pipeline::new(vec![range_stage(2), Stage::Segment(Box::new(side_effect))]);
        let second = Pipeline::new(vec![range_stage(5)]);

        let script = Script::new(vec![first, second]);
        script.set_runtime(RuntimeContext::new());

        let out: Vec<i64> =
            script.run(crate::node::empty_iter()).map(|i| i.into_data().unwrap().as_i64().unwrap()).collect();

        assert_eq!(side_effect_calls.load(Ordering::SeqCst), 2);
        assert_eq!(out, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn script_feeds_empty_to_later_pipeline_with_no_source() {
        // Unlike `script_drains_all_but_last_pipeline`, neither pipeline
        // here embeds a `Source` stage, so the bug this guards against
        // (rebroadcasting the original seed to every pipeline instead of
        // draining it away after the first) can't hide behind a stage that
        // ignores its fed input anyway.
        let first_calls = Arc::new(AtomicUsize::new(0));
        let first_segment = Double { cell: RuntimeCell::new(), calls: Arc::clone(&first_calls) };
        let first = Pipeline::new(vec![Stage::Segment(Box::new(first_segment))]);

        let second_calls = Arc::new(AtomicUsize::new(0));
        let second_segment = Double { cell: RuntimeCell::new(), calls: Arc::clone(&second_calls) };
        let second = Pipeline::new(vec![Stage::Segment(Box::new(second_segment))]);

        let script = Script::new(vec![first, second]);
        script.set_runtime(RuntimeContext::new());

        let seed = crate::node::iter_from_vec(vec![Item::from(1i64), Item::from(2i64)]);
        let out: Vec<i64> = script.run(seed).map(|i| i.into_data().unwrap().as_i64().unwrap()).collect();

        assert_eq!(first_calls.load(Ordering::SeqCst), 2, "the first pipeline sees the real seed");
        assert_eq!(second_calls.load(Ordering::SeqCst), 0, "the last pipeline sees an empty stream, not the seed");
        assert!(out.is_empty());
    }

    #[test]
    fn loop_only_seeds_first_iteration() {
        let seen_lengths = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen_lengths_clone = Arc::clone(&seen_lengths);

        struct Count {
            cell: RuntimeCell,
            seen: Arc<std::sync::Mutex<Vec<usize>>>,
        }
        impl HasRuntime for Count {
            fn runtime_cell(&self) -> &RuntimeCell {
                &self.cell
            }
        }
        impl Segment for Count {
            fn disposition(&self) -> MetadataDisposition {
                MetadataDisposition::Aware
            }
            fn transform(&self, input: ItemIter) -> ItemIter {
                let items: Vec<Item> = input.collect();
                self.seen.lock().unwrap().push(items.len());
                Box::new(items.into_iter())
            }
        }

        let pipeline = Pipeline::new(vec![Stage::Segment(Box::new(Count {
            cell: RuntimeCell::new(),
            seen: seen_lengths_clone,
        }))]);
        let script = Script::new(vec![pipeline]);
        let loop_stage = Loop::new(script, 3);
        loop_stage.set_runtime(RuntimeContext::new());

        let seed = crate::node::iter_from_vec(vec![Item::from(1i64), Item::from(2i64)]);
        let out: Vec<Item> = loop_stage.run(seed).collect();

        assert_eq!(out.len(), 0, "last iteration was seeded empty, so it has no output");
        assert_eq!(*seen_lengths.lock().unwrap(), vec![2, 0, 0]);
    }
}
