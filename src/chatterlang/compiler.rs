//! AST -> executable graph compilation (spec §4.8), ported from the
//! original's `chatterlang/compiler.py` `compile()` phases.

use super::ast::{InputNode, Literal, NodeSpec, Param, ParamValue, ParsedPipeline, ParsedScript, StageNode, Statement};
use super::parser::parse;
use crate::arrow::{ArrowForkRegistry, ThreadedQueue};
use crate::compose::{Loop, Pipeline, Script, Stage};
use crate::context::{ConstStore, RuntimeContext, SharedRuntime};
use crate::error::CompileError;
use crate::fork::{ForkDistribution, ForkSegment};
use crate::item::Item;
use crate::node::{empty_iter, iter_from_vec, HasRuntime, ItemIter, RuntimeCell, Runnable, Segment, Source};
use crate::registry::{create_segment, create_source, ResolvedParams};
use crate::segments::variable::{VariableSetSegment, VariableSource};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

/// Capacity of every arrow-fork's per-consumer queue (spec §4.7).
const ARROW_QUEUE_CAPACITY: usize = 256;

/// Capacity of every in-pipeline fork branch's queue (spec §4.6).
const FORK_BRANCH_CAPACITY: usize = 64;

/// Parse and compile ChatterLang source text into an executable graph.
///
/// `runtime`, if given, seeds the compile: its constants take precedence
/// over the script's own `CONST` declarations (spec §4.8 phase 2); a fresh
/// `RuntimeContext` is created otherwise.
pub fn compile(source: &str, runtime: Option<SharedRuntime>) -> Result<CompiledScript, CompileError> {
    compile_parsed(parse(source)?, runtime)
}

pub fn compile_parsed(parsed: ParsedScript, runtime: Option<SharedRuntime>) -> Result<CompiledScript, CompileError> {
    let runtime = runtime.unwrap_or_else(RuntimeContext::new);

    let mut constants = HashMap::new();
    for (name, literal) in &parsed.constants {
        constants.insert(name.clone(), literal.to_value());
    }
    runtime.add_constants(constants, false);

    let fork_registry = Arc::new(ArrowForkRegistry::new());
    let producer_counters = build_producer_counters(&parsed);

    let mut top_level: Vec<Box<dyn Runnable>> = Vec::new();
    let mut producers: Vec<ProducerJob> = Vec::new();

    for statement in &parsed.statements {
        match statement {
            Statement::Loop(parsed_loop) => {
                let mut pipelines = Vec::with_capacity(parsed_loop.pipelines.len());
                for p in &parsed_loop.pipelines {
                    let pipeline = compile_pipeline(p, &runtime, &fork_registry)?;
                    pipeline.set_runtime(runtime.clone());
                    pipelines.push(pipeline);
                }
                let script = Script::new(pipelines);
                script.set_runtime(runtime.clone());
                let loop_stage = Loop::new(script, parsed_loop.times);
                loop_stage.set_runtime(runtime.clone());
                top_level.push(Box::new(loop_stage));
            }
            Statement::Pipeline(p) => {
                let pipeline = compile_pipeline(p, &runtime, &fork_registry)?;
                pipeline.set_runtime(runtime.clone());

                match &p.produces_to {
                    Some(fork_name) => {
                        let queue = fork_registry.get_or_create(fork_name, ARROW_QUEUE_CAPACITY);
                        let counter = producer_counters
                            .get(fork_name)
                            .cloned()
                            .expect("every producer's fork has a counter entry");
                        producers.push(ProducerJob { pipeline, queue, counter });
                    }
                    None => top_level.push(Box::new(pipeline)),
                }
            }
        }
    }

    Ok(CompiledScript { runtime, top_level, producers: Mutex::new(Some(producers)), fork_registry })
}

fn build_producer_counters(parsed: &ParsedScript) -> HashMap<String, Arc<AtomicUsize>> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for statement in &parsed.statements {
        if let Statement::Pipeline(p) = statement {
            if let Some(name) = &p.produces_to {
                *counts.entry(name.clone()).or_insert(0) += 1;
            }
        }
    }
    counts.into_iter().map(|(name, count)| (name, Arc::new(AtomicUsize::new(count)))).collect()
}

fn compile_pipeline(
    parsed: &ParsedPipeline,
    runtime: &SharedRuntime,
    fork_registry: &Arc<ArrowForkRegistry>,
) -> Result<Pipeline, CompileError> {
    let mut stages = Vec::with_capacity(parsed.stages.len() + 1);

    if let Some(fork_name) = &parsed.consumes_from {
        let queue = fork_registry.get_or_create(fork_name, ARROW_QUEUE_CAPACITY);
        stages.push(Stage::Source(Box::new(QueueSource::new(queue))));
    } else if let Some(input) = &parsed.input {
        stages.push(compile_input(input, &runtime.const_store)?);
    }

    for stage in &parsed.stages {
        stages.push(compile_stage(stage, runtime, fork_registry)?);
    }

    Ok(Pipeline::new(stages))
}

fn compile_input(input: &InputNode, consts: &ConstStore) -> Result<Stage, CompileError> {
    match input {
        InputNode::Literal(text) => {
            Ok(Stage::Source(Box::new(crate::segments::basic::Echo::new(text.clone(), None))))
        }
        InputNode::Variable(name) => Ok(Stage::Source(Box::new(VariableSource::new(name.clone())))),
        InputNode::Source(spec) => {
            let params = resolve_params(spec, consts)?;
            Ok(Stage::Source(create_source(&spec.name, &params)?))
        }
    }
}

fn compile_stage(
    stage: &StageNode,
    runtime: &SharedRuntime,
    fork_registry: &Arc<ArrowForkRegistry>,
) -> Result<Stage, CompileError> {
    match stage {
        StageNode::Segment(spec) => {
            let params = resolve_params(spec, &runtime.const_store)?;
            Ok(Stage::Segment(create_segment(&spec.name, &params)?))
        }
        StageNode::VariableSink(name) => Ok(Stage::Segment(Box::new(VariableSetSegment::new(name.clone())))),
        StageNode::Fork(branches) => {
            let mut compiled = Vec::with_capacity(branches.len());
            for branch in branches {
                let pipeline = compile_pipeline(branch, runtime, fork_registry)?;
                pipeline.set_runtime(runtime.clone());
                compiled.push(Arc::new(pipeline) as Arc<dyn Segment>);
            }
            let fork = ForkSegment::new(compiled, ForkDistribution::Broadcast, FORK_BRANCH_CAPACITY);
            Ok(Stage::Segment(Box::new(fork)))
        }
    }
}

fn resolve_params(spec: &NodeSpec, consts: &ConstStore) -> Result<ResolvedParams, CompileError> {
    let mut map = HashMap::with_capacity(spec.params.len());
    for param in &spec.params {
        map.insert(param.name.clone(), resolve_param_value(param, consts)?);
    }
    Ok(ResolvedParams(map))
}

fn resolve_param_value(param: &Param, consts: &ConstStore) -> Result<Value, CompileError> {
    match &param.value {
        ParamValue::Literal(literal) => Ok(literal.to_value()),
        ParamValue::Identifier(name) => {
            consts.get(name).ok_or_else(|| CompileError::UnresolvedIdentifier(name.clone()))
        }
        ParamValue::List(items) => Ok(Value::Array(items.iter().map(Literal::to_value).collect())),
    }
}

/// A source wrapping one consumer subscription on a named arrow-fork.
///
/// Subscribes *eagerly*, at construction (i.e. compile time), not when
/// `generate()` is first pulled: a producer's background thread may start
/// publishing as soon as the compiled script starts running, and a
/// subscription registered after that point only sees items published from
/// then on (see `ThreadedQueue::subscribe`). Registering every consumer
/// during compilation, before any producer thread is spawned, is what makes
/// arrow-fork delivery deterministic.
struct QueueSource {
    cell: RuntimeCell,
    receiver: Mutex<Option<ItemIter>>,
}

impl QueueSource {
    fn new(queue: Arc<ThreadedQueue>) -> Self {
        Self { cell: RuntimeCell::new(), receiver: Mutex::new(Some(queue.subscribe())) }
    }
}

impl HasRuntime for QueueSource {
    fn runtime_cell(&self) -> &RuntimeCell {
        &self.cell
    }
}

impl Source for QueueSource {
    fn generate(&self) -> ItemIter {
        self.receiver
            .lock()
            .expect("queue source receiver poisoned")
            .take()
            .expect("an arrow-fork consumer pipeline can only be run once")
    }

    fn name(&self) -> &str {
        "arrow_fork_consumer"
    }
}

struct ProducerJob {
    pipeline: Pipeline,
    queue: Arc<ThreadedQueue>,
    counter: Arc<AtomicUsize>,
}

/// The result of compiling a ChatterLang script: a set of background
/// arrow-fork producers plus an ordered list of top-level units (spec §4.8
/// phase 6).
pub struct CompiledScript {
    runtime: SharedRuntime,
    top_level: Vec<Box<dyn Runnable>>,
    producers: Mutex<Option<Vec<ProducerJob>>>,
    fork_registry: Arc<ArrowForkRegistry>,
}

impl CompiledScript {
    pub fn runtime(&self) -> SharedRuntime {
        self.runtime.clone()
    }

    pub fn fork_registry(&self) -> &Arc<ArrowForkRegistry> {
        &self.fork_registry
    }

    /// Run the compiled script against `input`. Top-level units are run in
    /// `Script`-style drained-serial order: every unit but the last is
    /// fully drained and its output discarded before the next starts; the
    /// last unit's output is the lazy result. Background arrow-fork
    /// producers are spawned the first time this is called; later calls
    /// against the same `CompiledScript` reuse whatever producers already
    /// ran (a script's producers are one-shot, matching the arrow-fork
    /// state machine's `UNSTARTED -> STARTED` transition happening once).
    pub fn run(&self, input: Vec<Item>) -> ItemIter {
        self.spawn_producers();

        let Some((last, rest)) = self.top_level.split_last() else {
            return empty_iter();
        };

        // Only the first top-level unit sees `input`; everything after it
        // (drained or not) runs on an empty iterator, matching `Script`.
        let mut current = iter_from_vec(input);
        for unit in rest {
            unit.run(current).for_each(drop);
            current = empty_iter();
        }
        last.run(current)
    }

    fn spawn_producers(&self) {
        let jobs = {
            let mut guard = self.producers.lock().expect("producer job list poisoned");
            guard.take()
        };
        let Some(jobs) = jobs else { return };

        for job in jobs {
            let ProducerJob { pipeline, queue, counter } = job;
            thread::Builder::new()
                .name("arrow-fork-producer".to_string())
                .spawn(move || {
                    for item in pipeline.run(empty_iter()) {
                        queue.publish(item);
                    }
                    if counter.fetch_sub(1, Ordering::SeqCst) == 1 {
                        queue.begin_draining();
                        queue.close();
                    }
                })
                .expect("failed to spawn arrow-fork producer thread");
        }
    }
}
