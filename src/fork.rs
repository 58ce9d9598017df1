//! In-pipeline parallel fan-out (spec §4.7, C8), grounded in the original's
//! `pipe/fork.py` `ForkSegment`.
//!
//! Each branch runs on its own OS thread, fed through a bounded channel so a
//! slow branch applies backpressure to the distributor rather than letting
//! items pile up unboundedly. All branches' outputs are merged into a single
//! stream; a branch panicking cancels its siblings and the panic is
//! re-raised once every thread has been joined.

use crate::context::SharedRuntime;
use crate::item::Item;
use crate::node::{run_segment, HasRuntime, ItemIter, MetadataDisposition, RuntimeCell, Segment};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// How items are handed out to branches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForkDistribution {
    /// Every branch receives a clone of every item.
    Broadcast,
    /// Items are handed to branches in turn, each item going to exactly one.
    RoundRobin,
}

pub struct ForkSegment {
    cell: RuntimeCell,
    branches: Vec<Arc<dyn Segment>>,
    distribution: ForkDistribution,
    queue_depth: usize,
    name: String,
}

impl ForkSegment {
    pub fn new(branches: Vec<Arc<dyn Segment>>, distribution: ForkDistribution, queue_depth: usize) -> Self {
        Self { cell: RuntimeCell::new(), branches, distribution, queue_depth, name: "fork".to_string() }
    }
}

impl HasRuntime for ForkSegment {
    fn runtime_cell(&self) -> &RuntimeCell {
        &self.cell
    }

    fn set_runtime(&self, runtime: SharedRuntime) {
        self.runtime_cell().set(runtime.clone());
        for branch in &self.branches {
            branch.set_runtime(runtime.clone());
        }
    }
}

impl Segment for ForkSegment {
    fn disposition(&self) -> MetadataDisposition {
        MetadataDisposition::Aware
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn transform(&self, input: ItemIter) -> ItemIter {
        let cancelled = Arc::new(AtomicBool::new(false));
        let mut handles: Vec<JoinHandle<()>> = Vec::with_capacity(self.branches.len() + 1);

        let (output_tx, output_rx) = flume::bounded::<Item>(self.queue_depth.max(1));

        let branch_txs: Vec<flume::Sender<Item>> = self
            .branches
            .iter()
            .enumerate()
            .map(|(branch_id, branch)| {
                let (tx, rx) = flume::bounded::<Item>(self.queue_depth.max(1));
                let branch = Arc::clone(branch);
                let output_tx = output_tx.clone();
                let cancelled = Arc::clone(&cancelled);

                let handle = thread::Builder::new()
                    .name(format!("fork-branch-{branch_id}"))
                    .spawn(move || {
                        let feed: ItemIter = Box::new(CancellableRecv { rx, cancelled: Arc::clone(&cancelled) });
                        let out = run_segment(branch.as_ref(), feed);
                        for item in out {
                            if cancelled.load(Ordering::Relaxed) {
                                break;
                            }
                            if output_tx.send(item).is_err() {
                                break;
                            }
                        }
                    })
                    .expect("failed to spawn fork branch thread");

                handles.push(handle);
                tx
            })
            .collect();
        drop(output_tx);

        let distribution = self.distribution;
        let cancelled_for_distributor = Arc::clone(&cancelled);
        let distributor = thread::Builder::new()
            .name("fork-distributor".to_string())
            .spawn(move || {
                let mut next_branch = 0usize;
                for item in input {
                    if cancelled_for_distributor.load(Ordering::Relaxed) || branch_txs.is_empty() {
                        break;
                    }
                    match distribution {
                        ForkDistribution::Broadcast => {
                            for tx in &branch_txs {
                                if tx.send(item.clone()).is_err() {
                                    cancelled_for_distributor.store(true, Ordering::Relaxed);
                                    break;
                                }
                            }
                        }
                        ForkDistribution::RoundRobin => {
                            let tx = &branch_txs[next_branch % branch_txs.len()];
                            if tx.send(item).is_err() {
                                cancelled_for_distributor.store(true, Ordering::Relaxed);
                            }
                            next_branch = next_branch.wrapping_add(1);
                        }
                    }
                }
                // Dropping branch_txs here (end of scope) closes every
                // branch's input channel, unblocking their receive loops.
            })
            .expect("failed to spawn fork distributor thread");
        handles.push(distributor);

        Box::new(ForkOutputIter { rx: output_rx, handles: Some(handles) })
    }
}

/// Wraps a branch's inbound channel as an `Iterator`, stopping early if a
/// sibling branch has signalled cancellation.
struct CancellableRecv {
    rx: flume::Receiver<Item>,
    cancelled: Arc<AtomicBool>,
}

impl Iterator for CancellableRecv {
    type Item = Item;

    fn next(&mut self) -> Option<Item> {
        if self.cancelled.load(Ordering::Relaxed) {
            return None;
        }
        self.rx.recv().ok()
    }
}

struct ForkOutputIter {
    rx: flume::Receiver<Item>,
    handles: Option<Vec<JoinHandle<()>>>,
}

impl Iterator for ForkOutputIter {
    type Item = Item;

    fn next(&mut self) -> Option<Item> {
        match self.rx.recv() {
            Ok(item) => Some(item),
            Err(_) => {
                if let Some(handles) = self.handles.take() {
                    for handle in handles {
                        if let Err(panic) = handle.join() {
                            std::panic::resume_unwind(panic);
                        }
                    }
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RuntimeContext;
    use crate::node::{empty_iter, iter_from_vec};
    use std::collections::HashSet;

    struct Upper {
        cell: RuntimeCell,
    }

    impl HasRuntime for Upper {
        fn runtime_cell(&self) -> &RuntimeCell {
            &self.cell
        }
    }

    impl Segment for Upper {
        fn transform(&self, input: ItemIter) -> ItemIter {
            Box::new(input.filter_map(|item| {
                item.as_data().and_then(|v| v.as_str()).map(|s| Item::from(s.to_uppercase()))
            }))
        }
    }

    struct Lower {
        cell: RuntimeCell,
    }

    impl HasRuntime for Lower {
        fn runtime_cell(&self) -> &RuntimeCell {
            &self.cell
        }
    }

    impl Segment for Lower {
        fn transform(&self, input: ItemIter) -> ItemIter {
            Box::new(input.filter_map(|item| {
                item.as_data().and_then(|v| v.as_str()).map(|s| Item::from(s.to_lowercase()))
            }))
        }
    }

    #[test]
    fn broadcast_sends_every_item_to_every_branch() {
        let branches: Vec<Arc<dyn Segment>> =
            vec![Arc::new(Upper { cell: RuntimeCell::new() }), Arc::new(Lower { cell: RuntimeCell::new() })];
        let fork = ForkSegment::new(branches, ForkDistribution::Broadcast, 4);
        fork.set_runtime(RuntimeContext::new());

        let input = iter_from_vec(vec![Item::from("Hi"), Item::from("There")]);
        let out: HashSet<String> =
            fork.transform(input).map(|i| i.into_data().unwrap().as_str().unwrap().to_string()).collect();

        assert!(out.contains("HI"));
        assert!(out.contains("THERE"));
        assert!(out.contains("hi"));
        assert!(out.contains("there"));
        assert_eq!(out.len(), 4);
    }

    #[test]
    fn round_robin_splits_items_across_branches() {
        let branches: Vec<Arc<dyn Segment>> =
            vec![Arc::new(Upper { cell: RuntimeCell::new() }), Arc::new(Lower { cell: RuntimeCell::new() })];
        let fork = ForkSegment::new(branches, ForkDistribution::RoundRobin, 4);
        fork.set_runtime(RuntimeContext::new());

        let input = iter_from_vec(vec![Item::from("Aa"), Item::from("Bb"), Item::from("Cc"), Item::from("Dd")]);
        let out: Vec<String> =
            fork.transform(input).map(|i| i.into_data().unwrap().as_str().unwrap().to_string()).collect();

        assert_eq!(out.len(), 4);
    }

    #[test]
    fn empty_fork_yields_nothing() {
        let fork = ForkSegment::new(vec![], ForkDistribution::Broadcast, 4);
        fork.set_runtime(RuntimeContext::new());
        let out: Vec<Item> = fork.transform(empty_iter()).collect();
        assert!(out.is_empty());
    }
}
