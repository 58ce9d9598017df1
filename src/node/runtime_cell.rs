//! Runtime attachment mixin (spec's `HasRuntimeComponent`).

use crate::context::SharedRuntime;
use std::sync::RwLock;

/// Holds the [`SharedRuntime`] a node was compiled with.
///
/// Uses interior mutability so the compiler can attach the runtime to a node
/// already stored behind `Box<dyn Segment>`/`Box<dyn Source>` via `&self`,
/// mirroring the teacher's `runtime` setter property without threading
/// `&mut self` through every composer.
#[derive(Debug, Default)]
pub struct RuntimeCell(RwLock<Option<SharedRuntime>>);

impl RuntimeCell {
    pub fn new() -> Self {
        Self(RwLock::new(None))
    }

    pub fn set(&self, runtime: SharedRuntime) {
        *self.0.write().expect("runtime cell poisoned") = Some(runtime);
    }

    pub fn get(&self) -> SharedRuntime {
        self.0
            .read()
            .expect("runtime cell poisoned")
            .clone()
            .expect("runtime accessed before attachment by the compiler")
    }

    pub fn is_set(&self) -> bool {
        self.0.read().expect("runtime cell poisoned").is_some()
    }
}

/// Every segment and source carries a non-null reference to a
/// `RuntimeContext` after compilation (spec §3 invariant).
pub trait HasRuntime {
    fn runtime_cell(&self) -> &RuntimeCell;

    fn set_runtime(&self, runtime: SharedRuntime) {
        self.runtime_cell().set(runtime);
    }

    fn runtime(&self) -> SharedRuntime {
        self.runtime_cell().get()
    }
}
