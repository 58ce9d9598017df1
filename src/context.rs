//! Per-execution runtime context: constant store and variable store (spec §3, C2).

use crate::item::Item;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Name -> value map, written once from `CONST` declarations or a host API
/// and read-only thereafter within a single compiled graph execution.
#[derive(Debug, Default)]
pub struct ConstStore {
    values: RwLock<HashMap<String, Value>>,
}

impl ConstStore {
    pub fn get(&self, name: &str) -> Option<Value> {
        self.values.read().expect("const store poisoned").get(name).cloned()
    }

    /// Merge `constants` in. When `override_existing` is false, existing
    /// entries win (used when merging script constants into a runtime that
    /// may already carry host-provided constants).
    pub fn add_constants(&self, constants: HashMap<String, Value>, override_existing: bool) {
        let mut guard = self.values.write().expect("const store poisoned");
        for (key, value) in constants {
            if override_existing || !guard.contains_key(&key) {
                guard.insert(key, value);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.values.read().expect("const store poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Name -> sequence-of-items map. Writes replace the full sequence; reads
/// yield the sequence in insertion order.
#[derive(Debug, Default)]
pub struct VariableStore {
    sequences: RwLock<HashMap<String, Vec<Item>>>,
}

impl VariableStore {
    /// Last-writer-wins by script order (spec's adopted resolution for
    /// duplicate `@var` writes within one script).
    pub fn set(&self, name: &str, items: Vec<Item>) {
        self.sequences
            .write()
            .expect("variable store poisoned")
            .insert(name.to_string(), items);
    }

    pub fn get(&self, name: &str) -> Vec<Item> {
        self.sequences
            .read()
            .expect("variable store poisoned")
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sequences.read().expect("variable store poisoned").contains_key(name)
    }
}

/// Holds the constant and variable stores shared by every node compiled from
/// one script. A non-null `Arc<RuntimeContext>` is attached to every segment
/// and source after compilation.
#[derive(Debug, Default)]
pub struct RuntimeContext {
    pub const_store: ConstStore,
    pub variable_store: VariableStore,
}

impl RuntimeContext {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_constants(&self, constants: HashMap<String, Value>, override_existing: bool) {
        self.const_store.add_constants(constants, override_existing);
    }
}

/// Convenience alias: every node holds a reference-counted handle to the
/// context it was compiled with.
pub type SharedRuntime = Arc<RuntimeContext>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn const_store_add_respects_override_flag() {
        let store = ConstStore::default();
        store.add_constants(HashMap::from([("a".to_string(), Value::from(1))]), true);
        store.add_constants(HashMap::from([("a".to_string(), Value::from(2))]), false);
        assert_eq!(store.get("a"), Some(Value::from(1)));

        store.add_constants(HashMap::from([("a".to_string(), Value::from(3))]), true);
        assert_eq!(store.get("a"), Some(Value::from(3)));
    }

    #[test]
    fn variable_store_replaces_full_sequence() {
        let store = VariableStore::default();
        store.set("words", vec![Item::from("a"), Item::from("b")]);
        assert_eq!(store.get("words").len(), 2);
        store.set("words", vec![Item::from("c")]);
        assert_eq!(store.get("words").len(), 1);
    }
}
