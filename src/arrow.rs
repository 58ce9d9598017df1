//! Named broadcast channels backing arrow-fork wiring (spec §4.7/§4.11, C9).
//!
//! A ChatterLang script can name a broadcast point with `>name` and wire
//! several independent pipelines to it: one producer side (whatever feeds
//! `>name`) and one or more consumer sides (whatever reads `<name`). Since
//! the original's `thread_ops.py` wasn't available for grounding, this is
//! designed from the specification's prose and the teacher's
//! `core/channel.rs` fanout pattern, built on `flume` the way the teacher
//! builds its pub/sub primitives.

use crate::item::Item;
use crate::node::ItemIter;
use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

/// Lifecycle of a named broadcast queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    /// Created but not yet accepting publishes; consumers may still
    /// subscribe during this phase without missing anything.
    Unstarted,
    /// Accepting publishes and delivering to every current subscriber.
    Started,
    /// No longer accepting new publishes; subscribers drain whatever is
    /// still buffered in their own channel.
    Draining,
    /// Fully shut down; subscriber channels are disconnected.
    Closed,
}

/// A single named, multi-consumer broadcast channel.
///
/// Publishing blocks (backpressure) until every subscriber has room, so a
/// slow consumer throttles the producer rather than letting the queue grow
/// without bound.
pub struct ThreadedQueue {
    name: String,
    capacity: usize,
    state: RwLock<QueueState>,
    subscribers: Mutex<Vec<flume::Sender<Item>>>,
}

impl ThreadedQueue {
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            capacity: capacity.max(1),
            state: RwLock::new(QueueState::Unstarted),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> QueueState {
        *self.state.read().expect("queue state lock poisoned")
    }

    /// Register a new consumer. Valid in any state but `Closed`; a
    /// subscriber registered after publishing has begun only sees items
    /// published from that point on.
    pub fn subscribe(&self) -> ItemIter {
        let (tx, rx) = flume::bounded(self.capacity);
        {
            let state = self.state();
            if state == QueueState::Closed {
                drop(tx);
                return crate::node::empty_iter();
            }
        }
        self.subscribers.lock().expect("subscriber list poisoned").push(tx);
        Box::new(rx.into_iter())
    }

    /// Move `Unstarted` -> `Started`. Idempotent once started.
    pub fn start(&self) {
        let mut state = self.state.write().expect("queue state lock poisoned");
        if *state == QueueState::Unstarted {
            *state = QueueState::Started;
        }
    }

    /// Broadcast `item` to every current subscriber, blocking on backpressure.
    /// A no-op (besides starting the queue if needed) once draining/closed.
    pub fn publish(&self, item: Item) {
        self.start();
        if self.state() != QueueState::Started {
            return;
        }
        let subscribers = self.subscribers.lock().expect("subscriber list poisoned");
        for tx in subscribers.iter() {
            // A disconnected subscriber (consumer dropped its receiver) is
            // not this producer's problem; ignore the send error.
            let _ = tx.send(item.clone());
        }
    }

    /// Move `Started` -> `Draining`: no further publishes are accepted, but
    /// already-queued items remain available to subscribers.
    pub fn begin_draining(&self) {
        let mut state = self.state.write().expect("queue state lock poisoned");
        if *state == QueueState::Started {
            *state = QueueState::Draining;
        }
    }

    /// Move to `Closed`, dropping every subscriber sender so their receive
    /// loops end.
    pub fn close(&self) {
        {
            let mut state = self.state.write().expect("queue state lock poisoned");
            *state = QueueState::Closed;
        }
        self.subscribers.lock().expect("subscriber list poisoned").clear();
    }
}

/// A process-wide set of named queues, keyed by the arrow-fork name used in
/// a script (e.g. `>tagged`).
#[derive(Default)]
pub struct ArrowForkRegistry {
    queues: Mutex<HashMap<String, std::sync::Arc<ThreadedQueue>>>,
}

impl ArrowForkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the named queue, creating it (in `Unstarted` state) on first
    /// use. Every producer/consumer referencing the same name in a script
    /// shares the same queue.
    pub fn get_or_create(&self, name: &str, capacity: usize) -> std::sync::Arc<ThreadedQueue> {
        let mut queues = self.queues.lock().expect("registry lock poisoned");
        queues
            .entry(name.to_string())
            .or_insert_with(|| std::sync::Arc::new(ThreadedQueue::new(name, capacity)))
            .clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.queues.lock().expect("registry lock poisoned").keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn subscribers_registered_before_start_receive_everything() {
        let queue = ThreadedQueue::new("q", 4);
        let consumer = queue.subscribe();

        queue.publish(Item::from(1i64));
        queue.publish(Item::from(2i64));
        queue.close();

        let out: Vec<i64> = consumer.map(|i| i.into_data().unwrap().as_i64().unwrap()).collect();
        assert_eq!(out, vec![1, 2]);
    }

    #[test]
    fn every_subscriber_sees_every_item() {
        let queue = std::sync::Arc::new(ThreadedQueue::new("q", 4));
        let c1 = queue.subscribe();
        let c2 = queue.subscribe();

        let producer = {
            let queue = std::sync::Arc::clone(&queue);
            thread::spawn(move || {
                for i in 0..5i64 {
                    queue.publish(Item::from(i));
                }
                queue.close();
            })
        };
        producer.join().unwrap();

        let out1: Vec<i64> = c1.map(|i| i.into_data().unwrap().as_i64().unwrap()).collect();
        let out2: Vec<i64> = c2.map(|i| i.into_data().unwrap().as_i64().unwrap()).collect();
        assert_eq!(out1, vec![0, 1, 2, 3, 4]);
        assert_eq!(out2, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn closing_disconnects_subscribers() {
        let queue = ThreadedQueue::new("q", 4);
        let consumer = queue.subscribe();
        queue.start();
        queue.begin_draining();
        queue.close();
        assert_eq!(queue.state(), QueueState::Closed);

        let out: Vec<Item> = consumer.collect();
        assert!(out.is_empty());
    }

    #[test]
    fn registry_returns_the_same_queue_for_the_same_name() {
        let registry = ArrowForkRegistry::new();
        let a = registry.get_or_create("x", 4);
        let b = registry.get_or_create("x", 4);
        assert!(std::sync::Arc::ptr_eq(&a, &b));
    }
}
