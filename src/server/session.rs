//! Per-user session state and store (spec §4.9/§4.11), ported from the
//! original's `chatterlang_serve.py` `UserSession`.

use crate::chatterlang::{compile, CompiledScript};
use crate::item::Item;
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Bound on the per-session output queue (spec §4.9); full-queue drops the
/// oldest item to make room (spec §4.12).
pub const OUTPUT_QUEUE_CAPACITY: usize = 1000;
/// Bound on the per-session ring-buffered history (spec §4.9).
pub const HISTORY_CAPACITY: usize = 1000;

/// An empty top-level statement: the "default pass-through processor" (spec
/// §4.9) handed to a session when the server has no script template — a
/// single stageless pipeline is an identity transform.
pub const PASS_THROUGH_SCRIPT: &str = ";";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    New,
    Active,
    Idle,
    Expired,
    Deleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputEventKind {
    User,
    Response,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutputEvent {
    pub timestamp: u64,
    pub output: Value,
    #[serde(rename = "type")]
    pub kind: OutputEventKind,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub timestamp: u64,
    pub input: Value,
    pub output: Vec<Value>,
}

fn now_epoch_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

/// One user's isolated compiled graph, output queue, and history.
pub struct Session {
    pub id: String,
    state: Mutex<SessionState>,
    last_activity: Mutex<Instant>,
    output_queue: Mutex<VecDeque<OutputEvent>>,
    history: Mutex<VecDeque<HistoryEntry>>,
    script_source: String,
    graph: OnceLock<CompiledScript>,
}

impl Session {
    fn new(id: String, script_source: String) -> Self {
        Self {
            id,
            state: Mutex::new(SessionState::New),
            last_activity: Mutex::new(Instant::now()),
            output_queue: Mutex::new(VecDeque::new()),
            history: Mutex::new(VecDeque::new()),
            script_source,
            graph: OnceLock::new(),
        }
    }

    pub fn touch(&self) {
        *self.last_activity.lock().expect("session activity lock poisoned") = Instant::now();
        let mut state = self.state.lock().expect("session state lock poisoned");
        if matches!(*state, SessionState::New | SessionState::Idle) {
            *state = SessionState::Active;
        }
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.lock().expect("session activity lock poisoned").elapsed()
    }

    /// Compiled lazily on first use (spec §9 "Session compile on demand"):
    /// every session gets its own `ConstStore`/`VariableStore`, isolated
    /// from every other session, even though they share one script source.
    fn graph(&self) -> &CompiledScript {
        self.graph.get_or_init(|| {
            compile(&self.script_source, None).expect("session's script template failed to compile")
        })
    }

    fn push_output(&self, kind: OutputEventKind, output: Value) {
        let mut queue = self.output_queue.lock().expect("output queue poisoned");
        if queue.len() >= OUTPUT_QUEUE_CAPACITY {
            queue.pop_front();
        }
        queue.push_back(OutputEvent { timestamp: now_epoch_secs(), output, kind });
    }

    fn push_history(&self, input: Value, output: Vec<Value>) {
        let mut history = self.history.lock().expect("history poisoned");
        if history.len() >= HISTORY_CAPACITY {
            history.pop_front();
        }
        history.push_back(HistoryEntry { timestamp: now_epoch_secs(), input, output });
    }

    /// Run the session's compiled graph over `body` as a single-item input,
    /// recording the "user" event, every "response" event (or a single
    /// "error" event on failure), and a history entry (spec §4.9, §4.12).
    pub fn process(&self, body: Value) -> Result<Vec<Value>, String> {
        self.touch();
        self.push_output(OutputEventKind::User, body.clone());

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.graph().run(vec![Item::Data(body.clone())]).filter_map(Item::into_data).collect::<Vec<Value>>()
        }));

        match outcome {
            Ok(outputs) => {
                for item in &outputs {
                    self.push_output(OutputEventKind::Response, item.clone());
                }
                self.push_history(body, outputs.clone());
                Ok(outputs)
            }
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "processor failed".to_string());
                self.push_output(OutputEventKind::Error, Value::String(message.clone()));
                self.push_history(body, Vec::new());
                Err(message)
            }
        }
    }

    /// Drain whatever's currently queued (used by the output-stream poller).
    pub fn drain_output(&self) -> Vec<OutputEvent> {
        self.output_queue.lock().expect("output queue poisoned").drain(..).collect()
    }

    pub fn history(&self, limit: Option<usize>) -> Vec<HistoryEntry> {
        let history = self.history.lock().expect("history poisoned");
        match limit {
            Some(n) => history.iter().rev().take(n).rev().cloned().collect(),
            None => history.iter().cloned().collect(),
        }
    }

    pub fn clear_history(&self) {
        self.history.lock().expect("history poisoned").clear();
    }
}

/// Process-wide session map, guarded by a single mutex (spec §5's "session
/// map is guarded by a session-level mutex for insert/delete/expire").
pub struct SessionStore {
    sessions: Mutex<HashMap<String, std::sync::Arc<Session>>>,
    script_source: String,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(script_source: impl Into<String>, ttl: Duration) -> Self {
        Self { sessions: Mutex::new(HashMap::new()), script_source: script_source.into(), ttl }
    }

    /// Fetch the session for `id`, creating one if `id` is absent or
    /// unknown (spec §4.9: a cookie pointing at a session lost to a
    /// restart is re-adopted rather than rejected).
    pub fn get_or_create(&self, id: Option<&str>) -> std::sync::Arc<Session> {
        let mut sessions = self.sessions.lock().expect("session map poisoned");
        let id = id.map(str::to_string).unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        sessions
            .entry(id.clone())
            .or_insert_with(|| std::sync::Arc::new(Session::new(id, self.script_source.clone())))
            .clone()
    }

    /// Delete every session whose last activity exceeds the configured TTL
    /// (spec §4.9's ~5 minute background sweep).
    pub fn expire_stale(&self) {
        let mut sessions = self.sessions.lock().expect("session map poisoned");
        sessions.retain(|_, session| session.idle_for() < self.ttl);
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().expect("session map poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_echoes_input_through_pass_through_script() {
        let store = SessionStore::new(PASS_THROUGH_SCRIPT, Duration::from_secs(60));
        let session = store.get_or_create(None);
        let out = session.process(Value::String("hi".to_string())).unwrap();
        assert_eq!(out, vec![Value::String("hi".to_string())]);
        assert_eq!(session.history(None).len(), 1);
    }

    #[test]
    fn unknown_cookie_id_is_re_adopted() {
        let store = SessionStore::new(PASS_THROUGH_SCRIPT, Duration::from_secs(60));
        let session = store.get_or_create(Some("stale-id"));
        assert_eq!(session.id, "stale-id");
    }

    #[test]
    fn expire_stale_drops_inactive_sessions() {
        let store = SessionStore::new(PASS_THROUGH_SCRIPT, Duration::from_millis(1));
        store.get_or_create(Some("a"));
        std::thread::sleep(Duration::from_millis(20));
        store.expire_stale();
        assert!(store.is_empty());
    }

    #[test]
    fn clear_history_empties_it() {
        let store = SessionStore::new(PASS_THROUGH_SCRIPT, Duration::from_secs(60));
        let session = store.get_or_create(None);
        session.process(Value::from(1)).unwrap();
        session.clear_history();
        assert!(session.history(None).is_empty());
    }
}
