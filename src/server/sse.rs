//! `GET /output-stream`: drains a session's output queue as server-sent
//! events, heartbeating when idle (spec §4.9, §5's ~100ms poll-with-timeout).

use crate::server::session::Session;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{self, Stream};
use std::collections::VecDeque;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

struct StreamState {
    session: Arc<Session>,
    pending: VecDeque<String>,
}

pub fn output_stream(session: Arc<Session>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let state = StreamState { session, pending: VecDeque::new() };

    let stream = stream::unfold(state, |mut state| async move {
        loop {
            if let Some(payload) = state.pending.pop_front() {
                return Some((Ok(Event::default().data(payload)), state));
            }
            let events = state.session.drain_output();
            if !events.is_empty() {
                state.pending.extend(
                    events.iter().map(|e| serde_json::to_string(e).unwrap_or_else(|_| "{}".to_string())),
                );
                continue;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
