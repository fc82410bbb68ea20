//! Ring-buffered event stream with independent, no-replay consumers.
//!
//! New consumers ([`Tracer::events`]) only see events emitted *after* they
//! subscribed — [`Tracer::snapshot`] is the only way to see history.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

/// A single emitted tracer event.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TraceEvent {
    /// Monotonically increasing event id.
    pub id: u64,
    /// Milliseconds since the epoch when the event was emitted.
    pub timestamp: u64,
    /// The event's type tag, e.g. `"connect"` or `"log"`.
    pub event_type: String,
    /// Free-form JSON payload.
    pub payload: serde_json::Value,
}

/// Ring-buffered producer of [`TraceEvent`]s with evict-half overflow.
#[derive(Debug)]
pub struct Tracer {
    buffer: Mutex<VecDeque<TraceEvent>>,
    capacity: usize,
    next_id: AtomicU64,
    sender: broadcast::Sender<TraceEvent>,
}

impl Tracer {
    /// Creates a tracer with the given ring-buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(16));
        Self {
            buffer: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            next_id: AtomicU64::new(1),
            sender,
        }
    }

    /// Emits an event, auto-stamping its id and timestamp.
    pub fn emit(&self, event_type: impl Into<String>, payload: serde_json::Value, now_ms: u64) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let event = TraceEvent {
            id,
            timestamp: now_ms,
            event_type: event_type.into(),
            payload,
        };
        {
            let mut buf = self.buffer.lock();
            buf.push_back(event.clone());
            if buf.len() > self.capacity {
                // Evict-half: discard the oldest half when over capacity.
                let to_drop = buf.len() / 2;
                for _ in 0..to_drop {
                    buf.pop_front();
                }
            }
        }
        let _ = self.sender.send(event);
    }

    /// A consumer stream yielding only events emitted from this call onward.
    pub fn events(&self) -> impl futures::Stream<Item = TraceEvent> {
        BroadcastStream::new(self.sender.subscribe()).filter_map(|r| r.ok())
    }

    /// A copy of the current buffer, optionally filtered by event type.
    pub fn snapshot(&self, type_filter: Option<&str>) -> Vec<TraceEvent> {
        let buf = self.buffer.lock();
        match type_filter {
            Some(t) => buf.iter().filter(|e| e.event_type == t).cloned().collect(),
            None => buf.iter().cloned().collect(),
        }
    }
}
