//! Bounded accept queue with TCP-backlog drop semantics.

use crate::socket::StreamSocket;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::oneshot;

type CloseHook = dyn FnOnce() + Send;

struct Inner {
    queue: VecDeque<StreamSocket>,
    waiters: VecDeque<oneshot::Sender<Option<StreamSocket>>>,
    closed: bool,
}

struct Shared {
    local_port: u16,
    max_queue: usize,
    inner: Mutex<Inner>,
    on_close: Mutex<Option<Box<CloseHook>>>,
}

/// A bounded accept queue for inbound [`StreamSocket`]s. Cheaply cloneable:
/// every clone shares the same backlog and close state, mirroring how a
/// backend keeps a handle while handing an equivalent one to its caller.
#[derive(Clone)]
pub struct Listener {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("local_port", &self.shared.local_port)
            .field("max_queue", &self.shared.max_queue)
            .finish_non_exhaustive()
    }
}

impl Listener {
    /// Creates a listener bound to `local_port` with accept backlog
    /// `max_queue`.
    pub fn new(local_port: u16, max_queue: usize, on_close: Option<Box<CloseHook>>) -> Self {
        Self {
            shared: Arc::new(Shared {
                local_port,
                max_queue,
                inner: Mutex::new(Inner {
                    queue: VecDeque::new(),
                    waiters: VecDeque::new(),
                    closed: false,
                }),
                on_close: Mutex::new(on_close),
            }),
        }
    }

    /// The bound local port.
    pub fn local_port(&self) -> u16 {
        self.shared.local_port
    }

    /// Resolves to the next accepted socket, or `None` once closed.
    pub async fn accept(&self) -> Option<StreamSocket> {
        let rx = {
            let mut inner = self.shared.inner.lock();
            if let Some(socket) = inner.queue.pop_front() {
                return Some(socket);
            }
            if inner.closed {
                return None;
            }
            let (tx, rx) = oneshot::channel();
            inner.waiters.push_back(tx);
            rx
        };
        rx.await.unwrap_or(None)
    }

    /// Backend-side injection point. Delivers to the oldest waiter if one
    /// exists; otherwise enqueues up to `max_queue`; otherwise the socket is
    /// silently dropped (TCP backlog semantics).
    pub fn enqueue(&self, socket: StreamSocket) {
        let mut inner = self.shared.inner.lock();
        if inner.closed {
            return;
        }
        if let Some(waiter) = inner.waiters.pop_front() {
            let _ = waiter.send(Some(socket));
            return;
        }
        if inner.queue.len() < self.shared.max_queue {
            inner.queue.push_back(socket);
        }
        // else: backlog full, drop silently.
    }

    /// Number of sockets currently queued awaiting `accept`. Exposed for
    /// backlog testing.
    pub fn queue_len(&self) -> usize {
        self.shared.inner.lock().queue.len()
    }

    /// `true` once closed.
    pub fn is_closed(&self) -> bool {
        self.shared.inner.lock().closed
    }

    /// Resolves all pending acceptors with `None`, clears the queue, and
    /// runs the backend cleanup hook once. Idempotent.
    pub fn close(&self) {
        let mut inner = self.shared.inner.lock();
        if inner.closed {
            return;
        }
        inner.closed = true;
        inner.queue.clear();
        for waiter in inner.waiters.drain(..) {
            let _ = waiter.send(None);
        }
        drop(inner);
        if let Some(hook) = self.shared.on_close.lock().take() {
            hook();
        }
    }
}
