//! Unreliable message socket with synchronous delivery callbacks.

use crate::error::{StreamError, StreamResult};
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

type SendFn = dyn Fn(&str, Bytes) -> StreamResult<()> + Send + Sync;
type MessageHandler = dyn Fn(String, Bytes) + Send + Sync;
type CloseHook = dyn FnOnce() + Send;

struct Shared {
    send_fn: Arc<SendFn>,
    on_message: Mutex<Option<Box<MessageHandler>>>,
    local_port: u16,
    closed: AtomicBool,
    on_close: Mutex<Option<Box<CloseHook>>>,
}

/// A datagram socket: no buffering, delivery is a synchronous callback.
/// Cheaply cloneable; every clone shares the same handler registration and
/// close state, so a backend can keep a handle while returning an
/// equivalent one to its caller.
#[derive(Clone)]
pub struct DatagramSocket {
    shared: Arc<Shared>,
}

impl DatagramSocket {
    /// Creates a datagram socket bound to `local_port`, backed by
    /// `send_fn` for outgoing sends. `on_close` runs once, at `close`.
    pub fn new(
        local_port: u16,
        send_fn: Arc<SendFn>,
        on_close: Option<Box<CloseHook>>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                send_fn,
                on_message: Mutex::new(None),
                local_port,
                closed: AtomicBool::new(false),
                on_close: Mutex::new(on_close),
            }),
        }
    }

    /// The bound local port.
    pub fn local_port(&self) -> u16 {
        self.shared.local_port
    }

    /// Sends `data` to `address` via the backend send function.
    pub fn send(&self, address: &str, data: Bytes) -> StreamResult<()> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(StreamError::Closed("datagram socket closed".into()));
        }
        (self.shared.send_fn)(address, data)
    }

    /// Registers the single handler invoked on every inbound delivery.
    pub fn on_message(&self, handler: impl Fn(String, Bytes) + Send + Sync + 'static) {
        *self.shared.on_message.lock() = Some(Box::new(handler));
    }

    /// Backend-side injection point: delivers `data` from `from`.
    pub fn deliver(&self, from: String, data: Bytes) {
        if let Some(handler) = self.shared.on_message.lock().as_ref() {
            handler(from, data);
        }
    }

    /// `true` once closed.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Clears the message handler and runs the backend cleanup hook once.
    pub fn close(&self) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        *self.shared.on_message.lock() = None;
        if let Some(hook) = self.shared.on_close.lock().take() {
            hook();
        }
    }
}
