//! Paired FIFO message channels with microtask-equivalent delivery.

use crate::error::{StreamError, StreamResult};
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

type Listener = Box<dyn Fn(Bytes) + Send + Sync>;

struct PortState {
    listeners: Mutex<Vec<Listener>>,
    closed: AtomicBool,
}

impl Default for PortState {
    fn default() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }
}

/// One end of a paired message port. Posting on one end delivers, in
/// order, to the other's registered listeners.
pub struct MessagePort {
    own_state: Arc<PortState>,
    outbox: mpsc::UnboundedSender<Bytes>,
}

impl MessagePort {
    /// Creates a connected pair of message ports.
    ///
    /// Delivery is driven by a background task per direction so that, per
    /// sender, messages arrive at the peer strictly in post order, after
    /// the poster's current synchronous step has unwound (the microtask
    /// equivalent.
    pub fn create_pair() -> (MessagePort, MessagePort) {
        let state_a = Arc::new(PortState::default());
        let state_b = Arc::new(PortState::default());

        let (tx_a_to_b, mut rx_a_to_b) = mpsc::unbounded_channel::<Bytes>();
        let (tx_b_to_a, mut rx_b_to_a) = mpsc::unbounded_channel::<Bytes>();

        let deliver_to_b = state_b.clone();
        tokio::spawn(async move {
            while let Some(msg) = rx_a_to_b.recv().await {
                deliver(&deliver_to_b, msg);
            }
        });
        let deliver_to_a = state_a.clone();
        tokio::spawn(async move {
            while let Some(msg) = rx_b_to_a.recv().await {
                deliver(&deliver_to_a, msg);
            }
        });

        (
            MessagePort {
                own_state: state_a,
                outbox: tx_a_to_b,
            },
            MessagePort {
                own_state: state_b,
                outbox: tx_b_to_a,
            },
        )
    }

    /// Posts `msg` to the peer. Fails with `ESTREAMCLOSED` if this end is
    /// closed. If the peer is closed, the message is silently dropped on
    /// delivery (its listener list is already empty).
    pub fn post(&self, msg: Bytes) -> StreamResult<()> {
        if self.own_state.closed.load(Ordering::SeqCst) {
            return Err(StreamError::Closed("message port closed".into()));
        }
        let _ = self.outbox.send(msg);
        Ok(())
    }

    /// Registers a listener for messages arriving from the peer. Listener
    /// panics are caught and swallowed so one bad subscriber cannot break
    /// delivery to the rest.
    pub fn on_message(&self, listener: impl Fn(Bytes) + Send + Sync + 'static) {
        self.own_state.listeners.lock().push(Box::new(listener));
    }

    /// Discards this port's listeners and marks it closed.
    pub fn close(&self) {
        self.own_state.closed.store(true, Ordering::SeqCst);
        self.own_state.listeners.lock().clear();
    }

    /// `true` once this end is closed.
    pub fn is_closed(&self) -> bool {
        self.own_state.closed.load(Ordering::SeqCst)
    }
}

fn deliver(state: &PortState, msg: Bytes) {
    let listeners = state.listeners.lock();
    for listener in listeners.iter() {
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| listener(msg.clone())));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[tokio::test]
    async fn delivers_in_fifo_order() {
        let (a, b) = MessagePort::create_pair();
        let received = Arc::new(StdMutex::new(Vec::new()));
        let r = received.clone();
        b.on_message(move |msg| r.lock().unwrap().push(msg));
        a.post(Bytes::from_static(b"1")).unwrap();
        a.post(Bytes::from_static(b"2")).unwrap();
        a.post(Bytes::from_static(b"3")).unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let got = received.lock().unwrap();
        assert_eq!(*got, vec![Bytes::from_static(b"1"), Bytes::from_static(b"2"), Bytes::from_static(b"3")]);
    }

    #[tokio::test]
    async fn closed_port_fails_posts() {
        let (a, _b) = MessagePort::create_pair();
        a.close();
        let err = a.post(Bytes::from_static(b"x")).unwrap_err();
        assert_eq!(err.code(), "ESTREAMCLOSED");
    }

    #[tokio::test]
    async fn posting_to_closed_peer_is_a_silent_drop() {
        let (a, b) = MessagePort::create_pair();
        let received = Arc::new(StdMutex::new(Vec::new()));
        let r = received.clone();
        b.on_message(move |msg| r.lock().unwrap().push(msg));
        b.close();
        a.post(Bytes::from_static(b"gone")).unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(received.lock().unwrap().is_empty());
    }
}
