//! FIFO byte buffer with single-shot pull waiters and a hard high-water
//! back-pressure discipline.

use crate::error::{StreamError, StreamResult};
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::VecDeque;
use tokio::sync::oneshot;

struct Inner {
    queue: VecDeque<Bytes>,
    waiters: VecDeque<oneshot::Sender<Option<Bytes>>>,
    write_closed: bool,
    read_closed: bool,
}

/// A FIFO buffer of byte chunks with a bounded queue and single-shot pull
/// waiters; in particular, at
/// most one of `queue` and `waiters` is ever non-empty.
pub struct AsyncBuffer {
    inner: Mutex<Inner>,
    high_water_mark: usize,
}

impl AsyncBuffer {
    /// Creates an empty buffer that refuses writes once the queue reaches
    /// `high_water_mark` chunks.
    pub fn new(high_water_mark: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                waiters: VecDeque::new(),
                write_closed: false,
                read_closed: false,
            }),
            high_water_mark,
        }
    }

    /// Pushes a chunk. Delivers to the oldest waiter if one exists,
    /// otherwise enqueues. Crossing the high-water mark closes the write
    /// side for all subsequent writes (a hard close, not a temporary
    /// stall, since callers depend on write failing once crossed).
    pub fn write(&self, chunk: Bytes) -> StreamResult<()> {
        let mut inner = self.inner.lock();
        if inner.write_closed || inner.read_closed {
            return Err(StreamError::Closed("write to closed buffer".into()));
        }
        if let Some(waiter) = inner.waiters.pop_front() {
            let _ = waiter.send(Some(chunk));
            return Ok(());
        }
        inner.queue.push_back(chunk);
        if inner.queue.len() >= self.high_water_mark {
            inner.write_closed = true;
        }
        Ok(())
    }

    /// Pulls the next chunk, suspending if the buffer is currently empty.
    /// Returns `None` once the buffer is closed and drained.
    pub async fn read(&self) -> Option<Bytes> {
        let rx = {
            let mut inner = self.inner.lock();
            if let Some(chunk) = inner.queue.pop_front() {
                return Some(chunk);
            }
            if inner.write_closed || inner.read_closed {
                return None;
            }
            let (tx, rx) = oneshot::channel();
            inner.waiters.push_back(tx);
            rx
        };
        rx.await.unwrap_or(None)
    }

    /// Closes the write side. Buffered data already queued is still
    /// readable; once drained, reads yield `None` forever. Idempotent.
    pub fn close_write(&self) {
        let mut inner = self.inner.lock();
        if inner.write_closed {
            return;
        }
        inner.write_closed = true;
        for waiter in inner.waiters.drain(..) {
            let _ = waiter.send(None);
        }
    }

    /// Closes the read side, discarding anything still queued. Idempotent.
    pub fn close_read(&self) {
        let mut inner = self.inner.lock();
        inner.read_closed = true;
        inner.queue.clear();
        for waiter in inner.waiters.drain(..) {
            let _ = waiter.send(None);
        }
    }

    /// `true` once the write side has been closed (explicitly or via
    /// back-pressure).
    pub fn is_write_closed(&self) -> bool {
        self.inner.lock().write_closed
    }

    /// `true` once the read side has been closed.
    pub fn is_read_closed(&self) -> bool {
        self.inner.lock().read_closed
    }

    /// The number of chunks currently queued.
    pub fn queue_len(&self) -> usize {
        self.inner.lock().queue.len()
    }
}
