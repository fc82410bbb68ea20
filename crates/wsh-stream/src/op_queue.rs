//! Bounded deferred-execution FIFO, used for offline buffering of
//! operations until a transport is ready to drain them.

use crate::error::StreamError;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;
use tokio::sync::oneshot;

struct QueueEntry<Op, Res, Err> {
    op: Op,
    resolve: oneshot::Sender<Result<Res, Err>>,
}

/// A bounded FIFO of deferred operations, drained in order against a
/// caller-supplied execution function.
pub struct OperationQueue<Op, Res, Err> {
    entries: Mutex<VecDeque<QueueEntry<Op, Res, Err>>>,
    max: usize,
    drain_timeout: Duration,
}

impl<Op, Res, Err> OperationQueue<Op, Res, Err>
where
    Err: From<StreamError> + Send + 'static,
    Res: Send + 'static,
{
    /// Creates a queue bounded to `max` pending entries, with `drain`
    /// racing each item against `drain_timeout`.
    pub fn new(max: usize, drain_timeout: Duration) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            max,
            drain_timeout,
        }
    }

    /// Enqueues `op`, returning a receiver that resolves once `drain` (or
    /// `clear`) settles it. Fails with `EQUEUEFULL` at capacity.
    pub fn enqueue(&self, op: Op) -> Result<oneshot::Receiver<Result<Res, Err>>, Err> {
        let mut entries = self.entries.lock();
        if entries.len() >= self.max {
            return Err(StreamError::QueueFull(self.max).into());
        }
        let (tx, rx) = oneshot::channel();
        entries.push_back(QueueEntry { op, resolve: tx });
        Ok(rx)
    }

    /// Atomically empties the queue and, in FIFO order, races
    /// `execute_fn(op)` against the drain timeout, resolving or rejecting
    /// each entry as it completes.
    pub async fn drain<F, Fut>(&self, execute_fn: F)
    where
        F: Fn(Op) -> Fut,
        Fut: Future<Output = Result<Res, Err>>,
    {
        let drained: Vec<_> = {
            let mut entries = self.entries.lock();
            std::mem::take(&mut *entries).into_iter().collect()
        };
        for entry in drained {
            let outcome = tokio::time::timeout(self.drain_timeout, execute_fn(entry.op)).await;
            let result = match outcome {
                Ok(r) => r,
                Err(_) => Err(StreamError::TimedOut.into()),
            };
            let _ = entry.resolve.send(result);
        }
    }

    /// Rejects every pending entry with a queue-cleared error and empties
    /// the queue.
    pub fn clear(&self) {
        let drained: Vec<_> = {
            let mut entries = self.entries.lock();
            std::mem::take(&mut *entries).into_iter().collect()
        };
        for entry in drained {
            let _ = entry
                .resolve
                .send(Err(StreamError::Closed("queue cleared".into()).into()));
        }
    }

    /// Number of entries currently pending.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// `true` if no entries are pending.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn drain_preserves_fifo_order() {
        let queue: OperationQueue<i32, i32, StreamError> =
            OperationQueue::new(10, Duration::from_secs(1));
        let mut receivers = Vec::new();
        for i in 0..5 {
            receivers.push(queue.enqueue(i).unwrap());
        }
        let order = std::sync::Arc::new(Mutex::new(Vec::new()));
        let o = order.clone();
        queue
            .drain(|op| {
                let o = o.clone();
                async move {
                    o.lock().push(op);
                    Ok::<i32, StreamError>(op * 2)
                }
            })
            .await;
        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
        for (i, rx) in receivers.into_iter().enumerate() {
            assert_eq!(rx.await.unwrap().unwrap(), (i as i32) * 2);
        }
    }

    #[tokio::test]
    async fn enqueue_fails_at_capacity() {
        let queue: OperationQueue<i32, i32, StreamError> =
            OperationQueue::new(1, Duration::from_secs(1));
        let _rx = queue.enqueue(1).unwrap();
        let err = queue.enqueue(2).unwrap_err();
        assert_eq!(err.code(), "EQUEUEFULL");
    }

    #[tokio::test]
    async fn clear_rejects_all_pending() {
        let queue: OperationQueue<i32, i32, StreamError> =
            OperationQueue::new(10, Duration::from_secs(1));
        let rx = queue.enqueue(1).unwrap();
        queue.clear();
        assert!(rx.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn drain_times_out_slow_operations() {
        let queue: OperationQueue<i32, i32, StreamError> =
            OperationQueue::new(10, Duration::from_millis(20));
        let rx = queue.enqueue(1).unwrap();
        queue
            .drain(|op| async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<i32, StreamError>(op)
            })
            .await;
        let err = rx.await.unwrap().unwrap_err();
        assert_eq!(err.code(), "ETIMEDOUT");
    }
}
