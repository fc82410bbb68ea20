//! Errors raised by the byte-stream and messaging layer.

use thiserror::Error;

/// Result alias for stream-layer operations.
pub type StreamResult<T> = std::result::Result<T, StreamError>;

/// Errors raised by buffers, sockets, listeners, ports and queues.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// The stream, socket, port or queue is closed.
    #[error("stream closed: {0}")]
    Closed(String),

    /// An operation-queue enqueue failed because the queue is full.
    #[error("queue full (max {0})")]
    QueueFull(usize),

    /// A parked operation did not complete before its deadline.
    #[error("operation timed out")]
    TimedOut,

    /// A duplicate registration under an already-used name.
    #[error("already registered: {0}")]
    Already(String),

    /// A lookup or removal targeted a name that does not exist.
    #[error("not found: {0}")]
    NotFound(String),
}

impl StreamError {
    /// The stable machine code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            StreamError::Closed(_) => "ESTREAMCLOSED",
            StreamError::QueueFull(_) => "EQUEUEFULL",
            StreamError::TimedOut => "ETIMEDOUT",
            StreamError::Already(_) => "EALREADY",
            StreamError::NotFound(_) => "ENOTFOUND",
        }
    }
}
