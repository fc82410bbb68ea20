//! Kernel-level errors, folding in the lower-layer error types.

use thiserror::Error;
use wsh_net::NetError;
use wsh_stream::StreamError;

/// Result alias for kernel operations.
pub type KernelResult<T> = std::result::Result<T, KernelError>;

/// Errors raised by the kernel facade and tenant lifecycle.
#[derive(Error, Debug, Clone)]
pub enum KernelError {
    /// No tenant exists with the given id.
    #[error("no such tenant: {0}")]
    NoTenant(String),

    /// The kernel has already been closed.
    #[error("kernel closed")]
    Closed,

    /// Wraps a core-layer error (resource table, capabilities, signals).
    #[error(transparent)]
    Core(#[from] wsh_core::CoreError),

    /// Wraps a stream-layer error (sockets, service registry).
    #[error(transparent)]
    Stream(#[from] StreamError),

    /// Wraps a network-layer error (backends, policy, gateway).
    #[error(transparent)]
    Net(#[from] NetError),
}

impl KernelError {
    /// The stable machine code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            KernelError::NoTenant(_) => "ENOTFOUND",
            KernelError::Closed => "ECLOSED",
            KernelError::Core(e) => e.code(),
            KernelError::Stream(e) => e.code(),
            KernelError::Net(e) => e.code(),
        }
    }
}
