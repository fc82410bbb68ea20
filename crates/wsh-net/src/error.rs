//! Errors raised by the virtual network stack.

use thiserror::Error;
use wsh_stream::StreamError;

/// Result alias for virtual-network operations.
pub type NetResult<T> = std::result::Result<T, NetError>;

/// Errors raised by the router, policy engine and backends.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NetError {
    /// The address string did not parse.
    #[error("address parse error: {0}")]
    AddressParse(String),

    /// No backend is registered for the address's scheme.
    #[error("no route for scheme: {0}")]
    NoRoute(String),

    /// A connection attempt was refused by the target.
    #[error("connection refused: {0}")]
    ConnRefused(String),

    /// A policy scope denied the operation.
    #[error("policy denied: capability {capability} for scope {scope}")]
    PolicyDenied {
        /// The capability that was required.
        capability: String,
        /// The scope that denied it.
        scope: String,
    },

    /// A listen request collided with an already-bound port.
    #[error("address in use: {0}")]
    AddrInUse(String),

    /// The backend or transport is closed.
    #[error("closed: {0}")]
    Closed(String),

    /// A gateway operation did not receive a response in time.
    #[error("operation timed out")]
    TimedOut,

    /// A gateway listen request failed.
    #[error("listen failed: {0}")]
    ListenFailed(String),

    /// Wraps a lower-level stream error.
    #[error(transparent)]
    Stream(#[from] StreamError),
}

impl NetError {
    /// The stable machine code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            NetError::AddressParse(_) => "ENOROUTE",
            NetError::NoRoute(_) => "ENOROUTE",
            NetError::ConnRefused(_) => "ECONNREFUSED",
            NetError::PolicyDenied { .. } => "EPOLICY",
            NetError::AddrInUse(_) => "EADDRINUSE",
            NetError::Closed(_) => "ECLOSED",
            NetError::TimedOut => "ETIMEDOUT",
            NetError::ListenFailed(_) => "ELISTENFAIL",
            NetError::Stream(e) => e.code(),
        }
    }
}
