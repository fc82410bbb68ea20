//! Unified kernel error type.
//!
//! Every fallible kernel operation returns a [`CoreError`]. Each variant
//! carries the machine code from the closed external error contract via
//! [`CoreError::code`]; the `Display` message is free-form and safe to log.

use thiserror::Error;

/// Result type alias for core kernel operations.
pub type CoreResult<T> = std::result::Result<T, CoreError>;

/// Closed error hierarchy for the kernel's core subsystems.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// No resource table entry exists for the given handle.
    #[error("no such handle: {0}")]
    NoHandle(String),

    /// The handle exists but holds a value of a different type.
    #[error("handle {handle} is not a {expected}")]
    HandleType {
        /// The handle that was queried.
        handle: String,
        /// The type that was expected.
        expected: String,
    },

    /// The resource table is at capacity.
    #[error("resource table full (max {0})")]
    TableFull(usize),

    /// A capability required for an operation was not granted.
    #[error("capability denied: {0}")]
    CapDenied(String),

    /// A named resource already exists.
    #[error("already registered: {0}")]
    Already(String),

    /// A named resource could not be found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A signal-related operation failed.
    #[error("signal error: {0}")]
    Signal(String),
}

impl CoreError {
    /// The stable machine code for this error, part of the external contract.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::NoHandle(_) => "ENOHANDLE",
            CoreError::HandleType { .. } => "EHANDLETYPE",
            CoreError::TableFull(_) => "ETABLEFULL",
            CoreError::CapDenied(_) => "ECAPDENIED",
            CoreError::Already(_) => "EALREADY",
            CoreError::NotFound(_) => "ENOTFOUND",
            CoreError::Signal(_) => "ESIGNAL",
        }
    }
}
