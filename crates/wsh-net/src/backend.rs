//! The `Backend` trait: the five networking primitives every URL scheme
//! implements.

use crate::error::NetResult;
use async_trait::async_trait;
use std::fmt;
use wsh_stream::{DatagramSocket, Listener, StreamSocket};

/// A connection-oriented, datagram and name-resolution provider for one or
/// more URL schemes. Implemented by `LoopbackBackend`, `ServiceBackend`,
/// `GatewayBackend`, and `ChaosBackendWrapper`.
#[async_trait]
pub trait Backend: Send + Sync + fmt::Debug {
    /// Opens a reliable stream to `host:port`. `ECONNREFUSED` if nothing is
    /// listening.
    async fn connect(&self, host: &str, port: u16) -> NetResult<StreamSocket>;

    /// Starts listening on `port` (`0` requests an ephemeral port).
    /// `EADDRINUSE` on collision, `ELISTENFAIL` on a transport-level
    /// refusal.
    async fn listen(&self, port: u16) -> NetResult<Listener>;

    /// Sends one datagram to `host:port`. Delivery is best-effort; a
    /// missing destination is a silent drop, never an error.
    async fn send_datagram(&self, host: &str, port: u16, data: &[u8]) -> NetResult<()>;

    /// Binds a datagram socket to `port` (`0` requests an ephemeral port).
    async fn bind_datagram(&self, port: u16) -> NetResult<DatagramSocket>;

    /// Resolves `name` to a list of addresses. An empty vector, not an
    /// error, signals "nothing found".
    async fn resolve(&self, name: &str) -> NetResult<Vec<String>>;

    /// Closes the backend: all sockets, listeners and pending operations
    /// are rejected or dropped. Idempotent.
    async fn close(&self);
}
