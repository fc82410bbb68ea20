//! `wsh`: a capability-secure microkernel and virtual networking stack.
//!
//! This crate is a thin facade over [`wsh_core`], [`wsh_stream`],
//! [`wsh_net`] and [`wsh_kernel`] — construct a [`Kernel`], create tenants
//! with a fixed capability set, and every resource the tenant touches
//! (streams, sockets, the virtual network, stdio) is mediated by the
//! capabilities it was granted at creation.
//!
//! ```no_run
//! use wsh::{Cap, CreateTenantOptions, Kernel, Limits};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let kernel = Kernel::new(Limits::default());
//! let tenant = kernel
//!     .create_tenant(CreateTenantOptions {
//!         capabilities: vec![Cap::Loopback],
//!         ..Default::default()
//!     })
//!     .unwrap();
//! let network = tenant.network.as_ref().unwrap();
//! let _listener = network.listen("mem://localhost:9000").await.unwrap();
//! # }
//! ```

pub use wsh_core::{
    seeded, Cap, CapabilitySet, Clock, CoreError, CryptoRng, Environment, FixedClock, Handle,
    Level, Limits, LogEntry, Logger, Rng, SeededRng, SignalController, SystemClock, TraceEvent,
    Tracer,
};
pub use wsh_kernel::{
    build_caps, require_cap, Caps, CreateTenantOptions, Kernel, KernelError, Metrics,
    MetricsSnapshot, Resource, Stdin, Stdio, Tenant, WriteStream,
};
pub use wsh_net::{
    parse_address, Address, Backend, ChaosBackendWrapper, ChaosConfig, ChaosEngine, Decision,
    GatewayBackend, LoopbackBackend, NetError, PolicyEngine, ScopedNetwork, ScopeId,
    ServiceBackend, VirtualNetwork,
};
pub use wsh_stream::{
    AsyncBuffer, ByteStream, DatagramSocket, Listener, MessagePort, OperationQueue,
    ServiceEntry, ServiceRegistry, StreamError, StreamSocket,
};

/// The union of every error this crate's operations can raise, for callers
/// that want one `?`-friendly type instead of threading each crate's error
/// through by hand.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A kernel-level error (tenant lifecycle, closed kernel).
    #[error(transparent)]
    Kernel(#[from] KernelError),
    /// A network-layer error surfaced directly (e.g. from a raw
    /// `VirtualNetwork`, bypassing a tenant's scope).
    #[error(transparent)]
    Net(#[from] NetError),
    /// A stream-layer error surfaced directly.
    #[error(transparent)]
    Stream(#[from] StreamError),
    /// A core-layer error surfaced directly.
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl Error {
    /// The stable machine code for this error, delegating to
    /// whichever layer actually raised it.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Kernel(e) => e.code(),
            Error::Net(e) => e.code(),
            Error::Stream(e) => e.code(),
            Error::Core(e) => e.code(),
        }
    }
}

/// Installs a `tracing` subscriber reading `RUST_LOG` (or `info` by
/// default), suitable for the demo binary and integration tests that want
/// to see kernel log output.
pub fn install_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init();
}
