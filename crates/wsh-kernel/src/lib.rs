//! The kernel facade, tenant lifecycle, capabilities object, stdio and
//! activity metrics for the wsh microkernel. See the workspace
//! `SPEC_FULL.md`.

pub mod caps_object;
pub mod error;
pub mod kernel;
pub mod metrics;
pub mod stdio;

pub use caps_object::{build_caps, require_cap, Caps};
pub use error::{KernelError, KernelResult};
pub use kernel::{CreateTenantOptions, Kernel, Resource, Tenant};
pub use metrics::{Metrics, MetricsSnapshot};
pub use stdio::{Stdin, Stdio, WriteStream};
