//! The per-tenant capabilities object: granted tags resolved to the
//! subsystem references they unlock, rather than bare booleans.

use crate::error::{KernelError, KernelResult};
use crate::kernel::Kernel;
use std::sync::Arc;
use wsh_core::{Cap, CapabilitySet, Clock, Logger, Rng, Tracer};
use wsh_net::{ChaosEngine, ScopedNetwork};
use wsh_stream::ServiceRegistry;

/// A read-only view binding a tenant's granted capability tags to the
/// kernel subsystem references they unlock. Object-shaped tags (`clock`,
/// `rng`, `ipc`, `trace`, `chaos`) carry the actual reference; the rest
/// (`net`, `fs`, `stdio`, `env`, `signal`) are boolean markers since their
/// effect is enforced elsewhere (the tenant's `ScopedNetwork`, its
/// `Stdio`, its `Environment`).
pub struct Caps {
    granted: CapabilitySet,
    /// Present when `clock` is granted.
    pub clock: Option<Arc<dyn Clock>>,
    /// Present when `rng` is granted.
    pub rng: Option<Arc<dyn Rng>>,
    /// Present when `ipc` is granted — the kernel's service directory,
    /// addressable via the `svc://` namespace.
    pub services: Option<Arc<ServiceRegistry>>,
    /// Present when `trace` is granted.
    pub tracer: Option<Arc<Tracer>>,
    /// Present when `chaos` is granted.
    pub chaos: Option<Arc<ChaosEngine>>,
    /// Present when `net`, `loopback`, or any network sub-capability is
    /// granted; `None` otherwise, even if the tenant happened to request a
    /// scope.
    pub network: Option<Arc<ScopedNetwork>>,
}

/// Builds the capabilities object for `granted`, wiring in `kernel`'s
/// subsystems for every tag that names one, and `network` for tenants that
/// were scoped at creation.
pub fn build_caps(kernel: &Kernel, granted: &CapabilitySet, network: Option<Arc<ScopedNetwork>>) -> Caps {
    let has = |c: Cap| granted.has(c);
    Caps {
        granted: granted.clone(),
        clock: has(Cap::Clock).then(|| kernel.clock().clone()),
        rng: has(Cap::Rng).then(|| kernel.rng().clone()),
        services: has(Cap::Ipc).then(|| kernel.services().clone()),
        tracer: has(Cap::Trace).then(|| kernel.tracer().clone()),
        chaos: has(Cap::Chaos).then(|| kernel.chaos().clone()),
        network,
    }
}

/// Fails with `ECAPDENIED` unless `tag` is granted on `caps` (directly, or
/// via `ALL`).
pub fn require_cap(caps: &Caps, tag: Cap) -> KernelResult<()> {
    if caps.granted.has(tag) {
        Ok(())
    } else {
        Err(KernelError::Core(wsh_core::CoreError::CapDenied(
            tag.as_str().to_string(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::CreateTenantOptions;

    #[test]
    fn granted_clock_tag_carries_the_clock_reference() {
        let kernel = Kernel::new(wsh_core::Limits::default());
        let tenant = kernel
            .create_tenant(CreateTenantOptions {
                capabilities: vec![Cap::Clock],
                ..Default::default()
            })
            .unwrap();
        let caps = build_caps(&kernel, &tenant.capabilities, None);
        assert!(caps.clock.is_some());
        assert!(caps.rng.is_none());
    }

    #[test]
    fn require_cap_denies_ungranted_tag() {
        let kernel = Kernel::new(wsh_core::Limits::default());
        let tenant = kernel.create_tenant(CreateTenantOptions::default()).unwrap();
        let caps = build_caps(&kernel, &tenant.capabilities, None);
        let err = require_cap(&caps, Cap::Fs).unwrap_err();
        assert_eq!(err.code(), "ECAPDENIED");
    }

    #[test]
    fn wildcard_grants_every_subsystem_reference() {
        let kernel = Kernel::new(wsh_core::Limits::default());
        let tenant = kernel
            .create_tenant(CreateTenantOptions {
                capabilities: vec![Cap::All],
                ..Default::default()
            })
            .unwrap();
        let caps = build_caps(&kernel, &tenant.capabilities, None);
        assert!(caps.clock.is_some());
        assert!(caps.rng.is_some());
        assert!(caps.services.is_some());
        assert!(caps.tracer.is_some());
        assert!(caps.chaos.is_some());
    }
}
