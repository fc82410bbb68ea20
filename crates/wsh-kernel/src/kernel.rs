//! The kernel facade and tenant lifecycle.

use crate::error::{KernelError, KernelResult};
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::stdio::Stdio;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use wsh_core::{
    Cap, CapabilitySet, Clock, Environment, Handle, Logger, Rng, ResourceTable, SignalController,
    SystemClock, Tracer,
};
use wsh_net::{ChaosEngine, VirtualNetwork};
use wsh_stream::{DatagramSocket, Listener, MessagePort, ServiceRegistry};

/// A handle-table entry's payload: the kernel owns resources of several
/// unrelated shapes under one `ResourceTable`, so they are folded into one
/// enum rather than one table per kind.
#[derive(Clone)]
pub enum Resource {
    /// A paired reliable socket end.
    Stream(wsh_stream::StreamSocket),
    /// An accept queue.
    Listener(Listener),
    /// A datagram socket.
    Datagram(DatagramSocket),
    /// One end of a message-port pair.
    Port(Arc<MessagePort>),
}

impl Resource {
    fn type_tag(&self) -> &'static str {
        match self {
            Resource::Stream(_) => "stream",
            Resource::Listener(_) => "listener",
            Resource::Datagram(_) => "datagram",
            Resource::Port(_) => "port",
        }
    }
}

/// What the caller asks for when creating a tenant.
#[derive(Default)]
pub struct CreateTenantOptions {
    /// Capability tags to grant, e.g. `["net", "clock"]`.
    pub capabilities: Vec<Cap>,
    /// Environment variables visible to the tenant.
    pub env: HashMap<String, String>,
    /// Pre-built stdio to attach; a fresh in-memory pipe pair is used if
    /// omitted.
    pub stdio: Option<Stdio>,
}

/// Everything the kernel retains for one live tenant.
pub struct Tenant {
    /// The `tenant_N` id.
    pub id: String,
    /// The frozen capability set this tenant was created with.
    pub capabilities: CapabilitySet,
    /// The tenant's immutable environment.
    pub env: Environment,
    /// The tenant's stdio streams.
    pub stdio: Stdio,
    /// The tenant's own signal controller (independent of the kernel's).
    pub signals: Arc<SignalController>,
    /// The tenant's capability-scoped network view, if `net` or `loopback`
    /// (or any network sub-capability) was granted.
    pub network: Option<Arc<wsh_net::ScopedNetwork>>,
}

impl std::fmt::Debug for Tenant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tenant")
            .field("id", &self.id)
            .field("capabilities", &self.capabilities)
            .field("env", &self.env)
            .finish_non_exhaustive()
    }
}

/// The kernel facade: owns every shared
/// subsystem and the tenant table, and is the sole entry point for
/// creating and tearing down tenants.
pub struct Kernel {
    clock: Arc<dyn Clock>,
    rng: Arc<dyn Rng>,
    resources: ResourceTable<Resource>,
    tracer: Arc<Tracer>,
    logger: Arc<Logger>,
    chaos: Arc<ChaosEngine>,
    services: Arc<ServiceRegistry>,
    signals: Arc<SignalController>,
    network: VirtualNetwork,
    tenants: DashMap<String, Arc<Tenant>>,
    next_tenant_id: AtomicU64,
    closed: AtomicBool,
    metrics: Metrics,
}

impl Kernel {
    /// Builds a kernel with the default system clock and crypto RNG.
    pub fn new(limits: wsh_core::Limits) -> Self {
        Self::with_clock_and_rng(limits, Arc::new(SystemClock::new()), Arc::new(wsh_core::CryptoRng::new()))
    }

    /// Builds a kernel over an injected clock and RNG, used by tests that
    /// need deterministic time or chaos-injection reproducibility.
    pub fn with_clock_and_rng(limits: wsh_core::Limits, clock: Arc<dyn Clock>, rng: Arc<dyn Rng>) -> Self {
        let tracer = Arc::new(Tracer::new(limits.trace_capacity));
        let logger = Arc::new(Logger::new(limits.trace_capacity));
        logger.mirror_to(tracer.clone());
        Self {
            clock,
            chaos: Arc::new(ChaosEngine::new(rng.clone())),
            rng,
            resources: ResourceTable::new(limits.resource_table_max),
            tracer,
            logger,
            services: Arc::new(ServiceRegistry::new()),
            signals: Arc::new(SignalController::new()),
            network: VirtualNetwork::new(),
            tenants: DashMap::new(),
            next_tenant_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            metrics: Metrics::new(),
        }
    }

    /// A snapshot of the kernel's activity counters.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Records a gateway operation that timed out. The kernel does not
    /// itself drive gateway I/O (that lives behind each tenant's
    /// `ScopedNetwork`), so callers report this when they observe
    /// `NetError::TimedOut` from a gateway-backed operation.
    pub fn record_gateway_timeout(&self) {
        self.metrics.record_gateway_timeout();
    }

    /// The kernel clock.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// The kernel RNG.
    pub fn rng(&self) -> &Arc<dyn Rng> {
        &self.rng
    }

    /// The shared resource table.
    pub fn resources(&self) -> &ResourceTable<Resource> {
        &self.resources
    }

    /// The event tracer.
    pub fn tracer(&self) -> &Arc<Tracer> {
        &self.tracer
    }

    /// The structured logger, mirrored into the tracer.
    pub fn logger(&self) -> &Arc<Logger> {
        &self.logger
    }

    /// The fault-injection engine.
    pub fn chaos(&self) -> &Arc<ChaosEngine> {
        &self.chaos
    }

    /// The named service directory.
    pub fn services(&self) -> &Arc<ServiceRegistry> {
        &self.services
    }

    /// The kernel-level signal controller (distinct from each tenant's own).
    pub fn signals(&self) -> &Arc<SignalController> {
        &self.signals
    }

    /// The virtual network backing every tenant's scoped view.
    pub fn network(&self) -> &VirtualNetwork {
        &self.network
    }

    fn now_ms(&self) -> u64 {
        self.clock.now_wall()
    }

    fn require_open(&self) -> KernelResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(KernelError::Closed);
        }
        Ok(())
    }

    /// Creates a tenant with the given capabilities, environment and
    /// stdio, registers its signal controller and (if any network
    /// capability was granted) its scoped network view, and logs creation.
    pub fn create_tenant(&self, options: CreateTenantOptions) -> KernelResult<Arc<Tenant>> {
        self.require_open()?;
        let id = format!("tenant_{}", self.next_tenant_id.fetch_add(1, Ordering::SeqCst));
        let capabilities = CapabilitySet::new(options.capabilities);
        let env = Environment::new(options.env);
        let stdio = options.stdio.unwrap_or_else(|| Stdio::in_memory(wsh_stream::DEFAULT_HIGH_WATER_MARK).0);
        let signals = Arc::new(SignalController::new());

        let has_any_net_cap = [
            Cap::Net,
            Cap::Loopback,
            Cap::TcpConnect,
            Cap::TcpListen,
            Cap::UdpSend,
            Cap::UdpBind,
            Cap::DnsResolve,
        ]
        .iter()
        .any(|c| capabilities.has(*c))
            || capabilities.has(Cap::All);
        let network = has_any_net_cap.then(|| Arc::new(self.network.scope(capabilities.clone(), None)));

        let tenant = Arc::new(Tenant {
            id: id.clone(),
            capabilities,
            env,
            stdio,
            signals,
            network,
        });
        self.tenants.insert(id.clone(), tenant.clone());
        self.metrics.record_tenant_created();
        self.logger
            .for_module("kernel")
            .info(format!("tenant created: {id}"), self.now_ms());
        self.tracer.emit(
            "tenant_created",
            serde_json::json!({ "tenant_id": id }),
            self.now_ms(),
        );
        Ok(tenant)
    }

    /// Looks up a live tenant by id.
    pub fn tenant(&self, id: &str) -> KernelResult<Arc<Tenant>> {
        self.tenants
            .get(id)
            .map(|t| t.clone())
            .ok_or_else(|| KernelError::NoTenant(id.to_string()))
    }

    /// Destroys a tenant: drops every resource it owns, tears down its
    /// scoped network, fires its `TERM` signal, removes it, and logs.
    pub fn destroy_tenant(&self, id: &str) -> KernelResult<()> {
        let (_, tenant) = self
            .tenants
            .remove(id)
            .ok_or_else(|| KernelError::NoTenant(id.to_string()))?;
        let dropped = self.resources.drop_all_owned_by(id);
        for _ in &dropped {
            self.metrics.record_handle_dropped();
        }
        if let Some(network) = &tenant.network {
            network.close();
        }
        tenant.signals.signal("TERM");
        self.metrics.record_tenant_destroyed();
        self.logger
            .for_module("kernel")
            .info(format!("tenant destroyed: {id}"), self.now_ms());
        self.tracer.emit(
            "tenant_destroyed",
            serde_json::json!({ "tenant_id": id }),
            self.now_ms(),
        );
        Ok(())
    }

    /// Destroys every tenant and clears the resource table. Idempotent:
    /// calling `close` again after the kernel is already closed is a no-op.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let ids: Vec<String> = self.tenants.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            let _ = self.destroy_tenant(&id);
        }
        self.resources.clear();
        self.logger
            .for_module("kernel")
            .info("kernel closed", self.now_ms());
        self.tracer.emit("kernel_closed", serde_json::json!({}), self.now_ms());
    }

    /// Allocates a resource handle owned by `tenant_id`.
    pub fn allocate(&self, resource: Resource, tenant_id: &str) -> KernelResult<Handle> {
        let type_tag = resource.type_tag();
        let handle = self
            .resources
            .allocate(type_tag, resource, tenant_id)
            .map_err(KernelError::from)?;
        self.metrics.record_handle_allocated();
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_kernel() -> Kernel {
        Kernel::new(wsh_core::Limits::default())
    }

    #[test]
    fn create_tenant_assigns_monotonic_ids() {
        let kernel = test_kernel();
        let t1 = kernel.create_tenant(CreateTenantOptions::default()).unwrap();
        let t2 = kernel.create_tenant(CreateTenantOptions::default()).unwrap();
        assert_eq!(t1.id, "tenant_1");
        assert_eq!(t2.id, "tenant_2");
    }

    #[test]
    fn destroy_tenant_drops_its_resources() {
        let kernel = test_kernel();
        let tenant = kernel.create_tenant(CreateTenantOptions::default()).unwrap();
        let (a, _b) = wsh_stream::StreamSocket::create_pair(16);
        let handle = kernel.allocate(Resource::Stream(a), &tenant.id).unwrap();
        assert!(kernel.resources().has(&handle));
        kernel.destroy_tenant(&tenant.id).unwrap();
        assert!(!kernel.resources().has(&handle));
        assert!(kernel.tenant(&tenant.id).is_err());
    }

    #[test]
    fn destroy_unknown_tenant_fails_no_tenant() {
        let kernel = test_kernel();
        let err = kernel.destroy_tenant("tenant_999").unwrap_err();
        assert_eq!(err.code(), "ENOTFOUND");
    }

    #[test]
    fn close_is_idempotent_and_rejects_further_creation() {
        let kernel = test_kernel();
        kernel.create_tenant(CreateTenantOptions::default()).unwrap();
        kernel.close();
        kernel.close();
        let err = kernel.create_tenant(CreateTenantOptions::default()).unwrap_err();
        assert_eq!(err.code(), "ECLOSED");
    }

    #[test]
    fn tenant_without_net_capability_has_no_scoped_network() {
        let kernel = test_kernel();
        let tenant = kernel.create_tenant(CreateTenantOptions::default()).unwrap();
        assert!(tenant.network.is_none());
    }

    #[test]
    fn metrics_count_tenant_and_handle_lifecycle() {
        let kernel = test_kernel();
        let tenant = kernel.create_tenant(CreateTenantOptions::default()).unwrap();
        let (a, _b) = wsh_stream::StreamSocket::create_pair(16);
        kernel.allocate(Resource::Stream(a), &tenant.id).unwrap();
        kernel.destroy_tenant(&tenant.id).unwrap();
        let snap = kernel.metrics();
        assert_eq!(snap.tenants_created, 1);
        assert_eq!(snap.tenants_destroyed, 1);
        assert_eq!(snap.handles_allocated, 1);
        assert_eq!(snap.handles_dropped, 1);
    }

    #[test]
    fn tenant_with_loopback_capability_gets_scoped_network() {
        let kernel = test_kernel();
        let tenant = kernel
            .create_tenant(CreateTenantOptions {
                capabilities: vec![Cap::Loopback],
                ..Default::default()
            })
            .unwrap();
        assert!(tenant.network.is_some());
    }
}
