//! Atomic counters for kernel-wide activity, exposed as a point-in-time
//! snapshot. Not part of the original component table; added because a
//! long-running kernel process needs *some* cheap way to answer "how much
//! has this done" without walking the tracer ring buffer.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// A single counter snapshot.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct MetricsSnapshot {
    /// Total tenants ever created.
    pub tenants_created: u64,
    /// Total tenants ever destroyed (including via `close`).
    pub tenants_destroyed: u64,
    /// Total resource-table handles ever allocated.
    pub handles_allocated: u64,
    /// Total resource-table handles ever dropped.
    pub handles_dropped: u64,
    /// Total gateway operations that timed out waiting for a reply.
    pub gateway_timeouts: u64,
}

/// Monotonically increasing counters, cheap to update from any thread.
#[derive(Debug, Default)]
pub struct Metrics {
    tenants_created: AtomicU64,
    tenants_destroyed: AtomicU64,
    handles_allocated: AtomicU64,
    handles_dropped: AtomicU64,
    gateway_timeouts: AtomicU64,
}

impl Metrics {
    /// Creates a zeroed counter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a tenant creation.
    pub fn record_tenant_created(&self) {
        self.tenants_created.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a tenant destruction.
    pub fn record_tenant_destroyed(&self) {
        self.tenants_destroyed.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a resource-table allocation.
    pub fn record_handle_allocated(&self) {
        self.handles_allocated.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a resource-table drop.
    pub fn record_handle_dropped(&self) {
        self.handles_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a gateway operation timing out.
    pub fn record_gateway_timeout(&self) {
        self.gateway_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// A consistent-enough snapshot of every counter (each field is read
    /// independently; this is diagnostics, not a transaction).
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            tenants_created: self.tenants_created.load(Ordering::Relaxed),
            tenants_destroyed: self.tenants_destroyed.load(Ordering::Relaxed),
            handles_allocated: self.handles_allocated.load(Ordering::Relaxed),
            handles_dropped: self.handles_dropped.load(Ordering::Relaxed),
            gateway_timeouts: self.gateway_timeouts.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero() {
        let metrics = Metrics::new();
        let snap = metrics.snapshot();
        assert_eq!(snap.tenants_created, 0);
        assert_eq!(snap.handles_allocated, 0);
    }

    #[test]
    fn each_counter_increments_independently() {
        let metrics = Metrics::new();
        metrics.record_tenant_created();
        metrics.record_tenant_created();
        metrics.record_handle_allocated();
        let snap = metrics.snapshot();
        assert_eq!(snap.tenants_created, 2);
        assert_eq!(snap.handles_allocated, 1);
        assert_eq!(snap.tenants_destroyed, 0);
    }
}
