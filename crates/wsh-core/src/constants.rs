//! Frozen tag enums and defaults shared across the workspace.

/// Default tunables for the core kernel subsystems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Limits {
    /// Maximum number of live resource-table entries.
    pub resource_table_max: usize,
    /// Ring buffer capacity for the tracer and logger.
    pub trace_capacity: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            resource_table_max: 4096,
            trace_capacity: 1024,
        }
    }
}

/// Ephemeral port range used by loopback-style backends.
pub const EPHEMERAL_PORT_RANGE: std::ops::RangeInclusive<u16> = 49152..=65535;
