//! The virtual network stack for the wsh microkernel: address parsing,
//! the scheme-routed `Backend` trait, a policy engine, loopback/service/
//! gateway backends, fault injection, and the capability-scoped
//! `VirtualNetwork` facade. See the workspace `SPEC_FULL.md`.

pub mod address;
pub mod backend;
pub mod chaos;
pub mod error;
pub mod gateway;
pub mod loopback;
pub mod policy;
pub mod service_backend;
pub mod virtual_network;

pub use address::{parse_address, Address};
pub use backend::Backend;
pub use chaos::{ChaosBackendWrapper, ChaosConfig, ChaosEngine};
pub use error::{NetError, NetResult};
pub use gateway::GatewayBackend;
pub use loopback::LoopbackBackend;
pub use policy::{Decision, PolicyCallback, PolicyEngine, ScopeId};
pub use service_backend::ServiceBackend;
pub use virtual_network::{ScopedNetwork, VirtualNetwork};
