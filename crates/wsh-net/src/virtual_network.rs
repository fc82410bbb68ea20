//! `VirtualNetwork` and capability-scoped access to it.

use crate::address::parse_address;
use crate::backend::Backend;
use crate::error::{NetError, NetResult};
use crate::loopback::LoopbackBackend;
use crate::policy::{PolicyCallback, PolicyEngine, ScopeId};
use std::sync::Arc;
use wsh_core::{Cap, CapabilitySet};
use wsh_stream::{DatagramSocket, Listener, StreamSocket};

struct Route {
    scheme: String,
    backend: Arc<dyn Backend>,
}

/// Owns the scheme-routed backend table and the policy engine that every
/// [`ScopedNetwork`] checks against. Seeded with a [`LoopbackBackend`]
/// registered for `mem` and `loop`.
pub struct VirtualNetwork {
    routes: Vec<Route>,
    policy: Arc<PolicyEngine>,
}

impl VirtualNetwork {
    /// Creates a network with the loopback backend already registered for
    /// `mem` and `loop`.
    pub fn new() -> Self {
        let loopback: Arc<dyn Backend> = Arc::new(LoopbackBackend::new());
        Self {
            routes: vec![
                Route { scheme: "mem".to_string(), backend: loopback.clone() },
                Route { scheme: "loop".to_string(), backend: loopback },
            ],
            policy: Arc::new(PolicyEngine::new()),
        }
    }

    /// Registers `backend` for `scheme`, taking priority over any earlier
    /// registration for the same scheme.
    pub fn add_backend(&mut self, scheme: impl Into<String>, backend: Arc<dyn Backend>) {
        self.routes.push(Route { scheme: scheme.into(), backend });
    }

    fn route(&self, scheme: &str) -> NetResult<&Arc<dyn Backend>> {
        self.routes
            .iter()
            .rev()
            .find(|r| r.scheme == scheme)
            .map(|r| &r.backend)
            .ok_or_else(|| NetError::NoRoute(scheme.to_string()))
    }

    /// Opens a connection to `address` (`scheme://host[:port]`).
    pub async fn connect(&self, address: &str) -> NetResult<StreamSocket> {
        let addr = parse_address(address)?;
        self.route(&addr.scheme)?.connect(&addr.host, addr.port).await
    }

    /// Listens on `address`.
    pub async fn listen(&self, address: &str) -> NetResult<Listener> {
        let addr = parse_address(address)?;
        self.route(&addr.scheme)?.listen(addr.port).await
    }

    /// Sends one datagram to `address`.
    pub async fn send_datagram(&self, address: &str, data: &[u8]) -> NetResult<()> {
        let addr = parse_address(address)?;
        self.route(&addr.scheme)?.send_datagram(&addr.host, addr.port, data).await
    }

    /// Binds a datagram socket at `address`.
    pub async fn bind_datagram(&self, address: &str) -> NetResult<DatagramSocket> {
        let addr = parse_address(address)?;
        self.route(&addr.scheme)?.bind_datagram(addr.port).await
    }

    /// Resolves `name` by trying every registered backend in registration
    /// order, returning the first non-empty result, or an empty list if
    /// none has an answer.
    pub async fn resolve(&self, name: &str) -> NetResult<Vec<String>> {
        for route in &self.routes {
            let addresses = route.backend.resolve(name).await?;
            if !addresses.is_empty() {
                return Ok(addresses);
            }
        }
        Ok(Vec::new())
    }

    /// Creates a capability-scoped view over this network.
    pub fn scope(&self, capabilities: CapabilitySet, callback: Option<PolicyCallback>) -> ScopedNetwork {
        let scope_id = self.policy.create_scope(capabilities, callback);
        ScopedNetwork {
            routes: self.routes.iter().map(|r| Route { scheme: r.scheme.clone(), backend: r.backend.clone() }).collect(),
            policy: self.policy.clone(),
            scope_id,
        }
    }
}

impl Default for VirtualNetwork {
    fn default() -> Self {
        Self::new()
    }
}

/// Maps a scheme and operation to the capability that guards it:
/// `mem`/`loop` always require `loopback`;
/// everything else requires the operation's own tag.
fn required_capability(scheme: &str, op: Op) -> Cap {
    if scheme == "mem" || scheme == "loop" {
        return Cap::Loopback;
    }
    match op {
        Op::Connect => Cap::TcpConnect,
        Op::Listen => Cap::TcpListen,
        Op::SendDatagram => Cap::UdpSend,
        Op::BindDatagram => Cap::UdpBind,
        Op::Resolve => Cap::DnsResolve,
    }
}

#[derive(Clone, Copy)]
enum Op {
    Connect,
    Listen,
    SendDatagram,
    BindDatagram,
    Resolve,
}

/// A [`VirtualNetwork`] view bound to one policy scope: every operation is
/// checked against the scope's capabilities before it reaches a backend.
pub struct ScopedNetwork {
    routes: Vec<Route>,
    policy: Arc<PolicyEngine>,
    scope_id: ScopeId,
}

impl ScopedNetwork {
    fn route(&self, scheme: &str) -> NetResult<&Arc<dyn Backend>> {
        self.routes
            .iter()
            .rev()
            .find(|r| r.scheme == scheme)
            .map(|r| &r.backend)
            .ok_or_else(|| NetError::NoRoute(scheme.to_string()))
    }

    fn check(&self, scheme: &str, op: Op, address: Option<&str>) -> NetResult<()> {
        let capability = required_capability(scheme, op);
        if self.policy.check(self.scope_id, capability, address) {
            Ok(())
        } else {
            Err(NetError::PolicyDenied {
                capability: capability.as_str().to_string(),
                scope: self.scope_id.to_string(),
            })
        }
    }

    /// As [`VirtualNetwork::connect`], denying with `EPOLICY` if the scope
    /// lacks the required capability.
    pub async fn connect(&self, address: &str) -> NetResult<StreamSocket> {
        let addr = parse_address(address)?;
        self.check(&addr.scheme, Op::Connect, Some(address))?;
        self.route(&addr.scheme)?.connect(&addr.host, addr.port).await
    }

    /// As [`VirtualNetwork::listen`].
    pub async fn listen(&self, address: &str) -> NetResult<Listener> {
        let addr = parse_address(address)?;
        self.check(&addr.scheme, Op::Listen, Some(address))?;
        self.route(&addr.scheme)?.listen(addr.port).await
    }

    /// As [`VirtualNetwork::send_datagram`].
    pub async fn send_datagram(&self, address: &str, data: &[u8]) -> NetResult<()> {
        let addr = parse_address(address)?;
        self.check(&addr.scheme, Op::SendDatagram, Some(address))?;
        self.route(&addr.scheme)?.send_datagram(&addr.host, addr.port, data).await
    }

    /// As [`VirtualNetwork::bind_datagram`].
    pub async fn bind_datagram(&self, address: &str) -> NetResult<DatagramSocket> {
        let addr = parse_address(address)?;
        self.check(&addr.scheme, Op::BindDatagram, Some(address))?;
        self.route(&addr.scheme)?.bind_datagram(addr.port).await
    }

    /// As [`VirtualNetwork::resolve`].
    pub async fn resolve(&self, name: &str) -> NetResult<Vec<String>> {
        self.check("dns", Op::Resolve, Some(name))?;
        for route in &self.routes {
            let addresses = route.backend.resolve(name).await?;
            if !addresses.is_empty() {
                return Ok(addresses);
            }
        }
        Ok(Vec::new())
    }

    /// Releases this scope; further operations through it deny.
    pub fn close(&self) {
        self.policy.remove_scope(self.scope_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wsh_stream::ByteStream;

    #[tokio::test]
    async fn loopback_listen_then_connect_pairs_a_socket() {
        let net = VirtualNetwork::new();
        let listener = net.listen("mem://localhost:9000").await.unwrap();
        let client = net.connect("mem://localhost:9000").await.unwrap();
        client.write(bytes::Bytes::from_static(b"hi")).unwrap();
        let server = listener.accept().await.expect("server side should be enqueued");
        assert_eq!(server.read().await.unwrap(), bytes::Bytes::from_static(b"hi"));
    }

    #[tokio::test]
    async fn unknown_scheme_fails_no_route() {
        let net = VirtualNetwork::new();
        let err = net.connect("tcp://example.com:80").await.unwrap_err();
        assert_eq!(err.code(), "ENOROUTE");
    }

    #[tokio::test]
    async fn scoped_network_denies_without_capability() {
        let net = VirtualNetwork::new();
        let scope = net.scope(CapabilitySet::default(), None);
        let err = scope.connect("mem://localhost:9001").await.unwrap_err();
        assert_eq!(err.code(), "EPOLICY");
    }

    #[tokio::test]
    async fn scoped_network_allows_with_loopback_capability() {
        let net = VirtualNetwork::new();
        net.listen("mem://localhost:9002").await.unwrap();
        let scope = net.scope(CapabilitySet::new([Cap::Loopback]), None);
        assert!(scope.connect("mem://localhost:9002").await.is_ok());
    }

    #[tokio::test]
    async fn closed_scope_denies_subsequent_operations() {
        let net = VirtualNetwork::new();
        let scope = net.scope(CapabilitySet::new([Cap::Loopback]), None);
        scope.close();
        let err = scope.connect("mem://localhost:9003").await.unwrap_err();
        assert_eq!(err.code(), "EPOLICY");
    }
}
