//! In-process backend for `mem://` and `loop://`.

use crate::backend::Backend;
use crate::error::{NetError, NetResult};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU16, Ordering};
use wsh_core::constants::EPHEMERAL_PORT_RANGE;
use wsh_stream::{DatagramSocket, Listener, StreamSocket};

const ACCEPT_QUEUE: usize = 128;

/// An entirely in-memory backend: `listen`/`connect` pair up sockets
/// directly, `bind_datagram`/`send_datagram` deliver synchronously.
pub struct LoopbackBackend {
    listeners: DashMap<u16, Listener>,
    datagrams: DashMap<u16, DatagramSocket>,
    next_ephemeral: AtomicU16,
}

impl Default for LoopbackBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self {
            listeners: DashMap::new(),
            datagrams: DashMap::new(),
            next_ephemeral: AtomicU16::new(*EPHEMERAL_PORT_RANGE.start()),
        }
    }

    fn allocate_ephemeral<V>(&self, table: &DashMap<u16, V>) -> NetResult<u16> {
        let start = *EPHEMERAL_PORT_RANGE.start();
        let end = *EPHEMERAL_PORT_RANGE.end();
        let span = (end - start) as u32 + 1;
        for _ in 0..span {
            let raw = self.next_ephemeral.fetch_add(1, Ordering::SeqCst);
            let candidate = if raw > end || raw < start {
                self.next_ephemeral.store(start + 1, Ordering::SeqCst);
                start
            } else {
                raw
            };
            if !table.contains_key(&candidate) {
                return Ok(candidate);
            }
        }
        Err(NetError::AddrInUse("no ephemeral ports available".into()))
    }

    fn parse_host_port(addr: &str) -> NetResult<(String, u16)> {
        let (host, port_str) = addr
            .rsplit_once(':')
            .ok_or_else(|| NetError::AddressParse(format!("missing port in '{addr}'")))?;
        let port = port_str
            .parse::<u16>()
            .map_err(|_| NetError::AddressParse(format!("bad port in '{addr}'")))?;
        Ok((host.to_string(), port))
    }
}

#[async_trait]
impl Backend for LoopbackBackend {
    async fn connect(&self, _host: &str, port: u16) -> NetResult<StreamSocket> {
        let listener = self
            .listeners
            .get(&port)
            .map(|l| l.clone())
            .ok_or_else(|| NetError::ConnRefused(format!("no listener on port {port}")))?;
        let (client, server) = StreamSocket::create_pair(wsh_stream::DEFAULT_HIGH_WATER_MARK);
        listener.enqueue(server);
        Ok(client)
    }

    async fn listen(&self, port: u16) -> NetResult<Listener> {
        let actual_port = if port == 0 {
            self.allocate_ephemeral(&self.listeners)?
        } else {
            if self.listeners.contains_key(&port) {
                return Err(NetError::AddrInUse(format!("port {port} already bound")));
            }
            port
        };
        let listeners_table_for_close = self.listeners.clone();
        let listener = Listener::new(
            actual_port,
            ACCEPT_QUEUE,
            Some(Box::new(move || {
                listeners_table_for_close.remove(&actual_port);
            })),
        );
        self.listeners.insert(actual_port, listener.clone());
        Ok(listener)
    }

    async fn send_datagram(&self, host: &str, port: u16, data: &[u8]) -> NetResult<()> {
        let addr = format!("{host}:{port}");
        let (_, target_port) = Self::parse_host_port(&addr)?;
        if let Some(sock) = self.datagrams.get(&target_port) {
            sock.deliver(addr, Bytes::copy_from_slice(data));
        }
        Ok(())
    }

    async fn bind_datagram(&self, port: u16) -> NetResult<DatagramSocket> {
        let actual_port = if port == 0 {
            self.allocate_ephemeral(&self.datagrams)?
        } else {
            if self.datagrams.contains_key(&port) {
                return Err(NetError::AddrInUse(format!("port {port} already bound")));
            }
            port
        };
        let datagrams_for_send = self.datagrams.clone();
        let datagrams_for_close = self.datagrams.clone();
        let sock = DatagramSocket::new(
            actual_port,
            std::sync::Arc::new(move |addr: &str, data: Bytes| {
                if let Ok((_, target_port)) = LoopbackBackend::parse_host_port(addr) {
                    if let Some(target) = datagrams_for_send.get(&target_port) {
                        target.deliver(format!("127.0.0.1:{actual_port}"), data);
                    }
                }
                Ok(())
            }),
            Some(Box::new(move || {
                datagrams_for_close.remove(&actual_port);
            })),
        );
        self.datagrams.insert(actual_port, sock.clone());
        Ok(sock)
    }

    async fn resolve(&self, _name: &str) -> NetResult<Vec<String>> {
        Ok(vec!["127.0.0.1".to_string()])
    }

    async fn close(&self) {
        for entry in self.listeners.iter() {
            entry.value().close();
        }
        self.listeners.clear();
        for entry in self.datagrams.iter() {
            entry.value().close();
        }
        self.datagrams.clear();
    }
}

impl std::fmt::Debug for LoopbackBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackBackend")
            .field("listener_count", &self.listeners.len())
            .field("datagram_count", &self.datagrams.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wsh_stream::ByteStream;

    #[tokio::test]
    async fn connect_without_listener_is_refused() {
        let backend = LoopbackBackend::new();
        let err = backend.connect("localhost", 7000).await.unwrap_err();
        assert_eq!(err.code(), "ECONNREFUSED");
    }

    #[tokio::test]
    async fn connect_pairs_with_listening_socket() {
        let backend = LoopbackBackend::new();
        let listener = backend.listen(7000).await.unwrap();
        let client = backend.connect("localhost", 7000).await.unwrap();
        let server = listener.accept().await.unwrap();
        client.write(Bytes::from_static(b"hi")).unwrap();
        assert_eq!(server.read().await.unwrap(), Bytes::from_static(b"hi"));
    }

    #[tokio::test]
    async fn ephemeral_listen_picks_port_in_range() {
        let backend = LoopbackBackend::new();
        let listener = backend.listen(0).await.unwrap();
        assert!(EPHEMERAL_PORT_RANGE.contains(&listener.local_port()));
    }

    #[tokio::test]
    async fn listen_collision_fails_addr_in_use() {
        let backend = LoopbackBackend::new();
        let _first = backend.listen(7001).await.unwrap();
        let err = backend.listen(7001).await.unwrap_err();
        assert_eq!(err.code(), "EADDRINUSE");
    }

    #[tokio::test]
    async fn datagram_delivers_to_bound_port() {
        let backend = LoopbackBackend::new();
        let sock = backend.bind_datagram(9000).await.unwrap();
        let received = std::sync::Arc::new(parking_lot::Mutex::new(None));
        let r = received.clone();
        sock.on_message(move |_from, data| *r.lock() = Some(data));
        backend
            .send_datagram("127.0.0.1", 9000, b"ping")
            .await
            .unwrap();
        assert_eq!(received.lock().as_deref(), Some(&b"ping"[..]));
    }

    #[tokio::test]
    async fn send_to_unbound_port_is_silent_drop() {
        let backend = LoopbackBackend::new();
        backend.send_datagram("127.0.0.1", 9999, b"x").await.unwrap();
    }

    #[tokio::test]
    async fn resolve_always_yields_loopback() {
        let backend = LoopbackBackend::new();
        let addrs = backend.resolve("anything").await.unwrap();
        assert_eq!(addrs, vec!["127.0.0.1".to_string()]);
    }
}
