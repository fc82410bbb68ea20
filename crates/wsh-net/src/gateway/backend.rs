//! `GatewayBackend`: proxies TCP, UDP, listen and DNS operations through a
//! remote transport using the control protocol in `protocol.rs`.

use crate::backend::Backend;
use crate::error::{NetError, NetResult};
use crate::gateway::protocol::{decode_frame, encode_frame, Frame, MsgType};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};
use wsh_stream::{ByteStream, DatagramSocket, Listener, OperationQueue, StreamSocket};

const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(30);
const OP_QUEUE_MAX: usize = 256;
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);
const ACCEPT_QUEUE: usize = 128;

/// A deferred operation, queued while the transport has not yet completed
/// authentication.
enum GatewayOp {
    Connect { host: String, port: u16 },
    SendDatagram { host: String, port: u16, data: Vec<u8> },
    Listen { port: u16 },
    Resolve { name: String },
}

/// The settled result of a [`GatewayOp`].
enum GatewayOpResult {
    Socket(StreamSocket),
    Unit,
    Listener(Listener),
    Addresses(Vec<String>),
}

struct PendingUdp {
    tx: oneshot::Sender<NetResult<()>>,
    data: Vec<u8>,
}

struct Inner {
    transport: Arc<dyn ByteStream>,
    authenticated: AtomicBool,
    closed: AtomicBool,
    gateway_id_counter: AtomicU64,
    listener_id_counter: AtomicU64,
    operation_timeout: Duration,
    pending_tcp: DashMap<u64, oneshot::Sender<NetResult<StreamSocket>>>,
    pending_udp: DashMap<u64, PendingUdp>,
    pending_listen: DashMap<u64, oneshot::Sender<NetResult<Listener>>>,
    pending_dns: DashMap<u64, oneshot::Sender<NetResult<Vec<String>>>>,
    active_sockets: DashMap<u64, StreamSocket>,
    active_listeners: DashMap<u64, Listener>,
    queue: OperationQueue<GatewayOp, GatewayOpResult, NetError>,
}

/// A control-protocol client backend, proxying connection, datagram, listen
/// and DNS operations over a single external transport.
pub struct GatewayBackend {
    inner: Arc<Inner>,
}

impl GatewayBackend {
    /// Wraps `transport` with the default 30s operation timeout (0 disables
    /// it) and starts the background frame reader.
    pub fn new(transport: Arc<dyn ByteStream>) -> Self {
        Self::with_timeout(transport, DEFAULT_OPERATION_TIMEOUT)
    }

    /// As [`GatewayBackend::new`], with an explicit per-operation timeout.
    pub fn with_timeout(transport: Arc<dyn ByteStream>, operation_timeout: Duration) -> Self {
        let inner = Arc::new(Inner {
            transport,
            authenticated: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            gateway_id_counter: AtomicU64::new(1),
            listener_id_counter: AtomicU64::new(1),
            operation_timeout,
            pending_tcp: DashMap::new(),
            pending_udp: DashMap::new(),
            pending_listen: DashMap::new(),
            pending_dns: DashMap::new(),
            active_sockets: DashMap::new(),
            active_listeners: DashMap::new(),
            queue: OperationQueue::new(OP_QUEUE_MAX, DRAIN_TIMEOUT),
        });
        let reader_inner = inner.clone();
        tokio::spawn(async move { Inner::reader_loop(reader_inner).await });
        Self { inner }
    }

    /// Marks the transport authenticated and drains any operations queued
    /// while it was not.
    pub async fn mark_authenticated(&self) {
        self.inner.authenticated.store(true, Ordering::SeqCst);
        let inner = &self.inner;
        inner
            .queue
            .drain(|op| async move { inner.execute(op).await })
            .await;
    }

    /// `true` once the transport has completed authentication.
    pub fn is_authenticated(&self) -> bool {
        self.inner.authenticated.load(Ordering::SeqCst)
    }
}

impl Inner {
    fn next_gateway_id(&self) -> u64 {
        self.gateway_id_counter.fetch_add(1, Ordering::SeqCst)
    }

    fn next_listener_id(&self) -> u64 {
        self.listener_id_counter.fetch_add(1, Ordering::SeqCst)
    }

    fn send(&self, frame: Frame) -> NetResult<()> {
        let encoded = encode_frame(&frame)?;
        self.transport.write(encoded).map_err(NetError::from)
    }

    /// Registers a pending entry for `id` in `map`, then sends `frame`. The
    /// entry is visible to the reader loop before the frame leaves the
    /// transport, so a same-task synchronous reply can never race ahead of
    /// the registration.
    async fn park<T: Send + 'static>(
        &self,
        map: &DashMap<u64, oneshot::Sender<NetResult<T>>>,
        id: u64,
        frame: Frame,
    ) -> NetResult<T> {
        let (tx, rx) = oneshot::channel();
        map.insert(id, tx);
        if let Err(e) = self.send(frame) {
            map.remove(&id);
            return Err(e);
        }
        if self.operation_timeout.is_zero() {
            return rx.await.map_err(|_| NetError::Closed("gateway backend closed".into()))?;
        }
        match tokio::time::timeout(self.operation_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(NetError::Closed("gateway backend closed".into())),
            Err(_) => {
                map.remove(&id);
                Err(NetError::TimedOut)
            }
        }
    }

    async fn execute(&self, op: GatewayOp) -> NetResult<GatewayOpResult> {
        match op {
            GatewayOp::Connect { host, port } => {
                let id = self.next_gateway_id();
                let frame = Frame::new(MsgType::OpenTcp).with_u64("gateway_id", id).with_str("host", host).with_u64("port", port as u64);
                let socket = self.park(&self.pending_tcp, id, frame).await?;
                Ok(GatewayOpResult::Socket(socket))
            }
            GatewayOp::SendDatagram { host, port, data } => {
                let id = self.next_gateway_id();
                let (tx, rx) = oneshot::channel();
                self.pending_udp.insert(id, PendingUdp { tx, data });
                let frame = Frame::new(MsgType::OpenUdp).with_u64("gateway_id", id).with_str("host", host).with_u64("port", port as u64);
                if let Err(e) = self.send(frame) {
                    self.pending_udp.remove(&id);
                    return Err(e);
                }
                let result = if self.operation_timeout.is_zero() {
                    rx.await.map_err(|_| NetError::Closed("gateway backend closed".into()))?
                } else {
                    match tokio::time::timeout(self.operation_timeout, rx).await {
                        Ok(Ok(result)) => result,
                        Ok(Err(_)) => Err(NetError::Closed("gateway backend closed".into())),
                        Err(_) => {
                            self.pending_udp.remove(&id);
                            Err(NetError::TimedOut)
                        }
                    }
                };
                result.map(|_| GatewayOpResult::Unit)
            }
            GatewayOp::Listen { port } => {
                let id = self.next_listener_id();
                let frame = Frame::new(MsgType::ListenRequest).with_u64("listener_id", id).with_u64("port", port as u64).with_str("bind_addr", "0.0.0.0");
                let listener = self.park(&self.pending_listen, id, frame).await?;
                Ok(GatewayOpResult::Listener(listener))
            }
            GatewayOp::Resolve { name } => {
                let id = self.next_gateway_id();
                let frame = Frame::new(MsgType::ResolveDns).with_u64("gateway_id", id).with_str("name", name).with_str("record_type", "A");
                let addresses = self.park(&self.pending_dns, id, frame).await?;
                Ok(GatewayOpResult::Addresses(addresses))
            }
        }
    }

    /// Spawns the background task that pumps bytes the local user wrote
    /// into `relay` out to the transport as `GATEWAY_DATA`, terminating on
    /// relay EOF or a transport write failure.
    fn spawn_outbound_pump(self: &Arc<Self>, gateway_id: u64, relay: StreamSocket) {
        let inner = self.clone();
        tokio::spawn(async move {
            loop {
                match relay.read().await {
                    None => {
                        let _ = inner.send(Frame::new(MsgType::GatewayClose).with_u64("gateway_id", gateway_id));
                        break;
                    }
                    Some(chunk) => {
                        let frame = Frame::new(MsgType::GatewayData).with_u64("gateway_id", gateway_id).with_bytes("data", chunk.to_vec());
                        if inner.send(frame).is_err() {
                            relay.close().await;
                            break;
                        }
                    }
                }
            }
        });
    }

    async fn handle_frame(self: &Arc<Self>, frame: Frame) {
        let msg_type = match frame.msg_type() {
            Ok(t) => t,
            Err(e) => {
                warn!(error = %e, "dropping malformed gateway control frame");
                return;
            }
        };
        match msg_type {
            MsgType::GatewayOk => {
                let id = frame.get_u64("gateway_id").unwrap_or(0);
                if let Some((_, tx)) = self.pending_tcp.remove(&id) {
                    let (client, relay) = StreamSocket::create_pair(wsh_stream::DEFAULT_HIGH_WATER_MARK);
                    self.active_sockets.insert(id, relay.clone());
                    self.spawn_outbound_pump(id, relay);
                    let _ = tx.send(Ok(client));
                } else if let Some((_, pending)) = self.pending_udp.remove(&id) {
                    let _ = self.send(Frame::new(MsgType::GatewayData).with_u64("gateway_id", id).with_bytes("data", pending.data));
                    let _ = self.send(Frame::new(MsgType::GatewayClose).with_u64("gateway_id", id));
                    let _ = pending.tx.send(Ok(()));
                }
            }
            MsgType::GatewayFail => {
                let id = frame.get_u64("gateway_id").unwrap_or(0);
                let message = frame.get_str("message").unwrap_or("gateway operation failed").to_string();
                if let Some((_, tx)) = self.pending_tcp.remove(&id) {
                    let _ = tx.send(Err(NetError::ConnRefused(message)));
                } else if let Some((_, pending)) = self.pending_udp.remove(&id) {
                    let _ = pending.tx.send(Err(NetError::ConnRefused(message)));
                } else if let Some((_, tx)) = self.pending_dns.remove(&id) {
                    let _ = tx.send(Err(NetError::ConnRefused(message)));
                }
            }
            MsgType::GatewayClose => {
                let id = frame.get_u64("gateway_id").unwrap_or(0);
                if let Some((_, socket)) = self.active_sockets.remove(&id) {
                    socket.close().await;
                }
            }
            MsgType::GatewayData => {
                let id = frame.get_u64("gateway_id").unwrap_or(0);
                if let Some(socket) = self.active_sockets.get(&id) {
                    if let Some(data) = frame.get_bytes("data") {
                        let _ = socket.write(bytes::Bytes::copy_from_slice(data));
                    }
                }
            }
            MsgType::InboundOpen => {
                let listener_id = frame.get_u64("listener_id").unwrap_or(0);
                let channel_id = frame.get_u64("channel_id").unwrap_or(0);
                let listener = self.active_listeners.get(&listener_id).map(|l| l.clone());
                match listener {
                    Some(listener) if !listener.is_closed() => {
                        let gateway_id = self.next_gateway_id();
                        let (user_side, relay) = StreamSocket::create_pair(wsh_stream::DEFAULT_HIGH_WATER_MARK);
                        self.active_sockets.insert(gateway_id, relay.clone());
                        self.spawn_outbound_pump(gateway_id, relay);
                        listener.enqueue(user_side);
                        let _ = self.send(Frame::new(MsgType::InboundAccept).with_u64("channel_id", channel_id).with_u64("gateway_id", gateway_id));
                    }
                    _ => {
                        let _ = self.send(Frame::new(MsgType::InboundReject).with_u64("channel_id", channel_id).with_str("reason", "no such listener"));
                    }
                }
            }
            MsgType::DnsResult => {
                let id = frame.get_u64("gateway_id").unwrap_or(0);
                if let Some((_, tx)) = self.pending_dns.remove(&id) {
                    let _ = tx.send(Ok(frame.get_str_list("addresses")));
                }
            }
            MsgType::ListenOk => {
                let id = frame.get_u64("listener_id").unwrap_or(0);
                let actual_port = frame.get_u64("actual_port").unwrap_or(0) as u16;
                if let Some((_, tx)) = self.pending_listen.remove(&id) {
                    let listener = Listener::new(actual_port, ACCEPT_QUEUE, None);
                    self.active_listeners.insert(id, listener.clone());
                    let _ = tx.send(Ok(listener));
                }
            }
            MsgType::ListenFail => {
                let id = frame.get_u64("listener_id").unwrap_or(0);
                let reason = frame.get_str("reason").unwrap_or("listen failed").to_string();
                if let Some((_, tx)) = self.pending_listen.remove(&id) {
                    let _ = tx.send(Err(NetError::ListenFailed(reason)));
                }
            }
            MsgType::ListenClose => {
                let id = frame.get_u64("listener_id").unwrap_or(0);
                if let Some((_, listener)) = self.active_listeners.remove(&id) {
                    listener.close();
                }
            }
            // Outbound-only codes never arrive inbound; ignore defensively.
            MsgType::OpenTcp | MsgType::OpenUdp | MsgType::ResolveDns | MsgType::ListenRequest | MsgType::InboundAccept | MsgType::InboundReject => {
                debug!(?msg_type, "ignoring outbound-only control code received inbound");
            }
        }
    }

    async fn reader_loop(self: Arc<Self>) {
        loop {
            match self.transport.read().await {
                None => {
                    self.close_internal().await;
                    return;
                }
                Some(chunk) => match decode_frame(&chunk) {
                    Ok(frame) => self.handle_frame(frame).await,
                    Err(e) => warn!(error = %e, "dropping undecodable gateway frame"),
                },
            }
        }
    }

    async fn close_internal(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.queue.clear();
        // oneshot senders are not `Clone`; drain each map by owned removal.
        let tcp: Vec<_> = self.pending_tcp.iter().map(|e| *e.key()).collect();
        for id in tcp {
            if let Some((_, tx)) = self.pending_tcp.remove(&id) {
                let _ = tx.send(Err(NetError::Closed("gateway backend closed".into())));
            }
        }
        let udp: Vec<_> = self.pending_udp.iter().map(|e| *e.key()).collect();
        for id in udp {
            if let Some((_, pending)) = self.pending_udp.remove(&id) {
                let _ = pending.tx.send(Err(NetError::Closed("gateway backend closed".into())));
            }
        }
        let listens: Vec<_> = self.pending_listen.iter().map(|e| *e.key()).collect();
        for id in listens {
            if let Some((_, tx)) = self.pending_listen.remove(&id) {
                let _ = tx.send(Err(NetError::Closed("gateway backend closed".into())));
            }
        }
        let dns: Vec<_> = self.pending_dns.iter().map(|e| *e.key()).collect();
        for id in dns {
            if let Some((_, tx)) = self.pending_dns.remove(&id) {
                let _ = tx.send(Err(NetError::Closed("gateway backend closed".into())));
            }
        }
        for entry in self.active_sockets.iter() {
            entry.value().close().await;
        }
        self.active_sockets.clear();
        for entry in self.active_listeners.iter() {
            entry.value().close();
        }
        self.active_listeners.clear();
    }
}

#[async_trait]
impl Backend for GatewayBackend {
    async fn connect(&self, host: &str, port: u16) -> NetResult<StreamSocket> {
        let op = GatewayOp::Connect { host: host.to_string(), port };
        let result = if self.inner.authenticated.load(Ordering::SeqCst) {
            self.inner.execute(op).await
        } else {
            let rx = self.inner.queue.enqueue(op)?;
            rx.await.map_err(|_| NetError::Closed("gateway backend closed".into()))?
        }?;
        match result {
            GatewayOpResult::Socket(s) => Ok(s),
            _ => unreachable!("connect always resolves to a socket"),
        }
    }

    async fn listen(&self, port: u16) -> NetResult<Listener> {
        let op = GatewayOp::Listen { port };
        let result = if self.inner.authenticated.load(Ordering::SeqCst) {
            self.inner.execute(op).await
        } else {
            let rx = self.inner.queue.enqueue(op)?;
            rx.await.map_err(|_| NetError::Closed("gateway backend closed".into()))?
        }?;
        match result {
            GatewayOpResult::Listener(l) => Ok(l),
            _ => unreachable!("listen always resolves to a listener"),
        }
    }

    async fn send_datagram(&self, host: &str, port: u16, data: &[u8]) -> NetResult<()> {
        let op = GatewayOp::SendDatagram { host: host.to_string(), port, data: data.to_vec() };
        let result = if self.inner.authenticated.load(Ordering::SeqCst) {
            self.inner.execute(op).await
        } else {
            let rx = self.inner.queue.enqueue(op)?;
            rx.await.map_err(|_| NetError::Closed("gateway backend closed".into()))?
        }?;
        match result {
            GatewayOpResult::Unit => Ok(()),
            _ => unreachable!("send_datagram always resolves to unit"),
        }
    }

    async fn bind_datagram(&self, _port: u16) -> NetResult<DatagramSocket> {
        Err(NetError::ListenFailed("gateway backend does not support bind_datagram".into()))
    }

    async fn resolve(&self, name: &str) -> NetResult<Vec<String>> {
        let op = GatewayOp::Resolve { name: name.to_string() };
        let result = if self.inner.authenticated.load(Ordering::SeqCst) {
            self.inner.execute(op).await
        } else {
            let rx = self.inner.queue.enqueue(op)?;
            rx.await.map_err(|_| NetError::Closed("gateway backend closed".into()))?
        }?;
        match result {
            GatewayOpResult::Addresses(a) => Ok(a),
            _ => unreachable!("resolve always resolves to an address list"),
        }
    }

    async fn close(&self) {
        self.inner.close_internal().await;
    }
}

impl std::fmt::Debug for GatewayBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayBackend")
            .field("authenticated", &self.is_authenticated())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::protocol::{decode_frame, Frame, MsgType};
    use bytes::Bytes;
    use wsh_stream::StreamSocket as WireSocket;

    fn wire_pair() -> (Arc<dyn ByteStream>, WireSocket) {
        let (backend_side, test_side) = WireSocket::create_pair(wsh_stream::DEFAULT_HIGH_WATER_MARK);
        (Arc::new(backend_side), test_side)
    }

    #[tokio::test]
    async fn connect_resolves_on_gateway_ok() {
        let (transport, wire) = wire_pair();
        let backend = GatewayBackend::with_timeout(transport, Duration::from_secs(5));
        backend.mark_authenticated().await;

        let connect = tokio::spawn({
            let backend = Arc::new(backend);
            let b = backend.clone();
            async move { (b.connect("example.com", 80).await, b) }
        });
        tokio::task::yield_now().await;
        let sent = wire.read().await.unwrap();
        let frame = decode_frame(&sent).unwrap();
        assert_eq!(frame.msg_type().unwrap() as u8, MsgType::OpenTcp as u8);
        let gateway_id = frame.get_u64("gateway_id").unwrap();

        let reply = Frame::new(MsgType::GatewayOk).with_u64("gateway_id", gateway_id);
        wire.write(encode_frame(&reply).unwrap()).unwrap();

        let (result, _backend) = connect.await.unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn connect_rejects_on_gateway_fail() {
        let (transport, wire) = wire_pair();
        let backend = GatewayBackend::with_timeout(transport, Duration::from_secs(5));
        backend.mark_authenticated().await;

        let connect = tokio::spawn(async move { backend.connect("example.com", 80).await });
        tokio::task::yield_now().await;
        let sent = wire.read().await.unwrap();
        let frame = decode_frame(&sent).unwrap();
        let gateway_id = frame.get_u64("gateway_id").unwrap();

        let reply = Frame::new(MsgType::GatewayFail).with_u64("gateway_id", gateway_id).with_str("message", "refused");
        wire.write(encode_frame(&reply).unwrap()).unwrap();

        let err = connect.await.unwrap().unwrap_err();
        assert_eq!(err.code(), "ECONNREFUSED");
    }

    #[tokio::test]
    async fn resolve_rejects_promptly_on_gateway_fail() {
        let (transport, wire) = wire_pair();
        let backend = GatewayBackend::with_timeout(transport, Duration::from_secs(5));
        backend.mark_authenticated().await;

        let resolve = tokio::spawn(async move { backend.resolve("example.com").await });
        tokio::task::yield_now().await;
        let sent = wire.read().await.unwrap();
        let frame = decode_frame(&sent).unwrap();
        assert_eq!(frame.msg_type().unwrap() as u8, MsgType::ResolveDns as u8);
        let gateway_id = frame.get_u64("gateway_id").unwrap();

        let reply = Frame::new(MsgType::GatewayFail).with_u64("gateway_id", gateway_id).with_str("message", "no such host");
        wire.write(encode_frame(&reply).unwrap()).unwrap();

        let err = resolve.await.unwrap().unwrap_err();
        assert_eq!(err.code(), "ECONNREFUSED");
    }

    #[tokio::test]
    async fn connect_times_out_when_transport_never_responds() {
        let (transport, _wire) = wire_pair();
        let backend = GatewayBackend::with_timeout(transport, Duration::from_millis(50));
        backend.mark_authenticated().await;
        let err = backend.connect("example.com", 80).await.unwrap_err();
        assert_eq!(err.code(), "ETIMEDOUT");
    }

    #[tokio::test]
    async fn unauthenticated_operations_queue_until_drained() {
        let (transport, wire) = wire_pair();
        let backend = Arc::new(GatewayBackend::with_timeout(transport, Duration::from_secs(5)));
        let b = backend.clone();
        let connect = tokio::spawn(async move { b.connect("example.com", 80).await });
        // Give the enqueue a moment; no control frame should be sent yet.
        tokio::time::sleep(Duration::from_millis(20)).await;

        backend.mark_authenticated().await;
        tokio::task::yield_now().await;
        let sent = wire.read().await.unwrap();
        let frame = decode_frame(&sent).unwrap();
        let gateway_id = frame.get_u64("gateway_id").unwrap();
        let reply = Frame::new(MsgType::GatewayOk).with_u64("gateway_id", gateway_id);
        wire.write(encode_frame(&reply).unwrap()).unwrap();

        assert!(connect.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn close_rejects_pending_operations() {
        let (transport, _wire) = wire_pair();
        let backend = Arc::new(GatewayBackend::with_timeout(transport, Duration::from_secs(5)));
        backend.mark_authenticated().await;
        let b = backend.clone();
        let connect = tokio::spawn(async move { b.connect("example.com", 80).await });
        tokio::task::yield_now().await;
        backend.close().await;
        let err = connect.await.unwrap().unwrap_err();
        assert_eq!(err.code(), "ECLOSED");
    }

    #[tokio::test]
    async fn datagram_data_round_trips_after_open() {
        let (transport, wire) = wire_pair();
        let backend = GatewayBackend::with_timeout(transport, Duration::from_secs(5));
        backend.mark_authenticated().await;

        let send = tokio::spawn(async move { backend.send_datagram("example.com", 53, b"ping").await });
        tokio::task::yield_now().await;
        let open_frame = decode_frame(&wire.read().await.unwrap()).unwrap();
        assert_eq!(open_frame.msg_type().unwrap() as u8, MsgType::OpenUdp as u8);
        let gateway_id = open_frame.get_u64("gateway_id").unwrap();

        wire.write(encode_frame(&Frame::new(MsgType::GatewayOk).with_u64("gateway_id", gateway_id)).unwrap())
            .unwrap();

        let data_frame = decode_frame(&wire.read().await.unwrap()).unwrap();
        assert_eq!(data_frame.msg_type().unwrap() as u8, MsgType::GatewayData as u8);
        assert_eq!(data_frame.get_bytes("data"), Some(&b"ping"[..]));
        let _close_frame = wire.read().await.unwrap();

        assert!(send.await.unwrap().is_ok());
    }
}
