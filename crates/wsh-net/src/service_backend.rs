//! `svc://` backend: dispatches through a [`ServiceRegistry`].

use crate::backend::Backend;
use crate::error::{NetError, NetResult};
use async_trait::async_trait;
use std::sync::Arc;
use wsh_stream::{DatagramSocket, Listener, ServiceListener, ServiceRegistry, StreamSocket};

/// Routes `connect` through a shared [`ServiceRegistry`] by name (the host
/// part of the address). `listen`, `send_datagram`, `bind_datagram` and
/// `resolve` have no meaning for named services and fail accordingly.
pub struct ServiceBackend {
    registry: Arc<ServiceRegistry>,
}

impl ServiceBackend {
    /// Creates a backend dispatching through `registry`.
    pub fn new(registry: Arc<ServiceRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Backend for ServiceBackend {
    async fn connect(&self, host: &str, _port: u16) -> NetResult<StreamSocket> {
        let entry = self
            .registry
            .lookup(host)
            .ok_or_else(|| NetError::ConnRefused(format!("no service named '{host}'")))?;
        let (client, server) = StreamSocket::create_pair(wsh_stream::DEFAULT_HIGH_WATER_MARK);
        match &entry.listener {
            // `handle_connection` is preferred when an entry exposes both
            // styles; handle_connection is preferred when both are present.
            ServiceListener::HandleConnection(handler) => {
                handler(server);
                Ok(client)
            }
            ServiceListener::Enqueue(enqueue) => {
                enqueue(server);
                Ok(client)
            }
        }
    }

    async fn listen(&self, _port: u16) -> NetResult<Listener> {
        Err(NetError::ListenFailed("svc:// backend does not support listen".into()))
    }

    async fn send_datagram(&self, _host: &str, _port: u16, _data: &[u8]) -> NetResult<()> {
        Err(NetError::ConnRefused("svc:// backend does not support datagrams".into()))
    }

    async fn bind_datagram(&self, _port: u16) -> NetResult<DatagramSocket> {
        Err(NetError::ConnRefused("svc:// backend does not support datagrams".into()))
    }

    async fn resolve(&self, _name: &str) -> NetResult<Vec<String>> {
        Ok(Vec::new())
    }

    async fn close(&self) {}
}

impl std::fmt::Debug for ServiceBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceBackend").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use wsh_stream::ByteStream;

    #[tokio::test]
    async fn connect_prefers_handle_connection_over_enqueue() {
        let registry = Arc::new(ServiceRegistry::new());
        registry
            .register(
                "echo",
                ServiceListener::HandleConnection(Arc::new(|socket| {
                    tokio::spawn(async move {
                        if let Some(chunk) = socket.read().await {
                            let _ = socket.write(chunk);
                        }
                    });
                })),
                serde_json::Value::Null,
                None,
            )
            .unwrap();
        let backend = ServiceBackend::new(registry);
        let client = backend.connect("echo", 0).await.unwrap();
        client.write(Bytes::from_static(b"hi")).unwrap();
        let echoed = client.read().await.unwrap();
        assert_eq!(echoed, Bytes::from_static(b"hi"));
    }

    #[tokio::test]
    async fn missing_service_is_connection_refused() {
        let registry = Arc::new(ServiceRegistry::new());
        let backend = ServiceBackend::new(registry);
        let err = backend.connect("nope", 0).await.unwrap_err();
        assert_eq!(err.code(), "ECONNREFUSED");
    }
}
