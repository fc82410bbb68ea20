//! Bidirectional reliable socket over a pair of [`AsyncBuffer`]s.

use crate::buffer::AsyncBuffer;
use crate::byte_stream::ByteStream;
use crate::error::StreamResult;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

/// Default high-water mark for stream sockets.
pub const DEFAULT_HIGH_WATER_MARK: usize = 1024;

/// One end of a paired, bidirectional, reliable byte socket.
#[derive(Clone)]
pub struct StreamSocket {
    inbound: Arc<AsyncBuffer>,
    outbound: Arc<AsyncBuffer>,
}

impl std::fmt::Debug for StreamSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSocket").finish_non_exhaustive()
    }
}

impl StreamSocket {
    /// Allocates two [`AsyncBuffer`]s and returns the two symmetric ends of
    /// a paired socket.
    pub fn create_pair(high_water_mark: usize) -> (StreamSocket, StreamSocket) {
        let a = Arc::new(AsyncBuffer::new(high_water_mark));
        let b = Arc::new(AsyncBuffer::new(high_water_mark));
        (
            StreamSocket {
                inbound: b.clone(),
                outbound: a.clone(),
            },
            StreamSocket {
                inbound: a,
                outbound: b,
            },
        )
    }

    /// Builds a socket end directly from a pair of buffers, used by backends
    /// (e.g. the gateway relay) that need to hand out one end while keeping
    /// the other for internal plumbing.
    pub fn from_buffers(inbound: Arc<AsyncBuffer>, outbound: Arc<AsyncBuffer>) -> Self {
        Self { inbound, outbound }
    }

    /// The inbound buffer, exposed for backends that pump data into it
    /// directly (bypassing the `ByteStream::write` contract).
    pub fn inbound_buffer(&self) -> &Arc<AsyncBuffer> {
        &self.inbound
    }

    /// The outbound buffer, exposed for backends that read pumped data out
    /// directly.
    pub fn outbound_buffer(&self) -> &Arc<AsyncBuffer> {
        &self.outbound
    }
}

#[async_trait]
impl ByteStream for StreamSocket {
    fn protocol(&self) -> &'static str {
        "stream-socket"
    }

    async fn read(&self) -> Option<Bytes> {
        self.inbound.read().await
    }

    fn write(&self, chunk: Bytes) -> StreamResult<()> {
        self.outbound.write(chunk)
    }

    async fn close(&self) {
        self.inbound.close_read();
        self.inbound.close_write();
        self.outbound.close_read();
        self.outbound.close_write();
    }

    fn is_closed(&self) -> bool {
        self.outbound.is_write_closed() && self.inbound.is_read_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn loopback_echo() {
        let (client, server) = StreamSocket::create_pair(DEFAULT_HIGH_WATER_MARK);
        client.write(Bytes::from_static(&[0xDE, 0xAD, 0xBE, 0xEF])).unwrap();
        let received = server.read().await.unwrap();
        server.write(received.clone()).unwrap();
        let echoed = client.read().await.unwrap();
        assert_eq!(echoed, Bytes::from_static(&[0xDE, 0xAD, 0xBE, 0xEF]));
    }

    #[tokio::test]
    async fn close_is_idempotent_and_closes_both_ends() {
        let (client, server) = StreamSocket::create_pair(DEFAULT_HIGH_WATER_MARK);
        client.close().await;
        client.close().await;
        assert!(server.read().await.is_none());
        assert!(server.write(Bytes::from_static(b"x")).is_err());
    }
}
