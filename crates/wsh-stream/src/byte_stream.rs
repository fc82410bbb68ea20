//! The `ByteStream` protocol: anything supporting `read`, `write`, `close`
//! and a closed indicator, plus `pipe`, `dev_null` and `compose`.

use crate::buffer::AsyncBuffer;
use crate::error::StreamResult;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

/// The duck-typed byte-stream protocol, realized as a trait.
/// The protocol tag symbol of the source becomes trait identity plus
/// [`ByteStream::protocol`] for diagnostics.
#[async_trait]
pub trait ByteStream: Send + Sync {
    /// A short tag identifying the concrete stream kind, for diagnostics.
    fn protocol(&self) -> &'static str;

    /// Pulls the next chunk, or `None` at end of stream.
    async fn read(&self) -> Option<Bytes>;

    /// Pushes a chunk; fails with `ESTREAMCLOSED` if the stream rejects it.
    fn write(&self, chunk: Bytes) -> StreamResult<()>;

    /// Closes the stream. Idempotent.
    async fn close(&self);

    /// `true` once the stream is closed.
    fn is_closed(&self) -> bool;
}

/// The reader half of a `create_pipe` pair.
pub struct PipeReader(pub(crate) Arc<AsyncBuffer>);

#[async_trait]
impl ByteStream for PipeReader {
    fn protocol(&self) -> &'static str {
        "pipe-reader"
    }

    async fn read(&self) -> Option<Bytes> {
        self.0.read().await
    }

    fn write(&self, chunk: Bytes) -> StreamResult<()> {
        let _ = chunk;
        Err(crate::error::StreamError::Closed(
            "pipe reader is read-only".into(),
        ))
    }

    async fn close(&self) {
        self.0.close_read();
    }

    fn is_closed(&self) -> bool {
        self.0.is_read_closed()
    }
}

/// The writer half of a `create_pipe` pair.
pub struct PipeWriter(pub(crate) Arc<AsyncBuffer>);

#[async_trait]
impl ByteStream for PipeWriter {
    fn protocol(&self) -> &'static str {
        "pipe-writer"
    }

    async fn read(&self) -> Option<Bytes> {
        None
    }

    fn write(&self, chunk: Bytes) -> StreamResult<()> {
        self.0.write(chunk)
    }

    async fn close(&self) {
        self.0.close_write();
    }

    fn is_closed(&self) -> bool {
        self.0.is_write_closed()
    }
}

/// Creates a one-directional pipe: writes on the returned [`PipeWriter`]
/// become readable on the returned [`PipeReader`], in order.
pub fn create_pipe(high_water_mark: usize) -> (PipeReader, PipeWriter) {
    let buffer = Arc::new(AsyncBuffer::new(high_water_mark));
    (PipeReader(buffer.clone()), PipeWriter(buffer))
}

/// A byte stream that discards every write and always yields `None` on
/// read. Never closes.
pub struct DevNull;

#[async_trait]
impl ByteStream for DevNull {
    fn protocol(&self) -> &'static str {
        "dev-null"
    }

    async fn read(&self) -> Option<Bytes> {
        None
    }

    fn write(&self, _chunk: Bytes) -> StreamResult<()> {
        Ok(())
    }

    async fn close(&self) {}

    fn is_closed(&self) -> bool {
        false
    }
}

/// Reads `src` until EOF, writing every chunk to `dst`. On any write
/// failure, both endpoints are closed before the error is re-raised.
pub async fn pipe(src: &dyn ByteStream, dst: &dyn ByteStream) -> StreamResult<()> {
    loop {
        match src.read().await {
            None => return Ok(()),
            Some(chunk) => {
                if let Err(err) = dst.write(chunk) {
                    src.close().await;
                    dst.close().await;
                    return Err(err);
                }
            }
        }
    }
}

/// A reversible per-chunk transform used by [`compose`].
pub trait Transform: Send + Sync {
    /// Applied on the read path, in forward order across the transform list.
    fn transform(&self, chunk: Bytes) -> Bytes;

    /// Applied on the write path, in reverse order. Defaults to re-running
    /// `transform` when no dedicated inverse is supplied.
    fn untransform(&self, chunk: Bytes) -> Bytes {
        self.transform(chunk)
    }
}

/// A stream wrapping another stream with an ordered list of [`Transform`]s.
pub struct Composed {
    inner: Arc<dyn ByteStream>,
    transforms: Vec<Arc<dyn Transform>>,
}

#[async_trait]
impl ByteStream for Composed {
    fn protocol(&self) -> &'static str {
        "composed"
    }

    async fn read(&self) -> Option<Bytes> {
        let mut chunk = self.inner.read().await?;
        for t in &self.transforms {
            chunk = t.transform(chunk);
        }
        Some(chunk)
    }

    fn write(&self, chunk: Bytes) -> StreamResult<()> {
        let mut chunk = chunk;
        for t in self.transforms.iter().rev() {
            chunk = t.untransform(chunk);
        }
        self.inner.write(chunk)
    }

    async fn close(&self) {
        self.inner.close().await;
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

/// Wraps `stream` with `transforms` applied in order on read and in
/// reverse order (via `untransform`) on write.
pub fn compose(stream: Arc<dyn ByteStream>, transforms: Vec<Arc<dyn Transform>>) -> Composed {
    Composed {
        inner: stream,
        transforms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pipe_terminates_on_eof() {
        let (reader, writer) = create_pipe(1024);
        writer.write(Bytes::from_static(b"x")).unwrap();
        writer.close().await;
        let (dst_reader, dst_writer) = create_pipe(1024);
        pipe(&reader, &dst_writer).await.unwrap();
        assert_eq!(dst_reader.read().await.unwrap(), Bytes::from_static(b"x"));
    }

    #[tokio::test]
    async fn dev_null_accepts_writes_and_yields_none() {
        let dn = DevNull;
        assert!(dn.write(Bytes::from_static(b"anything")).is_ok());
        assert_eq!(dn.read().await, None);
    }

    struct Rot13;
    impl Transform for Rot13 {
        fn transform(&self, chunk: Bytes) -> Bytes {
            Bytes::from(chunk.iter().map(|b| b ^ 0xFF).collect::<Vec<u8>>())
        }
    }

    #[tokio::test]
    async fn compose_identity_with_no_transforms() {
        let (reader, writer) = create_pipe(1024);
        let composed_writer = compose(Arc::new(writer), vec![]);
        composed_writer.write(Bytes::from_static(b"same")).unwrap();
        assert_eq!(reader.read().await.unwrap(), Bytes::from_static(b"same"));
    }

    #[tokio::test]
    async fn compose_applies_transform_and_untransform() {
        let (reader, writer) = create_pipe(1024);
        let composed_reader: Arc<dyn ByteStream> = Arc::new(reader);
        let composed_reader = compose(composed_reader, vec![Arc::new(Rot13)]);
        writer.write(Bytes::from_static(b"hi")).unwrap();
        let out = composed_reader.read().await.unwrap();
        assert_eq!(out, Bytes::from(vec![b'h' ^ 0xFF, b'i' ^ 0xFF]));
    }
}
