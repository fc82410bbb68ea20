//! stdin/stdout/stderr as `ByteStream`s, bundled as a per-tenant `Stdio`
//! object.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use wsh_stream::{create_pipe, AsyncBuffer, ByteStream, DevNull, PipeReader, PipeWriter, StreamError, StreamResult};

const STDIN_READ_CHUNK: usize = 4096;

/// Process stdin, pumped by a background task into an internal buffer so
/// reads are a plain async pull like every other [`ByteStream`].
pub struct Stdin {
    buffer: Arc<AsyncBuffer>,
}

impl Stdin {
    /// Spawns the background reader and returns the stream over it.
    pub fn new(high_water_mark: usize) -> Self {
        let buffer = Arc::new(AsyncBuffer::new(high_water_mark));
        let pump = buffer.clone();
        tokio::spawn(async move {
            let mut stdin = tokio::io::stdin();
            let mut chunk = vec![0u8; STDIN_READ_CHUNK];
            loop {
                match stdin.read(&mut chunk).await {
                    Ok(0) | Err(_) => {
                        pump.close_write();
                        return;
                    }
                    Ok(n) => {
                        if pump.write(Bytes::copy_from_slice(&chunk[..n])).is_err() {
                            return;
                        }
                    }
                }
            }
        });
        Self { buffer }
    }
}

#[async_trait]
impl ByteStream for Stdin {
    fn protocol(&self) -> &'static str {
        "stdin"
    }

    async fn read(&self) -> Option<Bytes> {
        self.buffer.read().await
    }

    fn write(&self, _chunk: Bytes) -> StreamResult<()> {
        Err(StreamError::Closed("stdin is read-only".into()))
    }

    async fn close(&self) {
        self.buffer.close_read();
    }

    fn is_closed(&self) -> bool {
        self.buffer.is_read_closed()
    }
}

/// A write-only process stream (stdout or stderr), pumped by a background
/// task that owns the real sink so the synchronous [`ByteStream::write`]
/// only has to enqueue.
pub struct WriteStream {
    name: &'static str,
    outbox: mpsc::UnboundedSender<Bytes>,
    closed: AtomicBool,
}

impl WriteStream {
    fn new(name: &'static str, mut sink: Box<dyn tokio::io::AsyncWrite + Send + Unpin>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Bytes>();
        tokio::spawn(async move {
            while let Some(chunk) = rx.recv().await {
                if sink.write_all(&chunk).await.is_err() {
                    break;
                }
                let _ = sink.flush().await;
            }
        });
        Self {
            name,
            outbox: tx,
            closed: AtomicBool::new(false),
        }
    }

    /// Wraps real process stdout.
    pub fn stdout() -> Self {
        Self::new("stdout", Box::new(tokio::io::stdout()))
    }

    /// Wraps real process stderr.
    pub fn stderr() -> Self {
        Self::new("stderr", Box::new(tokio::io::stderr()))
    }
}

#[async_trait]
impl ByteStream for WriteStream {
    fn protocol(&self) -> &'static str {
        self.name
    }

    async fn read(&self) -> Option<Bytes> {
        None
    }

    fn write(&self, chunk: Bytes) -> StreamResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StreamError::Closed(format!("{} is closed", self.name)));
        }
        let _ = self.outbox.send(chunk);
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// The three standard streams handed to a tenant at creation.
pub struct Stdio {
    /// stdin, read-only.
    pub stdin: Arc<dyn ByteStream>,
    /// stdout, write-only.
    pub stdout: Arc<dyn ByteStream>,
    /// stderr, write-only.
    pub stderr: Arc<dyn ByteStream>,
}

impl Stdio {
    /// Builds a `Stdio` backed by the real process streams.
    pub fn process(high_water_mark: usize) -> Self {
        Self {
            stdin: Arc::new(Stdin::new(high_water_mark)),
            stdout: Arc::new(WriteStream::stdout()),
            stderr: Arc::new(WriteStream::stderr()),
        }
    }

    /// Builds a `Stdio` over in-memory pipes, for tests and non-process
    /// tenants that should never touch the real terminal. Returns the
    /// tenant-facing `Stdio` plus the harness-facing other ends: a writer
    /// to inject stdin and a reader to capture stdout.
    pub fn in_memory(high_water_mark: usize) -> (Self, PipeWriter, PipeReader) {
        let (tenant_stdin, harness_stdin) = create_pipe(high_water_mark);
        let (harness_stdout, tenant_stdout) = create_pipe(high_water_mark);
        (
            Self {
                stdin: Arc::new(tenant_stdin),
                stdout: Arc::new(tenant_stdout),
                stderr: Arc::new(DevNull),
            },
            harness_stdin,
            harness_stdout,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_stdio_round_trips() {
        let (stdio, harness_stdin, harness_stdout) = Stdio::in_memory(1024);
        harness_stdin.write(Bytes::from_static(b"hi")).unwrap();
        assert_eq!(stdio.stdin.read().await, Some(Bytes::from_static(b"hi")));
        stdio.stdout.write(Bytes::from_static(b"out")).unwrap();
        assert_eq!(
            harness_stdout.read().await,
            Some(Bytes::from_static(b"out"))
        );
    }

    #[tokio::test]
    async fn stdin_is_read_only() {
        let (stdio, _harness_stdin, _harness_stdout) = Stdio::in_memory(1024);
        let err = stdio.stdin.write(Bytes::from_static(b"x")).unwrap_err();
        assert_eq!(err.code(), "ESTREAMCLOSED");
    }
}
