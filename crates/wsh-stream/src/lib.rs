//! Byte streams, sockets, listeners, message ports and operation queues for
//! the wsh microkernel's IPC layer. See the workspace `SPEC_FULL.md`.

pub mod buffer;
pub mod byte_stream;
pub mod datagram;
pub mod error;
pub mod listener;
pub mod message_port;
pub mod op_queue;
pub mod service_registry;
pub mod socket;

pub use buffer::AsyncBuffer;
pub use byte_stream::{compose, create_pipe, pipe, ByteStream, Composed, DevNull, PipeReader, PipeWriter, Transform};
pub use datagram::DatagramSocket;
pub use error::{StreamError, StreamResult};
pub use listener::Listener;
pub use message_port::MessagePort;
pub use op_queue::OperationQueue;
pub use service_registry::{ServiceEntry, ServiceListener, ServiceRegistry};
pub use socket::{StreamSocket, DEFAULT_HIGH_WATER_MARK};
