//! The gateway control protocol and its `Backend` implementation.

pub mod auth;
pub mod backend;
pub mod protocol;

pub use backend::GatewayBackend;
pub use protocol::{decode_frame, encode_frame, Frame, MsgType};
