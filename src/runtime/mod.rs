//! Runtime support: the byte-stream buffer, COBS codec, CRC engine, framer
//! and protocol endpoint. These are the host-side reference for the wire
//! behavior every generated target must match byte for byte.

pub mod cobs;
pub mod crc;
pub mod endpoint;
pub mod framer;
pub mod stream;

pub use crc::CrcKind;
pub use endpoint::{Endpoint, EndpointError, Poll};
pub use framer::{FrameEvent, Framer, FramerError};
pub use stream::{Buffer, WireError};
