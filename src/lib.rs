//! # Bakelite — schema compiler for embedded communication protocols
//!
//! Bakelite compiles a small protocol definition language (messages,
//! enums, a protocol block) into per-target codec and framing code, and
//! ships a host runtime that is the byte-exact reference for the wire
//! format the generated targets speak.
//!
//! ## Pipeline
//!
//! - [`parser`]: `.bakelite` source to AST (PEST grammar).
//! - [`sema`]: name resolution, invariant checks, size calculation; the
//!   frozen [`Schema`] feeds everything downstream.
//! - [`codec`]: schema-driven pack/unpack of [`Value`] trees on the host.
//! - [`runtime`]: byte stream, COBS, CRC, framer and protocol endpoint.
//! - [`gen`]: backends rendering the generated artifacts for `python`,
//!   `ctiny` (C99, heap-free) and `cpptiny` (C++, heap-free).
//!
//! ## Wire format
//!
//! One frame is `COBS(message_id ‖ payload ‖ crc)` followed by a single
//! `0x00` terminator. Primitives are little-endian; `bytes[N]` and arrays
//! are length-prefixed with one byte; strings are null-terminated.
//!
//! ## Example
//!
//! ```
//! use bakelite::{analyze, parse};
//!
//! let schema = analyze(parse("
//! struct Ping {
//!     seq: uint32
//! }
//! protocol {
//!     framing = cobs
//!     crc = CRC8
//!     messageIds {
//!         Ping = 1
//!     }
//! }
//! ").unwrap()).unwrap();
//!
//! assert_eq!(schema.message_id("Ping"), Some(1));
//! ```

pub mod ast;
pub mod codec;
pub mod gen;
pub mod parser;
pub mod runtime;
pub mod sema;
pub mod sizes;
pub mod value;

pub use ast::Definitions;
pub use codec::{Codec, CodecError};
pub use parser::parse;
pub use runtime::{CrcKind, Endpoint, FrameEvent, Framer, Poll};
pub use sema::{analyze, Schema, SemaError};
pub use value::Value;
