//! Host-side protocol endpoint: framed send and receive with message-id
//! dispatch.
//!
//! The endpoint owns a [`Framer`] sized from the schema's protocol block
//! and a [`Codec`] for the payloads. All I/O happens through caller
//! callbacks: the read callback returns one byte or `None` for "no data",
//! the write callback reports how many bytes it accepted. Nothing here
//! blocks, and a failed send or a bad frame leaves the endpoint usable.

use std::collections::HashMap;

use crate::codec::{Codec, CodecError};
use crate::sema::Framing;
use crate::value::Value;

use super::framer::{FrameEvent, Framer, FramerError};
use super::stream::Buffer;

#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    #[error("schema has no protocol block")]
    NoProtocol,
    #[error("protocol framing is not cobs")]
    NoFraming,
    #[error("{0} has no message id")]
    NotAMessage(String),
    #[error("received message is not {0}")]
    WrongMessage(String),
    #[error("no message has been received")]
    NothingReceived,
    #[error("transport accepted {0} of {1} bytes")]
    ShortWrite(usize, usize),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Framer(#[from] FramerError),
}

/// Result of one [`Endpoint::poll`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Poll {
    /// No complete frame yet (or the frame was malformed and dropped).
    NoMessage,
    /// A frame completed; the payload carries this message id.
    Message(u8),
}

#[derive(Debug)]
pub struct Endpoint {
    codec: Codec,
    framer: Framer,
    received: Option<(u8, usize)>,
}

impl Endpoint {
    pub fn new(codec: Codec) -> Result<Endpoint, EndpointError> {
        let proto = codec.schema().protocol().ok_or(EndpointError::NoProtocol)?;
        if proto.framing != Framing::Cobs {
            return Err(EndpointError::NoFraming);
        }
        let framer = Framer::new(proto.max_length, proto.crc);
        Ok(Endpoint { codec, framer, received: None })
    }

    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    /// Encode `values` as message `name` and push the frame to `write`.
    pub fn send(
        &mut self,
        name: &str,
        values: &HashMap<String, Value>,
        write: &mut dyn FnMut(&[u8]) -> usize,
    ) -> Result<(), EndpointError> {
        let id = self
            .codec
            .schema()
            .message_id(name)
            .ok_or_else(|| EndpointError::NotAMessage(name.to_string()))?;

        let len = {
            let region = self.framer.message_region();
            region[0] = id;
            let mut buf = Buffer::new(&mut region[1..]);
            self.codec.encode_message_into(name, values, &mut buf)? + 1
        };

        let frame = self.framer.encode(len)?;
        let accepted = write(frame);
        if accepted != frame.len() {
            return Err(EndpointError::ShortWrite(accepted, frame.len()));
        }
        Ok(())
    }

    /// Pull one byte from `read` and feed it to the framer. Framing errors
    /// are swallowed into `NoMessage`; the framer has already reset.
    pub fn poll(&mut self, read: &mut dyn FnMut() -> Option<u8>) -> Poll {
        let Some(byte) = read() else {
            return Poll::NoMessage;
        };

        match self.framer.push_byte(byte) {
            FrameEvent::Complete { len } if len > 0 => {
                let id = self.framer.payload(len)[0];
                self.received = Some((id, len - 1));
                Poll::Message(id)
            }
            _ => Poll::NoMessage,
        }
    }

    /// Decode the last received frame as message `name`.
    pub fn decode(&mut self, name: &str) -> Result<HashMap<String, Value>, EndpointError> {
        let (id, len) = self.received.ok_or(EndpointError::NothingReceived)?;
        let expected = self
            .codec
            .schema()
            .message_id(name)
            .ok_or_else(|| EndpointError::NotAMessage(name.to_string()))?;
        if id != expected {
            return Err(EndpointError::WrongMessage(name.to_string()));
        }
        let payload = &self.framer.payload(len + 1)[1..];
        Ok(self.codec.decode_message(name, payload)?)
    }

    /// Id of the last received message, if any.
    pub fn received_id(&self) -> Option<u8> {
        self.received.map(|(id, _)| id)
    }

    /// Struct name bound to a message id.
    pub fn message_name(&self, id: u8) -> Option<&str> {
        self.codec
            .schema()
            .message_struct(id)
            .map(|s| s.name.as_str())
    }
}
