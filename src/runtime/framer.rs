//! COBS framer: builds and parses delimited frames over one pre-sized
//! buffer.
//!
//! The buffer layout is fixed at construction:
//!
//! ```text
//! [ cobs-overhead prefix | message area (max_length + 1) | crc | terminator ]
//! ```
//!
//! Outbound messages are written at [`Framer::message_region`] (the id byte
//! followed by the encoded struct), the CRC is appended, and the COBS
//! encoder writes forward from the buffer start — the overhead prefix
//! guarantees the writer never overtakes the source bytes. Inbound bytes
//! accumulate from the buffer start; on the `0x00` terminator the frame is
//! COBS-decoded in place, the CRC verified, and the payload moved back to
//! the message offset so a receive can be answered through the same
//! zero-copy region. One buffer serves both directions, so a send clobbers
//! any partially accumulated frame; callers drive one direction at a time.

use super::cobs;
use super::crc::{self, CrcKind};

/// Outcome of feeding one byte to [`Framer::push_byte`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameEvent {
    /// The byte did not complete a frame. Normal steady state.
    NotReady,
    /// A frame decoded; the payload (id byte included, CRC stripped) is at
    /// the message offset.
    Complete { len: usize },
    /// Malformed frame (bad COBS data or a lone terminator).
    Failure,
    /// The frame decoded but its CRC did not match.
    CrcFailure,
    /// The accumulated bytes filled the buffer before a terminator.
    BufferOverrun,
}

#[derive(Debug, thiserror::Error)]
pub enum FramerError {
    #[error("message length {0} exceeds the message area ({1} bytes)")]
    Oversize(usize, usize),
    #[error("cobs encoding failed (status {0:#04x})")]
    Encode(u8),
}

#[derive(Debug)]
pub struct Framer {
    buf: Vec<u8>,
    max_length: usize,
    message_offset: usize,
    crc: CrcKind,
    read_pos: usize,
}

impl Framer {
    /// A framer for payloads up to `max_length` bytes (the message id byte
    /// is budgeted separately).
    pub fn new(max_length: usize, crc: CrcKind) -> Framer {
        let crc_width = crc.width();
        Framer {
            buf: vec![0; crate::sizes::frame_buffer_size(max_length, crc_width)],
            max_length,
            message_offset: crate::sizes::message_offset(max_length, crc_width),
            crc,
            read_pos: 0,
        }
    }

    pub fn crc(&self) -> CrcKind {
        self.crc
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub fn message_offset(&self) -> usize {
        self.message_offset
    }

    pub fn buffer_size(&self) -> usize {
        self.buf.len()
    }

    /// The zero-copy message area: id byte plus payload.
    pub fn message_region(&mut self) -> &mut [u8] {
        let start = self.message_offset;
        let len = self.max_length + 1;
        &mut self.buf[start..start + len]
    }

    /// Frame the first `len` bytes of the message region. Returns the
    /// complete frame, terminator included.
    pub fn encode(&mut self, len: usize) -> Result<&[u8], FramerError> {
        if len > self.max_length + 1 {
            return Err(FramerError::Oversize(len, self.max_length + 1));
        }

        let off = self.message_offset;
        let crc_width = self.crc.width();
        if crc_width > 0 {
            let value = crc::checksum(self.crc, &self.buf[off..off + len]);
            let le = value.to_le_bytes();
            self.buf[off + len..off + len + crc_width].copy_from_slice(&le[..crc_width]);
        }

        let result = cobs::encode_from_offset(&mut self.buf, off, len + crc_width);
        if result.status != 0 || result.out_len >= self.buf.len() {
            return Err(FramerError::Encode(result.status));
        }
        self.buf[result.out_len] = 0;
        Ok(&self.buf[..result.out_len + 1])
    }

    /// Copy `data` into the message region and frame it.
    pub fn encode_copy(&mut self, data: &[u8]) -> Result<&[u8], FramerError> {
        if data.len() > self.max_length + 1 {
            return Err(FramerError::Oversize(data.len(), self.max_length + 1));
        }
        let off = self.message_offset;
        self.buf[off..off + data.len()].copy_from_slice(data);
        self.encode(data.len())
    }

    /// Feed one received byte to the frame parser.
    pub fn push_byte(&mut self, byte: u8) -> FrameEvent {
        self.buf[self.read_pos] = byte;
        let length = self.read_pos + 1;

        if byte == 0 {
            self.read_pos = 0;
            return self.decode_frame(length);
        }
        if length == self.buf.len() {
            self.read_pos = 0;
            return FrameEvent::BufferOverrun;
        }
        self.read_pos += 1;
        FrameEvent::NotReady
    }

    /// The decoded payload after a [`FrameEvent::Complete`].
    pub fn payload(&self, len: usize) -> &[u8] {
        &self.buf[self.message_offset..self.message_offset + len]
    }

    /// Drop any partially accumulated frame.
    pub fn reset(&mut self) {
        self.read_pos = 0;
    }

    fn decode_frame(&mut self, length: usize) -> FrameEvent {
        if length == 1 {
            return FrameEvent::Failure;
        }
        let length = length - 1; // discard the terminator

        let result = cobs::decode_in_place(&mut self.buf, length);
        if result.status != 0 {
            return FrameEvent::Failure;
        }

        let crc_width = self.crc.width();
        if result.out_len < crc_width {
            return FrameEvent::Failure;
        }
        let len = result.out_len - crc_width;
        // A payload larger than the message area cannot have come from a
        // conforming encoder.
        if len > self.max_length + 1 {
            return FrameEvent::Failure;
        }

        if crc_width > 0 {
            let mut le = [0u8; 8];
            le[..crc_width].copy_from_slice(&self.buf[len..len + crc_width]);
            let received = u64::from_le_bytes(le);
            if crc::checksum(self.crc, &self.buf[..len]) != received {
                return FrameEvent::CrcFailure;
            }
        }

        self.buf.copy_within(0..len, self.message_offset);
        FrameEvent::Complete { len }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(framer: &mut Framer, bytes: &[u8]) -> FrameEvent {
        let mut last = FrameEvent::NotReady;
        for (i, &b) in bytes.iter().enumerate() {
            last = framer.push_byte(b);
            if i + 1 < bytes.len() {
                assert_eq!(last, FrameEvent::NotReady, "byte {} completed early", i);
            }
        }
        last
    }

    #[test]
    fn encode_plain() {
        let mut framer = Framer::new(256, CrcKind::None);
        let frame = framer.encode_copy(&[0x11, 0x22, 0x33, 0x44]).unwrap();
        assert_eq!(frame, &[0x05, 0x11, 0x22, 0x33, 0x44, 0x00]);
    }

    #[test]
    fn encode_one_byte() {
        let mut framer = Framer::new(256, CrcKind::None);
        let frame = framer.encode_copy(&[0x22]).unwrap();
        assert_eq!(frame, &[0x02, 0x22, 0x00]);
    }

    #[test]
    fn encode_empty() {
        let mut framer = Framer::new(256, CrcKind::None);
        let frame = framer.encode_copy(&[]).unwrap();
        assert_eq!(frame, &[0x01, 0x00]);
    }

    #[test]
    fn encode_with_each_crc() {
        let mut framer = Framer::new(256, CrcKind::Crc8);
        let frame = framer.encode_copy(&[0x11, 0x22, 0x33, 0x44]).unwrap();
        assert_eq!(frame, &[0x06, 0x11, 0x22, 0x33, 0x44, 0xF9, 0x00]);

        let mut framer = Framer::new(256, CrcKind::Crc16);
        let frame = framer.encode_copy(&[0x11, 0x22, 0x33, 0x44]).unwrap();
        assert_eq!(frame, &[0x07, 0x11, 0x22, 0x33, 0x44, 0xB1, 0xF5, 0x00]);

        let mut framer = Framer::new(256, CrcKind::Crc32);
        let frame = framer.encode_copy(&[0x11, 0x22, 0x33, 0x44]).unwrap();
        assert_eq!(
            frame,
            &[0x09, 0x11, 0x22, 0x33, 0x44, 0xD1, 0x9D, 0xF2, 0x77, 0x00]
        );
    }

    #[test]
    fn decode_plain() {
        let mut framer = Framer::new(256, CrcKind::None);
        let event = feed(&mut framer, &[0x05, 0x11, 0x22, 0x33, 0x44, 0x00]);
        assert_eq!(event, FrameEvent::Complete { len: 4 });
        assert_eq!(framer.payload(4), &[0x11, 0x22, 0x33, 0x44]);
    }

    #[test]
    fn decode_empty_frame() {
        let mut framer = Framer::new(256, CrcKind::None);
        assert_eq!(framer.push_byte(0x01), FrameEvent::NotReady);
        assert_eq!(framer.push_byte(0x00), FrameEvent::Complete { len: 0 });
    }

    #[test]
    fn lone_terminator_fails() {
        let mut framer = Framer::new(256, CrcKind::None);
        let event = feed(&mut framer, &[0x05, 0x11, 0x22, 0x33, 0x44, 0x00]);
        assert_eq!(event, FrameEvent::Complete { len: 4 });
        assert_eq!(framer.push_byte(0x00), FrameEvent::Failure);
    }

    #[test]
    fn back_to_back_frames() {
        let mut framer = Framer::new(256, CrcKind::None);
        for _ in 0..2 {
            let event = feed(&mut framer, &[0x05, 0x11, 0x22, 0x33, 0x44, 0x00]);
            assert_eq!(event, FrameEvent::Complete { len: 4 });
            assert_eq!(framer.payload(4), &[0x11, 0x22, 0x33, 0x44]);
        }
        assert_eq!(framer.push_byte(0x05), FrameEvent::NotReady);
    }

    #[test]
    fn malformed_cobs_fails() {
        let mut framer = Framer::new(256, CrcKind::None);
        let event = feed(&mut framer, &[0x01, 0x11, 0x22, 0x33, 0x44, 0x00]);
        assert_eq!(event, FrameEvent::Failure);

        let event = feed(&mut framer, &[0x10, 0x11, 0x22, 0x33, 0x44, 0x00]);
        assert_eq!(event, FrameEvent::Failure);
    }

    #[test]
    fn buffer_overrun_resets() {
        let mut framer = Framer::new(2, CrcKind::None);
        assert_eq!(framer.buffer_size(), 4);
        assert_eq!(framer.push_byte(0x05), FrameEvent::NotReady);
        assert_eq!(framer.push_byte(0x11), FrameEvent::NotReady);
        assert_eq!(framer.push_byte(0x22), FrameEvent::NotReady);
        assert_eq!(framer.push_byte(0x33), FrameEvent::BufferOverrun);
        // The read position reset; a valid frame now goes through.
        let event = feed(&mut framer, &[0x02, 0x11, 0x00]);
        assert_eq!(event, FrameEvent::Complete { len: 1 });
    }

    #[test]
    fn crc_roundtrip_and_rejection() {
        for kind in [CrcKind::Crc8, CrcKind::Crc16, CrcKind::Crc32] {
            let mut framer = Framer::new(256, kind);
            let frame: Vec<u8> = framer.encode_copy(&[0x11, 0x22, 0x33, 0x44]).unwrap().to_vec();

            let event = feed(&mut framer, &frame);
            assert_eq!(event, FrameEvent::Complete { len: 4 });
            assert_eq!(framer.payload(4), &[0x11, 0x22, 0x33, 0x44]);

            // Flip one payload bit inside the encoded region.
            let mut corrupt = frame.clone();
            corrupt[1] ^= 0x01;
            let event = feed(&mut framer, &corrupt);
            assert_eq!(event, FrameEvent::CrcFailure);

            // The framer keeps working afterwards.
            let event = feed(&mut framer, &frame);
            assert_eq!(event, FrameEvent::Complete { len: 4 });
        }
    }

    #[test]
    fn crc8_decode_vector() {
        let mut framer = Framer::new(256, CrcKind::Crc8);
        let event = feed(&mut framer, &[0x06, 0x11, 0x22, 0x33, 0x44, 0xF9, 0x00]);
        assert_eq!(event, FrameEvent::Complete { len: 4 });
    }

    #[test]
    fn oversize_message_rejected() {
        let mut framer = Framer::new(4, CrcKind::None);
        assert!(matches!(
            framer.encode_copy(&[0u8; 6]),
            Err(FramerError::Oversize(6, 5))
        ));
        // A failed send leaves the framer usable.
        assert!(framer.encode_copy(&[1, 2, 3]).is_ok());
    }

    #[test]
    fn garbage_then_valid_frame() {
        let mut framer = Framer::new(64, CrcKind::Crc8);
        let frame: Vec<u8> = framer.encode_copy(&[0xAB, 0xCD]).unwrap().to_vec();

        // Arbitrary garbage (terminated) then a well-formed frame.
        for &b in &[0x42u8, 0x13, 0x99, 0x00] {
            framer.push_byte(b);
        }
        let event = feed(&mut framer, &frame);
        assert_eq!(event, FrameEvent::Complete { len: 2 });
        assert_eq!(framer.payload(2), &[0xAB, 0xCD]);
    }
}
