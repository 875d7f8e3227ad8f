//! Wire-size arithmetic shared by the analyzer, the framer and the backends.

use crate::runtime::cobs;

/// Minimum and maximum encoded size of a type, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeInfo {
    pub min: usize,
    pub max: usize,
}

impl SizeInfo {
    pub fn fixed(width: usize) -> SizeInfo {
        SizeInfo { min: width, max: width }
    }

    pub fn is_fixed(&self) -> bool {
        self.min == self.max
    }
}

/// Total framer buffer size for one worst-case frame:
/// COBS overhead prefix, payload area, CRC area, terminator.
pub fn frame_buffer_size(max_length: usize, crc_width: usize) -> usize {
    cobs::overhead(max_length + crc_width) + max_length + crc_width + 1
}

/// Offset of the message area inside the framer buffer.
pub fn message_offset(max_length: usize, crc_width: usize) -> usize {
    cobs::overhead(max_length + crc_width)
}
