//! Bounded byte stream over a caller-owned region.

/// Wire-level errors surfaced by the stream and the generated codecs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("write past end of buffer")]
    Write,
    #[error("read past end of buffer")]
    Read,
    #[error("seek out of bounds")]
    Seek,
    #[error("inline capacity exceeded")]
    Capacity,
}

/// A mutable region with a read/write position. Never grows; all overflow
/// is reported to the caller.
#[derive(Debug)]
pub struct Buffer<'a> {
    data: &'a mut [u8],
    pos: usize,
}

impl<'a> Buffer<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        Buffer { data, pos: 0 }
    }

    pub fn write(&mut self, bytes: &[u8]) -> Result<(), WireError> {
        let end = self.pos + bytes.len();
        if end > self.data.len() {
            return Err(WireError::Write);
        }
        self.data[self.pos..end].copy_from_slice(bytes);
        self.pos = end;
        Ok(())
    }

    pub fn read(&mut self, out: &mut [u8]) -> Result<(), WireError> {
        let end = self.pos + out.len();
        if end > self.data.len() {
            return Err(WireError::Read);
        }
        out.copy_from_slice(&self.data[self.pos..end]);
        self.pos = end;
        Ok(())
    }

    pub fn seek(&mut self, pos: usize) -> Result<(), WireError> {
        if pos >= self.data.len() {
            return Err(WireError::Seek);
        }
        self.pos = pos;
        Ok(())
    }

    pub fn reset(&mut self) {
        self.pos = 0;
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }
}

impl std::io::Write for Buffer<'_> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        Buffer::write(self, buf)
            .map_err(|_| std::io::Error::from(std::io::ErrorKind::WriteZero))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl std::io::Read for Buffer<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        Buffer::read(self, buf)
            .map_err(|_| std::io::Error::from(std::io::ErrorKind::UnexpectedEof))?;
        Ok(buf.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_read_seek() {
        let mut region = [0u8; 4];
        let mut buf = Buffer::new(&mut region);
        buf.write(&[1, 2, 3]).unwrap();
        assert_eq!(buf.pos(), 3);
        assert_eq!(buf.remaining(), 1);

        assert_eq!(buf.write(&[4, 5]), Err(WireError::Write));

        buf.seek(1).unwrap();
        let mut out = [0u8; 2];
        buf.read(&mut out).unwrap();
        assert_eq!(out, [2, 3]);

        let mut past = [0u8; 2];
        assert_eq!(buf.read(&mut past), Err(WireError::Read));
        assert_eq!(buf.seek(4), Err(WireError::Seek));

        buf.reset();
        assert_eq!(buf.pos(), 0);
    }
}
