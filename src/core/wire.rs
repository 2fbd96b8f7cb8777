//! Bounds-checked big-endian primitives shared by the value and envelope codecs.
//!
//! Every read validates against the bytes that remain *before* touching or
//! allocating anything, so a hostile length field can never cause an
//! out-of-bounds read or an oversized allocation.

use crate::error::{constants, ProtocolError, Result};
use bytes::{Buf, BufMut};

/// Cursor over a borrowed byte slice.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    buf: &'a [u8],
    start_len: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            start_len: buf.len(),
        }
    }

    /// Bytes consumed since construction.
    #[inline]
    pub fn consumed(&self) -> usize {
        self.start_len - self.buf.len()
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    fn need(&self, n: usize) -> Result<()> {
        if self.buf.len() < n {
            Err(ProtocolError::Decode(constants::ERR_TRUNCATED.to_string()))
        } else {
            Ok(())
        }
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        self.need(2)?;
        Ok(self.buf.get_u16())
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        self.need(4)?;
        Ok(self.buf.get_i32())
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.need(4)?;
        Ok(self.buf.get_u32())
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        self.need(4)?;
        Ok(self.buf.get_f32())
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        self.need(8)?;
        Ok(self.buf.get_f64())
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        self.need(N)?;
        let mut out = [0u8; N];
        self.buf.copy_to_slice(&mut out);
        Ok(out)
    }

    /// Reads a u32 length, the bytes it names, and the alignment pad byte
    /// that follows an odd length.
    pub fn read_padded_blob(&mut self) -> Result<&'a [u8]> {
        let len = self.read_u32()? as usize;
        if len > self.buf.len() {
            return Err(ProtocolError::Decode(format!(
                "{}: {} > {}",
                constants::ERR_LENGTH_EXCEEDS_BUFFER,
                len,
                self.buf.len()
            )));
        }
        let (blob, rest) = self.buf.split_at(len);
        self.buf = rest;
        if len % 2 != 0 {
            // Trailing pad is tolerated when a peer omits it at end of buffer.
            if !self.buf.is_empty() {
                self.buf.advance(1);
            }
        }
        Ok(blob)
    }

    /// Validates that `count` elements of at least `min_each` bytes fit.
    pub fn check_count(&self, count: u32, min_each: usize) -> Result<usize> {
        let count = count as usize;
        match count.checked_mul(min_each) {
            Some(total) if total <= self.buf.len() => Ok(count),
            _ => Err(ProtocolError::Decode(format!(
                "{}: {} elements in {} bytes",
                constants::ERR_COUNT_EXCEEDS_BUFFER,
                count,
                self.buf.len()
            ))),
        }
    }

    pub fn rest(&self) -> &'a [u8] {
        self.buf
    }
}

/// Writes a u32 length, the bytes, and a zero pad byte when the length is odd.
pub fn put_padded_blob<B: BufMut>(out: &mut B, bytes: &[u8]) {
    out.put_u32(bytes.len() as u32);
    out.put_slice(bytes);
    if bytes.len() % 2 != 0 {
        out.put_u8(0);
    }
}

/// Encoded size of a padded blob.
#[inline]
pub fn padded_blob_len(len: usize) -> usize {
    4 + len + (len % 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_padded_blob_odd_length() {
        let mut out = Vec::new();
        put_padded_blob(&mut out, b"abc");
        assert_eq!(out, vec![0, 0, 0, 3, b'a', b'b', b'c', 0]);
        assert_eq!(padded_blob_len(3), out.len());

        let mut reader = Reader::new(&out);
        assert_eq!(reader.read_padded_blob().unwrap_or_default(), b"abc");
        assert_eq!(reader.consumed(), 8);
    }

    #[test]
    fn test_blob_length_checked_before_read() {
        let bytes = [0x7F, 0xFF, 0xFF, 0xFF, 1, 2];
        let mut reader = Reader::new(&bytes);
        assert!(matches!(
            reader.read_padded_blob(),
            Err(ProtocolError::Decode(_))
        ));
    }

    #[test]
    fn test_count_overflow_rejected() {
        let reader = Reader::new(&[0u8; 8]);
        assert!(reader.check_count(u32::MAX, 4).is_err());
        assert_eq!(reader.check_count(2, 4).ok(), Some(2));
    }
}
