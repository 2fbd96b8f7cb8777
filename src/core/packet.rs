//! # Frame
//!
//! A frame is the unit the transport sees: a fixed 6-byte header followed by
//! an opaque body.
//!
//! ```text
//! [Magic(2) = 0x7200] [BodyLength(4)] [Body(N)]
//! ```
//!
//! All integers are big-endian. The body is an encoded message envelope.

use crate::error::{ProtocolError, Result};
use bytes::{Buf, BufMut};

/// Frame signature.
pub const MAGIC: u16 = 0x7200;

/// Magic plus body length.
pub const HEADER_LEN: usize = 6;

/// Default upper bound on a single frame body (1 MB).
pub const DEFAULT_MAX_PAYLOAD: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(payload: Vec<u8>) -> Self {
        Self { payload }
    }

    /// Serialize the frame, header first.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.payload.len());
        write_header(&mut out, self.payload.len());
        out.extend_from_slice(&self.payload);
        out
    }

    /// Parse one complete frame. Trailing bytes after the declared body are
    /// rejected.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let len = parse_header(data)? as usize;
        let body = &data[HEADER_LEN..];
        if body.len() != len {
            return Err(ProtocolError::InvalidLength(body.len() as u32));
        }
        Ok(Self {
            payload: body.to_vec(),
        })
    }
}

/// Writes magic and body length.
pub fn write_header<B: BufMut>(out: &mut B, body_len: usize) {
    out.put_u16(MAGIC);
    out.put_u32(body_len as u32);
}

/// Validates the magic of a header and returns the declared body length.
///
/// Requires at least [`HEADER_LEN`] bytes.
pub fn parse_header(header: &[u8]) -> Result<u32> {
    if header.len() < HEADER_LEN {
        return Err(ProtocolError::InvalidHeader);
    }
    let mut cursor = &header[..HEADER_LEN];
    if cursor.get_u16() != MAGIC {
        return Err(ProtocolError::InvalidHeader);
    }
    Ok(cursor.get_u32())
}
