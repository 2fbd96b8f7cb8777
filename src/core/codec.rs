//! # Stream Codecs
//!
//! [`FrameCodec`] turns an arbitrary byte stream into frame bodies and back;
//! [`MessageCodec`] layers the envelope codec on top of it. Both plug into
//! `tokio_util::codec::Framed`.
//!
//! ## Decoder states
//! ```text
//! AwaitHeader ──(header complete)──▶ Body { len, decrypted } ──(body complete)──▶ AwaitHeader
//! ```
//! The decoder consumes the header as soon as it is validated and remembers
//! the body length in its state, so a partially received body never causes
//! the header to be parsed (or decrypted) twice.
//!
//! ## Cipher mode
//! With a [`FrameCipher`] the whole frame, header included, is ciphertext.
//! The length field sits inside the first 8-byte block, so decoding waits for
//! 8 bytes, decrypts exactly that block, and records the two body bytes it
//! already covered in `decrypted`. The rest of the body is decrypted once it
//! has fully arrived, after which the keystream is reset.
//!
//! ## Security
//! - Bad magic clears the buffer and fails; the connection must be dropped.
//! - Body length is checked against `max_payload` before any reservation.

use crate::core::packet::{self, Frame, HEADER_LEN};
use crate::error::{ProtocolError, Result};
use crate::protocol::message::Message;
use crate::utils::crypto::FrameCipher;
use crate::utils::metrics::global_metrics;
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

/// First cipher block; covers the header and two body bytes.
const CIPHER_HEAD: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    AwaitHeader,
    /// Header consumed; `decrypted` leading body bytes are already plaintext.
    Body { len: usize, decrypted: usize },
}

#[derive(Debug)]
pub struct FrameCodec {
    state: DecodeState,
    cipher: Option<FrameCipher>,
    /// Separate keystream for the outbound direction.
    out_cipher: Option<FrameCipher>,
    max_payload: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameCodec {
    pub fn new() -> Self {
        Self {
            state: DecodeState::AwaitHeader,
            cipher: None,
            out_cipher: None,
            max_payload: packet::DEFAULT_MAX_PAYLOAD,
        }
    }

    /// Cipher-composed framing; both directions use independent keystreams
    /// derived from `cipher`.
    pub fn with_cipher(cipher: FrameCipher) -> Self {
        Self {
            out_cipher: Some(cipher.fork()),
            cipher: Some(cipher),
            ..Self::new()
        }
    }

    pub fn max_payload(mut self, max_payload: usize) -> Self {
        self.max_payload = max_payload;
        self
    }

    pub fn is_encrypted(&self) -> bool {
        self.cipher.is_some()
    }

    fn check_len(&self, len: u32) -> Result<usize> {
        let len = len as usize;
        if len > self.max_payload {
            return Err(ProtocolError::OversizedPacket(len));
        }
        Ok(len)
    }

    /// Reads the header (plain or encrypted) and moves to `Body`.
    /// Returns `Ok(false)` when more bytes are needed.
    fn read_header(&mut self, src: &mut BytesMut) -> Result<bool> {
        match self.cipher.as_mut() {
            None => {
                if src.len() < HEADER_LEN {
                    return Ok(false);
                }
                let declared = packet::parse_header(&src[..HEADER_LEN]);
                let len = match declared {
                    Ok(len) => self.check_len(len)?,
                    Err(e) => {
                        src.clear();
                        return Err(e);
                    }
                };
                src.advance(HEADER_LEN);
                self.state = DecodeState::Body { len, decrypted: 0 };
            }
            Some(cipher) => {
                if src.len() < CIPHER_HEAD {
                    return Ok(false);
                }
                cipher.apply(&mut src[..CIPHER_HEAD]);
                let declared = match packet::parse_header(&src[..HEADER_LEN]) {
                    Ok(len) => len,
                    Err(e) => {
                        src.clear();
                        return Err(e);
                    }
                };
                if declared < 2 {
                    src.clear();
                    return Err(ProtocolError::InvalidLength(declared));
                }
                let len = self.check_len(declared)?;
                src.advance(HEADER_LEN);
                self.state = DecodeState::Body {
                    len,
                    decrypted: CIPHER_HEAD - HEADER_LEN,
                };
            }
        }
        Ok(true)
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        if self.state == DecodeState::AwaitHeader && !self.read_header(src)? {
            return Ok(None);
        }

        let DecodeState::Body { len, decrypted } = self.state else {
            return Ok(None);
        };

        if src.len() < len {
            src.reserve(len - src.len());
            return Ok(None);
        }

        if let Some(cipher) = self.cipher.as_mut() {
            cipher.apply(&mut src[decrypted..len]);
            cipher.reset();
        }

        let body = src.split_to(len);
        self.state = DecodeState::AwaitHeader;
        Ok(Some(Frame::new(body.to_vec())))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<()> {
        let len = frame.payload.len();
        if len > self.max_payload {
            return Err(ProtocolError::OversizedPacket(len));
        }
        let start = dst.len();
        dst.reserve(HEADER_LEN + len);
        packet::write_header(dst, len);
        dst.put_slice(&frame.payload);

        if let Some(cipher) = self.out_cipher.as_mut() {
            cipher.apply(&mut dst[start..]);
            cipher.reset();
        }
        Ok(())
    }
}

/// Envelope-level codec: frames in, [`Message`]s out.
#[derive(Debug, Default)]
pub struct MessageCodec {
    frames: FrameCodec,
}

impl MessageCodec {
    pub fn new(frames: FrameCodec) -> Self {
        Self { frames }
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>> {
        let Some(frame) = self.frames.decode(src).inspect_err(|e| {
            global_metrics().protocol_error();
            warn!(error = %e, "Frame rejected");
        })?
        else {
            return Ok(None);
        };
        global_metrics().message_received((HEADER_LEN + frame.payload.len()) as u64);
        Message::decode(&frame.payload).map(Some).inspect_err(|e| {
            global_metrics().protocol_error();
            warn!(error = %e, "Envelope rejected");
        })
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = ProtocolError;

    fn encode(&mut self, msg: Message, dst: &mut BytesMut) -> Result<()> {
        let payload = msg.encode();
        global_metrics().message_sent((HEADER_LEN + payload.len()) as u64);
        self.frames.encode(Frame::new(payload), dst)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    fn encrypted_frame(key: &[u8], payload: &[u8]) -> Vec<u8> {
        let mut codec = FrameCodec::with_cipher(FrameCipher::new(key).unwrap());
        let mut out = BytesMut::new();
        codec.encode(Frame::new(payload.to_vec()), &mut out).unwrap();
        out.to_vec()
    }

    #[test]
    fn test_header_consumed_once_across_partial_body() {
        let mut codec = FrameCodec::new();
        let bytes = Frame::new(vec![1, 2, 3, 4]).to_bytes();
        let mut buf = BytesMut::from(&bytes[..8]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 2);
        buf.extend_from_slice(&bytes[8..]);
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().payload, vec![1, 2, 3, 4]);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_encrypted_partial_body_not_decrypted_twice() {
        let key = b"partial-key";
        let payload: Vec<u8> = (0..40).collect();
        let wire = encrypted_frame(key, &payload);

        let mut codec = FrameCodec::with_cipher(FrameCipher::new(key).unwrap());
        let mut buf = BytesMut::from(&wire[..10]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(&wire[10..20]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(&wire[20..]);
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().payload, payload);
    }

    #[test]
    fn test_encrypted_short_length_rejected() {
        let key = b"short-len";
        let mut cipher = FrameCipher::new(key).unwrap();
        let mut wire = vec![0x72, 0x00, 0, 0, 0, 1, 0xAA, 0xBB];
        cipher.apply(&mut wire);
        let mut codec = FrameCodec::with_cipher(FrameCipher::new(key).unwrap());
        let mut buf = BytesMut::from(&wire[..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(ProtocolError::InvalidLength(1))
        ));
    }

    #[test]
    fn test_oversized_rejected() {
        let mut codec = FrameCodec::new().max_payload(16);
        let mut buf = BytesMut::from(&[0x72, 0x00, 0, 0, 1, 0][..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(ProtocolError::OversizedPacket(256))
        ));
    }
}
