//! # Message Envelope
//!
//! The decoded form of a frame body.
//!
//! ## Layout
//! ```text
//! [ErrorCode i32] [Timestamp i32] [Subject] [Sender] [RecipientCount u32] [Recipient]* [Content Value]
//! ```
//! Subject, sender and recipients are untagged padded strings (u32 length,
//! bytes, one zero pad byte when the length is odd). The content value takes
//! the rest of the payload; an envelope that ends after its recipients has
//! `Void` content.

use crate::core::value::Value;
use crate::core::wire::{padded_blob_len, put_padded_blob, Reader};
use crate::error::Result;
use crate::protocol::error_code::ErrorCode;
use bytes::BufMut;
use std::fmt;

/// Sender name used for messages originated by the server itself.
pub const SYSTEM_SENDER: &str = "System";

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub error_code: i32,
    pub timestamp: i32,
    pub subject: String,
    pub sender: String,
    pub recipients: Vec<String>,
    pub content: Value,
    /// Transport hint only; never encoded.
    pub reliable: bool,
}

impl Default for Message {
    fn default() -> Self {
        Self {
            error_code: 0,
            timestamp: 0,
            subject: String::new(),
            sender: String::new(),
            recipients: Vec::new(),
            content: Value::Void,
            reliable: true,
        }
    }
}

impl Message {
    pub fn new(
        subject: impl Into<String>,
        sender: impl Into<String>,
        recipients: Vec<String>,
        content: Value,
    ) -> Self {
        Self {
            subject: subject.into(),
            sender: sender.into(),
            recipients,
            content,
            ..Self::default()
        }
    }

    /// Message from the server to a single recipient.
    pub fn from_system(subject: &str, recipient: &str, content: Value) -> Self {
        Self::new(subject, SYSTEM_SENDER, vec![recipient.to_string()], content)
    }

    pub fn with_error(mut self, code: ErrorCode) -> Self {
        self.error_code = code.code();
        self
    }

    pub fn with_timestamp(mut self, timestamp: i32) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Copy addressed to exactly one recipient.
    pub fn readdressed(&self, recipient: &str) -> Self {
        Self {
            recipients: vec![recipient.to_string()],
            ..self.clone()
        }
    }

    /// Decoded wire error code, if it is one we know.
    pub fn error(&self) -> Option<ErrorCode> {
        ErrorCode::from_code(self.error_code)
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(payload);
        let error_code = reader.read_i32()?;
        let timestamp = reader.read_i32()?;
        let subject = read_header_string(&mut reader)?;
        let sender = read_header_string(&mut reader)?;

        let raw = reader.read_u32()?;
        let count = reader.check_count(raw, 4)?;
        let mut recipients = Vec::with_capacity(count);
        for _ in 0..count {
            recipients.push(read_header_string(&mut reader)?);
        }

        let content = if reader.remaining() == 0 {
            Value::Void
        } else {
            Value::read(&mut reader)?
        };

        Ok(Self {
            error_code,
            timestamp,
            subject,
            sender,
            recipients,
            content,
            reliable: true,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut out);
        out
    }

    pub fn encode_into<B: BufMut>(&self, out: &mut B) {
        out.put_i32(self.error_code);
        out.put_i32(self.timestamp);
        put_padded_blob(out, self.subject.as_bytes());
        put_padded_blob(out, self.sender.as_bytes());
        out.put_u32(self.recipients.len() as u32);
        for r in &self.recipients {
            put_padded_blob(out, r.as_bytes());
        }
        self.content.encode_into(out);
    }

    pub fn encoded_len(&self) -> usize {
        8 + padded_blob_len(self.subject.len())
            + padded_blob_len(self.sender.len())
            + 4
            + self
                .recipients
                .iter()
                .map(|r| padded_blob_len(r.len()))
                .sum::<usize>()
            + self.content.encoded_len()
    }
}

fn read_header_string(reader: &mut Reader<'_>) -> Result<String> {
    let bytes = reader.read_padded_blob()?;
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} -> {:?} ({}): {}",
            self.error_code, self.sender, self.recipients, self.subject, self.content
        )
    }
}
