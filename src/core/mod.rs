//! # Core Protocol Components
//!
//! Typed values, framing and the stream codecs.
//!
//! ## Components
//! - **Value**: self-describing typed datum with a recursive binary encoding
//! - **PropList**: ordered key/value container used inside values
//! - **Packet**: frame header (magic + body length)
//! - **Codec**: Tokio codecs for frames and envelopes, with optional cipher
//!
//! ## Wire Format
//! ```text
//! [Magic(2)] [Length(4)] [Envelope(N)]
//! ```
//!
//! ## Security
//! - Frame bodies are bounded by a configurable maximum
//! - Every embedded length is validated before allocation
//! - Value nesting is depth-limited

pub mod codec;
pub mod packet;
pub mod proplist;
pub mod value;
pub mod wire;

pub use proplist::PropList;
pub use value::Value;
