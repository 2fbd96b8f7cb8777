//! # Utility Modules
//!
//! Supporting utilities shared by the codec, the directory and the sessions.
//!
//! ## Components
//! - **Crypto**: resettable Blowfish keystream for encrypted framing
//! - **Logging**: structured logging configuration
//! - **Metrics**: thread-safe observability counters
//! - **Time**: message timestamps and wall-clock strings
//! - **Timeout**: timeout defaults and async wrappers
//!
//! ## Security
//! - Memory zeroing for key material (zeroize crate)

pub mod crypto;
pub mod logging;
pub mod metrics;
pub mod time;
pub mod timeout;
