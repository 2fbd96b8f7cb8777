//! # Protocol Layer
//!
//! Message envelopes, recipient addressing, delivery and the system
//! command surface.
//!
//! ## Components
//! - **Message**: envelope header plus content value
//! - **ErrorCode**: wire error codes
//! - **Address**: recipient grammar (user, group, cross-movie, system)
//! - **Router**: delivery to users, groups and other movies
//! - **Dispatcher**: `system.<ns>.<cmd>` handler registry
//! - **Commands**: the built-in server, movie, group, user and script commands

pub mod address;
pub mod commands;
pub mod dispatcher;
pub mod error_code;
pub mod message;
pub mod router;

pub use error_code::ErrorCode;
pub use message::Message;
