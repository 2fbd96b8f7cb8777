//! # Error Types
//!
//! Error handling for the messaging server.
//!
//! Two families of failure exist and they never mix:
//!
//! ## Error Categories
//! - **Protocol Errors** ([`ProtocolError`]): bad magic, malformed lengths,
//!   value sanity failures, I/O. These are fatal for the connection that
//!   produced them; the session tears the connection down without a reply.
//! - **Command Errors** ([`CommandError`]): bad arguments, unknown targets,
//!   insufficient privilege. These are recoverable; the dispatch boundary
//!   turns them into a reply message carrying the matching wire code.
//!
//! ## Example Usage
//! ```rust
//! use multiuser_server::error::{ProtocolError, Result};
//! use multiuser_server::core::value::Value;
//!
//! fn first_value(bytes: &[u8]) -> Result<Value> {
//!     let (value, _consumed) = Value::decode(bytes, 0)?;
//!     Ok(value)
//! }
//!
//! assert!(matches!(first_value(&[0x00, 0x03, 0xFF, 0xFF, 0xFF, 0xFF]), Err(ProtocolError::Decode(_))));
//! ```

use crate::protocol::error_code::ErrorCode;
use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Dispatcher-related error messages
    pub const ERR_DISPATCHER_WRITE_LOCK: &str = "Failed to acquire write lock on dispatcher";
    pub const ERR_DISPATCHER_READ_LOCK: &str = "Failed to acquire read lock on dispatcher";

    /// Value decoding errors
    pub const ERR_TRUNCATED: &str = "Value truncated";
    pub const ERR_LENGTH_EXCEEDS_BUFFER: &str = "Embedded length exceeds remaining bytes";
    pub const ERR_COUNT_EXCEEDS_BUFFER: &str = "Element count exceeds remaining bytes";
    pub const ERR_TOO_DEEP: &str = "Value nesting too deep";
    pub const ERR_BAD_COORDINATE: &str = "Point or rect coordinate is not a number";

    /// Connection errors
    pub const ERR_CONNECTION_CLOSED: &str = "Connection closed";
}

/// Fatal failures of the byte stream, the frame layer or the value codec.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid protocol header")]
    InvalidHeader,

    #[error("Packet too large: {0} bytes")]
    OversizedPacket(usize),

    #[error("Invalid frame length: {0}")]
    InvalidLength(u32),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Timeout occurred")]
    Timeout,

    #[error("Connection timed out (no activity)")]
    ConnectionTimeout,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Cipher error: {0}")]
    Cipher(String),

    #[error("Logon refused: {0}")]
    Logon(ErrorCode),

    #[error("Custom error: {0}")]
    Custom(String),
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Recoverable failures raised while routing or executing a command.
///
/// Every variant maps onto a wire [`ErrorCode`]; the `*NotFound` variants are
/// control-flow signals that best-effort fan-out swallows silently.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    #[error("bad parameter")]
    BadParameter,

    #[error("invalid group name")]
    InvalidGroupName,

    #[error("invalid movie id")]
    InvalidMovieId,

    #[error("invalid user id")]
    InvalidUserId,

    #[error("error joining group")]
    ErrorJoiningGroup,

    #[error("error leaving group")]
    ErrorLeavingGroup,

    #[error("not permitted with user level")]
    NotPermitted,

    #[error("group not found")]
    GroupNotFound,

    #[error("user not found")]
    UserNotFound,

    #[error("movie not found")]
    MovieNotFound,

    #[error("duplicate connection")]
    ConnectionDuplicate,

    #[error("no connections available")]
    NoConnectionsAvailable,

    #[error("connection refused")]
    ConnectionRefused,

    #[error("invalid password")]
    InvalidPassword,
}

impl CommandError {
    /// Wire code carried in the reply's error field.
    pub fn code(self) -> ErrorCode {
        match self {
            CommandError::BadParameter => ErrorCode::BadParameter,
            CommandError::InvalidGroupName | CommandError::GroupNotFound => {
                ErrorCode::InvalidGroupName
            }
            CommandError::InvalidMovieId | CommandError::MovieNotFound => ErrorCode::InvalidMovieId,
            CommandError::InvalidUserId | CommandError::UserNotFound => ErrorCode::InvalidUserId,
            CommandError::ErrorJoiningGroup => ErrorCode::ErrorJoiningGroup,
            CommandError::ErrorLeavingGroup => ErrorCode::ErrorLeavingGroup,
            CommandError::NotPermitted => ErrorCode::NotPermittedWithUserLevel,
            CommandError::ConnectionDuplicate => ErrorCode::ConnectionDuplicate,
            CommandError::NoConnectionsAvailable => ErrorCode::NoConnectionsAvailable,
            CommandError::ConnectionRefused => ErrorCode::ConnectionRefused,
            CommandError::InvalidPassword => ErrorCode::InvalidPassword,
        }
    }
}

/// Result alias used by routing and command handlers.
pub type CommandResult<T> = std::result::Result<T, CommandError>;
