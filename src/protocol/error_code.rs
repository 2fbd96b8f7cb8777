//! Wire error codes carried in a message's `errorCode` field.
//!
//! Zero means success. The remaining values follow the historical
//! multiuser-server numbering so existing clients can match on them.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NoError,
    Unknown,
    InvalidMovieId,
    InvalidUserId,
    InvalidPassword,
    NoConnectionsAvailable,
    BadParameter,
    ConnectionRefused,
    MessageTooLarge,
    InvalidMessageFormat,
    ConnectionDuplicate,
    InvalidMessageRecipient,
    ErrorJoiningGroup,
    ErrorLeavingGroup,
    InvalidGroupName,
    InvalidServerCommand,
    NotPermittedWithUserLevel,
    MessageContainsErrorInfo,
}

impl ErrorCode {
    pub const fn code(self) -> i32 {
        match self {
            ErrorCode::NoError => 0,
            ErrorCode::Unknown => -2147216223,
            ErrorCode::InvalidMovieId => -2147216222,
            ErrorCode::InvalidUserId => -2147216221,
            ErrorCode::InvalidPassword => -2147216220,
            ErrorCode::NoConnectionsAvailable => -2147216217,
            ErrorCode::BadParameter => -2147216216,
            ErrorCode::ConnectionRefused => -2147216209,
            ErrorCode::MessageTooLarge => -2147216208,
            ErrorCode::InvalidMessageFormat => -2147216207,
            ErrorCode::ConnectionDuplicate => -2147216201,
            ErrorCode::InvalidMessageRecipient => -2147216199,
            ErrorCode::ErrorJoiningGroup => -2147216196,
            ErrorCode::ErrorLeavingGroup => -2147216195,
            ErrorCode::InvalidGroupName => -2147216194,
            ErrorCode::InvalidServerCommand => -2147216193,
            ErrorCode::NotPermittedWithUserLevel => -2147216192,
            ErrorCode::MessageContainsErrorInfo => -2147216185,
        }
    }

    /// Maps a raw wire value back to a known code; unknown values yield `None`.
    pub fn from_code(code: i32) -> Option<Self> {
        ALL.iter().copied().find(|c| c.code() == code)
    }
}

const ALL: [ErrorCode; 18] = [
    ErrorCode::NoError,
    ErrorCode::Unknown,
    ErrorCode::InvalidMovieId,
    ErrorCode::InvalidUserId,
    ErrorCode::InvalidPassword,
    ErrorCode::NoConnectionsAvailable,
    ErrorCode::BadParameter,
    ErrorCode::ConnectionRefused,
    ErrorCode::MessageTooLarge,
    ErrorCode::InvalidMessageFormat,
    ErrorCode::ConnectionDuplicate,
    ErrorCode::InvalidMessageRecipient,
    ErrorCode::ErrorJoiningGroup,
    ErrorCode::ErrorLeavingGroup,
    ErrorCode::InvalidGroupName,
    ErrorCode::InvalidServerCommand,
    ErrorCode::NotPermittedWithUserLevel,
    ErrorCode::MessageContainsErrorInfo,
];

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl From<ErrorCode> for i32 {
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}
