//! Shared error type across lobbysync crates.

use thiserror::Error;

/// Stable error codes (used in logs, close reasons and tests).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Invalid input / malformed frame.
    BadRequest,
    /// Operation needs a live connection.
    NotConnected,
    /// Connection already established.
    AlreadyConnected,
    /// Correlated request got no answer in time.
    Timeout,
    /// Admission refused by a resolver.
    Refused,
    /// Call not valid in the current lifecycle state.
    InvalidState,
    /// Entity key already registered for this app.
    KeyConflict,
    /// Unsupported config/protocol version.
    UnsupportedVersion,
    /// Underlying transport failed.
    Transport,
    /// Internal error.
    Internal,
}

impl ErrorCode {
    /// String representation used in logs and close reasons.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::BadRequest => "BAD_REQUEST",
            ErrorCode::NotConnected => "NOT_CONNECTED",
            ErrorCode::AlreadyConnected => "ALREADY_CONNECTED",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::Refused => "REFUSED",
            ErrorCode::InvalidState => "INVALID_STATE",
            ErrorCode::KeyConflict => "KEY_CONFLICT",
            ErrorCode::UnsupportedVersion => "UNSUPPORTED_VERSION",
            ErrorCode::Transport => "TRANSPORT",
            ErrorCode::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Unified error type used by core, server and client.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not connected")]
    NotConnected,
    #[error("already connected")]
    AlreadyConnected,
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("refused: {0}")]
    Refused(String),
    #[error("invalid state: {0}")]
    InvalidState(&'static str),
    #[error("key already in use: {0}")]
    KeyConflict(String),
    #[error("unsupported version")]
    UnsupportedVersion,
    #[error("transport: {0}")]
    Transport(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl SyncError {
    /// Map the error to its stable code.
    pub fn code(&self) -> ErrorCode {
        match self {
            SyncError::BadRequest(_) => ErrorCode::BadRequest,
            SyncError::NotConnected => ErrorCode::NotConnected,
            SyncError::AlreadyConnected => ErrorCode::AlreadyConnected,
            SyncError::Timeout(_) => ErrorCode::Timeout,
            SyncError::Refused(_) => ErrorCode::Refused,
            SyncError::InvalidState(_) => ErrorCode::InvalidState,
            SyncError::KeyConflict(_) => ErrorCode::KeyConflict,
            SyncError::UnsupportedVersion => ErrorCode::UnsupportedVersion,
            SyncError::Transport(_) => ErrorCode::Transport,
            SyncError::Internal(_) => ErrorCode::Internal,
        }
    }
}
