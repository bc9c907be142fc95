//! Error types for the session layer.

use cloudlink_protocol::{ProtocolError, StatusCode};
use cloudlink_transport::TransportError;

/// Errors surfaced to callers of session operations.
///
/// Requests fail locally with one of these; disconnection is never one of
/// them, because the session absorbs it and recovers on its own.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No matching response arrived before the request deadline.
    #[error("request timed out")]
    Timeout,

    /// The server answered with an error status code.
    #[error("server returned {0}")]
    Server(StatusCode),

    /// The transport could not carry the request.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The request could not be encoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Credentials could not be persisted.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The session was shut down while the operation was waiting.
    #[error("session shut down")]
    Shutdown,
}

/// Errors from a persisted key/value [`Storage`](crate::Storage).
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Reading or writing the backing file failed.
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The backing file exists but isn't a JSON object of strings.
    #[error("storage file is corrupt: {0}")]
    Corrupt(#[source] serde_json::Error),
}
