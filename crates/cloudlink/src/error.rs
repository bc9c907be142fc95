//! Unified error type for the CloudLink client.

use cloudlink_protocol::ProtocolError;
use cloudlink_session::{SessionError, StorageError};
use cloudlink_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `cloudlink` meta-crate, you deal with this single error
/// type instead of importing errors from each sub-crate. The `#[from]`
/// attribute on each variant generates `From` impls, so `?` converts
/// sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum CloudlinkError {
    /// A transport-level error (connect, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid message).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (timeout, server error code, shutdown).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Credentials storage could not be opened or written.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The client configuration is unusable.
    #[error("invalid configuration: {0}")]
    Config(String),
}
