//! Error types for the protocol layer.
//!
//! A `ProtocolError` always means the problem is in turning packets into
//! bytes or back, never in networking or session state.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serializing an outbound packet failed.
    #[error("encode failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// An inbound frame is not valid JSON.
    ///
    /// Frames that parse but match no listener are not errors; they are
    /// simply skipped by the session layer.
    #[error("decode failed: {0}")]
    Decode(#[source] serde_json::Error),

    /// The frame parsed but is not a packet object.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
