//! Client transport abstraction for CloudLink.
//!
//! Provides the [`Transport`] trait: one reconnectable duplex channel that
//! carries discrete text frames between this client and the server. The
//! session layer owns a single transport for its whole lifetime and calls
//! [`Transport::connect`] again every time the socket drops.
//!
//! # Implementations
//!
//! - [`WebSocketTransport`]: a real socket via `tokio-tungstenite`
//!   (`websocket` feature, on by default)
//! - [`MemoryTransport`]: an in-process loopback whose server side is
//!   driven by a [`MemoryServer`]; used to script a server in tests

mod error;
mod memory;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
pub use memory::{MemoryPeer, MemoryServer, MemoryTransport};
#[cfg(feature = "websocket")]
pub use websocket::WebSocketTransport;

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter for generating unique connection IDs across all transports.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one underlying socket opened by [`Transport::connect`].
///
/// A transport keeps its identity across reconnects; each new socket gets a
/// fresh id so logs can tell consecutive connections apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Allocates the next process-wide id.
    pub(crate) fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A reconnectable client-side connection to a CloudLink server.
///
/// The methods return `Send` futures so a transport can be driven from a
/// spawned task while other tasks send through it.
pub trait Transport: Send + Sync + 'static {
    /// Opens a new underlying socket, replacing any previous one.
    fn connect(
        &self,
    ) -> impl Future<Output = Result<ConnectionId, TransportError>> + Send;

    /// Sends one frame to the server.
    ///
    /// Fails with [`TransportError::NotConnected`] when no socket is open.
    fn send(
        &self,
        data: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Receives the next frame from the server.
    ///
    /// Returns `Ok(None)` when the socket is cleanly closed (by either side).
    fn recv(
        &self,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, TransportError>> + Send;

    /// Closes the current socket. A pending [`recv`](Self::recv) observes
    /// the close and returns `Ok(None)`.
    fn close(&self) -> impl Future<Output = Result<(), TransportError>> + Send;
}
