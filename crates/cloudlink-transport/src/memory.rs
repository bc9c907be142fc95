//! In-process loopback transport.
//!
//! [`MemoryTransport::pair`] returns the client half and a [`MemoryServer`].
//! Every successful [`connect`](Transport::connect) hands the server a new
//! [`MemoryPeer`], which plays the server end of that one socket: it reads
//! what the client sent, pushes frames to the client, and drops the socket.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{mpsc, watch};

use crate::{ConnectionId, Transport, TransportError};

/// Client half of one open loopback socket.
struct Socket {
    id: ConnectionId,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    inbound: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    closed: watch::Sender<bool>,
}

/// The client end of an in-process transport.
pub struct MemoryTransport {
    current: Mutex<Option<Arc<Socket>>>,
    accepts: mpsc::UnboundedSender<MemoryPeer>,
}

impl MemoryTransport {
    /// Creates a connected transport/server pair.
    pub fn pair() -> (Self, MemoryServer) {
        let (accepts, accepted) = mpsc::unbounded_channel();
        let transport = Self {
            current: Mutex::new(None),
            accepts,
        };
        (transport, MemoryServer { accepted })
    }

    fn socket(&self) -> Option<Arc<Socket>> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Transport for MemoryTransport {
    async fn connect(&self) -> Result<ConnectionId, TransportError> {
        let (to_server, from_client) = mpsc::unbounded_channel();
        let (to_client, from_server) = mpsc::unbounded_channel();
        let (closed, _) = watch::channel(false);
        let id = ConnectionId::next();

        let peer = MemoryPeer {
            id,
            to_client,
            from_client,
        };
        self.accepts.send(peer).map_err(|_| {
            TransportError::ConnectFailed("memory server is gone".into())
        })?;

        let socket = Arc::new(Socket {
            id,
            outbound: to_server,
            inbound: tokio::sync::Mutex::new(from_server),
            closed,
        });
        let previous = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(socket);
        if let Some(previous) = previous {
            previous.closed.send_replace(true);
        }
        tracing::debug!(%id, "memory transport connected");
        Ok(id)
    }

    async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        let socket = self.socket().ok_or(TransportError::NotConnected)?;
        if *socket.closed.borrow() {
            return Err(TransportError::NotConnected);
        }
        socket.outbound.send(data.to_vec()).map_err(|_| {
            TransportError::ConnectionClosed(format!(
                "{} dropped by server",
                socket.id
            ))
        })
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, TransportError> {
        let socket = self.socket().ok_or(TransportError::NotConnected)?;
        let mut closed = socket.closed.subscribe();
        let mut inbound = socket.inbound.lock().await;
        tokio::select! {
            frame = inbound.recv() => Ok(frame),
            _ = closed.wait_for(|closed| *closed) => Ok(None),
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        let socket = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(socket) = socket {
            socket.closed.send_replace(true);
        }
        Ok(())
    }
}

/// Accepts the loopback sockets opened by a [`MemoryTransport`].
pub struct MemoryServer {
    accepted: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl MemoryServer {
    /// Waits for the client's next [`connect`](Transport::connect).
    ///
    /// Returns `None` once the transport has been dropped.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.accepted.recv().await
    }
}

/// The server end of one loopback socket.
pub struct MemoryPeer {
    id: ConnectionId,
    to_client: mpsc::UnboundedSender<Vec<u8>>,
    from_client: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl MemoryPeer {
    /// The id the client side reported for this socket.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Pushes one raw frame to the client.
    pub fn send(&self, data: impl Into<Vec<u8>>) -> Result<(), TransportError> {
        self.to_client.send(data.into()).map_err(|_| {
            TransportError::ConnectionClosed(format!("{} closed", self.id))
        })
    }

    /// Receives the next frame the client sent.
    ///
    /// Returns `None` once the client has replaced or closed this socket and
    /// every buffered frame has been read.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.from_client.recv().await
    }

    /// Returns a frame the client already sent, without waiting.
    pub fn try_recv(&mut self) -> Option<Vec<u8>> {
        self.from_client.try_recv().ok()
    }

    /// Drops the socket from the server side. The client's pending
    /// [`recv`](Transport::recv) returns `Ok(None)`.
    pub fn close(self) {
        tracing::debug!(id = %self.id, "memory peer closed");
    }
}
