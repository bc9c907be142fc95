//! The connection: one transport, its status, and the listener registry that
//! sees every inbound packet.
//!
//! A [`Link`] lives as long as the session. When its socket drops it is
//! reconnected in place: same `Link`, same transport value, new socket.

use std::fmt;

use cloudlink_protocol::{Codec, JsonCodec, Packet, Shape};
use cloudlink_transport::{ConnectionId, Transport, TransportError};
use tokio::sync::watch;

use crate::SessionConfig;
use crate::error::SessionError;
use crate::matcher::{ListenerId, ListenerRegistry, Persistence};

/// Status of the link's current socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// A connect attempt is in progress.
    Connecting,
    /// The socket is open; packets may be sent.
    Open,
    /// No socket is open.
    Closed,
}

impl ConnectionStatus {
    /// Numeric form: 0 connecting, 1 open, 2 closed.
    pub fn code(self) -> u8 {
        match self {
            Self::Connecting => 0,
            Self::Open => 1,
            Self::Closed => 2,
        }
    }

    /// Parses the numeric form. Anything other than 0 or 1 is closed.
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => Self::Connecting,
            1 => Self::Open,
            _ => Self::Closed,
        }
    }

    /// Whether packets may be sent.
    pub fn is_open(self) -> bool {
        self == Self::Open
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// A reconnectable connection to the server.
pub struct Link<T> {
    transport: T,
    codec: JsonCodec,
    registry: ListenerRegistry,
    pub(crate) status: watch::Sender<ConnectionStatus>,
    pub(crate) shutdown: watch::Sender<bool>,
    pub(crate) config: SessionConfig,
}

impl<T: Transport> Link<T> {
    /// Wraps a transport. Nothing is connected until [`connect`](Self::connect).
    pub fn new(transport: T, config: SessionConfig) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Closed);
        let (shutdown, _) = watch::channel(false);
        Self {
            transport,
            codec: JsonCodec,
            registry: ListenerRegistry::new(),
            status,
            shutdown,
            config,
        }
    }

    /// Current connection status.
    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    /// Subscribes to status changes.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The listener registry fed by [`pump`](Self::pump).
    pub fn registry(&self) -> &ListenerRegistry {
        &self.registry
    }

    /// The configuration this link was built with.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Registers a listener on the inbound packet stream.
    pub fn look_for<S, H>(&self, shape: S, handler: H, persistence: Persistence) -> ListenerId
    where
        S: Shape,
        H: FnMut(S::Output) + Send + 'static,
    {
        self.registry.look_for(shape, handler, persistence)
    }

    /// Removes a listener registered with [`look_for`](Self::look_for).
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.registry.remove(id)
    }

    /// Opens a new socket. Status is `Connecting` for the duration and `Open`
    /// or `Closed` afterwards.
    pub async fn connect(&self) -> Result<ConnectionId, TransportError> {
        self.set_status(ConnectionStatus::Connecting);
        match self.transport.connect().await {
            Ok(id) => {
                tracing::info!(%id, "connected");
                self.set_status(ConnectionStatus::Open);
                Ok(id)
            }
            Err(e) => {
                self.set_status(ConnectionStatus::Closed);
                Err(e)
            }
        }
    }

    /// Reads frames until the socket closes, dispatching each packet to the
    /// registry in arrival order. Marks the link `Closed` on return.
    pub async fn pump(&self) {
        loop {
            match self.transport.recv().await {
                Ok(Some(frame)) => match self.codec.decode_packet(&frame) {
                    Ok(packet) => {
                        tracing::trace!(%packet, "packet received");
                        self.registry.dispatch(&packet);
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "dropping undecodable frame");
                    }
                },
                Ok(None) => {
                    tracing::info!("connection closed");
                    break;
                }
                Err(e) => {
                    tracing::debug!(error = %e, "receive failed, treating as close");
                    break;
                }
            }
        }
        self.set_status(ConnectionStatus::Closed);
    }

    /// Encodes and transmits one packet.
    pub async fn send_packet(&self, packet: &Packet) -> Result<(), SessionError> {
        let bytes = self.codec.encode(packet)?;
        tracing::trace!(cmd = %packet.cmd, "packet sent");
        self.transport.send(&bytes).await?;
        Ok(())
    }

    /// Closes the current socket. The status flips to `Closed` immediately so
    /// nothing new is sent on the dying socket.
    pub async fn drop_connection(&self) {
        self.set_status(ConnectionStatus::Closed);
        if let Err(e) = self.transport.close().await {
            tracing::debug!(error = %e, "close failed");
        }
    }

    /// Marks the link as shut down and closes the socket. Pending waits on
    /// [`wait_until_sendable`](Self::wait_until_sendable) fail with
    /// [`SessionError::Shutdown`].
    pub async fn shutdown(&self) {
        self.shutdown.send_replace(true);
        self.registry.clear();
        self.drop_connection().await;
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_shut_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    fn set_status(&self, status: ConnectionStatus) {
        self.status.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            tracing::debug!(from = %current, to = %status, "link status");
            *current = status;
            true
        });
    }
}

#[cfg(test)]
mod tests {
    use cloudlink_protocol::shape::{direct, typed};
    use cloudlink_transport::MemoryTransport;
    use serde_json::{Value, json};

    use super::*;

    #[test]
    fn test_status_codes_map_both_ways() {
        for status in [
            ConnectionStatus::Connecting,
            ConnectionStatus::Open,
            ConnectionStatus::Closed,
        ] {
            assert_eq!(ConnectionStatus::from_code(status.code()), status);
        }
        assert_eq!(ConnectionStatus::from_code(3), ConnectionStatus::Closed);
        assert_eq!(ConnectionStatus::from_code(255), ConnectionStatus::Closed);
    }

    #[tokio::test]
    async fn test_connect_sets_status_open() {
        let (transport, mut server) = MemoryTransport::pair();
        let link = Link::new(transport, SessionConfig::default());
        assert_eq!(link.status(), ConnectionStatus::Closed);

        link.connect().await.unwrap();

        assert_eq!(link.status(), ConnectionStatus::Open);
        assert!(server.accept().await.is_some());
    }

    #[tokio::test]
    async fn test_connect_failure_sets_status_closed() {
        let (transport, server) = MemoryTransport::pair();
        drop(server);
        let link = Link::new(transport, SessionConfig::default());

        assert!(link.connect().await.is_err());
        assert_eq!(link.status(), ConnectionStatus::Closed);
    }

    #[tokio::test]
    async fn test_pump_dispatches_packets_and_closes() {
        let (transport, mut server) = MemoryTransport::pair();
        let link = Link::new(transport, SessionConfig::default());
        link.connect().await.unwrap();
        let peer = server.accept().await.unwrap();

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        link.look_for(
            direct(typed::<Value>()),
            move |val| {
                let _ = tx.send(val);
            },
            Persistence::Persistent,
        );

        peer.send(r#"{"cmd":"direct","val":{"n":1}}"#).unwrap();
        peer.send("not json").unwrap();
        peer.send(r#"[1,2,3]"#).unwrap();
        peer.send(r#"{"cmd":"direct","val":{"n":2}}"#).unwrap();
        peer.close();

        link.pump().await;

        assert_eq!(rx.recv().await.unwrap(), json!({ "n": 1 }));
        assert_eq!(rx.recv().await.unwrap(), json!({ "n": 2 }));
        assert_eq!(link.status(), ConnectionStatus::Closed);
    }

    #[tokio::test]
    async fn test_send_packet_writes_json_frame() {
        let (transport, mut server) = MemoryTransport::pair();
        let link = Link::new(transport, SessionConfig::default());
        link.connect().await.unwrap();
        let mut peer = server.accept().await.unwrap();

        link.send_packet(&Packet::ping()).await.unwrap();

        let frame = peer.recv().await.unwrap();
        let value: Value = serde_json::from_slice(&frame).unwrap();
        assert_eq!(value, json!({ "cmd": "ping", "val": "" }));
    }

    #[tokio::test]
    async fn test_send_packet_before_connect_is_transport_error() {
        let (transport, _server) = MemoryTransport::pair();
        let link = Link::new(transport, SessionConfig::default());

        let err = link.send_packet(&Packet::ping()).await.unwrap_err();

        assert!(matches!(
            err,
            SessionError::Transport(TransportError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_drop_connection_closes_immediately() {
        let (transport, mut server) = MemoryTransport::pair();
        let link = Link::new(transport, SessionConfig::default());
        link.connect().await.unwrap();
        let mut peer = server.accept().await.unwrap();

        link.drop_connection().await;

        assert_eq!(link.status(), ConnectionStatus::Closed);
        assert!(peer.recv().await.is_none(), "server sees the socket drop");
    }

    #[tokio::test]
    async fn test_shutdown_clears_listeners() {
        let (transport, _server) = MemoryTransport::pair();
        let link = Link::new(transport, SessionConfig::default());
        link.look_for(direct(typed::<Value>()), |_| {}, Persistence::Persistent);

        link.shutdown().await;

        assert!(link.is_shut_down());
        assert!(link.registry().is_empty());
    }
}
