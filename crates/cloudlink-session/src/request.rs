//! Request/response correlation over the shared packet stream.
//!
//! The server echoes no request ids, so a request registers two one-shot
//! listeners (its success shape and the error status shape) before it
//! transmits, and whichever fires first settles the request.

use std::sync::{Arc, Mutex, PoisonError};

use cloudlink_protocol::shape::{direct, error_status};
use cloudlink_protocol::{Packet, Shape, StatusCode};
use cloudlink_transport::Transport;
use tokio::sync::oneshot;

use crate::error::SessionError;
use crate::link::Link;
use crate::matcher::Persistence;

/// How a request's success shape is applied to inbound packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Wrapping {
    /// The response arrives as `{"cmd":"direct","val":<response>}` and the
    /// shape is applied to `val`.
    #[default]
    Direct,
    /// The shape is applied to the whole packet. For replies that come back
    /// as bare status codes.
    Raw,
}

type Outcome<O> = Result<O, StatusCode>;
type Slot<O> = Arc<Mutex<Option<oneshot::Sender<Outcome<O>>>>>;

fn settle<O>(slot: &Slot<O>, outcome: Outcome<O>) {
    let sender = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
    if let Some(sender) = sender {
        let _ = sender.send(outcome);
    }
}

impl<T: Transport> Link<T> {
    /// Sends `envelope` in a `direct` frame and waits for the first packet
    /// matching `shape` (under `wrapping`) or an error status code.
    ///
    /// Waits for the link to be open before transmitting.
    ///
    /// # Errors
    /// - [`SessionError::Server`] if an error status code arrives first
    /// - [`SessionError::Timeout`] if nothing matches within
    ///   `request_timeout`
    /// - [`SessionError::Transport`] if the frame can't be sent
    /// - [`SessionError::Shutdown`] if the link shuts down while waiting
    pub async fn request<S: Shape>(
        &self,
        envelope: Packet,
        shape: S,
        wrapping: Wrapping,
    ) -> Result<S::Output, SessionError> {
        self.wait_until_sendable().await?;

        let (tx, rx) = oneshot::channel();
        let slot: Slot<S::Output> = Arc::new(Mutex::new(Some(tx)));

        let on_success = {
            let slot = Arc::clone(&slot);
            move |output| settle(&slot, Ok(output))
        };
        let success_id = match wrapping {
            Wrapping::Direct => {
                self.look_for(direct(shape), on_success, Persistence::OneShot)
            }
            Wrapping::Raw => self.look_for(shape, on_success, Persistence::OneShot),
        };
        let error_id = {
            let slot = Arc::clone(&slot);
            self.look_for(
                error_status(),
                move |code| settle(&slot, Err(code)),
                Persistence::OneShot,
            )
        };
        let cleanup = || {
            self.remove_listener(success_id);
            self.remove_listener(error_id);
        };

        let cmd = envelope.cmd.clone();
        if let Err(e) = self.send_packet(&Packet::direct(envelope)).await {
            cleanup();
            return Err(e);
        }

        let outcome = tokio::time::timeout(self.config.request_timeout, rx).await;
        cleanup();

        match outcome {
            Ok(Ok(Ok(output))) => Ok(output),
            Ok(Ok(Err(code))) => {
                tracing::debug!(%cmd, %code, "request rejected");
                Err(SessionError::Server(code))
            }
            Ok(Err(_)) => Err(SessionError::Shutdown),
            Err(_) => {
                tracing::debug!(%cmd, "request timed out");
                Err(SessionError::Timeout)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use cloudlink_protocol::shape::{status_code, typed};
    use cloudlink_transport::{MemoryPeer, MemoryTransport};
    use serde::Deserialize;
    use serde_json::{Value, json};

    use super::*;
    use crate::SessionConfig;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Pong {
        pong: u32,
    }

    async fn open_link() -> (Arc<Link<MemoryTransport>>, MemoryPeer) {
        let (transport, mut server) = MemoryTransport::pair();
        let link = Arc::new(Link::new(transport, SessionConfig::default()));
        link.connect().await.unwrap();
        let peer = server.accept().await.unwrap();
        tokio::spawn({
            let link = Arc::clone(&link);
            async move { link.pump().await }
        });
        (link, peer)
    }

    async fn next_json(peer: &mut MemoryPeer) -> Value {
        let frame = peer.recv().await.unwrap();
        serde_json::from_slice(&frame).unwrap()
    }

    fn ask() -> Packet {
        Packet::new("ask", json!({ "q": 1 }))
    }

    #[tokio::test]
    async fn test_request_resolves_on_direct_reply() {
        let (link, mut peer) = open_link().await;

        let pending = tokio::spawn({
            let link = Arc::clone(&link);
            async move { link.request(ask(), typed::<Pong>(), Wrapping::Direct).await }
        });

        let sent = next_json(&mut peer).await;
        assert_eq!(sent, json!({ "cmd": "direct", "val": { "cmd": "ask", "val": { "q": 1 } } }));
        peer.send(r#"{"cmd":"direct","val":{"pong":3}}"#).unwrap();

        assert_eq!(pending.await.unwrap().unwrap(), Pong { pong: 3 });
        assert!(link.registry().is_empty(), "both listeners removed");
    }

    #[tokio::test]
    async fn test_request_rejects_on_error_status() {
        let (link, mut peer) = open_link().await;

        let pending = tokio::spawn({
            let link = Arc::clone(&link);
            async move { link.request(ask(), typed::<Pong>(), Wrapping::Direct).await }
        });

        next_json(&mut peer).await;
        peer.send(r#"{"cmd":"statuscode","val":"I:011 | Invalid Password"}"#)
            .unwrap();
        peer.send(r#"{"cmd":"direct","val":{"pong":3}}"#).unwrap();

        match pending.await.unwrap() {
            Err(SessionError::Server(code)) => {
                assert_eq!(code.as_str(), "I:011 | Invalid Password");
            }
            other => panic!("expected server error, got {other:?}"),
        }
        assert!(link.registry().is_empty());
    }

    #[tokio::test]
    async fn test_request_ignores_non_error_status() {
        let (link, mut peer) = open_link().await;

        let pending = tokio::spawn({
            let link = Arc::clone(&link);
            async move { link.request(ask(), typed::<Pong>(), Wrapping::Direct).await }
        });

        next_json(&mut peer).await;
        peer.send(r#"{"cmd":"statuscode","val":"I:100 | OK"}"#).unwrap();
        peer.send(r#"{"cmd":"direct","val":{"pong":9}}"#).unwrap();

        assert_eq!(pending.await.unwrap().unwrap(), Pong { pong: 9 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_times_out_without_reply() {
        let (link, mut peer) = open_link().await;

        let started = tokio::time::Instant::now();
        let result = link.request(ask(), typed::<Pong>(), Wrapping::Direct).await;

        assert!(matches!(result, Err(SessionError::Timeout)));
        assert!(started.elapsed() >= Duration::from_millis(2500));
        assert!(peer.try_recv().is_some(), "request was transmitted");
        assert!(link.registry().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_reply_after_timeout_is_ignored() {
        let (link, mut peer) = open_link().await;

        let result = link.request(ask(), typed::<Pong>(), Wrapping::Direct).await;
        assert!(matches!(result, Err(SessionError::Timeout)));

        next_json(&mut peer).await;
        peer.send(r#"{"cmd":"direct","val":{"pong":1}}"#).unwrap();
        tokio::task::yield_now().await;

        assert!(link.registry().is_empty());
    }

    #[tokio::test]
    async fn test_request_waits_until_open_before_transmitting() {
        let (transport, mut server) = MemoryTransport::pair();
        let link = Arc::new(Link::new(transport, SessionConfig::default()));

        let pending = tokio::spawn({
            let link = Arc::clone(&link);
            async move { link.request(ask(), typed::<Pong>(), Wrapping::Direct).await }
        });
        tokio::task::yield_now().await;
        assert!(link.registry().is_empty(), "nothing registered while closed");

        link.connect().await.unwrap();
        let mut peer = server.accept().await.unwrap();
        tokio::spawn({
            let link = Arc::clone(&link);
            async move { link.pump().await }
        });

        let sent = next_json(&mut peer).await;
        assert_eq!(sent["val"]["cmd"], "ask");
        peer.send(r#"{"cmd":"direct","val":{"pong":2}}"#).unwrap();

        assert_eq!(pending.await.unwrap().unwrap(), Pong { pong: 2 });
    }

    #[tokio::test]
    async fn test_request_raw_wrapping_matches_whole_packet() {
        let (link, mut peer) = open_link().await;

        let pending = tokio::spawn({
            let link = Arc::clone(&link);
            async move {
                link.request(
                    ask(),
                    status_code(|code| code.starts_with("I:100")),
                    Wrapping::Raw,
                )
                .await
            }
        });

        next_json(&mut peer).await;
        peer.send(r#"{"cmd":"statuscode","val":"I:100 | OK"}"#).unwrap();

        let code = pending.await.unwrap().unwrap();
        assert_eq!(code.as_str(), "I:100 | OK");
    }

    #[tokio::test]
    async fn test_request_send_failure_removes_listeners() {
        let (link, peer) = open_link().await;
        drop(peer);
        // Let the pump observe the close.
        link.wait_until_closed().await;
        link.status.send_replace(crate::link::ConnectionStatus::Open);

        let result = link.request(ask(), typed::<Pong>(), Wrapping::Direct).await;

        assert!(matches!(result, Err(SessionError::Transport(_))));
        assert!(link.registry().is_empty());
    }
}
