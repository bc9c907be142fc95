//! Integration tests for the WebSocket client transport.
//!
//! Each test runs a tiny `tokio-tungstenite` server on a free local port and
//! drives the client transport against it.

#[cfg(feature = "websocket")]
mod websocket {
    use cloudlink_transport::{Transport, TransportError, WebSocketTransport};
    use futures_util::{SinkExt, StreamExt};
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::Message;

    type ServerWs = tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>;

    /// Binds a listener on an OS-assigned port and returns it with its URL.
    async fn bind() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let addr = listener.local_addr().expect("should have addr");
        (listener, format!("ws://{addr}"))
    }

    async fn accept(listener: &TcpListener) -> ServerWs {
        let (stream, _) = listener.accept().await.expect("should accept");
        tokio_tungstenite::accept_async(stream)
            .await
            .expect("handshake should succeed")
    }

    #[tokio::test]
    async fn test_websocket_connect_send_receive() {
        let (listener, url) = bind().await;
        let server = tokio::spawn(async move { accept(&listener).await });

        let transport = WebSocketTransport::new(url);
        transport.connect().await.expect("should connect");
        let mut server_ws = server.await.expect("task should complete");

        // Client → server arrives as a text frame.
        transport
            .send(br#"{"cmd":"ping","val":""}"#)
            .await
            .expect("send should succeed");
        let msg = server_ws.next().await.unwrap().unwrap();
        assert!(msg.is_text());
        assert_eq!(msg.into_text().unwrap().as_str(), r#"{"cmd":"ping","val":""}"#);

        // Server → client.
        server_ws
            .send(Message::Text(r#"{"cmd":"statuscode","val":"I:100 | OK"}"#.into()))
            .await
            .unwrap();
        let received = transport
            .recv()
            .await
            .expect("recv should succeed")
            .expect("should have data");
        assert_eq!(received, br#"{"cmd":"statuscode","val":"I:100 | OK"}"#);

        transport.close().await.expect("close should succeed");
    }

    #[tokio::test]
    async fn test_websocket_recv_returns_none_on_server_close() {
        let (listener, url) = bind().await;
        let server = tokio::spawn(async move { accept(&listener).await });

        let transport = WebSocketTransport::new(url);
        transport.connect().await.expect("should connect");
        let mut server_ws = server.await.unwrap();

        server_ws.send(Message::Close(None)).await.unwrap();

        let result = transport.recv().await.expect("recv should not error");
        assert!(result.is_none(), "should return None on server close");
    }

    #[tokio::test]
    async fn test_websocket_send_before_connect_fails() {
        let transport = WebSocketTransport::new("ws://127.0.0.1:9");

        let result = transport.send(b"{}").await;

        assert!(matches!(result, Err(TransportError::NotConnected)));
    }

    #[tokio::test]
    async fn test_websocket_connect_refused_reports_error() {
        // Bind then drop so the port is very likely closed.
        let (listener, url) = bind().await;
        drop(listener);

        let transport = WebSocketTransport::new(url);
        let result = transport.connect().await;

        assert!(matches!(result, Err(TransportError::ConnectFailed(_))));
    }
}
