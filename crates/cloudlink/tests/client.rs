//! End-to-end tests: a `ClientBuilder` client against a real local
//! WebSocket server scripted with `tokio-tungstenite`.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cloudlink::prelude::*;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

// =========================================================================
// Helpers
// =========================================================================

type ServerWs = tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>;

#[derive(Clone, Default)]
struct LogDialog {
    alerts: Arc<Mutex<Vec<(String, AlertKind)>>>,
    closed: Arc<Mutex<usize>>,
}

impl Dialog for LogDialog {
    fn alert(&self, message: &str, kind: AlertKind) {
        self.alerts.lock().unwrap().push((message.to_string(), kind));
    }

    fn close_alert(&self) {
        *self.closed.lock().unwrap() += 1;
    }

    fn confirm(&self, _message: &str) -> impl Future<Output = bool> + Send {
        async { true }
    }
}

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

async fn send_json(ws: &mut ServerWs, value: Value) {
    ws.send(Message::Text(value.to_string().into()))
        .await
        .expect("server send");
}

/// Reads frames until the client logs in; returns `{username, pswd}`.
async fn next_login(ws: &mut ServerWs) -> Value {
    loop {
        let msg = ws.next().await.expect("client hung up").expect("frame");
        let Ok(text) = msg.into_text() else { continue };
        let Ok(packet) = serde_json::from_str::<Value>(text.as_str()) else {
            continue;
        };
        if packet["cmd"] == "direct" && packet["val"]["cmd"] == "authpswd" {
            return packet["val"]["val"].clone();
        }
    }
}

fn login_response(username: &str, token: &str, blocked: &[&str]) -> Value {
    let relationships: Vec<Value> = blocked
        .iter()
        .map(|user| json!({ "username": user, "state": 2 }))
        .collect();
    json!({
        "cmd": "direct",
        "val": {
            "payload": {
                "username": username,
                "token": token,
                "relationships": relationships,
                "account": { "ban": { "state": "none", "expires": 0 } }
            }
        }
    })
}

fn client(url: &str, storage: &MemoryStorage, dialog: &LogDialog) -> Client<LogDialog> {
    ClientBuilder::new()
        .url(url)
        .session_config(SessionConfig {
            reconnect_delay: Duration::from_millis(20),
            reconnect_jitter: Duration::ZERO,
            ..SessionConfig::default()
        })
        .storage(storage.clone())
        .build(dialog.clone())
        .expect("valid url")
}

async fn eventually(what: &str, cond: impl Fn() -> bool) {
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for {what}");
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn test_login_over_websocket_stores_credentials_and_blocks() {
    let (listener, url) = bind().await;
    let storage = MemoryStorage::new();
    let dialog = LogDialog::default();
    let client = client(&url, &storage, &dialog);
    client.start();
    let mut ws = accept(&listener).await;

    let login = tokio::spawn({
        let client = client.clone();
        async move { client.login("bob", "hunter2").await }
    });

    let sent = next_login(&mut ws).await;
    assert_eq!(sent, json!({ "username": "bob", "pswd": "hunter2" }));
    send_json(&mut ws, login_response("bob", "abc", &["eve"])).await;

    let response = login.await.unwrap().expect("login should succeed");
    assert_eq!(response.payload.token, "abc");
    assert!(client.is_authenticated());
    assert!(client.blocked_users().contains("eve"));
    assert_eq!(client.credentials(), Some(Credentials::new("bob", "abc")));
    assert_eq!(client.status(), ConnectionStatus::Open);

    client.shutdown().await;
}

#[tokio::test]
async fn test_server_restart_relogs_in_with_stored_token() {
    let (listener, url) = bind().await;
    let storage = MemoryStorage::new();
    storage.set("cloudlink:username", "bob").unwrap();
    storage.set("cloudlink:token", "abc").unwrap();
    let dialog = LogDialog::default();
    let client = client(&url, &storage, &dialog);
    client.start();

    let mut ws = accept(&listener).await;
    send_json(&mut ws, json!({ "cmd": "statuscode", "val": "E:101 | Syntax" })).await;
    assert_eq!(next_login(&mut ws).await["pswd"], "abc");
    send_json(&mut ws, login_response("bob", "abc", &[])).await;
    eventually("first login", || client.is_authenticated()).await;

    ws.close(None).await.unwrap();
    drop(ws);
    eventually("disconnected alert", || !dialog.alerts.lock().unwrap().is_empty()).await;

    let mut ws = accept(&listener).await;
    send_json(&mut ws, json!({ "cmd": "statuscode", "val": "E:101 | Syntax" })).await;
    assert_eq!(next_login(&mut ws).await["pswd"], "abc");
    send_json(&mut ws, login_response("bob", "abc", &[])).await;

    eventually("alert dismissed", || *dialog.closed.lock().unwrap() == 1).await;
    assert!(client.is_authenticated());
    let alerts = dialog.alerts.lock().unwrap().clone();
    assert_eq!(
        alerts,
        vec![(EnglishLocalizer.t(keys::DISCONNECTED, &[]), AlertKind::Blocking)]
    );

    client.shutdown().await;
}
