//! A terminal CloudLink client.
//!
//! ```text
//! CLOUDLINK_URL=wss://server.example/ cargo run -p console-client -- bob hunter2
//! ```
//!
//! Credentials are kept in `CLOUDLINK_CREDENTIALS` (default
//! `cloudlink-credentials.json`), so later runs log in on their own.

use std::future::Future;
use std::io::{self, BufRead, Write};

use cloudlink::prelude::*;
use tokio::sync::broadcast::error::RecvError;

const CREDENTIALS_ENV: &str = "CLOUDLINK_CREDENTIALS";
const DEFAULT_CREDENTIALS: &str = "cloudlink-credentials.json";

// ---------------------------------------------------------------------------
// Terminal dialog
// ---------------------------------------------------------------------------

struct ConsoleDialog;

impl Dialog for ConsoleDialog {
    fn alert(&self, message: &str, kind: AlertKind) {
        match kind {
            AlertKind::Blocking => eprintln!("[!] {message}"),
            AlertKind::Dismissible => eprintln!("[i] {message}"),
        }
    }

    fn close_alert(&self) {
        eprintln!("[ok] back online");
    }

    fn confirm(&self, message: &str) -> impl Future<Output = bool> + Send {
        let prompt = format!("{message} [y/N] ");
        async move {
            let answer = tokio::task::spawn_blocking(move || {
                eprint!("{prompt}");
                let _ = io::stderr().flush();
                let mut line = String::new();
                io::stdin().lock().read_line(&mut line).map(|_| line)
            })
            .await;
            matches!(answer, Ok(Ok(line)) if line.trim().eq_ignore_ascii_case("y"))
        }
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), CloudlinkError> {
    init_tracing();

    let path = std::env::var(CREDENTIALS_ENV).unwrap_or_else(|_| DEFAULT_CREDENTIALS.into());
    let client = ClientBuilder::from_env()?
        .storage(FileStorage::open(path)?)
        .build(ConsoleDialog)?;
    let mut events = client.subscribe();
    client.start();

    let mut args = std::env::args().skip(1);
    if let (Some(username), Some(password)) = (args.next(), args.next()) {
        let response = client.login(&username, &password).await?;
        tracing::info!(username = %response.payload.username, "logged in");
    } else if client.credentials().is_none() {
        tracing::warn!("no stored login; pass a username and password");
    }

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => report(&client, event),
                Err(RecvError::Lagged(missed)) => tracing::debug!(missed, "events dropped"),
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    client.shutdown().await;
    Ok(())
}

fn report(client: &Client<ConsoleDialog>, event: SessionEvent) {
    match event {
        SessionEvent::Authenticated { username } => {
            let blocked = client.blocked_users().len();
            println!("authenticated as {username} ({blocked} blocked)");
            if let Some(ban) = client.ban() {
                println!("account restricted until {}: {}", ban.expires, ban.reason);
            }
        }
        SessionEvent::Disconnected => println!("disconnected"),
        SessionEvent::Reconnected => println!("reconnected"),
        SessionEvent::Banned(notice) => println!("banned: {}", notice.reason),
        SessionEvent::ReloadRequested => println!("session reset"),
    }
}
