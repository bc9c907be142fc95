//! `ClientBuilder`: wires a WebSocket transport into a session.
//!
//! This is the entry point for a CloudLink client application. It ties
//! together all the layers: transport → protocol → session.

use std::env;

use cloudlink_session::{
    BlockedUsers, Dialog, Localizer, SessionBuilder, SessionConfig, SessionManager, Storage,
};
use cloudlink_transport::WebSocketTransport;

use crate::CloudlinkError;

/// Environment variable read by [`ClientBuilder::from_env`].
pub const URL_ENV: &str = "CLOUDLINK_URL";

/// A session over a real WebSocket.
pub type Client<D> = SessionManager<WebSocketTransport, D>;

/// Builder for configuring a CloudLink [`Client`].
///
/// # Example
///
/// ```rust,ignore
/// use cloudlink::prelude::*;
///
/// let client = ClientBuilder::new()
///     .url("wss://server.example/")
///     .storage(FileStorage::open("creds.json")?)
///     .build(my_dialog)?;
/// client.start();
/// client.login("bob", "hunter2").await?;
/// ```
pub struct ClientBuilder {
    url: Option<String>,
    session: SessionBuilder,
}

impl ClientBuilder {
    /// Creates a builder with default settings and no URL.
    pub fn new() -> Self {
        Self {
            url: None,
            session: SessionBuilder::new(),
        }
    }

    /// Creates a builder with the URL taken from `CLOUDLINK_URL`.
    ///
    /// # Errors
    /// [`CloudlinkError::Config`] if the variable is unset or not UTF-8.
    pub fn from_env() -> Result<Self, CloudlinkError> {
        let url = env::var(URL_ENV)
            .map_err(|e| CloudlinkError::Config(format!("{URL_ENV}: {e}")))?;
        Ok(Self::new().url(url))
    }

    /// Sets the server URL (`ws://` or `wss://`).
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Sets the session configuration.
    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.session = self.session.config(config);
        self
    }

    /// Sets where credentials are persisted.
    pub fn storage(mut self, storage: impl Storage) -> Self {
        self.session = self.session.storage(storage);
        self
    }

    /// Sets the message localizer.
    pub fn localizer(mut self, localizer: impl Localizer) -> Self {
        self.session = self.session.localizer(localizer);
        self
    }

    /// Shares an existing blocked-user set with the session.
    pub fn blocked_users(mut self, blocked: BlockedUsers) -> Self {
        self.session = self.session.blocked_users(blocked);
        self
    }

    /// Builds the client. Call [`start`](SessionManager::start) to connect.
    ///
    /// # Errors
    /// [`CloudlinkError::Config`] if no URL was set or it isn't a WebSocket
    /// URL.
    pub fn build<D: Dialog>(self, dialog: D) -> Result<Client<D>, CloudlinkError> {
        let url = self
            .url
            .ok_or_else(|| CloudlinkError::Config("no server url".into()))?;
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(CloudlinkError::Config(format!(
                "expected a ws:// or wss:// url, got {url}"
            )));
        }
        tracing::debug!(%url, "building client");
        Ok(self.session.build(WebSocketTransport::new(url), dialog))
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
