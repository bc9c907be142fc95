//! The session manager: login, automatic re-login, bans, and relationships.
//!
//! This is the central piece of the session layer. It owns the [`Link`] and
//! every collaborator, and is responsible for:
//! - Logging in and keeping the returned credentials
//! - Recovering after the socket drops (reconnect, then re-login with the
//!   stored token)
//! - Showing ban notices the server sends during login
//! - Keeping the blocked-user set current
//!
//! # Lifecycle
//!
//! ```text
//!   start() ──→ driver: connect ──→ pump ──(socket closed)──→ close handler
//!                  ↑                                              │
//!                  └──────── reconnect_delay + jitter ────────────┤
//!                                                                 ▼
//!                          alert ──→ wait sendable ──→ stored_log_in()
//!                                                        │
//!                          close alert ←── attempt done ←┘
//! ```
//!
//! Re-login is triggered by the server, not by the client: a fresh socket
//! receives `E:101 | Syntax`, and the persistent listener armed by
//! [`stored_log_in`](SessionManager::stored_log_in) answers it with a login
//! using the stored token.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use cloudlink_protocol::shape::{direct_mode, syntax_error, typed};
use cloudlink_protocol::{
    Ban, BanNoticeKind, BannedNotice, LoginResponse, Packet, Relationship, mode,
};
use cloudlink_transport::Transport;
use rand::Rng;
use tokio::sync::{Notify, broadcast};
use tokio::task::JoinHandle;

use crate::credentials::{CredentialStore, Credentials, MemoryStorage, Storage};
use crate::error::SessionError;
use crate::link::{ConnectionStatus, Link};
use crate::matcher::{ListenerId, Persistence};
use crate::relationship::BlockedUsers;
use crate::request::Wrapping;
use crate::session::{AuthState, SessionConfig, SessionEvent, SessionState};
use crate::ui::{AlertKind, Dialog, EnglishLocalizer, Localizer, keys};

/// Buffered events per subscriber before the slowest starts missing some.
const EVENT_CAPACITY: usize = 64;

struct Inner<T, D> {
    link: Link<T>,
    dialog: D,
    localizer: Arc<dyn Localizer>,
    credentials: CredentialStore,
    blocked: BlockedUsers,
    auth: Mutex<AuthState>,
    events: broadcast::Sender<SessionEvent>,

    ban_listener: Mutex<Option<ListenerId>>,
    stored_login_listener: Mutex<Option<ListenerId>>,
    relationship_listener: Mutex<Option<ListenerId>>,

    started: AtomicBool,
    /// A close handler is showing the disconnected alert.
    recovering: AtomicBool,
    relogin_in_flight: AtomicBool,
    relogin_done: Notify,

    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Owns one connection to the server and the user's session on it.
///
/// Cheap to clone; clones share the session.
///
/// # Example
///
/// ```rust,ignore
/// let session = SessionBuilder::new()
///     .storage(FileStorage::open("creds.json")?)
///     .build(transport, my_dialog);
/// session.start();
/// let response = session.login("bob", "hunter2").await?;
/// ```
pub struct SessionManager<T, D> {
    inner: Arc<Inner<T, D>>,
}

impl<T, D> Clone for SessionManager<T, D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

fn lock<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T: Transport, D: Dialog> SessionManager<T, D> {
    /// Spawns the connection driver and the heartbeat, and arms the
    /// relationship listener and the stored login.
    ///
    /// Must be called from within a Tokio runtime. Calling it again has no
    /// effect.
    pub fn start(&self) {
        let inner = &self.inner;
        if inner.started.swap(true, Ordering::SeqCst) {
            return;
        }

        let blocked = inner.blocked.clone();
        let id = inner.link.look_for(
            direct_mode::<Relationship>(mode::UPDATE_RELATIONSHIP),
            move |relationship| blocked.apply(&relationship),
            Persistence::Persistent,
        );
        *lock(&inner.relationship_listener) = Some(id);

        inner.stored_log_in();

        let driver = tokio::spawn(Arc::clone(inner).drive());
        let heartbeat = tokio::spawn({
            let inner = Arc::clone(inner);
            async move { inner.link.heartbeat().await }
        });
        inner.track(driver);
        inner.track(heartbeat);
        tracing::debug!("session started");
    }

    /// Stops every background task, drops all listeners and closes the
    /// socket. Pending requests fail with [`SessionError::Shutdown`].
    pub async fn shutdown(&self) {
        let inner = &self.inner;
        inner.link.shutdown().await;
        for task in lock(&inner.tasks).drain(..) {
            task.abort();
        }
        *lock(&inner.ban_listener) = None;
        *lock(&inner.stored_login_listener) = None;
        *lock(&inner.relationship_listener) = None;
        tracing::info!("session shut down");
    }

    /// Logs in with a username and password (or a stored token).
    ///
    /// On success the blocked-user set is replaced, the credentials are
    /// stored, the account ban is kept if still in force, and the session
    /// becomes authenticated.
    ///
    /// # Errors
    /// Whatever the login request fails with; the session returns to
    /// [`SessionState::Unauthenticated`].
    pub async fn login(
        &self,
        username: &str,
        password: &str,
    ) -> Result<LoginResponse, SessionError> {
        self.inner.login(username, password).await
    }

    /// Arms automatic re-login with the stored credentials.
    ///
    /// Returns `false` (and arms nothing) if no credentials are stored.
    pub fn stored_log_in(&self) -> bool {
        self.inner.stored_log_in()
    }

    /// Resets the session the way a fresh start would: in-memory state is
    /// cleared, credentials are re-read from storage, and the socket is
    /// dropped so the driver reconnects.
    pub async fn reload(&self) {
        self.inner.reset();
        self.inner.link.drop_connection().await;
    }

    /// Current authentication state.
    pub fn state(&self) -> SessionState {
        self.inner.state()
    }

    /// Whether the session is logged in on the current connection.
    pub fn is_authenticated(&self) -> bool {
        self.state() == SessionState::Authenticated
    }

    /// The stored credentials.
    pub fn credentials(&self) -> Option<Credentials> {
        self.inner.credentials.get()
    }

    /// The account ban from the last login, if it is in force.
    pub fn ban(&self) -> Option<Ban> {
        lock(&self.inner.auth).ban.clone()
    }

    /// The blocked-user set. Clones share the live set.
    pub fn blocked_users(&self) -> BlockedUsers {
        self.inner.blocked.clone()
    }

    /// Status of the current socket.
    pub fn status(&self) -> ConnectionStatus {
        self.inner.link.status()
    }

    /// Subscribes to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// The connection, for issuing requests and registering listeners.
    pub fn link(&self) -> &Link<T> {
        &self.inner.link
    }

    /// The dialog collaborator.
    pub fn dialog(&self) -> &D {
        &self.inner.dialog
    }
}

impl<T: Transport, D: Dialog> Inner<T, D> {
    fn state(&self) -> SessionState {
        lock(&self.auth).state
    }

    fn set_state(&self, state: SessionState) {
        lock(&self.auth).state = state;
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn track(&self, task: JoinHandle<()>) {
        let mut tasks = lock(&self.tasks);
        tasks.retain(|task| !task.is_finished());
        tasks.push(task);
    }

    fn reconnect_delay(&self) -> Duration {
        let config = self.link.config();
        let jitter_ms = config.reconnect_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
        };
        config.reconnect_delay + jitter
    }

    /// Replaces `slot`'s listener with `id`, removing the previous one.
    fn replace_listener(&self, slot: &Mutex<Option<ListenerId>>, id: Option<ListenerId>) {
        let previous = std::mem::replace(&mut *lock(slot), id);
        if let Some(previous) = previous {
            self.link.remove_listener(previous);
        }
    }

    async fn login(
        self: &Arc<Self>,
        username: &str,
        password: &str,
    ) -> Result<LoginResponse, SessionError> {
        self.watch_for_ban();
        self.set_state(SessionState::Authenticating);

        let result = self
            .link
            .request(
                Packet::auth_password(username, password),
                typed::<LoginResponse>(),
                Wrapping::Direct,
            )
            .await;
        let response = match result {
            Ok(response) => response,
            Err(e) => {
                self.set_state(SessionState::Unauthenticated);
                tracing::info!(username, error = %e, "login failed");
                return Err(e);
            }
        };

        let payload = &response.payload;
        self.blocked.replace(payload.blocked_usernames());
        let credentials = Credentials::new(&payload.username, &payload.token);
        if let Err(e) = self.credentials.set(Some(credentials)) {
            tracing::warn!(error = %e, "failed to persist credentials");
        }

        let now = Utc::now().timestamp();
        let ban = &payload.account.ban;
        {
            let mut auth = lock(&self.auth);
            auth.ban = ban.applies_at(now).then(|| ban.clone());
            auth.state = SessionState::Authenticated;
        }

        tracing::info!(username = %payload.username, "logged in");
        self.emit(SessionEvent::Authenticated {
            username: payload.username.clone(),
        });
        Ok(response)
    }

    /// Arms a one-shot listener for the ban notice that may accompany a
    /// login response. Only the newest login's listener is kept.
    fn watch_for_ban(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let id = self.link.look_for(
            direct_mode::<BannedNotice>(mode::BANNED),
            move |notice| {
                if let Some(inner) = weak.upgrade() {
                    inner.show_ban_notice(notice);
                }
            },
            Persistence::OneShot,
        );
        self.replace_listener(&self.ban_listener, Some(id));
    }

    fn show_ban_notice(&self, notice: BannedNotice) {
        let now = Utc::now().timestamp();
        let reason = notice.reason.as_str();
        let message = match notice.kind_at(now) {
            Some(BanNoticeKind::Permanent) => {
                self.localizer.t(keys::PERM_BAN, &[("reason", reason)])
            }
            Some(BanNoticeKind::Temporary { expires }) => {
                let date = format_expiry(expires);
                self.localizer
                    .t(keys::TEMP_BAN, &[("date", date.as_str()), ("reason", reason)])
            }
            None => {
                tracing::debug!(expires = notice.expires, "ignoring expired ban notice");
                return;
            }
        };
        tracing::info!(reason, expires = notice.expires, "account is banned");
        self.dialog.alert(&message, AlertKind::Dismissible);
        self.emit(SessionEvent::Banned(notice));
    }

    fn stored_log_in(self: &Arc<Self>) -> bool {
        if self.credentials.get().is_none() {
            return false;
        }
        let weak: Weak<Self> = Arc::downgrade(self);
        let id = self.link.look_for(
            syntax_error(),
            move |_| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_syntax_error();
                }
            },
            Persistence::Persistent,
        );
        self.replace_listener(&self.stored_login_listener, Some(id));
        true
    }

    /// Runs inside packet dispatch, so the login itself is spawned.
    fn on_syntax_error(self: Arc<Self>) {
        if self.state() == SessionState::Authenticated {
            return;
        }
        if self
            .relogin_in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        let Some(credentials) = self.credentials.get() else {
            self.relogin_in_flight.store(false, Ordering::SeqCst);
            return;
        };
        let task = tokio::spawn(Arc::clone(&self).relogin(credentials));
        self.track(task);
    }

    async fn relogin(self: Arc<Self>, credentials: Credentials) {
        let username = credentials.username.as_str();
        match self.login(username, &credentials.token).await {
            Ok(_) => tracing::info!(username, "re-login succeeded"),
            Err(SessionError::Shutdown) => {
                tracing::debug!(username, "re-login abandoned by shutdown");
            }
            Err(e) => {
                tracing::info!(username, error = %e, "re-login failed");
                let prompt = self.localizer.t(keys::LOGIN_FAIL, &[]);
                if !self.dialog.confirm(&prompt).await {
                    if let Err(e) = self.credentials.clear() {
                        tracing::warn!(error = %e, "failed to clear credentials");
                    }
                }
                self.reset();
                self.link.drop_connection().await;
            }
        }
        self.relogin_in_flight.store(false, Ordering::SeqCst);
        self.relogin_done.notify_waiters();
    }

    /// The in-memory half of a reload.
    fn reset(self: &Arc<Self>) {
        *lock(&self.auth) = AuthState::default();
        self.blocked.clear();
        self.credentials.reload();
        self.replace_listener(&self.stored_login_listener, None);
        self.stored_log_in();
        tracing::info!("session reloaded");
        self.emit(SessionEvent::ReloadRequested);
    }

    /// Connects, pumps until the socket closes, hands the close to a close
    /// handler, waits, and connects again. Runs until shutdown.
    async fn drive(self: Arc<Self>) {
        let shutdown = self.link.wait_for_shutdown();
        tokio::pin!(shutdown);
        let mut first = true;
        loop {
            if self.link.is_shut_down() {
                return;
            }
            match self.link.connect().await {
                Ok(_) => {
                    if !first {
                        self.emit(SessionEvent::Reconnected);
                    }
                    first = false;
                    self.link.pump().await;
                    if self.link.is_shut_down() {
                        return;
                    }
                    let handler = tokio::spawn(Arc::clone(&self).handle_close());
                    self.track(handler);
                }
                Err(e) => tracing::warn!(error = %e, "connect failed"),
            }

            let delay = self.reconnect_delay();
            tracing::debug!(?delay, "reconnecting");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                () = &mut shutdown => return,
            }
        }
    }

    /// Keeps the disconnected alert up until the session has recovered.
    async fn handle_close(self: Arc<Self>) {
        if self.recovering.swap(true, Ordering::SeqCst) {
            return;
        }
        self.set_state(SessionState::Unauthenticated);
        self.emit(SessionEvent::Disconnected);
        let message = self.localizer.t(keys::DISCONNECTED, &[]);
        self.dialog.alert(&message, AlertKind::Blocking);

        loop {
            let attempt = self.relogin_done.notified();
            tokio::pin!(attempt);
            attempt.as_mut().enable();

            if self.link.wait_until_sendable().await.is_err() {
                return;
            }
            if !self.stored_log_in() {
                break;
            }
            tokio::select! {
                _ = &mut attempt => {
                    if self.link.status().is_open() {
                        break;
                    }
                }
                _ = self.link.wait_until_closed() => {
                    tracing::debug!("closed again before re-login finished");
                }
            }
        }

        self.dialog.close_alert();
        self.recovering.store(false, Ordering::SeqCst);
    }
}

/// RFC 2822 date for a ban expiry in Unix seconds.
fn format_expiry(expires: i64) -> String {
    DateTime::<Utc>::from_timestamp(expires, 0)
        .map(|date| date.to_rfc2822())
        .unwrap_or_else(|| expires.to_string())
}

// ---------------------------------------------------------------------------
// SessionBuilder
// ---------------------------------------------------------------------------

/// Builder for a [`SessionManager`].
///
/// Defaults: [`SessionConfig::default`], in-memory storage, English
/// messages, a fresh blocked-user set.
pub struct SessionBuilder {
    config: SessionConfig,
    storage: Option<Box<dyn Storage>>,
    localizer: Option<Arc<dyn Localizer>>,
    blocked: Option<BlockedUsers>,
}

impl SessionBuilder {
    /// Creates a builder with default settings.
    pub fn new() -> Self {
        Self {
            config: SessionConfig::default(),
            storage: None,
            localizer: None,
            blocked: None,
        }
    }

    /// Sets the session configuration.
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets where credentials are persisted.
    pub fn storage(mut self, storage: impl Storage) -> Self {
        self.storage = Some(Box::new(storage));
        self
    }

    /// Sets the message localizer.
    pub fn localizer(mut self, localizer: impl Localizer) -> Self {
        self.localizer = Some(Arc::new(localizer));
        self
    }

    /// Shares an existing blocked-user set with the session.
    pub fn blocked_users(mut self, blocked: BlockedUsers) -> Self {
        self.blocked = Some(blocked);
        self
    }

    /// Builds the session. Nothing runs until
    /// [`start`](SessionManager::start).
    pub fn build<T, D>(self, transport: T, dialog: D) -> SessionManager<T, D>
    where
        T: Transport,
        D: Dialog,
    {
        let config = self.config.validated();
        let storage = self
            .storage
            .unwrap_or_else(|| Box::new(MemoryStorage::new()));
        let credentials = CredentialStore::new(storage, &config);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let inner = Inner {
            link: Link::new(transport, config),
            dialog,
            localizer: self
                .localizer
                .unwrap_or_else(|| Arc::new(EnglishLocalizer)),
            credentials,
            blocked: self.blocked.unwrap_or_default(),
            auth: Mutex::new(AuthState::default()),
            events,
            ban_listener: Mutex::new(None),
            stored_login_listener: Mutex::new(None),
            relationship_listener: Mutex::new(None),
            started: AtomicBool::new(false),
            recovering: AtomicBool::new(false),
            relogin_in_flight: AtomicBool::new(false),
            relogin_done: Notify::new(),
            tasks: Mutex::new(Vec::new()),
        };
        SessionManager {
            inner: Arc::new(inner),
        }
    }
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}
