//! Session types: configuration, authentication state, and events.

use std::time::Duration;

use cloudlink_protocol::{Ban, BannedNotice};

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Configuration for a client session.
///
/// Every field has a sensible default; override just what you need:
///
/// ```rust
/// use std::time::Duration;
/// use cloudlink_session::SessionConfig;
///
/// let config = SessionConfig {
///     storage_prefix: "roarer".into(),
///     ..SessionConfig::default()
/// };
/// assert_eq!(config.request_timeout, Duration::from_millis(2500));
/// ```
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long a request waits for its response before failing with
    /// [`SessionError::Timeout`](crate::SessionError::Timeout).
    pub request_timeout: Duration,

    /// Interval between keep-alive pings while the connection is open.
    pub heartbeat_interval: Duration,

    /// Pause between a socket closing and the next connect attempt. Never
    /// below [`MIN_RECONNECT_DELAY`](Self::MIN_RECONNECT_DELAY) once
    /// validated.
    pub reconnect_delay: Duration,

    /// Upper bound of the random delay added to `reconnect_delay`, so many
    /// clients dropped by the same server restart don't redial in lockstep.
    pub reconnect_jitter: Duration,

    /// Prefix for the persisted credential keys (`<prefix>:username`,
    /// `<prefix>:token`).
    pub storage_prefix: String,
}

impl SessionConfig {
    /// Default per-request deadline.
    pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(2500);
    /// Default keep-alive interval.
    pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(20);
    /// Default pause before reconnecting.
    pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(1);
    /// Floor for the reconnect pause, so a refusing server isn't redialled
    /// in a tight loop.
    pub const MIN_RECONNECT_DELAY: Duration = Duration::from_millis(10);
    /// Default storage key prefix.
    pub const DEFAULT_STORAGE_PREFIX: &'static str = "cloudlink";

    /// Replaces out-of-range values so the config is safe to use.
    ///
    /// Called automatically when a session is built. Zero timeouts and
    /// intervals fall back to their defaults, a reconnect delay below the
    /// floor is raised to it, and an empty prefix falls back to the default
    /// prefix.
    pub fn validated(mut self) -> Self {
        if self.request_timeout.is_zero() {
            tracing::warn!("request_timeout is zero, using default");
            self.request_timeout = Self::DEFAULT_REQUEST_TIMEOUT;
        }
        if self.heartbeat_interval.is_zero() {
            tracing::warn!("heartbeat_interval is zero, using default");
            self.heartbeat_interval = Self::DEFAULT_HEARTBEAT_INTERVAL;
        }
        if self.reconnect_delay < Self::MIN_RECONNECT_DELAY {
            tracing::warn!(
                delay = ?self.reconnect_delay,
                "reconnect_delay below minimum, using minimum"
            );
            self.reconnect_delay = Self::MIN_RECONNECT_DELAY;
        }
        if self.storage_prefix.is_empty() {
            tracing::warn!("storage_prefix is empty, using default");
            self.storage_prefix = Self::DEFAULT_STORAGE_PREFIX.to_string();
        }
        self
    }

    /// Storage key holding the username.
    pub fn username_key(&self) -> String {
        format!("{}:username", self.storage_prefix)
    }

    /// Storage key holding the token.
    pub fn token_key(&self) -> String {
        format!("{}:token", self.storage_prefix)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            request_timeout: Self::DEFAULT_REQUEST_TIMEOUT,
            heartbeat_interval: Self::DEFAULT_HEARTBEAT_INTERVAL,
            reconnect_delay: Self::DEFAULT_RECONNECT_DELAY,
            reconnect_jitter: Duration::from_millis(500),
            storage_prefix: Self::DEFAULT_STORAGE_PREFIX.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Authentication state of the session.
///
/// ```text
/// Unauthenticated ──login()──→ Authenticating ──ok──→ Authenticated
///        ↑                           │                     │
///        └───────────err─────────────┘        (socket closed)
///        └─────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Not logged in. Every session starts here and returns here on close.
    #[default]
    Unauthenticated,
    /// A login request is in flight.
    Authenticating,
    /// Logged in on the current connection.
    Authenticated,
}

/// In-memory authentication state, reset on close and on reload.
#[derive(Debug, Default)]
pub(crate) struct AuthState {
    pub(crate) state: SessionState,
    pub(crate) ban: Option<Ban>,
}

// ---------------------------------------------------------------------------
// SessionEvent
// ---------------------------------------------------------------------------

/// Notifications for the embedding application.
///
/// Delivered on a broadcast channel from
/// [`SessionManager::subscribe`](crate::SessionManager::subscribe). Slow
/// receivers may miss events; the accessors on the manager are the source
/// of truth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A login succeeded.
    Authenticated {
        /// The canonical username returned by the server.
        username: String,
    },
    /// The connection closed; the session is unauthenticated until it
    /// recovers.
    Disconnected,
    /// A new socket opened after a close.
    Reconnected,
    /// The server sent a ban notice that is still in force.
    Banned(BannedNotice),
    /// In-memory state was reset the way a fresh process would start.
    ReloadRequested,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_matches_protocol_timings() {
        let config = SessionConfig::default();
        assert_eq!(config.request_timeout, Duration::from_millis(2500));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(20));
        assert_eq!(config.storage_prefix, "cloudlink");
    }

    #[test]
    fn test_validated_replaces_zero_durations_and_empty_prefix() {
        let config = SessionConfig {
            request_timeout: Duration::ZERO,
            heartbeat_interval: Duration::ZERO,
            storage_prefix: String::new(),
            ..SessionConfig::default()
        }
        .validated();

        assert_eq!(config.request_timeout, SessionConfig::DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(
            config.heartbeat_interval,
            SessionConfig::DEFAULT_HEARTBEAT_INTERVAL
        );
        assert_eq!(config.storage_prefix, "cloudlink");
    }

    #[test]
    fn test_validated_raises_zero_reconnect_delay_to_minimum() {
        let config = SessionConfig {
            reconnect_delay: Duration::ZERO,
            reconnect_jitter: Duration::ZERO,
            ..SessionConfig::default()
        }
        .validated();

        assert_eq!(config.reconnect_delay, SessionConfig::MIN_RECONNECT_DELAY);
        assert_eq!(config.reconnect_jitter, Duration::ZERO);
    }

    #[test]
    fn test_validated_keeps_short_reconnect_delay_above_minimum() {
        let config = SessionConfig {
            reconnect_delay: Duration::from_millis(25),
            ..SessionConfig::default()
        }
        .validated();

        assert_eq!(config.reconnect_delay, Duration::from_millis(25));
    }

    #[test]
    fn test_storage_keys_use_prefix() {
        let config = SessionConfig {
            storage_prefix: "roarer".into(),
            ..SessionConfig::default()
        };
        assert_eq!(config.username_key(), "roarer:username");
        assert_eq!(config.token_key(), "roarer:token");
    }

    #[test]
    fn test_session_state_defaults_to_unauthenticated() {
        assert_eq!(SessionState::default(), SessionState::Unauthenticated);
        let auth = AuthState::default();
        assert!(auth.ban.is_none());
    }
}
