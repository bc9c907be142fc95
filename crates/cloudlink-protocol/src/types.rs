//! Packet types for the CloudLink wire format.
//!
//! Every frame is a JSON object with a `cmd` string and a `val` payload.
//! Requests are sent as `direct` frames whose `val` is itself a packet (the
//! envelope); the server answers with `direct` frames, `statuscode` frames,
//! or both.

use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Value, json};

/// Well-known `cmd` values.
pub mod cmd {
    /// Wrapper for correlated requests and their responses.
    pub const DIRECT: &str = "direct";
    /// Status and error codes.
    pub const STATUS_CODE: &str = "statuscode";
    /// Keep-alive heartbeat.
    pub const PING: &str = "ping";
    /// Password authentication envelope.
    pub const AUTH_PASSWORD: &str = "authpswd";
}

/// Well-known `val.mode` values inside `direct` frames.
pub mod mode {
    /// Ban notice sent alongside a login response.
    pub const BANNED: &str = "banned";
    /// A relationship with another user changed.
    pub const UPDATE_RELATIONSHIP: &str = "update_relationship";
}

// ---------------------------------------------------------------------------
// Packet
// ---------------------------------------------------------------------------

/// An outbound packet: `{"cmd": ..., "val": ...}`.
///
/// Inbound packets are matched as raw [`Value`]s instead (see
/// [`crate::shape`]), because the server adds fields we don't model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    /// The command name.
    pub cmd: String,
    /// The payload. Absent on the wire reads as `null`.
    #[serde(default)]
    pub val: Value,
}

impl Packet {
    /// Creates a packet with an arbitrary command and payload.
    pub fn new(cmd: impl Into<String>, val: Value) -> Self {
        Self {
            cmd: cmd.into(),
            val,
        }
    }

    /// The heartbeat: `{"cmd":"ping","val":""}`.
    pub fn ping() -> Self {
        Self::new(cmd::PING, Value::String(String::new()))
    }

    /// Wraps an envelope in a `direct` frame.
    pub fn direct(envelope: Packet) -> Self {
        Self::new(
            cmd::DIRECT,
            json!({ "cmd": envelope.cmd, "val": envelope.val }),
        )
    }

    /// The password login envelope.
    pub fn auth_password(username: &str, password: &str) -> Self {
        Self::new(
            cmd::AUTH_PASSWORD,
            json!({ "username": username, "pswd": password }),
        )
    }
}

// ---------------------------------------------------------------------------
// StatusCode
// ---------------------------------------------------------------------------

/// The `val` of a `statuscode` frame, e.g. `"E:101 | Syntax"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusCode(pub String);

impl StatusCode {
    /// Prefix of every error code.
    pub const ERROR_PREFIX: &'static str = "E:";

    /// Informational codes the server uses to report failures.
    pub const FAILURE_INFO_PREFIXES: [&'static str; 2] = ["I:011", "I:017"];

    /// Sent when the server rejects a frame; also its signal that a fresh
    /// connection is ready to authenticate.
    pub const SYNTAX_ERROR: &'static str = "E:101 | Syntax";

    /// Whether a request that receives this code has failed.
    pub fn is_error(&self) -> bool {
        is_error_code(&self.0)
    }

    /// Whether this is exactly the syntax error code.
    pub fn is_syntax_error(&self) -> bool {
        self.0 == Self::SYNTAX_ERROR
    }

    /// The raw code string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `E:` codes plus the two failure-flavored `I:` codes.
pub(crate) fn is_error_code(code: &str) -> bool {
    code.starts_with(StatusCode::ERROR_PREFIX)
        || StatusCode::FAILURE_INFO_PREFIXES
            .iter()
            .any(|prefix| code.starts_with(prefix))
}

// ---------------------------------------------------------------------------
// Relationships
// ---------------------------------------------------------------------------

/// Numeric relationship state as sent by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelationshipState(pub u8);

impl RelationshipState {
    /// No relationship (also: unblocked).
    pub const NONE: Self = Self(0);
    /// Friends.
    pub const FRIEND: Self = Self(1);
    /// Blocked.
    pub const BLOCKED: Self = Self(2);

    /// Whether this is the "no relationship" state.
    pub fn is_none(self) -> bool {
        self == Self::NONE
    }
}

/// One relationship entry, both in login responses and in
/// `update_relationship` notices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    /// The other user.
    pub username: String,
    /// Our relationship to them.
    pub state: RelationshipState,
}

// ---------------------------------------------------------------------------
// Bans
// ---------------------------------------------------------------------------

/// Ban state string. Only `"none"` has meaning on the client; every other
/// value is an active restriction of some kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BanState {
    /// Not banned.
    None,
    /// Any other state the server reports, e.g. `"temp_ban"`.
    Restricted(String),
}

impl BanState {
    /// Whether this is the `"none"` state.
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

impl From<String> for BanState {
    fn from(state: String) -> Self {
        if state == "none" {
            Self::None
        } else {
            Self::Restricted(state)
        }
    }
}

impl From<BanState> for String {
    fn from(state: BanState) -> Self {
        match state {
            BanState::None => "none".to_string(),
            BanState::Restricted(state) => state,
        }
    }
}

/// The account ban record included in a login response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ban {
    /// Ban state.
    pub state: BanState,
    /// Expiry as Unix seconds; 0 means no expiry.
    #[serde(deserialize_with = "unix_seconds")]
    pub expires: i64,
    /// Moderator-supplied reason.
    #[serde(default)]
    pub reason: String,
}

impl Ban {
    /// Whether the ban is in force at `now` (Unix seconds): its expiry is
    /// strictly in the future and its state is not `"none"`.
    pub fn applies_at(&self, now: i64) -> bool {
        self.expires > now && !self.state.is_none()
    }
}

/// Accepts any JSON number as Unix seconds. Fractional values round up, so
/// `expires > now` holds for the rounded value exactly when it holds for
/// the original.
fn unix_seconds<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    let number = serde_json::Number::deserialize(deserializer)?;
    if let Some(seconds) = number.as_i64() {
        return Ok(seconds);
    }
    number
        .as_f64()
        .map(|seconds| seconds.ceil() as i64)
        .ok_or_else(|| D::Error::custom(format!("{number} is not a usable timestamp")))
}

/// Payload of the `banned` notice the server may send while logging in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BannedNotice {
    /// Moderator-supplied reason.
    pub reason: String,
    /// Expiry as Unix seconds; 0 means permanent.
    #[serde(deserialize_with = "unix_seconds")]
    pub expires: i64,
}

/// How a [`BannedNotice`] should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BanNoticeKind {
    /// No expiry was supplied.
    Permanent,
    /// Expires at the given Unix second, which is still in the future.
    Temporary {
        /// Unix seconds.
        expires: i64,
    },
}

impl BannedNotice {
    /// Classifies the notice at `now`. An expiry in the past yields `None`:
    /// the ban is over and nothing should be shown.
    pub fn kind_at(&self, now: i64) -> Option<BanNoticeKind> {
        if self.expires == 0 {
            Some(BanNoticeKind::Permanent)
        } else if self.expires > now {
            Some(BanNoticeKind::Temporary {
                expires: self.expires,
            })
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Login response
// ---------------------------------------------------------------------------

/// The `val` of a successful `authpswd` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResponse {
    /// The authenticated account.
    pub payload: LoginPayload,
}

/// Account data returned by a successful login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginPayload {
    /// Canonical username (the server may fix up casing).
    pub username: String,
    /// Session token to persist for automatic re-login.
    pub token: String,
    /// Every relationship the account has.
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    /// Account flags.
    pub account: Account,
}

impl LoginPayload {
    /// Usernames whose relationship state is blocked.
    pub fn blocked_usernames(&self) -> impl Iterator<Item = &str> {
        self.relationships
            .iter()
            .filter(|r| r.state == RelationshipState::BLOCKED)
            .map(|r| r.username.as_str())
    }
}

/// Account flags included in a login response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// The account's ban record.
    pub ban: Ban,
}
