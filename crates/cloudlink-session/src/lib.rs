//! Session layer for CloudLink clients.
//!
//! This crate turns a bare [`Transport`](cloudlink_transport::Transport)
//! into a logged-in session that survives disconnects:
//!
//! 1. **Matching** ([`ListenerRegistry`]): every inbound packet is offered to
//!    shape-based listeners, one-shot or persistent
//! 2. **Liveness** ([`Link`]): connection status, waiting until sendable,
//!    and a keep-alive heartbeat
//! 3. **Requests** ([`Link::request`]): send a `direct` frame, resolve on
//!    the first matching reply or error code, time out otherwise
//! 4. **Session** ([`SessionManager`]): login, stored re-login after
//!    reconnect, ban notices, and the blocked-user set
//!
//! # How it fits in the stack
//!
//! ```text
//! Application (above)  ← Dialog, Localizer, Storage collaborators
//!     ↕
//! Session Layer (this crate)  ← owns the Link and the user's session
//!     ↕
//! Protocol Layer (below)  ← Packet, Shape, LoginResponse
//!     ↕
//! Transport Layer  ← one reconnectable socket
//! ```

mod credentials;
mod error;
mod link;
mod liveness;
mod manager;
mod matcher;
mod relationship;
mod request;
mod session;
mod ui;

pub use credentials::{CredentialStore, Credentials, FileStorage, MemoryStorage, Storage};
pub use error::{SessionError, StorageError};
pub use link::{ConnectionStatus, Link};
pub use manager::{SessionBuilder, SessionManager};
pub use matcher::{ListenerId, ListenerRegistry, Persistence};
pub use relationship::BlockedUsers;
pub use request::Wrapping;
pub use session::{SessionConfig, SessionEvent, SessionState};
pub use ui::{AlertKind, Dialog, EnglishLocalizer, Localizer, keys};
