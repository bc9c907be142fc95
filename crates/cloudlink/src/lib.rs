//! # CloudLink
//!
//! Resilient client sessions for CloudLink servers.
//!
//! A CloudLink server speaks JSON frames over a WebSocket and never echoes
//! request ids. This crate keeps a logged-in session alive on top of that:
//! requests are correlated by the shape of their replies, the socket is
//! reconnected when it drops, and the stored token logs the user back in.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cloudlink::prelude::*;
//!
//! // Implement Dialog for your UI, then:
//! // let client = ClientBuilder::from_env()?
//! //     .storage(FileStorage::open("creds.json")?)
//! //     .build(my_dialog)?;
//! // client.start();
//! // client.login("bob", "hunter2").await?;
//! ```

mod client;
mod error;
mod logging;

pub use client::{Client, ClientBuilder, URL_ENV};
pub use error::CloudlinkError;
pub use logging::{DEFAULT_FILTER, init_tracing};

pub use cloudlink_protocol as protocol;
pub use cloudlink_session as session;
pub use cloudlink_transport as transport;

/// The types most applications need.
pub mod prelude {
    pub use crate::{Client, ClientBuilder, CloudlinkError, init_tracing};
    pub use cloudlink_protocol::{
        Ban, BannedNotice, LoginResponse, Packet, Relationship, RelationshipState, StatusCode,
        shape,
    };
    pub use cloudlink_session::{
        AlertKind, BlockedUsers, ConnectionStatus, Credentials, Dialog, EnglishLocalizer,
        FileStorage, Localizer, MemoryStorage, Persistence, SessionBuilder, SessionConfig,
        SessionError, SessionEvent, SessionManager, SessionState, Storage, Wrapping, keys,
    };
    pub use cloudlink_transport::{Transport, WebSocketTransport};
}
