//! Wire protocol for CloudLink clients.
//!
//! This crate defines what travels between the client and the server:
//!
//! - **Types** ([`Packet`], [`StatusCode`], [`LoginResponse`], etc.): the
//!   outbound packets we build and the inbound payloads we understand.
//! - **Shapes** ([`Shape`], [`shape`]): predicates that recognize inbound
//!   packets by their structure and narrow them to typed values.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how packets become frame
//!   bytes and back.
//! - **Errors** ([`ProtocolError`]).
//!
//! # Architecture
//!
//! ```text
//! Transport (frames) → Protocol (packets, shapes) → Session (listeners, requests)
//! ```

mod codec;
mod error;
pub mod shape;
mod types;

pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use shape::Shape;
pub use types::{
    Account, Ban, BanNoticeKind, BanState, BannedNotice, LoginPayload,
    LoginResponse, Packet, Relationship, RelationshipState, StatusCode, cmd,
    mode,
};
