//! Shape predicates over raw inbound packets.
//!
//! The server does not echo request identifiers, so responses are
//! correlated by what they look like. A [`Shape`] inspects a raw packet and
//! either rejects it or returns the narrowed, typed value a listener wants.
//! Rejection is always `None`; a malformed or unexpected packet never
//! produces an error.
//!
//! Shapes compose: [`direct`] wraps any inner shape to match only `direct`
//! frames, [`status_code`] matches `statuscode` frames by predicate, and any
//! closure `Fn(&Value) -> Option<T>` is a shape on its own.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::types::{StatusCode, cmd, is_error_code};

/// A predicate over a raw packet that narrows it to `Output` on a match.
pub trait Shape: Send + Sync + 'static {
    /// What a matching packet is narrowed to.
    type Output: Send + 'static;

    /// Returns the narrowed value, or `None` if the packet doesn't match.
    fn check(&self, packet: &Value) -> Option<Self::Output>;
}

impl<F, T> Shape for F
where
    F: Fn(&Value) -> Option<T> + Send + Sync + 'static,
    T: Send + 'static,
{
    type Output = T;

    fn check(&self, packet: &Value) -> Option<T> {
        self(packet)
    }
}

/// Matches values that deserialize into `T`. See [`typed`].
pub struct Typed<T>(PhantomData<fn() -> T>);

impl<T> Shape for Typed<T>
where
    T: DeserializeOwned + Send + 'static,
{
    type Output = T;

    fn check(&self, packet: &Value) -> Option<T> {
        T::deserialize(packet).ok()
    }
}

/// Matches any value that deserializes into `T`.
pub fn typed<T: DeserializeOwned + Send + 'static>() -> Typed<T> {
    Typed(PhantomData)
}

/// Matches `direct` frames whose `val` satisfies an inner shape. See
/// [`direct`].
pub struct Direct<S>(S);

impl<S: Shape> Shape for Direct<S> {
    type Output = S::Output;

    fn check(&self, packet: &Value) -> Option<S::Output> {
        if packet.get("cmd")?.as_str()? != cmd::DIRECT {
            return None;
        }
        self.0.check(packet.get("val")?)
    }
}

/// Matches `{"cmd":"direct","val":<inner>}` and yields the inner output.
pub fn direct<S: Shape>(inner: S) -> Direct<S> {
    Direct(inner)
}

/// Matches `direct` frames carrying `{"mode": <mode>, "payload": T}`. See
/// [`direct_mode`].
pub struct DirectMode<T> {
    mode: &'static str,
    _payload: PhantomData<fn() -> T>,
}

impl<T> Shape for DirectMode<T>
where
    T: DeserializeOwned + Send + 'static,
{
    type Output = T;

    fn check(&self, packet: &Value) -> Option<T> {
        if packet.get("cmd")?.as_str()? != cmd::DIRECT {
            return None;
        }
        let val = packet.get("val")?;
        if val.get("mode")?.as_str()? != self.mode {
            return None;
        }
        T::deserialize(val.get("payload")?).ok()
    }
}

/// Matches `direct` frames with the given `val.mode` and deserializes
/// `val.payload` into `T`.
pub fn direct_mode<T: DeserializeOwned + Send + 'static>(
    mode: &'static str,
) -> DirectMode<T> {
    DirectMode {
        mode,
        _payload: PhantomData,
    }
}

/// Matches `statuscode` frames whose code satisfies a predicate. See
/// [`status_code`].
pub struct StatusCodeShape<P>(P);

impl<P> Shape for StatusCodeShape<P>
where
    P: Fn(&str) -> bool + Send + Sync + 'static,
{
    type Output = StatusCode;

    fn check(&self, packet: &Value) -> Option<StatusCode> {
        if packet.get("cmd")?.as_str()? != cmd::STATUS_CODE {
            return None;
        }
        let code = packet.get("val")?.as_str()?;
        (self.0)(code).then(|| StatusCode(code.to_string()))
    }
}

/// Matches `{"cmd":"statuscode","val":<code>}` where `pred(code)` holds.
pub fn status_code<P>(pred: P) -> StatusCodeShape<P>
where
    P: Fn(&str) -> bool + Send + Sync + 'static,
{
    StatusCodeShape(pred)
}

/// Status codes that fail a pending request: `E:*`, `I:011`, `I:017`.
pub fn error_status() -> StatusCodeShape<fn(&str) -> bool> {
    StatusCodeShape(is_error_code)
}

/// Exactly `E:101 | Syntax`.
pub fn syntax_error() -> StatusCodeShape<fn(&str) -> bool> {
    StatusCodeShape(|code| code == StatusCode::SYNTAX_ERROR)
}
