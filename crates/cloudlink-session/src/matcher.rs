//! The packet matcher: a registry of shape-based listeners.
//!
//! Every inbound packet is offered to every registered listener in
//! registration order. A listener whose [`Shape`] matches is fired with the
//! narrowed value; one-shot listeners are removed from the registry as they
//! fire, persistent ones stay until removed explicitly.
//!
//! Requests, ban notices, re-login triggers and relationship updates are all
//! built from this one primitive.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use cloudlink_protocol::Shape;
use serde_json::Value;

/// Handle to a registered listener, used to remove it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L-{}", self.0)
    }
}

/// Whether a listener fires once or on every match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persistence {
    /// Fire on the first match, then unregister.
    OneShot,
    /// Fire on every match until removed.
    Persistent,
}

/// Type-erased check-and-handle closure. Returns whether it fired.
type Erased = Box<dyn FnMut(&Value) -> bool + Send>;

struct Listener {
    persistence: Persistence,
    fire: Erased,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    // Ids grow monotonically, so map order is registration order.
    listeners: BTreeMap<ListenerId, Listener>,
}

/// Registry of packet listeners for one connection.
///
/// Dispatch runs handlers while the registry is locked, so a handler must
/// not call back into the registry (register or remove) synchronously;
/// spawn a task for follow-up work instead.
#[derive(Default)]
pub struct ListenerRegistry {
    inner: Mutex<Registry>,
}

impl ListenerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers `handler` to be called with the output of `shape` for
    /// matching packets.
    pub fn look_for<S, H>(
        &self,
        shape: S,
        mut handler: H,
        persistence: Persistence,
    ) -> ListenerId
    where
        S: Shape,
        H: FnMut(S::Output) + Send + 'static,
    {
        let fire: Erased = Box::new(move |packet| match shape.check(packet) {
            Some(output) => {
                handler(output);
                true
            }
            None => false,
        });

        let mut registry = self.lock();
        let id = ListenerId(registry.next_id);
        registry.next_id += 1;
        registry.listeners.insert(id, Listener { persistence, fire });
        tracing::trace!(%id, ?persistence, "listener registered");
        id
    }

    /// Unregisters a listener. Returns `false` if it already fired (one-shot)
    /// or was removed before.
    pub fn remove(&self, id: ListenerId) -> bool {
        self.lock().listeners.remove(&id).is_some()
    }

    /// Offers one packet to every listener, in registration order. Returns
    /// how many listeners fired.
    pub fn dispatch(&self, packet: &Value) -> usize {
        let mut fired = 0;
        self.lock().listeners.retain(|_, listener| {
            if !(listener.fire)(packet) {
                return true;
            }
            fired += 1;
            listener.persistence == Persistence::Persistent
        });
        fired
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.lock().listeners.len()
    }

    /// Returns `true` if no listeners are registered.
    pub fn is_empty(&self) -> bool {
        self.lock().listeners.is_empty()
    }

    /// Removes every listener.
    pub fn clear(&self) {
        self.lock().listeners.clear();
    }
}
