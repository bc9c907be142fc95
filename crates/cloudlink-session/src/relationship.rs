//! The blocked-user set.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use cloudlink_protocol::{Relationship, RelationshipState};

/// Usernames the current account has blocked.
///
/// Cheap to clone; clones share the set, so the embedding application can
/// hold one and read it while the session keeps it current.
#[derive(Debug, Clone, Default)]
pub struct BlockedUsers {
    inner: Arc<Mutex<HashSet<String>>>,
}

impl BlockedUsers {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether `username` is blocked.
    pub fn contains(&self, username: &str) -> bool {
        self.lock().contains(username)
    }

    /// A copy of the current set.
    pub fn snapshot(&self) -> HashSet<String> {
        self.lock().clone()
    }

    /// Replaces the whole set.
    pub fn replace<I, S>(&self, usernames: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let next: HashSet<String> = usernames.into_iter().map(Into::into).collect();
        *self.lock() = next;
    }

    /// Applies one relationship change: state 0 unblocks, anything else
    /// blocks.
    pub fn apply(&self, relationship: &Relationship) {
        let mut set = self.lock();
        if relationship.state == RelationshipState::NONE {
            set.remove(&relationship.username);
        } else {
            set.insert(relationship.username.clone());
        }
    }

    /// Empties the set.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of blocked users.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nobody is blocked.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
