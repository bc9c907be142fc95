//! Persisted login credentials.
//!
//! [`CredentialStore`] keeps the `(username, token)` pair in memory and
//! writes every change through to a [`Storage`] backend, so the pair
//! survives a restart (or a [`reload`](crate::SessionManager::reload)).

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::SessionConfig;
use crate::error::StorageError;

/// A string key/value store that outlives the process.
pub trait Storage: Send + Sync + 'static {
    /// Reads a value.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Writes a value.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Deletes a value. Deleting a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// In-memory [`Storage`]. Clones share the same map, which makes it handy
/// for simulating a restart in tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStorage {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.lock().remove(key);
        Ok(())
    }
}

/// [`Storage`] backed by a JSON object in a file.
///
/// The whole map is rewritten on every change via a temporary file and a
/// rename, so a crash mid-write leaves the old contents intact.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl FileStorage {
    /// Opens (or prepares to create) the store at `path`.
    ///
    /// # Errors
    /// [`StorageError::Corrupt`] if the file exists but isn't a JSON object
    /// of strings; [`StorageError::Io`] if it can't be read.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let entries = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(StorageError::Corrupt)?,
            Err(e) if e.kind() == ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// The backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_through(&self, entries: &HashMap<String, String>) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec_pretty(entries).map_err(StorageError::Corrupt)?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn update(
        &self,
        change: impl FnOnce(&mut HashMap<String, String>) -> bool,
    ) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if change(&mut entries) {
            self.write_through(&entries)?;
        }
        Ok(())
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.update(|entries| {
            entries.insert(key.to_string(), value.to_string()).as_deref() != Some(value)
        })
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.update(|entries| entries.remove(key).is_some())
    }
}

/// A username and the session token issued for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Canonical username.
    pub username: String,
    /// Token accepted in place of the password.
    pub token: String,
}

impl Credentials {
    /// Creates a credential pair.
    pub fn new(username: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            token: token.into(),
        }
    }
}

/// The current credentials, mirrored to [`Storage`].
///
/// Both keys are present together or not at all.
pub struct CredentialStore {
    storage: Box<dyn Storage>,
    username_key: String,
    token_key: String,
    current: Mutex<Option<Credentials>>,
}

impl CredentialStore {
    /// Wraps a storage backend and loads whatever it holds.
    pub fn new(storage: Box<dyn Storage>, config: &SessionConfig) -> Self {
        let store = Self {
            storage,
            username_key: config.username_key(),
            token_key: config.token_key(),
            current: Mutex::new(None),
        };
        store.reload();
        store
    }

    fn lock(&self) -> MutexGuard<'_, Option<Credentials>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The current credentials, if any.
    pub fn get(&self) -> Option<Credentials> {
        self.lock().clone()
    }

    /// Replaces the credentials and writes them through. `None` deletes both
    /// keys.
    ///
    /// The in-memory copy is updated even if the write fails.
    pub fn set(&self, credentials: Option<Credentials>) -> Result<(), StorageError> {
        *self.lock() = credentials.clone();
        match credentials {
            Some(Credentials { username, token }) => {
                self.storage.set(&self.username_key, &username)?;
                self.storage.set(&self.token_key, &token)?;
            }
            None => {
                self.storage.remove(&self.username_key)?;
                self.storage.remove(&self.token_key)?;
            }
        }
        Ok(())
    }

    /// Deletes the credentials.
    pub fn clear(&self) -> Result<(), StorageError> {
        self.set(None)
    }

    /// Re-reads the credentials from storage, discarding the in-memory copy.
    pub fn reload(&self) -> Option<Credentials> {
        let loaded = self.load();
        *self.lock() = loaded.clone();
        loaded
    }

    fn load(&self) -> Option<Credentials> {
        let username = self.read(&self.username_key);
        let token = self.read(&self.token_key);
        match (username, token) {
            (Some(username), Some(token)) => Some(Credentials { username, token }),
            (None, None) => None,
            (username, _) => {
                tracing::warn!(
                    has_username = username.is_some(),
                    "stored credentials are incomplete, ignoring them"
                );
                None
            }
        }
    }

    fn read(&self, key: &str) -> Option<String> {
        match self.storage.get(key) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key, error = %e, "failed to read stored credential");
                None
            }
        }
    }
}
