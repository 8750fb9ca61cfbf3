//! Durable storage for session values
//!
//! Values are stored under fixed keys, each with its own expiry, the way a
//! browser keeps cookies: an expired entry reads as absent.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Storage key of the access token
pub const ACCESS_TOKEN_KEY: &str = "accessToken";

/// Storage key of the refresh token
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";

/// Storage key of the serialized profile
pub const PROFILE_KEY: &str = "profile";

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    /// I/O error during storage operations
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Key-value storage that outlives the process
pub trait SessionStore: Send + Sync {
    /// Read a value; expired or missing entries yield `None`
    ///
    /// # Errors
    /// Returns an error if the backing storage cannot be read
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write a value that stays readable for `ttl` (forever when `None`)
    ///
    /// # Errors
    /// Returns an error if the backing storage cannot be written
    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StorageError>;

    /// Remove a value; removing a missing key is not an error
    ///
    /// # Errors
    /// Returns an error if the backing storage cannot be written
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}

/// One stored value with its expiry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredEntry {
    value: String,
    /// Unix timestamp after which the entry reads as absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<u64>,
}

impl StoredEntry {
    fn new(value: &str, ttl: Option<Duration>) -> Self {
        Self {
            value: value.to_string(),
            expires_at: ttl.map(|ttl| now_secs().saturating_add(ttl.as_secs())),
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| now_secs() >= at)
    }
}

type Entries = HashMap<String, StoredEntry>;

/// JSON file storage, written with user-only permissions on Unix
#[derive(Debug)]
pub struct FileSessionStore {
    storage_path: PathBuf,
    lock: Mutex<()>,
}

impl FileSessionStore {
    /// Create storage backed by `path`; the file is created on first write
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            storage_path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Get the storage path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.storage_path
    }

    fn load(&self) -> Result<Entries, StorageError> {
        if !self.storage_path.exists() {
            return Ok(Entries::new());
        }

        let content = std::fs::read_to_string(&self.storage_path)?;
        if content.trim().is_empty() {
            return Ok(Entries::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    fn save(&self, entries: &Entries) -> Result<(), StorageError> {
        if entries.is_empty() {
            if self.storage_path.exists() {
                std::fs::remove_file(&self.storage_path)?;
            }
            return Ok(());
        }

        if let Some(parent) = self.storage_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(entries)?;
        std::fs::write(&self.storage_path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&self.storage_path, perms)?;
        }

        Ok(())
    }
}

impl SessionStore for FileSessionStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let entries = self.load()?;
        Ok(entries
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.value.clone()))
    }

    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StorageError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.load()?;
        entries.retain(|_, entry| !entry.is_expired());
        entries.insert(key.to_string(), StoredEntry::new(value, ttl));
        self.save(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.load()?;
        if entries.remove(key).is_some() {
            self.save(&entries)?;
        }
        Ok(())
    }
}

/// In-memory storage. Clones share the same entries, so several sessions in
/// one process can stand in for contexts sharing one origin's storage.
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    entries: Arc<Mutex<Entries>>,
}

impl MemorySessionStore {
    /// Create empty storage
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.value.clone()))
    }

    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), StoredEntry::new(value, ttl));
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_store_set_get() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileSessionStore::new(temp_dir.path().join("nested").join("session.json"));

        store
            .set(ACCESS_TOKEN_KEY, "a1", Some(Duration::from_secs(60)))
            .unwrap();
        store.set(REFRESH_TOKEN_KEY, "r1", None).unwrap();

        assert_eq!(store.get(ACCESS_TOKEN_KEY).unwrap().as_deref(), Some("a1"));
        assert_eq!(store.get(REFRESH_TOKEN_KEY).unwrap().as_deref(), Some("r1"));
        assert_eq!(store.get(PROFILE_KEY).unwrap(), None);
    }

    #[test]
    fn test_file_store_survives_new_instance() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("session.json");

        FileSessionStore::new(&path)
            .set(ACCESS_TOKEN_KEY, "persisted", None)
            .unwrap();

        let reopened = FileSessionStore::new(&path);
        assert_eq!(
            reopened.get(ACCESS_TOKEN_KEY).unwrap().as_deref(),
            Some("persisted")
        );
    }

    #[test]
    fn test_expired_entry_reads_as_absent() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileSessionStore::new(temp_dir.path().join("session.json"));

        store
            .set(ACCESS_TOKEN_KEY, "short", Some(Duration::ZERO))
            .unwrap();
        assert_eq!(store.get(ACCESS_TOKEN_KEY).unwrap(), None);

        let memory = MemorySessionStore::new();
        memory
            .set(ACCESS_TOKEN_KEY, "short", Some(Duration::ZERO))
            .unwrap();
        assert_eq!(memory.get(ACCESS_TOKEN_KEY).unwrap(), None);
    }

    #[test]
    fn test_remove_last_key_deletes_file() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileSessionStore::new(temp_dir.path().join("session.json"));

        store.set(ACCESS_TOKEN_KEY, "a", None).unwrap();
        assert!(store.path().exists());

        store.remove(ACCESS_TOKEN_KEY).unwrap();
        store.remove(ACCESS_TOKEN_KEY).unwrap();
        assert!(!store.path().exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_file_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let store = FileSessionStore::new(temp_dir.path().join("session.json"));
        store.set(REFRESH_TOKEN_KEY, "r", None).unwrap();

        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_memory_store_clones_share_entries() {
        let a = MemorySessionStore::new();
        let b = a.clone();

        a.set(PROFILE_KEY, "{}", None).unwrap();
        assert_eq!(b.get(PROFILE_KEY).unwrap().as_deref(), Some("{}"));
    }
}
