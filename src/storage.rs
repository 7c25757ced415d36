use std::{
    collections::HashMap,
    env, io,
    path::PathBuf,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;
use tokio::fs;
use tracing::warn;

const STORAGE_DIR_NAME: &str = ".notice-client";

/// Storage key for the cached list of bookmarked notices (JSON array of
/// canonical notices).
pub const BOOKMARKED_NOTICES_KEY: &str = "bookmarkedNotices";
/// Storage key for the notice-id -> server bookmark-id map (JSON object).
pub const BOOKMARK_ID_MAP_KEY: &str = "bookmarkIdMap";
/// Storage key for the notification inbox (JSON array of canonical notices).
pub const NOTIFICATION_NOTICES_KEY: &str = "notificationNotices";
/// Storage key for the raw bearer token of the signed-in session.
pub const AUTH_TOKEN_KEY: &str = "authToken";

/// String-valued key/value storage, mirroring the mobile storage API the
/// cached data originally lived in. Keys are plain names such as the
/// constants above; values are opaque to the store (the callers decide
/// whether a value is JSON or a raw token).
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Returns the stored value, or `None` when the key has never been set.
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// On-disk store keeping one file per key.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Opens the store in its default location under the user's home
    /// directory, creating the directory on first use.
    pub async fn initialize() -> Result<Self, StorageError> {
        let home = env::var("HOME").map_err(|_| StorageError::HomeDirMissing)?;
        Self::new(PathBuf::from(home).join(STORAGE_DIR_NAME)).await
    }

    /// Opens the store rooted at an explicit directory.
    pub async fn new(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.entry_path(key)).await {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        fs::write(self.entry_path(key), value).await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.entry_path(key)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// In-memory store for tests and ephemeral sessions. Clones share the same
/// underlying map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(|err| err.into_inner())
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries().insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries().remove(key);
        Ok(())
    }
}

/// Reads a JSON value from the store, treating every failure mode as an
/// empty cache: a missing key, an unreadable store and a corrupt entry all
/// yield `None`. Failures are logged, never surfaced, so callers can fall
/// back to the remote copy.
pub(crate) async fn read_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Option<T> {
    let raw = match store.get(key).await {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(err) => {
            warn!("failed to read cached {key}: {err}");
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!("ignoring unreadable cache entry {key}: {err}");
            None
        }
    }
}

pub(crate) async fn write_json<T: Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let data = serde_json::to_string(value)?;
    store.set(key, &data).await
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("HOME environment variable is not set; cannot store data under ~/.notice-client")]
    HomeDirMissing,
    #[error("I/O error while accessing local storage: {0}")]
    Io(#[from] io::Error),
    #[error("Failed to serialize cached data: {0}")]
    Serialization(#[from] serde_json::Error),
}

// -------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_store_round_trips_values() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("cache")).await.unwrap();

        store.set(BOOKMARKED_NOTICES_KEY, "[]").await.unwrap();
        let value = store.get(BOOKMARKED_NOTICES_KEY).await.unwrap();
        assert_eq!(value.as_deref(), Some("[]"));

        store.set(BOOKMARKED_NOTICES_KEY, "[1]").await.unwrap();
        let value = store.get(BOOKMARKED_NOTICES_KEY).await.unwrap();
        assert_eq!(value.as_deref(), Some("[1]"));
    }

    #[tokio::test]
    async fn file_store_reports_missing_keys_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).await.unwrap();

        assert_eq!(store.get("neverSet").await.unwrap(), None);
    }

    #[tokio::test]
    async fn file_store_remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).await.unwrap();

        store.set(AUTH_TOKEN_KEY, "token").await.unwrap();
        store.remove(AUTH_TOKEN_KEY).await.unwrap();
        store.remove(AUTH_TOKEN_KEY).await.unwrap();
        assert_eq!(store.get(AUTH_TOKEN_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn memory_store_clones_share_entries() {
        let store = MemoryStore::new();
        let alias = store.clone();

        store.set("k", "v").await.unwrap();
        assert_eq!(alias.get("k").await.unwrap().as_deref(), Some("v"));

        alias.remove("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn read_json_swallows_corrupt_entries() {
        let store = MemoryStore::new();
        store.set("list", "not json").await.unwrap();

        let value: Option<Vec<String>> = read_json(&store, "list").await;
        assert_eq!(value, None);

        write_json(&store, "list", &vec!["a".to_owned()]).await.unwrap();
        let value: Option<Vec<String>> = read_json(&store, "list").await;
        assert_eq!(value, Some(vec!["a".to_owned()]));
    }
}
