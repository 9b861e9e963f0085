//! Persistent key-value store and the cached CRM credential living in it.
//!
//! Persisted as `~/.onetool-scout/storage.json`: one JSON object whose `auth`
//! key holds the [`CachedCredential`] written by `login` and removed by
//! `logout`. Writes are atomic (write-to-temp then rename) so a concurrent
//! reader never observes a partial file.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{info, warn};

use crate::types::CachedCredential;

pub const AUTH_KEY: &str = "auth";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("storage file {path} is not a JSON object: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("could not encode credential: {0}")]
    Encode(#[source] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get_all(&self) -> StoreResult<Map<String, Value>>;

    async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        Ok(self.get_all().await?.remove(key))
    }

    async fn set(&self, key: &str, value: Value) -> StoreResult<()>;

    /// Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> StoreResult<()>;
}

// ─────────────────────────────────────────────────────────────────────────────
// In-memory store
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<Map<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, Map<String, Value>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get_all(&self) -> StoreResult<Map<String, Value>> {
        Ok(self.entries().clone())
    }

    async fn set(&self, key: &str, value: Value) -> StoreResult<()> {
        self.entries().insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> StoreResult<()> {
        self.entries().remove(key);
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// File store
// ─────────────────────────────────────────────────────────────────────────────

/// JSON-object file. Read-modify-write per call; a missing file is an empty
/// store.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> StoreResult<Map<String, Value>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        if content.trim().is_empty() {
            return Ok(Map::new());
        }
        serde_json::from_str(&content).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })
    }

    async fn save(&self, map: &Map<String, Value>) -> StoreResult<()> {
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        let json = serde_json::to_string_pretty(map).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })?;

        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, json).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(io_err)
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get_all(&self) -> StoreResult<Map<String, Value>> {
        self.load().await
    }

    async fn set(&self, key: &str, value: Value) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut map = self.load().await?;
        map.insert(key.to_string(), value);
        self.save(&map).await
    }

    async fn remove(&self, key: &str) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut map = self.load().await?;
        if map.remove(key).is_some() {
            self.save(&map).await?;
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Credential
// ─────────────────────────────────────────────────────────────────────────────

/// Typed view of the `auth` entry.
#[derive(Clone)]
pub struct CredentialStore {
    store: Arc<dyn KeyValueStore>,
}

impl CredentialStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// The cached credential, or `None` when logged out. A malformed entry is
    /// logged and treated as logged out.
    pub async fn load(&self) -> StoreResult<Option<CachedCredential>> {
        let Some(raw) = self.store.get(AUTH_KEY).await? else {
            return Ok(None);
        };
        match serde_json::from_value::<CachedCredential>(raw) {
            Ok(cred) => Ok(Some(cred)),
            Err(e) => {
                warn!("credential_store: ignoring malformed '{}' entry: {}", AUTH_KEY, e);
                Ok(None)
            }
        }
    }

    pub async fn save(&self, credential: &CachedCredential) -> StoreResult<()> {
        let value = serde_json::to_value(credential).map_err(StoreError::Encode)?;
        self.store.set(AUTH_KEY, value).await?;
        info!("credential_store: 🔐 cached credential for {}", credential.user);
        Ok(())
    }

    pub async fn clear(&self) -> StoreResult<()> {
        self.store.remove(AUTH_KEY).await?;
        info!("credential_store: 🗑️  removed cached credential");
        Ok(())
    }
}
