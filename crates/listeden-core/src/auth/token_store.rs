//! Single-slot persistence for the session token.
//!
//! Every backend stores at most one value under [`AUTH_TOKEN_KEY`]. A save
//! replaces the previous value, and "not found" is reported as `Ok(None)`.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use keyring::Entry;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use super::StorageError;
use crate::models::SessionToken;

/// Well-known key the token is stored under
pub const AUTH_TOKEN_KEY: &str = "auth_token";

/// Preferences file name inside the app data directory
const PREFS_FILE: &str = "auth_prefs.json";

/// Distinguishes temporary files of concurrent writes
static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Persist `token`, replacing any existing value.
    async fn save(&self, token: &SessionToken) -> Result<(), StorageError>;

    /// Return the stored token, or `None` when the store is empty.
    async fn read(&self) -> Result<Option<SessionToken>, StorageError>;

    /// Remove the stored token. Clearing an empty store is a no-op.
    async fn clear(&self) -> Result<(), StorageError>;
}

// ============================================================================
// File-backed preferences
// ============================================================================

/// Token store backed by a small JSON preferences file in the app's private
/// data directory.
///
/// Writes go to a temporary file that is renamed over the original, so a
/// reader never observes a half-written file. Saves and clears through the
/// same store (or its clones) are serialized; the last one wins.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl FileTokenStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            path: data_dir.as_ref().join(PREFS_FILE),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load_prefs(&self) -> Result<Option<BTreeMap<String, String>>, StorageError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_prefs(&self, prefs: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let contents = serde_json::to_string_pretty(prefs)?;
        let tmp = self.path.with_extension(format!(
            "json.{}.{}.tmp",
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));

        let written = Self::replace_with(&tmp, &self.path, contents).await;
        if written.is_err() {
            let _ = tokio::fs::remove_file(&tmp).await;
        }
        written
    }

    async fn replace_with(tmp: &Path, path: &Path, contents: String) -> Result<(), StorageError> {
        tokio::fs::write(tmp, contents).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(tmp, std::fs::Permissions::from_mode(0o600)).await?;
        }

        tokio::fs::rename(tmp, path).await?;
        Ok(())
    }

    async fn remove_file(&self) -> Result<(), StorageError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn save(&self, token: &SessionToken) -> Result<(), StorageError> {
        let _write = self.write_lock.lock().await;
        let mut prefs = match self.load_prefs().await {
            Ok(prefs) => prefs.unwrap_or_default(),
            Err(StorageError::Format(e)) => {
                warn!(path = %self.path.display(), error = %e, "Replacing unreadable preferences file");
                BTreeMap::new()
            }
            Err(e) => return Err(e),
        };

        prefs.insert(AUTH_TOKEN_KEY.to_string(), token.as_str().to_string());
        self.write_prefs(&prefs).await?;
        debug!(path = %self.path.display(), "Session token saved");
        Ok(())
    }

    async fn read(&self) -> Result<Option<SessionToken>, StorageError> {
        let prefs = self.load_prefs().await?;
        Ok(prefs
            .and_then(|mut p| p.remove(AUTH_TOKEN_KEY))
            .map(SessionToken::new))
    }

    async fn clear(&self) -> Result<(), StorageError> {
        let _write = self.write_lock.lock().await;
        let mut prefs = match self.load_prefs().await {
            Ok(Some(prefs)) => prefs,
            Ok(None) => return Ok(()),
            Err(StorageError::Format(e)) => {
                warn!(path = %self.path.display(), error = %e, "Removing unreadable preferences file");
                return self.remove_file().await;
            }
            Err(e) => return Err(e),
        };

        if prefs.remove(AUTH_TOKEN_KEY).is_none() {
            return Ok(());
        }

        if prefs.is_empty() {
            self.remove_file().await?;
        } else {
            self.write_prefs(&prefs).await?;
        }
        debug!(path = %self.path.display(), "Session token cleared");
        Ok(())
    }
}

// ============================================================================
// OS keychain
// ============================================================================

/// Token store backed by the OS keychain.
///
/// keyring calls block, so each one runs on the blocking thread pool.
#[derive(Clone)]
pub struct KeyringTokenStore {
    entry: Arc<Entry>,
}

impl KeyringTokenStore {
    pub fn new(service: &str) -> Result<Self, StorageError> {
        let entry = Entry::new(service, AUTH_TOKEN_KEY)?;
        Ok(Self {
            entry: Arc::new(entry),
        })
    }

    async fn run<T, F>(&self, op: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&Entry) -> Result<T, keyring::Error> + Send + 'static,
    {
        let entry = Arc::clone(&self.entry);
        let result = tokio::task::spawn_blocking(move || op(&entry)).await?;
        Ok(result?)
    }
}

#[async_trait]
impl TokenStore for KeyringTokenStore {
    async fn save(&self, token: &SessionToken) -> Result<(), StorageError> {
        let value = token.as_str().to_string();
        self.run(move |entry| entry.set_password(&value)).await
    }

    async fn read(&self) -> Result<Option<SessionToken>, StorageError> {
        self.run(|entry| match entry.get_password() {
            Ok(value) => Ok(Some(SessionToken::new(value))),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e),
        })
        .await
    }

    async fn clear(&self) -> Result<(), StorageError> {
        self.run(|entry| match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e),
        })
        .await
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// Process-local token store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    slot: RwLock<Option<SessionToken>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: SessionToken) -> Self {
        Self {
            slot: RwLock::new(Some(token)),
        }
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn save(&self, token: &SessionToken) -> Result<(), StorageError> {
        *self.slot.write().await = Some(token.clone());
        Ok(())
    }

    async fn read(&self) -> Result<Option<SessionToken>, StorageError> {
        Ok(self.slot.read().await.clone())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        *self.slot.write().await = None;
        Ok(())
    }
}
