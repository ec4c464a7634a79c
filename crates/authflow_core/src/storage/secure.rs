//! Secure backend and its credential-store collaborators.
//!
//! # Responsibility
//! - Adapt a platform credential store (`get_item/set_item/remove_item`) to
//!   the async `StorageAdapter` contract.
//! - Provide the fail-closed sink used when secure storage is refused.
//!
//! # Invariants
//! - Credential values are never logged.
//! - `DisabledStore` never persists anything.

use super::{BackendKind, StorageAdapter, StorageError, StorageResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

/// Platform credential store (keychain, keystore, ...).
///
/// Calls may block; `SecureAdapter` runs them on the blocking pool.
pub trait CredentialStore: Send + Sync {
    fn get_item(&self, key: &str) -> StorageResult<Option<String>>;
    fn set_item(&self, key: &str, value: &str) -> StorageResult<()>;
    fn remove_item(&self, key: &str) -> StorageResult<()>;
}

/// Async adapter over a `CredentialStore`.
#[derive(Clone)]
pub struct SecureAdapter {
    inner: Arc<dyn CredentialStore>,
}

impl SecureAdapter {
    pub fn new(inner: Arc<dyn CredentialStore>) -> Self {
        Self { inner }
    }

    async fn run<T, F>(&self, op: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn CredentialStore) -> StorageResult<T> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || op(inner.as_ref())).await?
    }
}

#[async_trait]
impl StorageAdapter for SecureAdapter {
    fn backend(&self) -> BackendKind {
        BackendKind::Secure
    }

    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let key = key.to_string();
        self.run(move |store| store.get_item(&key)).await
    }

    async fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let key = key.to_string();
        let value = value.to_string();
        self.run(move |store| store.set_item(&key, &value)).await
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        let key = key.to_string();
        self.run(move |store| store.remove_item(&key)).await
    }
}

/// Process-local credential store for tests and the demo flow.
#[derive(Default)]
pub struct MemoryCredentialStore {
    items: Mutex<HashMap<String, String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get_item(&self, key: &str) -> StorageResult<Option<String>> {
        let items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> StorageResult<()> {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> StorageResult<()> {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        items.remove(key);
        Ok(())
    }
}

/// Sandboxed directory credential store, one owner-only file per key.
///
/// Stand-in for the platform keychain on desktop builds of the demo flow.
/// Values are not encrypted here; confidentiality is delegated to the
/// sandbox directory permissions.
pub struct FileCredentialStore {
    dir: PathBuf,
}

impl FileCredentialStore {
    /// Opens the sandbox directory, creating it owner-only when missing.
    pub fn open(dir: impl AsRef<Path>) -> StorageResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        restrict_permissions(&dir, 0o700)?;
        Ok(Self { dir })
    }

    fn item_path(&self, key: &str) -> StorageResult<PathBuf> {
        if !is_valid_item_key(key) {
            return Err(StorageError::Io(io::Error::new(
                ErrorKind::InvalidInput,
                format!("credential key `{key}` must match [A-Za-z0-9._-]+"),
            )));
        }
        Ok(self.dir.join(format!("{key}.cred")))
    }
}

impl CredentialStore for FileCredentialStore {
    fn get_item(&self, key: &str) -> StorageResult<Option<String>> {
        let path = self.item_path(key)?;
        match std::fs::read_to_string(path) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn set_item(&self, key: &str, value: &str) -> StorageResult<()> {
        let path = self.item_path(key)?;
        let tmp_path = self.dir.join(format!(".{key}.{}.tmp", Uuid::new_v4()));
        std::fs::write(&tmp_path, value)?;
        restrict_permissions(&tmp_path, 0o600)?;
        if let Err(err) = std::fs::rename(&tmp_path, &path) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(err.into());
        }
        Ok(())
    }

    fn remove_item(&self, key: &str) -> StorageResult<()> {
        let path = self.item_path(key)?;
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// Fail-closed sink: nothing is ever read back or written.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledStore;

#[async_trait]
impl StorageAdapter for DisabledStore {
    fn backend(&self) -> BackendKind {
        BackendKind::Disabled
    }

    async fn get(&self, _key: &str) -> StorageResult<Option<String>> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: &str) -> StorageResult<()> {
        Err(StorageError::Unavailable(BackendKind::Disabled))
    }

    async fn remove(&self, _key: &str) -> StorageResult<()> {
        Ok(())
    }
}

fn is_valid_item_key(key: &str) -> bool {
    !key.is_empty()
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-')
}

#[cfg(unix)]
fn restrict_permissions(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}
