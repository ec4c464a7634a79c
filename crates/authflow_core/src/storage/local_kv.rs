//! Web plain backend: a synchronous local key/value map.
//!
//! Mirrors browser local storage: every call completes synchronously and the
//! async methods only exist for interface uniformity. When opened with a
//! file path, the whole map is mirrored to one JSON document after each
//! write.

use super::{BackendKind, StorageAdapter, StorageResult};
use async_trait::async_trait;
use log::warn;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use uuid::Uuid;

/// Local key/value map with optional JSON file mirroring.
pub struct LocalKvStore {
    entries: Mutex<BTreeMap<String, String>>,
    mirror_path: Option<PathBuf>,
}

impl LocalKvStore {
    /// Creates a volatile store that lives for the process only.
    pub fn in_memory() -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            mirror_path: None,
        }
    }

    /// Opens a store mirrored to `path`.
    ///
    /// An unreadable or corrupt mirror file starts an empty map instead of
    /// failing; the next write replaces the file.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let entries = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<BTreeMap<String, String>>(&raw) {
                Ok(entries) => entries,
                Err(err) => {
                    warn!(
                        "event=local_kv_open module=storage status=fallback path={} error_code=corrupt_mirror error={}",
                        path.display(),
                        err
                    );
                    BTreeMap::new()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(err.into()),
        };

        Ok(Self {
            entries: Mutex::new(entries),
            mirror_path: Some(path),
        })
    }

    fn get_sync(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    fn set_sync(&self, key: &str, value: &str) -> StorageResult<()> {
        let mut entries = self.lock();
        entries.insert(key.to_string(), value.to_string());
        self.write_mirror(&entries)
    }

    fn remove_sync(&self, key: &str) -> StorageResult<()> {
        let mut entries = self.lock();
        if entries.remove(key).is_none() {
            return Ok(());
        }
        self.write_mirror(&entries)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_mirror(&self, entries: &BTreeMap<String, String>) -> StorageResult<()> {
        let Some(path) = self.mirror_path.as_deref() else {
            return Ok(());
        };

        let encoded = serde_json::to_vec(entries)?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "local_kv".to_string());
        let tmp_path = path.with_file_name(format!(".{file_name}.{}.tmp", Uuid::new_v4()));

        std::fs::write(&tmp_path, encoded)?;
        if let Err(err) = std::fs::rename(&tmp_path, path) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(err.into());
        }
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for LocalKvStore {
    fn backend(&self) -> BackendKind {
        BackendKind::WebLocal
    }

    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.get_sync(key))
    }

    async fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.set_sync(key, value)
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        self.remove_sync(key)
    }
}

#[cfg(test)]
mod tests {
    use super::LocalKvStore;
    use crate::storage::StorageAdapter;

    #[tokio::test]
    async fn in_memory_store_round_trips_values() {
        let store = LocalKvStore::in_memory();
        store.set("a", "1").await.expect("set");
        assert_eq!(store.get("a").await.expect("get").as_deref(), Some("1"));
        store.remove("a").await.expect("remove");
        assert_eq!(store.get("a").await.expect("get after remove"), None);
    }

    #[tokio::test]
    async fn mirror_file_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("web").join("local_storage.json");

        let first = LocalKvStore::open(&path).expect("open");
        first.set("session-storage", "{}").await.expect("set");
        drop(first);

        let second = LocalKvStore::open(&path).expect("reopen");
        assert_eq!(
            second.get("session-storage").await.expect("get").as_deref(),
            Some("{}")
        );
    }

    #[tokio::test]
    async fn corrupt_mirror_starts_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("local_storage.json");
        std::fs::write(&path, "not json").expect("seed corrupt file");

        let store = LocalKvStore::open(&path).expect("open should tolerate corrupt mirror");
        assert_eq!(store.get("anything").await.expect("get"), None);
    }
}
