//! Native plain backend over a SQLite key/value table.
//!
//! # Invariants
//! - One row per key; `set` replaces the previous value.
//! - SQLite calls never run on the async task; they move to the blocking pool.

use super::{BackendKind, StorageAdapter, StorageResult};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

mod schema;

pub use schema::latest_schema_version;

/// SQLite-backed plain key/value store.
#[derive(Clone)]
pub struct SqliteKvStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteKvStore {
    /// Opens (or creates) the database file and upgrades its schema.
    ///
    /// # Errors
    /// - `SchemaTooNew` when the file was written by a newer build.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let conn = schema::connect_file(path.as_ref())?;
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = schema::connect_memory()?;
        Ok(Self::from_connection(conn))
    }

    /// Schema version recorded in the open database.
    pub async fn schema_version(&self) -> StorageResult<u32> {
        self.run(schema::schema_version).await
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    async fn run<T, F>(&self, op: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let result = tokio::task::spawn_blocking(move || {
            let guard = conn.lock().unwrap_or_else(PoisonError::into_inner);
            op(&guard)
        })
        .await?;
        Ok(result?)
    }
}

#[async_trait]
impl StorageAdapter for SqliteKvStore {
    fn backend(&self) -> BackendKind {
        BackendKind::NativeKv
    }

    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let key = key.to_string();
        self.run(move |conn| {
            conn.query_row(
                "SELECT value FROM kv_entries WHERE key = ?1;",
                [key.as_str()],
                |row| row.get::<_, String>(0),
            )
            .optional()
        })
        .await
    }

    async fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let key = key.to_string();
        let value = value.to_string();
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO kv_entries (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    updated_at = (strftime('%s', 'now') * 1000);",
                params![key, value],
            )
            .map(|_| ())
        })
        .await
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        let key = key.to_string();
        self.run(move |conn| {
            conn.execute("DELETE FROM kv_entries WHERE key = ?1;", [key.as_str()])
                .map(|_| ())
        })
        .await
    }
}
