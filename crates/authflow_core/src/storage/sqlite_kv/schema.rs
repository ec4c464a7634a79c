//! Connection setup and schema upgrades for the `kv_entries` database.
//!
//! # Invariants
//! - Step `n` of `SCHEMA_STEPS` produces schema version `n + 1`, mirrored
//!   to `PRAGMA user_version`.
//! - A connection is handed out only after every pending step committed.
//! - A database written by a newer build is refused, never downgraded.

use crate::storage::{StorageError, StorageResult};
use log::{error, info};
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

const SCHEMA_STEPS: &[&str] = &[include_str!("0001_kv_entries.sql")];
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Schema version produced by this build.
pub fn latest_schema_version() -> u32 {
    SCHEMA_STEPS.len() as u32
}

pub(super) fn connect_file(path: &Path) -> StorageResult<Connection> {
    connect("file", || Connection::open(path), true)
}

pub(super) fn connect_memory() -> StorageResult<Connection> {
    connect("memory", Connection::open_in_memory, false)
}

pub(super) fn schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
}

fn connect(
    mode: &str,
    open: impl FnOnce() -> rusqlite::Result<Connection>,
    wal: bool,
) -> StorageResult<Connection> {
    let started_at = Instant::now();
    let result = open()
        .map_err(StorageError::from)
        .and_then(|mut conn| prepare(&mut conn, wal).map(|()| conn));

    match &result {
        Ok(_) => info!(
            "event=kv_db_open module=storage status=ok mode={mode} duration_ms={} schema_version={}",
            started_at.elapsed().as_millis(),
            latest_schema_version()
        ),
        Err(err) => error!(
            "event=kv_db_open module=storage status=error mode={mode} duration_ms={} error={}",
            started_at.elapsed().as_millis(),
            err
        ),
    }
    result
}

fn prepare(conn: &mut Connection, wal: bool) -> StorageResult<()> {
    if wal {
        // journal_mode answers with a row, so execute_batch would reject it.
        conn.query_row("PRAGMA journal_mode = WAL;", [], |_| Ok(()))?;
    }
    conn.busy_timeout(BUSY_TIMEOUT)?;
    upgrade(conn)
}

fn upgrade(conn: &mut Connection) -> StorageResult<()> {
    let found = schema_version(conn)?;
    let supported = latest_schema_version();
    if found > supported {
        return Err(StorageError::SchemaTooNew { found, supported });
    }

    let pending = SCHEMA_STEPS.iter().zip(1u32..).skip(found as usize);
    let tx = conn.transaction()?;
    for (sql, version) in pending {
        tx.execute_batch(sql)?;
        tx.pragma_update(None, "user_version", version)?;
    }
    tx.commit()?;
    Ok(())
}
