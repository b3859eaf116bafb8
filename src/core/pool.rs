//! Per-collection SQLite access with serialized writes and busy retries.
//!
//! - Each collection has exactly one write connection, opened lazily and held
//!   behind a mutex; writes to different collections proceed in parallel.
//! - Reads open a fresh read-only connection without taking the mutex (WAL
//!   readers). A collection that was never written reads as absent.

use crate::core::db;
use crate::core::error::MigrateError;
use rusqlite::Connection;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Maximum retry attempts for busy/locked errors.
const MAX_RETRIES: u32 = 5;
/// Base delay for exponential backoff (milliseconds).
const BASE_DELAY_MS: u64 = 20;
/// Maximum delay cap (milliseconds).
const MAX_DELAY_MS: u64 = 2_000;

const WRITE_BUSY_TIMEOUT_SECS: u64 = 30;
const READ_BUSY_TIMEOUT_SECS: u64 = 15;

type WriteSlot = Arc<Mutex<Option<Connection>>>;

#[derive(Default)]
pub struct CollectionPool {
    writers: Mutex<HashMap<PathBuf, WriteSlot>>,
}

impl CollectionPool {
    pub fn new() -> Self {
        Self::default()
    }

    fn write_slot(&self, db_path: &Path) -> Result<WriteSlot, MigrateError> {
        let mut writers = self
            .writers
            .lock()
            .map_err(|_| MigrateError::PoolError("collection lock table poisoned".to_string()))?;
        Ok(writers
            .entry(db_path.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone())
    }

    /// Run `f` on a write connection, retrying busy/locked failures.
    pub fn with_write<F, R>(&self, db_path: &Path, mut f: F) -> Result<R, MigrateError>
    where
        F: FnMut(&Connection) -> Result<R, MigrateError>,
    {
        let slot = self.write_slot(db_path)?;
        let mut guard = slot
            .lock()
            .map_err(|_| MigrateError::PoolError("collection write lock poisoned".to_string()))?;

        if guard.is_none() {
            let conn = db::db_connect(db_path, WRITE_BUSY_TIMEOUT_SECS)?;
            db::ensure_collection(&conn)?;
            *guard = Some(conn);
        }
        let conn = guard
            .as_ref()
            .ok_or_else(|| MigrateError::PoolError("write connection missing".to_string()))?;

        retry_on_busy(|| f(conn))
    }

    /// Run `f` on a read-only connection, or return `None` if the collection
    /// file or its table does not exist yet.
    pub fn with_read<F, R>(&self, db_path: &Path, f: F) -> Result<Option<R>, MigrateError>
    where
        F: FnOnce(&Connection) -> Result<R, MigrateError>,
    {
        if !db_path.exists() {
            return Ok(None);
        }
        let conn = db::db_connect_read_only(db_path, READ_BUSY_TIMEOUT_SECS)?;
        if !db::has_collection(&conn)? {
            return Ok(None);
        }
        f(&conn).map(Some)
    }
}

/// Retry a closure on `SQLITE_BUSY` / `SQLITE_LOCKED` with exponential backoff.
pub fn retry_on_busy<F, R>(mut f: F) -> Result<R, MigrateError>
where
    F: FnMut() -> Result<R, MigrateError>,
{
    let mut attempt = 0u32;
    loop {
        match f() {
            Ok(v) => return Ok(v),
            Err(e) if is_busy_error(&e) && attempt < MAX_RETRIES => {
                attempt += 1;
                let delay_ms = (BASE_DELAY_MS * 2u64.pow(attempt - 1)).min(MAX_DELAY_MS);
                thread::sleep(Duration::from_millis(delay_ms));
            }
            Err(e) => return Err(e),
        }
    }
}

pub fn is_busy_error(err: &MigrateError) -> bool {
    match err {
        MigrateError::RusqliteError(rusqlite::Error::SqliteFailure(code, _)) => matches!(
            code.code,
            rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
        ),
        _ => false,
    }
}
