use crate::core::error;
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use std::path::Path;
use std::time::Duration;

/// One table per collection file; `data` is the sanitized payload as JSON.
pub const COLLECTION_SCHEMA: &str = "CREATE TABLE IF NOT EXISTS documents (
    id TEXT PRIMARY KEY NOT NULL,
    data TEXT NOT NULL
)";

pub fn db_connect(db_path: &Path, busy_timeout_secs: u64) -> Result<Connection, error::MigrateError> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(Duration::from_secs(busy_timeout_secs))
        .map_err(error::MigrateError::RusqliteError)?;
    conn.query_row("PRAGMA journal_mode=WAL;", [], |_| Ok(()))
        .map_err(error::MigrateError::RusqliteError)?;
    Ok(conn)
}

/// Open an existing collection without creating the file or touching the schema.
pub fn db_connect_read_only(
    db_path: &Path,
    busy_timeout_secs: u64,
) -> Result<Connection, error::MigrateError> {
    let conn = Connection::open_with_flags(
        db_path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    conn.busy_timeout(Duration::from_secs(busy_timeout_secs))?;
    Ok(conn)
}

pub fn has_collection(conn: &Connection) -> Result<bool, error::MigrateError> {
    let found = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'documents'",
            [],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

pub fn ensure_collection(conn: &Connection) -> Result<(), error::MigrateError> {
    conn.execute(COLLECTION_SCHEMA, [])?;
    Ok(())
}
