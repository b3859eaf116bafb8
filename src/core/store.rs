//! Destination store context.
//!
//! One SQLite file per category lives under `root`. The context is built once
//! by the orchestrator and shared (`Arc`) with the writer and the compactor,
//! so nothing in the crate holds a process-wide database handle.

use crate::core::category::Category;
use crate::core::document::Document;
use crate::core::error::MigrateError;
use crate::core::pool::CollectionPool;
use rusqlite::{OptionalExtension, params};
use std::fs;
use std::path::{Path, PathBuf};

/// A persisted record as it sits in a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub id: String,
    pub data: Document,
}

pub struct StoreContext {
    root: PathBuf,
    pool: CollectionPool,
}

impl StoreContext {
    /// Create the destination root if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, MigrateError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            pool: CollectionPool::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn pool(&self) -> &CollectionPool {
        &self.pool
    }

    pub fn collection_path(&self, category: Category) -> PathBuf {
        self.root.join(category.collection_file())
    }

    pub fn get(&self, category: Category, id: &str) -> Result<Option<StoredRecord>, MigrateError> {
        let path = self.collection_path(category);
        let raw: Option<String> = self
            .pool
            .with_read(&path, |conn| {
                Ok(conn
                    .query_row(
                        "SELECT data FROM documents WHERE id = ?1",
                        params![id],
                        |row| row.get(0),
                    )
                    .optional()?)
            })?
            .flatten();
        match raw {
            Some(raw) => Ok(Some(StoredRecord {
                id: id.to_string(),
                data: Document::from_json_str(&raw)?,
            })),
            None => Ok(None),
        }
    }

    /// All records in id order.
    pub fn list(&self, category: Category) -> Result<Vec<StoredRecord>, MigrateError> {
        let path = self.collection_path(category);
        let rows: Vec<(String, String)> = self.pool.with_read(&path, |conn| {
            let mut stmt = conn.prepare("SELECT id, data FROM documents ORDER BY id")?;
            let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
            let mut out = Vec::new();
            for r in rows {
                out.push(r?);
            }
            Ok(out)
        })?
        .unwrap_or_default();
        rows.into_iter()
            .map(|(id, raw)| -> Result<StoredRecord, MigrateError> {
                Ok(StoredRecord {
                    id,
                    data: Document::from_json_str(&raw)?,
                })
            })
            .collect()
    }

    /// Zero for a collection that was never written.
    pub fn count(&self, category: Category) -> Result<i64, MigrateError> {
        let path = self.collection_path(category);
        let count = self.pool.with_read(&path, |conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?)
        })?;
        Ok(count.unwrap_or(0))
    }
}
