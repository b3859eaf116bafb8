//! Reader for the legacy flat-file store.
//!
//! Layout: `<root>/<category>/<id>.json`, one document per file. A missing
//! file is a sparse document, not an error.

use crate::core::category::Category;
use crate::core::document::Document;
use crate::core::error::MigrateError;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const DOCUMENT_EXT: &str = "json";

/// Everything found in one category directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceListing {
    pub ids: Vec<String>,
    /// `*.json` files whose names are not valid UTF-8, lossily decoded.
    /// They cannot be addressed by id, so each one is a failed record.
    pub unreadable: Vec<String>,
}

impl From<Vec<String>> for SourceListing {
    fn from(ids: Vec<String>) -> Self {
        Self {
            ids,
            unreadable: Vec::new(),
        }
    }
}

/// Where the orchestrator enumerates ids and the scheduler pulls payloads.
pub trait DocumentSource: Send + Sync {
    /// Entries present for a category, or `None` when the category has no source at all.
    fn list_ids(&self, category: Category) -> Result<Option<SourceListing>, MigrateError>;

    fn read_document(&self, category: Category, id: &str) -> Result<Document, MigrateError>;
}

#[derive(Debug, Clone)]
pub struct SourceReader {
    root: PathBuf,
}

impl SourceReader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn category_dir(&self, category: Category) -> PathBuf {
        self.root.join(category.source_dir())
    }

    pub fn document_path(&self, category: Category, id: &str) -> PathBuf {
        self.category_dir(category)
            .join(format!("{}.{}", id, DOCUMENT_EXT))
    }
}

impl DocumentSource for SourceReader {
    /// Sorted ids for every `*.json` file, or `None` if the directory is absent.
    fn list_ids(&self, category: Category) -> Result<Option<SourceListing>, MigrateError> {
        let dir = self.category_dir(category);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(MigrateError::IoError(e)),
        };

        let mut listing = SourceListing::default();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(DOCUMENT_EXT) {
                continue;
            }
            let Some(stem) = path.file_stem() else {
                continue;
            };
            match stem.to_str() {
                Some(id) => listing.ids.push(id.to_string()),
                None => listing.unreadable.push(stem.to_string_lossy().into_owned()),
            }
        }
        listing.ids.sort();
        listing.unreadable.sort();
        Ok(Some(listing))
    }

    fn read_document(&self, category: Category, id: &str) -> Result<Document, MigrateError> {
        let path = self.document_path(category, id);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Document::empty()),
            Err(e) => return Err(MigrateError::source_read(category.name(), id, e)),
        };
        Document::from_json_str(&raw).map_err(|e| MigrateError::source_read(category.name(), id, e))
    }
}
