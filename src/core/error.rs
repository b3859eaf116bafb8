use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MigrateError {
    #[error("SQLite error: {0}")]
    RusqliteError(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Pool error: {0}")]
    PoolError(String),
    #[error("Failed to read source document {category}/{id}: {reason}")]
    SourceRead {
        category: String,
        id: String,
        reason: String,
    },
    #[error("Failed to write {category}/{id}: {reason}")]
    DestinationWrite {
        category: String,
        id: String,
        reason: String,
    },
    #[error("Compaction of collection '{category}' failed: {reason}")]
    Compaction { category: String, reason: String },
}

impl MigrateError {
    pub fn source_read(
        category: impl Into<String>,
        id: impl Into<String>,
        reason: impl ToString,
    ) -> Self {
        MigrateError::SourceRead {
            category: category.into(),
            id: id.into(),
            reason: reason.to_string(),
        }
    }

    pub fn destination_write(
        category: impl Into<String>,
        id: impl Into<String>,
        reason: impl ToString,
    ) -> Self {
        MigrateError::DestinationWrite {
            category: category.into(),
            id: id.into(),
            reason: reason.to_string(),
        }
    }

    pub fn compaction(category: impl Into<String>, reason: impl ToString) -> Self {
        MigrateError::Compaction {
            category: category.into(),
            reason: reason.to_string(),
        }
    }

    /// Every error that reaches the entry point aborts the run.
    pub fn exit_code(&self) -> u8 {
        1
    }

    /// Format error with its source chain for terminal output.
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}", self);
        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\n  Caused by ({}): {}", depth, err));
            source = err.source();
            depth += 1;
        }
        output
    }
}

pub type Result<T> = std::result::Result<T, MigrateError>;
