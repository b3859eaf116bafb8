//! Run configuration.
//!
//! Loaded from `docmigrate.toml` when present; every key is optional and a
//! missing file means defaults. CLI flags are layered on top by the caller.

use crate::core::category::{Category, ExclusionFilter};
use crate::core::compact::CompactionPolicy;
use crate::core::error::MigrateError;
use crate::core::scheduler::DEFAULT_CONCURRENCY;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "docmigrate.toml";

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct MigrationConfig {
    pub source_root: PathBuf,
    pub destination_root: PathBuf,
    pub concurrency: usize,
    pub compaction: CompactionConfig,
    /// Category name → regex over raw ids. Empty string disables the default.
    pub exclusions: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompactionConfig {
    pub poll_interval_ms: u64,
    pub max_polls: u32,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        let policy = CompactionPolicy::default();
        Self {
            poll_interval_ms: policy.poll_interval.as_millis() as u64,
            max_polls: policy.max_polls,
        }
    }
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            source_root: PathBuf::from("database"),
            destination_root: PathBuf::from("storage"),
            concurrency: DEFAULT_CONCURRENCY,
            compaction: CompactionConfig::default(),
            exclusions: BTreeMap::new(),
        }
    }
}

impl MigrationConfig {
    /// Load from an explicit file (must exist) or from the default file if present.
    ///
    /// Not validated here: callers layer overrides first, then call `validate`.
    pub fn load(explicit: Option<&Path>) -> Result<Self, MigrateError> {
        let config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, MigrateError> {
        let content = fs::read_to_string(path).map_err(|e| {
            MigrateError::ConfigError(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, MigrateError> {
        toml::from_str(content).map_err(|e| MigrateError::ConfigError(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), MigrateError> {
        if self.concurrency == 0 {
            return Err(MigrateError::ConfigError(
                "concurrency must be at least 1".to_string(),
            ));
        }
        for (name, pattern) in &self.exclusions {
            name.parse::<Category>()?;
            ExclusionFilter::from_pattern(pattern)?;
        }
        Ok(())
    }

    /// Configured override if any, otherwise the category default.
    pub fn exclusion_for(&self, category: Category) -> Result<ExclusionFilter, MigrateError> {
        match self.exclusions.get(category.name()) {
            Some(pattern) => ExclusionFilter::from_pattern(pattern),
            None => ExclusionFilter::for_category(category),
        }
    }

    pub fn compaction_policy(&self) -> CompactionPolicy {
        CompactionPolicy {
            poll_interval: Duration::from_millis(self.compaction.poll_interval_ms),
            max_polls: self.compaction.max_polls,
        }
    }
}
