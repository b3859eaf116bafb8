//! Static category table.
//!
//! Each category maps 1:1 to a source directory and a destination collection.
//! Adding a partition means adding a variant here.

use crate::core::error::MigrateError;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Users,
    Chats,
    Stats,
    Msgs,
    Sticker,
    Settings,
}

impl Category {
    /// Processing order.
    pub const ALL: [Category; 6] = [
        Category::Users,
        Category::Chats,
        Category::Stats,
        Category::Msgs,
        Category::Sticker,
        Category::Settings,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Category::Users => "users",
            Category::Chats => "chats",
            Category::Stats => "stats",
            Category::Msgs => "msgs",
            Category::Sticker => "sticker",
            Category::Settings => "settings",
        }
    }

    /// Directory under the source root.
    pub fn source_dir(self) -> &'static str {
        self.name()
    }

    /// Collection file under the destination root.
    pub fn collection_file(self) -> String {
        format!("{}.db", self.name())
    }

    /// Raw ids this category never migrates, if any.
    ///
    /// Ids are matched both in their native form and in the file-safe form
    /// where `@` was written as `_at_`.
    pub fn default_exclusion(self) -> Option<&'static str> {
        match self {
            Category::Chats => Some(r"^status(?:@|_at_)broadcast$|(?:@|_at_)newsletter$"),
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Category {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.name() == s)
            .ok_or_else(|| MigrateError::ConfigError(format!("unknown category '{}'", s)))
    }
}

/// Per-category id filter evaluated before anything is scheduled.
#[derive(Debug, Clone, Default)]
pub struct ExclusionFilter {
    pattern: Option<Regex>,
}

impl ExclusionFilter {
    pub fn none() -> Self {
        Self { pattern: None }
    }

    /// An empty pattern disables filtering.
    pub fn from_pattern(pattern: &str) -> Result<Self, MigrateError> {
        if pattern.is_empty() {
            return Ok(Self::none());
        }
        let re = Regex::new(pattern)
            .map_err(|e| MigrateError::ConfigError(format!("invalid exclusion '{}': {}", pattern, e)))?;
        Ok(Self { pattern: Some(re) })
    }

    pub fn for_category(category: Category) -> Result<Self, MigrateError> {
        match category.default_exclusion() {
            Some(p) => Self::from_pattern(p),
            None => Ok(Self::none()),
        }
    }

    pub fn excludes(&self, raw_id: &str) -> bool {
        self.pattern.as_ref().is_some_and(|re| re.is_match(raw_id))
    }
}
