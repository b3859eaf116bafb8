use crate::core::category::Category;
use crate::core::document::Document;
use crate::core::error::MigrateError;
use crate::core::sanitize::sanitize_object;
use crate::core::store::StoreContext;
use rusqlite::params;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

/// Anything the scheduler can hand a read result to.
pub trait DocumentSink: Send + Sync {
    fn upsert(&self, category: Category, sanitized_id: &str, payload: Document) -> Result<(), MigrateError>;
}

/// Replace-or-insert writer over the destination collections.
///
/// A second upsert for the same id fully overwrites the first, which is what
/// makes re-running the whole pipeline converge.
pub struct DestinationWriter {
    store: Arc<StoreContext>,
    touched: Mutex<BTreeSet<Category>>,
}

impl DestinationWriter {
    pub fn new(store: Arc<StoreContext>) -> Self {
        Self {
            store,
            touched: Mutex::new(BTreeSet::new()),
        }
    }

    /// Categories that saw at least one upsert attempt, in processing order.
    pub fn touched(&self) -> Vec<Category> {
        match self.touched.lock() {
            Ok(set) => set.iter().copied().collect(),
            Err(poisoned) => poisoned.into_inner().iter().copied().collect(),
        }
    }

    fn mark_touched(&self, category: Category) {
        match self.touched.lock() {
            Ok(mut set) => {
                set.insert(category);
            }
            Err(poisoned) => {
                poisoned.into_inner().insert(category);
            }
        }
    }
}

impl DocumentSink for DestinationWriter {
    fn upsert(&self, category: Category, sanitized_id: &str, payload: Document) -> Result<(), MigrateError> {
        self.mark_touched(category);

        let data = sanitize_object(payload)
            .to_json_string()
            .map_err(|e| MigrateError::destination_write(category.name(), sanitized_id, e))?;
        let path = self.store.collection_path(category);

        self.store
            .pool()
            .with_write(&path, |conn| {
                conn.execute(
                    "INSERT INTO documents(id, data) VALUES(?1, ?2)
                     ON CONFLICT(id) DO UPDATE SET data = excluded.data",
                    params![sanitized_id, data],
                )?;
                Ok(())
            })
            .map_err(|e| MigrateError::destination_write(category.name(), sanitized_id, e))
    }
}
