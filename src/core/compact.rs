//! Post-pass compaction of destination collections.
//!
//! `VACUUM` rewrites the collection file; the WAL is then checkpointed with
//! `TRUNCATE` and polled until SQLite reports the checkpoint was not blocked.
//! A collection that never settles is a pipeline-level failure.

use crate::core::category::Category;
use crate::core::error::MigrateError;
use crate::core::store::StoreContext;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
pub struct CompactionPolicy {
    pub poll_interval: Duration,
    pub max_polls: u32,
}

impl Default for CompactionPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(50),
            max_polls: 200,
        }
    }
}

/// Result of one `wal_checkpoint` call: `(busy, log_frames, checkpointed_frames)`.
type CheckpointStatus = (i64, i64, i64);

pub struct Compactor {
    store: Arc<StoreContext>,
    policy: CompactionPolicy,
}

impl Compactor {
    pub fn new(store: Arc<StoreContext>, policy: CompactionPolicy) -> Self {
        Self { store, policy }
    }

    /// Compact one collection and return once its on-disk state has settled.
    pub fn compact(&self, category: Category) -> Result<u32, MigrateError> {
        let path = self.store.collection_path(category);
        let pool = self.store.pool();

        pool.with_write(&path, |conn| {
            conn.execute_batch("VACUUM;")?;
            Ok(())
        })
        .map_err(|e| MigrateError::compaction(category.name(), e))?;

        for attempt in 1..=self.policy.max_polls.max(1) {
            let (busy, log, done): CheckpointStatus = pool
                .with_write(&path, |conn| {
                    Ok(conn.query_row("PRAGMA wal_checkpoint(TRUNCATE);", [], |row| {
                        Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                    })?)
                })
                .map_err(|e| MigrateError::compaction(category.name(), e))?;

            if busy == 0 {
                debug!(
                    category = category.name(),
                    attempt, log, done, "collection compacted"
                );
                return Ok(attempt);
            }
            thread::sleep(self.policy.poll_interval);
        }

        Err(MigrateError::compaction(
            category.name(),
            format!("checkpoint still busy after {} polls", self.policy.max_polls),
        ))
    }
}
