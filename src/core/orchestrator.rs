//! Migration orchestrator.
//!
//! Phases:
//! 1. Schedule: walk categories in fixed order, skip absent sources, drop
//!    excluded ids, submit the rest.
//! 2. Drain: wait for every record to settle.
//! 3. Compact: finalize every collection that saw a write attempt.
//!
//! Per-record failures are absorbed by the scheduler. Anything else that
//! fails here (enumeration, compaction) escapes to the caller.

use crate::core::category::{Category, ExclusionFilter};
use crate::core::compact::Compactor;
use crate::core::config::MigrationConfig;
use crate::core::error::MigrateError;
use crate::core::scheduler::{BatchTotals, MigrationScheduler};
use crate::core::source::{DocumentSource, SourceReader};
use crate::core::store::StoreContext;
use crate::core::writer::{DestinationWriter, DocumentSink};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationSummary {
    pub totals: BatchTotals,
    pub scheduled: usize,
    pub excluded: usize,
    pub skipped_categories: Vec<Category>,
    pub compacted_categories: Vec<Category>,
    pub elapsed_ms: u64,
}

pub struct Orchestrator {
    config: MigrationConfig,
    source: Arc<dyn DocumentSource>,
    store: Arc<StoreContext>,
    writer: Arc<DestinationWriter>,
}

impl Orchestrator {
    /// Wire the file-backed reader and the SQLite destination from `config`.
    pub fn new(config: MigrationConfig) -> Result<Self, MigrateError> {
        let source = Arc::new(SourceReader::new(config.source_root.clone()));
        Self::with_source(config, source)
    }

    pub fn with_source(
        config: MigrationConfig,
        source: Arc<dyn DocumentSource>,
    ) -> Result<Self, MigrateError> {
        config.validate()?;
        let store = Arc::new(StoreContext::open(config.destination_root.clone())?);
        let writer = Arc::new(DestinationWriter::new(Arc::clone(&store)));
        Ok(Self {
            config,
            source,
            store,
            writer,
        })
    }

    pub fn store(&self) -> &Arc<StoreContext> {
        &self.store
    }

    pub fn run(&self) -> Result<MigrationSummary, MigrateError> {
        let started = Instant::now();
        let filters = Category::ALL
            .into_iter()
            .map(|c| self.config.exclusion_for(c).map(|filter| (c, filter)))
            .collect::<Result<Vec<_>, MigrateError>>()?;

        let sink: Arc<dyn DocumentSink> = self.writer.clone();
        let scheduler =
            MigrationScheduler::new(self.config.concurrency, Arc::clone(&self.source), sink)?;

        info!(
            source = %self.config.source_root.display(),
            destination = %self.store.root().display(),
            concurrency = scheduler.ceiling(),
            workers = scheduler.workers(),
            "Phase 1: scheduling records"
        );

        let mut summary = MigrationSummary::default();
        let scheduled = self.schedule(&scheduler, &filters, &mut summary);

        info!("Phase 2: draining {} scheduled records", summary.scheduled);
        summary.totals = scheduler.drain();
        // Enumeration failures abort only after in-flight work has settled.
        scheduled?;

        info!("Phase 3: compacting collections");
        let compactor = Compactor::new(Arc::clone(&self.store), self.config.compaction_policy());
        for category in self.writer.touched() {
            let polls = compactor.compact(category)?;
            debug!(category = category.name(), polls, "collection finalized");
            summary.compacted_categories.push(category);
        }

        summary.elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            migrated = summary.totals.migrated,
            failed = summary.totals.failed(),
            excluded = summary.excluded,
            elapsed_ms = summary.elapsed_ms,
            "migration finished"
        );
        Ok(summary)
    }

    fn schedule(
        &self,
        scheduler: &MigrationScheduler,
        filters: &[(Category, ExclusionFilter)],
        summary: &mut MigrationSummary,
    ) -> Result<(), MigrateError> {
        for (category, filter) in filters {
            let category = *category;
            let Some(listing) = self.source.list_ids(category)? else {
                warn!(
                    category = category.name(),
                    "source directory missing, skipping category"
                );
                summary.skipped_categories.push(category);
                continue;
            };

            for name in &listing.unreadable {
                let reason =
                    MigrateError::source_read(category.name(), name, "file name is not valid UTF-8");
                scheduler.reject(category, name.as_str(), &reason);
            }

            let mut submitted = 0usize;
            let mut excluded = 0usize;
            for id in listing.ids {
                if filter.excludes(&id) {
                    debug!(category = category.name(), id = %id, "excluded");
                    excluded += 1;
                    continue;
                }
                scheduler.submit(category, id);
                submitted += 1;
            }

            info!(
                category = category.name(),
                submitted,
                excluded,
                unreadable = listing.unreadable.len(),
                "category scheduled"
            );
            summary.scheduled += submitted;
            summary.excluded += excluded;
        }
        Ok(())
    }
}
