//! Bounded-concurrency executor for read→write record steps.
//!
//! A record's read runs as one task on a fixed-size pool; only once it
//! resolves is the dependent write spawned onto the same pool. Each worker
//! thread runs one task at a time, so the pool size bounds in-flight tasks
//! across all records. Records are independent, so nothing orders one
//! record's tasks against another's.
//!
//! The pool is `min(ceiling, cores * THREADS_PER_CORE)` threads. A ceiling of
//! 500 therefore never means 500 OS threads; writes to one collection are
//! serialized anyway, so extra threads would only park on its lock.
//!
//! Failures are settled per record: logged, counted, and the batch goes on.

use crate::core::category::Category;
use crate::core::document::Document;
use crate::core::error::MigrateError;
use crate::core::sanitize::sanitize;
use crate::core::source::DocumentSource;
use crate::core::writer::DocumentSink;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::Serialize;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use tracing::{error, info};

/// In-flight ceiling used when nothing overrides it.
pub const DEFAULT_CONCURRENCY: usize = 500;

/// Worker threads per core. Tasks block on file and SQLite I/O.
pub const THREADS_PER_CORE: usize = 4;

/// Threads backing a scheduler with the given in-flight ceiling.
pub fn worker_count(ceiling: usize) -> usize {
    let cores = thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    ceiling.min(cores * THREADS_PER_CORE).max(1)
}

/// Lifecycle of one record inside the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    Pending,
    ReadOk,
    ReadFailed,
    WriteOk,
    WriteFailed,
}

impl RecordState {
    pub fn after_read(self, ok: bool) -> RecordState {
        match (self, ok) {
            (RecordState::Pending, true) => RecordState::ReadOk,
            (RecordState::Pending, false) => RecordState::ReadFailed,
            (other, _) => other,
        }
    }

    pub fn after_write(self, ok: bool) -> RecordState {
        match (self, ok) {
            (RecordState::ReadOk, true) => RecordState::WriteOk,
            (RecordState::ReadOk, false) => RecordState::WriteFailed,
            (other, _) => other,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RecordState::ReadFailed | RecordState::WriteOk | RecordState::WriteFailed
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CategoryTotals {
    pub migrated: usize,
    pub read_failed: usize,
    pub write_failed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchTotals {
    pub migrated: usize,
    pub read_failed: usize,
    pub write_failed: usize,
    /// Highest number of tasks observed running at once.
    pub peak_in_flight: usize,
    pub per_category: BTreeMap<Category, CategoryTotals>,
}

impl BatchTotals {
    pub fn failed(&self) -> usize {
        self.read_failed + self.write_failed
    }
}

struct Shared {
    source: Arc<dyn DocumentSource>,
    sink: Arc<dyn DocumentSink>,
    pending: Mutex<usize>,
    drained: Condvar,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    migrated: AtomicUsize,
    tallies: Mutex<BTreeMap<Category, CategoryTotals>>,
}

/// Counts a task as running for as long as it is alive.
struct InFlight<'a>(&'a Shared);

impl<'a> InFlight<'a> {
    fn enter(shared: &'a Shared) -> Self {
        let now = shared.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        shared.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        InFlight(shared)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Shared {
    fn settle(&self, category: Category, id: &str, state: RecordState) {
        debug_assert!(state.is_terminal());
        {
            let mut tallies = self.tallies.lock().unwrap_or_else(|p| p.into_inner());
            let tally = tallies.entry(category).or_default();
            match state {
                RecordState::WriteOk => {
                    tally.migrated += 1;
                    let total = self.migrated.fetch_add(1, Ordering::SeqCst) + 1;
                    info!(category = category.name(), id, migrated = total, "record migrated");
                }
                RecordState::ReadFailed => tally.read_failed += 1,
                RecordState::WriteFailed => tally.write_failed += 1,
                RecordState::Pending | RecordState::ReadOk => {}
            }
        }

        let mut pending = self.pending.lock().unwrap_or_else(|p| p.into_inner());
        *pending -= 1;
        if *pending == 0 {
            self.drained.notify_all();
        }
    }

    fn read(&self, category: Category, id: &str) -> Result<Document, MigrateError> {
        let _slot = InFlight::enter(self);
        panic::catch_unwind(AssertUnwindSafe(|| self.source.read_document(category, id)))
            .unwrap_or_else(|_| Err(MigrateError::source_read(category.name(), id, "reader panicked")))
    }

    fn write(&self, category: Category, id: &str, payload: Document) -> Result<(), MigrateError> {
        let _slot = InFlight::enter(self);
        let sanitized = sanitize(id);
        panic::catch_unwind(AssertUnwindSafe(|| self.sink.upsert(category, &sanitized, payload)))
            .unwrap_or_else(|_| {
                Err(MigrateError::destination_write(category.name(), &sanitized, "writer panicked"))
            })
    }
}

pub struct MigrationScheduler {
    pool: ThreadPool,
    ceiling: usize,
    workers: usize,
    shared: Arc<Shared>,
}

impl MigrationScheduler {
    pub fn new(
        ceiling: usize,
        source: Arc<dyn DocumentSource>,
        sink: Arc<dyn DocumentSink>,
    ) -> Result<Self, MigrateError> {
        if ceiling == 0 {
            return Err(MigrateError::ConfigError(
                "concurrency must be at least 1".to_string(),
            ));
        }
        let workers = worker_count(ceiling);
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("migrate-{}", i))
            .build()
            .map_err(|e| MigrateError::PoolError(e.to_string()))?;

        Ok(Self {
            pool,
            ceiling,
            workers,
            shared: Arc::new(Shared {
                source,
                sink,
                pending: Mutex::new(0),
                drained: Condvar::new(),
                in_flight: AtomicUsize::new(0),
                peak_in_flight: AtomicUsize::new(0),
                migrated: AtomicUsize::new(0),
                tallies: Mutex::new(BTreeMap::new()),
            }),
        })
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Settle a record that cannot be read at all as a read failure.
    pub fn reject(&self, category: Category, raw_id: impl Into<String>, reason: &MigrateError) {
        let id = raw_id.into();
        {
            let mut pending = self.shared.pending.lock().unwrap_or_else(|p| p.into_inner());
            *pending += 1;
        }
        error!(category = category.name(), id = %id, error = %reason, "read failed");
        self.shared
            .settle(category, &id, RecordState::Pending.after_read(false));
    }

    /// Queue one record. Returns without waiting for it to run.
    pub fn submit(&self, category: Category, raw_id: impl Into<String>) {
        let id = raw_id.into();
        {
            let mut pending = self.shared.pending.lock().unwrap_or_else(|p| p.into_inner());
            *pending += 1;
        }

        let shared = Arc::clone(&self.shared);
        self.pool.spawn(move || {
            let state = RecordState::Pending;
            let read = shared.read(category, &id);
            match read {
                Ok(payload) => {
                    let state = state.after_read(true);
                    // Spawned from a pool thread, so the write lands on this pool.
                    rayon::spawn(move || {
                        let state = match shared.write(category, &id, payload) {
                            Ok(()) => state.after_write(true),
                            Err(e) => {
                                error!(category = category.name(), id = %id, error = %e, "write failed");
                                state.after_write(false)
                            }
                        };
                        shared.settle(category, &id, state);
                    });
                }
                Err(e) => {
                    error!(category = category.name(), id = %id, error = %e, "read failed");
                    shared.settle(category, &id, state.after_read(false));
                }
            }
        });
    }

    /// Block until every submitted record has settled, then report totals.
    pub fn drain(&self) -> BatchTotals {
        let mut pending = self.shared.pending.lock().unwrap_or_else(|p| p.into_inner());
        while *pending > 0 {
            pending = self
                .shared
                .drained
                .wait(pending)
                .unwrap_or_else(|p| p.into_inner());
        }
        drop(pending);

        let per_category = self
            .shared
            .tallies
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone();
        BatchTotals {
            migrated: per_category.values().map(|t| t.migrated).sum(),
            read_failed: per_category.values().map(|t| t.read_failed).sum(),
            write_failed: per_category.values().map(|t| t.write_failed).sum(),
            peak_in_flight: self.shared.peak_in_flight.load(Ordering::SeqCst),
            per_category,
        }
    }
}
