use docmigrate::core::category::Category;
use docmigrate::core::config::MigrationConfig;
use docmigrate::core::document::Document;
use docmigrate::core::error::MigrateError;
use docmigrate::core::orchestrator::Orchestrator;
use docmigrate::core::scheduler::MigrationScheduler;
use docmigrate::core::source::{DocumentSource, SourceListing, SourceReader};
use docmigrate::core::store::StoreContext;
use docmigrate::core::writer::{DestinationWriter, DocumentSink};
use serde_json::{Value, json};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tempfile::{TempDir, tempdir};

fn write_doc(root: &Path, category: &str, id: &str, body: &str) {
    let dir = root.join("src").join(category);
    fs::create_dir_all(&dir).expect("create category dir");
    fs::write(dir.join(format!("{}.json", id)), body).expect("write doc");
}

fn config_for(tmp: &TempDir) -> MigrationConfig {
    MigrationConfig {
        source_root: tmp.path().join("src"),
        destination_root: tmp.path().join("dst"),
        concurrency: 8,
        ..MigrationConfig::default()
    }
}

fn snapshot(store: &StoreContext) -> Vec<(Category, String, Value)> {
    let mut out = Vec::new();
    for category in Category::ALL {
        for rec in store.list(category).expect("list collection") {
            out.push((category, rec.id, Value::from(rec.data)));
        }
    }
    out
}

/// Wraps the real reader and remembers every id it was asked to read.
struct RecordingSource {
    inner: SourceReader,
    reads: Mutex<Vec<(Category, String)>>,
    fail_listing: Option<Category>,
}

impl RecordingSource {
    fn new(root: &Path) -> Self {
        Self {
            inner: SourceReader::new(root),
            reads: Mutex::new(Vec::new()),
            fail_listing: None,
        }
    }
}

impl DocumentSource for RecordingSource {
    fn list_ids(&self, category: Category) -> Result<Option<SourceListing>, MigrateError> {
        if self.fail_listing == Some(category) {
            return Err(MigrateError::IoError(std::io::Error::other("listing denied")));
        }
        self.inner.list_ids(category)
    }

    fn read_document(&self, category: Category, id: &str) -> Result<Document, MigrateError> {
        self.reads
            .lock()
            .unwrap()
            .push((category, id.to_string()));
        self.inner.read_document(category, id)
    }
}

#[test]
fn user_document_is_migrated_with_sanitized_keys() {
    let tmp = tempdir().expect("tempdir");
    write_doc(tmp.path(), "users", "5511999_at_s", r#"{"a.b": 1}"#);

    let orchestrator = Orchestrator::new(config_for(&tmp)).expect("orchestrator");
    let summary = orchestrator.run().expect("run");

    assert_eq!(summary.totals.migrated, 1);
    let rec = orchestrator
        .store()
        .get(Category::Users, "5511999_at_s")
        .expect("get")
        .expect("record present");
    assert_eq!(rec.id, "5511999_at_s");
    assert_eq!(Value::from(rec.data), json!({"a_b": 1}));
}

#[test]
fn excluded_chat_ids_are_never_read_or_written() {
    let tmp = tempdir().expect("tempdir");
    write_doc(tmp.path(), "chats", "status_at_broadcast", r#"{"x": 1}"#);
    write_doc(tmp.path(), "chats", "120363_at_g.us", r#"{"welcome.msg": "hola"}"#);

    let source = Arc::new(RecordingSource::new(&tmp.path().join("src")));
    let orchestrator =
        Orchestrator::with_source(config_for(&tmp), source.clone()).expect("orchestrator");
    let summary = orchestrator.run().expect("run");

    assert_eq!(summary.excluded, 1);
    assert_eq!(summary.totals.migrated, 1);
    let reads = source.reads.lock().unwrap().clone();
    assert!(reads.iter().all(|(_, id)| id != "status_at_broadcast"));

    let store = orchestrator.store();
    assert!(store.get(Category::Chats, "status_at_broadcast").unwrap().is_none());
    let kept = store.get(Category::Chats, "120363_at_g_us").unwrap().expect("kept chat");
    assert_eq!(Value::from(kept.data), json!({"welcome_msg": "hola"}));
}

#[test]
fn existing_record_is_replaced_not_merged() {
    let tmp = tempdir().expect("tempdir");
    write_doc(tmp.path(), "stats", "X", r#"{"hits": 3}"#);

    let store = Arc::new(StoreContext::open(tmp.path().join("dst")).expect("store"));
    DestinationWriter::new(store)
        .upsert(Category::Stats, "X", Document::from(json!({"hits": 1, "legacy": true})))
        .expect("seed");

    let orchestrator = Orchestrator::new(config_for(&tmp)).expect("orchestrator");
    orchestrator.run().expect("run");

    let rec = orchestrator.store().get(Category::Stats, "X").unwrap().unwrap();
    assert_eq!(Value::from(rec.data), json!({"hits": 3}));
}

#[test]
fn missing_category_directory_is_skipped() {
    let tmp = tempdir().expect("tempdir");
    write_doc(tmp.path(), "users", "u1", "{}");
    write_doc(tmp.path(), "sticker", "s1", r#"{"pack.name": "cats"}"#);

    let orchestrator = Orchestrator::new(config_for(&tmp)).expect("orchestrator");
    let summary = orchestrator.run().expect("run must not fail on missing dirs");

    assert!(summary.skipped_categories.contains(&Category::Settings));
    assert!(summary.skipped_categories.contains(&Category::Chats));
    assert_eq!(summary.totals.migrated, 2);
    assert_eq!(
        summary.compacted_categories,
        vec![Category::Users, Category::Sticker]
    );
}

#[test]
fn second_run_converges_to_the_same_state() {
    let tmp = tempdir().expect("tempdir");
    for i in 0..25 {
        write_doc(
            tmp.path(),
            "users",
            &format!("user{}", i),
            &format!(r#"{{"exp": {}, "profile.lang": "es", "tags": [{{"a.b": 1}}]}}"#, i),
        );
    }
    write_doc(tmp.path(), "settings", "bot.main", r#"{"self.only": false}"#);

    let first = Orchestrator::new(config_for(&tmp)).expect("orchestrator");
    first.run().expect("first run");
    let after_first = snapshot(first.store());

    let second = Orchestrator::new(config_for(&tmp)).expect("orchestrator");
    let summary = second.run().expect("second run");
    let after_second = snapshot(second.store());

    assert_eq!(summary.totals.migrated, 26);
    assert_eq!(after_first, after_second);
    assert_eq!(after_first.len(), 26);
    assert!(after_first.iter().any(|(c, id, data)| {
        *c == Category::Settings && id == "bot_main" && data == &json!({"self_only": false})
    }));
}

#[test]
fn malformed_file_does_not_stop_siblings() {
    let tmp = tempdir().expect("tempdir");
    write_doc(tmp.path(), "users", "broken", "{\"exp\": ");
    write_doc(tmp.path(), "users", "ok1", r#"{"exp": 1}"#);
    write_doc(tmp.path(), "msgs", "m1", r#"{"text": "hi"}"#);

    let orchestrator = Orchestrator::new(config_for(&tmp)).expect("orchestrator");
    let summary = orchestrator.run().expect("run tolerates record failures");

    assert_eq!(summary.totals.migrated, 2);
    assert_eq!(summary.totals.read_failed, 1);
    assert_eq!(summary.totals.per_category[&Category::Users].read_failed, 1);
    assert!(orchestrator.store().get(Category::Users, "broken").unwrap().is_none());
    assert!(orchestrator.store().get(Category::Msgs, "m1").unwrap().is_some());
}

#[cfg(unix)]
#[test]
fn non_utf8_file_name_is_counted_as_read_failure() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let tmp = tempdir().expect("tempdir");
    write_doc(tmp.path(), "users", "good", r#"{"exp": 1}"#);
    let dir = tmp.path().join("src").join("users");
    fs::write(dir.join(OsStr::from_bytes(b"bad\xff.json")), "{}").expect("write doc");

    let orchestrator = Orchestrator::new(config_for(&tmp)).expect("orchestrator");
    let summary = orchestrator.run().expect("run tolerates record failures");

    assert_eq!(summary.scheduled, 1);
    assert_eq!(summary.totals.migrated, 1);
    assert_eq!(summary.totals.read_failed, 1);
    assert_eq!(summary.totals.per_category[&Category::Users].read_failed, 1);
    assert_eq!(orchestrator.store().count(Category::Users).unwrap(), 1);
}

#[test]
fn enumeration_failure_escapes_after_drain() {
    let tmp = tempdir().expect("tempdir");
    write_doc(tmp.path(), "users", "u1", "{}");
    write_doc(tmp.path(), "chats", "c1", "{}");

    let mut source = RecordingSource::new(&tmp.path().join("src"));
    source.fail_listing = Some(Category::Chats);
    let orchestrator =
        Orchestrator::with_source(config_for(&tmp), Arc::new(source)).expect("orchestrator");

    let err = orchestrator.run().expect_err("listing failure is fatal");
    assert!(matches!(err, MigrateError::IoError(_)));
    assert_eq!(err.exit_code(), 1);
    // Work scheduled before the failure still landed.
    assert!(orchestrator.store().get(Category::Users, "u1").unwrap().is_some());
}

struct SlowSource {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl SlowSource {
    fn enter(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(3));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl DocumentSource for SlowSource {
    fn list_ids(&self, _: Category) -> Result<Option<SourceListing>, MigrateError> {
        Ok(None)
    }

    fn read_document(&self, _: Category, id: &str) -> Result<Document, MigrateError> {
        self.enter();
        if id.starts_with("bad-read") {
            return Err(MigrateError::source_read("users", id, "unreadable"));
        }
        Ok(Document::from(json!({ "id.copy": id })))
    }
}

/// Shares the in-flight counter with the source so reads and writes count together.
struct SlowSink {
    source: Arc<SlowSource>,
    written: Mutex<HashSet<(Category, String)>>,
}

impl DocumentSink for SlowSink {
    fn upsert(&self, category: Category, id: &str, _: Document) -> Result<(), MigrateError> {
        self.source.enter();
        if id.starts_with("bad-write") {
            return Err(MigrateError::destination_write(category.name(), id, "rejected"));
        }
        self.written
            .lock()
            .unwrap()
            .insert((category, id.to_string()));
        Ok(())
    }
}

#[test]
fn in_flight_tasks_never_exceed_the_ceiling() {
    let source = Arc::new(SlowSource {
        in_flight: AtomicUsize::new(0),
        peak: AtomicUsize::new(0),
    });
    let sink = Arc::new(SlowSink {
        source: source.clone(),
        written: Mutex::new(HashSet::new()),
    });
    let scheduler = MigrationScheduler::new(4, source.clone(), sink.clone()).expect("scheduler");

    for i in 0..120 {
        scheduler.submit(Category::Users, format!("u{}", i));
    }
    let totals = scheduler.drain();

    assert_eq!(totals.migrated, 120);
    assert!(totals.peak_in_flight <= 4, "peak {}", totals.peak_in_flight);
    assert!(source.peak.load(Ordering::SeqCst) <= 4);
    assert!(totals.peak_in_flight >= 1);
}

#[test]
fn read_and_write_failures_are_isolated_per_record() {
    let source = Arc::new(SlowSource {
        in_flight: AtomicUsize::new(0),
        peak: AtomicUsize::new(0),
    });
    let sink = Arc::new(SlowSink {
        source: source.clone(),
        written: Mutex::new(HashSet::new()),
    });
    let scheduler = MigrationScheduler::new(3, source.clone(), sink.clone()).expect("scheduler");

    for category in [Category::Users, Category::Chats] {
        scheduler.submit(category, "bad-read-1");
        scheduler.submit(category, "bad-write.1");
        for i in 0..10 {
            scheduler.submit(category, format!("ok.{}", i));
        }
    }
    let totals = scheduler.drain();

    assert_eq!(totals.migrated, 20);
    assert_eq!(totals.read_failed, 2);
    assert_eq!(totals.write_failed, 2);
    assert_eq!(totals.per_category[&Category::Chats].migrated, 10);

    let written = sink.written.lock().unwrap();
    assert_eq!(written.len(), 20);
    // The sink only ever sees sanitized ids.
    assert!(written.contains(&(Category::Users, "ok_3".to_string())));
}
