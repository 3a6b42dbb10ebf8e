//! Isolated environment for running ingestion jobs end to end.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use shelf::db::{book_repo, Database};
use shelf::pipeline::RetryPolicy;
use shelf::{
    BookRecord, BookStatus, FileStorage, IngestRequest, IngestionJob, JobResult, ObjectKey,
    PipelineConfig, RecordError, RecordStore, RecordUpdate, StorageBackend, StorageError,
};

/// Filesystem storage that counts calls and can fail puts with a
/// transient error: the next N, or every put for matching keys.
pub struct TestStorage {
    inner: FileStorage,
    puts: AtomicUsize,
    deletes: AtomicUsize,
    failures_remaining: AtomicU32,
    failing_suffix: Mutex<Option<String>>,
}

impl TestStorage {
    pub fn new(root: &Path) -> Self {
        Self {
            inner: FileStorage::new(root),
            puts: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
            failures_remaining: AtomicU32::new(0),
            failing_suffix: Mutex::new(None),
        }
    }

    pub fn fail_next_puts(&self, count: u32) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    /// Every put whose key hint ends with `suffix` fails from now on.
    pub fn fail_puts_ending_with(&self, suffix: &str) {
        *self.failing_suffix.lock().unwrap() = Some(suffix.to_string());
    }

    /// Put attempts, failed ones included.
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn delete_count(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    pub fn root(&self) -> &Path {
        self.inner.root()
    }
}

#[async_trait]
impl StorageBackend for TestStorage {
    async fn put(&self, key_hint: &str, data: &[u8]) -> Result<ObjectKey, StorageError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        let matches_suffix = self
            .failing_suffix
            .lock()
            .unwrap()
            .as_deref()
            .is_some_and(|suffix| key_hint.ends_with(suffix));
        let failing = matches_suffix
            || self
                .failures_remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
        if failing {
            return Err(StorageError::Transient {
                operation: "put",
                reason: "simulated connection reset".to_string(),
            });
        }
        self.inner.put(key_hint, data).await
    }

    async fn get(&self, key: &ObjectKey) -> Result<Vec<u8>, StorageError> {
        self.inner.get(key).await
    }

    async fn delete(&self, key: &ObjectKey) -> Result<(), StorageError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(key).await
    }
}

/// Interference injected just before the job's final update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordHook {
    None,
    /// The record is deleted by someone else.
    DeleteBeforeCompleted,
    /// Someone else fails the record first.
    FailBeforeCompleted,
}

/// Database-backed record store that logs every applied transition.
pub struct RecordingStore {
    db: Database,
    applied: Mutex<Vec<BookStatus>>,
    hook: RecordHook,
}

impl RecordingStore {
    pub fn new(db: Database, hook: RecordHook) -> Self {
        Self {
            db,
            applied: Mutex::new(Vec::new()),
            hook,
        }
    }

    /// Target status of every update that was applied, in order.
    pub fn applied(&self) -> Vec<BookStatus> {
        self.applied.lock().unwrap().clone()
    }
}

impl RecordStore for RecordingStore {
    fn get_record(&self, id: &str) -> Result<Option<BookRecord>, RecordError> {
        self.db.get_record(id)
    }

    fn update_record(
        &self,
        id: &str,
        update: &RecordUpdate,
        expected: BookStatus,
    ) -> Result<(), RecordError> {
        if update.status == BookStatus::Completed {
            match self.hook {
                RecordHook::None => {}
                RecordHook::DeleteBeforeCompleted => {
                    book_repo::delete(&self.db, id)?;
                }
                RecordHook::FailBeforeCompleted => {
                    self.db.update_record(
                        id,
                        &RecordUpdate::transition(BookStatus::Failed).with_error("cancelled"),
                        BookStatus::Processing,
                    )?;
                }
            }
        }

        self.db.update_record(id, update, expected)?;
        self.applied.lock().unwrap().push(update.status);
        Ok(())
    }
}

pub struct TestHarness {
    temp_dir: TempDir,
    pub uploads_dir: PathBuf,
    pub db: Database,
    pub storage: Arc<TestStorage>,
    pub records: Arc<RecordingStore>,
    pub job: Arc<IngestionJob>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::build(RecordHook::None, |_| {})
    }

    pub fn with_hook(hook: RecordHook) -> Self {
        Self::build(hook, |_| {})
    }

    /// Harness whose pipeline settings are adjusted by `configure`.
    pub fn with_config(configure: impl FnOnce(&mut PipelineConfig)) -> Self {
        Self::build(RecordHook::None, configure)
    }

    fn build(hook: RecordHook, configure: impl FnOnce(&mut PipelineConfig)) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let uploads_dir = temp_dir.path().join("uploads");
        std::fs::create_dir_all(&uploads_dir).expect("Failed to create uploads dir");

        let db = Database::open_in_memory().expect("Failed to open database");
        let storage = Arc::new(TestStorage::new(&temp_dir.path().join("store")));
        let records = Arc::new(RecordingStore::new(db.clone(), hook));

        let mut config = PipelineConfig {
            retry: RetryPolicy::new(3)
                .with_initial_delay(Duration::from_millis(1))
                .with_max_delay(Duration::from_millis(5)),
            ..PipelineConfig::default()
        };
        // Fixtures are judged on their embedded images, whether or not
        // poppler is installed.
        config.parsers.render_pdf_first_page = false;
        configure(&mut config);
        let job = Arc::new(IngestionJob::new(
            Arc::new(config),
            storage.clone(),
            records.clone(),
        ));

        Self {
            temp_dir,
            uploads_dir,
            db,
            storage,
            records,
            job,
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes an upload and creates its `pending` record.
    pub fn upload(&self, filename: &str, content: &[u8]) -> IngestRequest {
        let path = self.uploads_dir.join(filename);
        std::fs::write(&path, content).expect("Failed to write upload");
        let record = book_repo::insert_pending(&self.db, Some(filename), &path)
            .expect("Failed to insert record");
        IngestRequest::from_record(&record)
    }

    pub async fn run(&self, request: &IngestRequest) -> JobResult {
        self.job.run(request.clone()).await
    }

    pub fn record(&self, book_id: &str) -> BookRecord {
        book_repo::find_by_id(&self.db, book_id)
            .expect("Failed to query record")
            .expect("Record should exist")
    }

    pub async fn object(&self, key: &ObjectKey) -> Vec<u8> {
        self.storage.get(key).await.expect("Stored object should exist")
    }

    /// Every file currently in the storage root (excluding directories).
    pub fn stored_files(&self) -> Vec<PathBuf> {
        let root = self.storage.root();
        if !root.exists() {
            return Vec::new();
        }
        walkdir::WalkDir::new(root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .collect()
    }
}
