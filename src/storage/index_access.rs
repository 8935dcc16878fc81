//! Per-index access: one writer, one published reader snapshot.
//!
//! [`IndexAccess`] wraps the [`IndexWriter`] of one index together with the
//! snapshot readers currently see, the logical write timestamps of the
//! command layer, the outstanding backup handle and the wall-clock time of
//! the last commit.
//!
//! # Locking
//!
//! The per-index read-write lock is used in an inverted sense. Writes,
//! commits, backups and queries all take the *shared* side because the
//! writer is safe for concurrent use. Only [`IndexAccess::drop_index`] takes
//! the *exclusive* side: it waits for every in-flight call to finish and
//! blocks new ones, which then observe the dropped state.
//!
//! # Timestamps
//!
//! `write_timestamp` is advanced by the command layer before writes.
//! `committed_timestamp` is the write timestamp captured when the last
//! commit started. It is stored in the commit's user data under
//! [`COMMITTED_TIMESTAMP_KEY`] and restored when the index is reopened.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use arc_swap::ArcSwap;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use crate::clock::Clock;
use crate::config::Parameters;
use crate::engine::commit::CommitHandle;
use crate::engine::directory::Directory;
use crate::engine::inverted::StoredField;
use crate::engine::merge::{MergeScheduler, TieredMergePolicy};
use crate::engine::query::Query;
use crate::engine::snapshot::{Hit, IndexSnapshot};
use crate::engine::writer::{IndexWriter, WriterConfig};
use crate::error::{LucernaError, Result};
use crate::storage::index_config::{IndexConfig, IndexKind};
use crate::storage::query_spec::QuerySpec;
use crate::storage::text_index::TextIndex;
use crate::storage::vector_index::VectorIndex;
use crate::storage::write_batch::WriteBatch;

/// User-data key holding the committed logical timestamp.
pub const COMMITTED_TIMESTAMP_KEY: &str = "lastCommittedTimestamp";

/// Variant-specific part of an index.
#[derive(Debug, Clone)]
pub enum IndexVariant {
    Vector(VectorIndex),
    Text(TextIndex),
}

impl IndexVariant {
    pub fn from_config(config: &IndexConfig) -> Result<Self> {
        match (&config.hnsw_config, &config.search_config) {
            (Some(vector), None) => Ok(IndexVariant::Vector(VectorIndex::new(vector)?)),
            (None, Some(text)) => Ok(IndexVariant::Text(TextIndex::new(text)?)),
            _ => Err(LucernaError::config("unknown index config type")),
        }
    }

    pub fn kind(&self) -> IndexKind {
        match self {
            IndexVariant::Vector(_) => IndexKind::Vector,
            IndexVariant::Text(_) => IndexKind::Text,
        }
    }
}

/// Lifecycle state of an index handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum IndexState {
    Open,
    BackupActive,
    Dropped,
}

/// Point-in-time statistics of one index.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    pub name: String,
    pub kind: IndexKind,
    pub num_docs: u64,
    pub num_segments: usize,
    pub generation: u64,
    pub ram_bytes: u64,
    pub last_commit_millis: u64,
    pub write_ts: u64,
    pub committed_ts: u64,
    pub state: IndexState,
}

/// Handle to one open index of the catalog.
#[derive(Debug)]
pub struct IndexAccess {
    name: String,
    config: IndexConfig,
    variant: IndexVariant,
    writer: IndexWriter,
    reader: ArcSwap<IndexSnapshot>,
    lock: RwLock<()>,
    clock: Arc<dyn Clock>,
    last_commit_millis: AtomicU64,
    last_write_timestamp: AtomicU64,
    last_committed_timestamp: AtomicU64,
    backup: Mutex<Option<CommitHandle>>,
    dropped: AtomicBool,
}

impl IndexAccess {
    /// Open (or create) the index described by `config` under `root`.
    pub fn open(
        config: IndexConfig,
        root: &Path,
        params: &Parameters,
        clock: Arc<dyn Clock>,
        merge_scheduler: Arc<MergeScheduler>,
    ) -> Result<Self> {
        let variant = IndexVariant::from_config(&config)?;
        let (schema, max_merged_bytes) = match &variant {
            IndexVariant::Vector(vector) => (vector.schema(), vector.max_merged_segment_bytes(params)),
            IndexVariant::Text(text) => (text.schema(), text.max_merged_segment_bytes(params)),
        };
        let writer_config = WriterConfig {
            ram_buffer_bytes: params.ram_buffer_bytes_per_index(),
            merge_policy: TieredMergePolicy::new(max_merged_bytes),
        };

        let directory = Directory::open(root.join(&config.path))?;
        let writer = IndexWriter::open(directory, schema, writer_config, merge_scheduler)?;
        let snapshot = writer.snapshot();

        let committed = match snapshot.user_data().get(COMMITTED_TIMESTAMP_KEY) {
            Some(value) => value.parse::<u64>().map_err(|_| {
                LucernaError::corruption(format!(
                    "index {}: bad {COMMITTED_TIMESTAMP_KEY} {value:?}",
                    config.name
                ))
            })?,
            None => 0,
        };

        tracing::info!(
            index = %config.name,
            kind = %variant.kind(),
            docs = snapshot.num_docs(),
            committed_ts = committed,
            "opened index"
        );

        Ok(IndexAccess {
            name: config.name.clone(),
            config,
            variant,
            writer,
            reader: ArcSwap::new(snapshot),
            lock: RwLock::new(()),
            last_commit_millis: AtomicU64::new(clock.millis()),
            clock,
            last_write_timestamp: AtomicU64::new(committed),
            last_committed_timestamp: AtomicU64::new(committed),
            backup: Mutex::new(None),
            dropped: AtomicBool::new(false),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn kind(&self) -> IndexKind {
        self.variant.kind()
    }

    pub fn variant(&self) -> &IndexVariant {
        &self.variant
    }

    pub fn directory(&self) -> &Path {
        self.writer.directory().path()
    }

    /// Apply every operation of `batch` in order.
    ///
    /// All operations are checked before the first one is applied, so an
    /// invalid operation leaves the index untouched. With auto-commit the
    /// batch is committed and made visible before returning.
    pub fn batch_write(&self, batch: &WriteBatch) -> Result<()> {
        let _guard = self.lock.read();
        self.ensure_live()?;

        for op in batch.ops() {
            match &self.variant {
                IndexVariant::Vector(vector) => vector.validate(op)?,
                IndexVariant::Text(text) => text.validate(op)?,
            }
        }

        for op in batch.ops() {
            let doc = match &self.variant {
                IndexVariant::Vector(vector) => vector.to_document(op),
                IndexVariant::Text(text) => text.to_document(op),
            };
            match doc {
                Some(doc) if op.is_insert() => self.writer.add_document(doc)?,
                Some(doc) => self.writer.update_document(op.id(), doc)?,
                None => self.writer.delete_documents(op.id())?,
            }
        }

        if batch.is_auto_commit() {
            self.commit_locked()?;
        }
        Ok(())
    }

    /// Commit pending writes and publish the new snapshot to readers.
    pub fn commit_and_refresh_reader(&self) -> Result<()> {
        let _guard = self.lock.read();
        self.ensure_live()?;
        self.commit_locked()
    }

    fn commit_locked(&self) -> Result<()> {
        let mut write_ts = 0;
        let snapshot = self.writer.commit_with(|previous| {
            // Never persist a timestamp below the one already committed.
            let committed = previous
                .get(COMMITTED_TIMESTAMP_KEY)
                .and_then(|value| value.parse::<u64>().ok())
                .unwrap_or(0);
            write_ts = self.last_write_timestamp.load(Ordering::SeqCst).max(committed);
            let mut user_data = BTreeMap::new();
            user_data.insert(COMMITTED_TIMESTAMP_KEY.to_string(), write_ts.to_string());
            user_data
        })?;
        self.last_committed_timestamp.fetch_max(write_ts, Ordering::SeqCst);
        self.last_commit_millis.store(self.clock.millis(), Ordering::SeqCst);

        // Concurrent commits may finish out of order; keep the newest.
        self.reader.rcu(|current| {
            if current.generation() >= snapshot.generation() {
                Arc::clone(current)
            } else {
                Arc::clone(&snapshot)
            }
        });
        tracing::debug!(
            index = %self.name,
            generation = snapshot.generation(),
            committed_ts = write_ts,
            "committed index"
        );
        Ok(())
    }

    /// Retain the current commit and return its files, relative to
    /// [`IndexAccess::directory`].
    pub fn begin_backup(&self) -> Result<Vec<String>> {
        let _guard = self.lock.read();
        self.ensure_live()?;

        let mut backup = self.backup.lock();
        if backup.is_some() {
            return Err(LucernaError::backup_conflict(&self.name));
        }
        let handle = self.writer.snapshot_commit()?;
        let files = handle.files().to_vec();
        tracing::info!(
            index = %self.name,
            generation = handle.generation(),
            files = files.len(),
            "backup started"
        );
        *backup = Some(handle);
        Ok(files)
    }

    /// Release the outstanding backup, if any.
    pub fn end_backup(&self) -> Result<()> {
        let _guard = self.lock.read();
        self.ensure_live()?;
        self.release_backup();
        Ok(())
    }

    fn release_backup(&self) {
        if let Some(handle) = self.backup.lock().take() {
            self.writer.release_commit(&handle);
            tracing::info!(index = %self.name, generation = handle.generation(), "backup ended");
        }
    }

    /// Raise the logical write timestamp to `ts`.
    pub fn advance_write_timestamp(&self, ts: u64) -> Result<()> {
        self.ensure_live()?;
        let mut current = self.last_write_timestamp.load(Ordering::SeqCst);
        loop {
            if ts < current {
                return Err(LucernaError::MonotonicityViolation {
                    index: self.name.clone(),
                    current,
                    requested: ts,
                });
            }
            match self.last_write_timestamp.compare_exchange(
                current,
                ts,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return Ok(()),
                Err(actual) => current = actual,
            }
        }
    }

    /// Whether [`IndexAccess::advance_write_timestamp`] would accept `ts` now.
    pub fn check_write_timestamp(&self, ts: u64) -> Result<()> {
        self.ensure_live()?;
        let current = self.last_write_timestamp.load(Ordering::SeqCst);
        if ts < current {
            return Err(LucernaError::MonotonicityViolation {
                index: self.name.clone(),
                current,
                requested: ts,
            });
        }
        Ok(())
    }

    pub fn committed_timestamp(&self) -> u64 {
        self.last_committed_timestamp.load(Ordering::SeqCst)
    }

    pub fn write_timestamp(&self) -> u64 {
        self.last_write_timestamp.load(Ordering::SeqCst)
    }

    /// Wall-clock millis of the last commit (or of opening the index).
    pub fn last_commit_millis(&self) -> u64 {
        self.last_commit_millis.load(Ordering::SeqCst)
    }

    /// Bytes of buffered, uncommitted data. Zero once dropped.
    pub fn ram_bytes_used(&self) -> u64 {
        let _guard = self.lock.read();
        if self.is_dropped() {
            return 0;
        }
        self.writer.ram_bytes_used()
    }

    /// Snapshot currently visible to readers.
    pub fn snapshot(&self) -> Result<Arc<IndexSnapshot>> {
        self.ensure_live()?;
        Ok(self.reader.load_full())
    }

    /// Stored text fields of a document, as of the last commit.
    pub fn stored_fields(&self, id: &str) -> Result<Option<Vec<StoredField>>> {
        Ok(self.snapshot()?.stored_fields(id))
    }

    /// Ids of the `k` nearest neighbours of `query`.
    pub fn knn(&self, query: &[f32], k: usize, candidates: usize) -> Result<Vec<String>> {
        Ok(self
            .knn_hits(query, k, candidates)?
            .into_iter()
            .map(|hit| hit.id)
            .collect())
    }

    /// Like [`IndexAccess::knn`], with scores.
    pub fn knn_hits(&self, query: &[f32], k: usize, candidates: usize) -> Result<Vec<Hit>> {
        let _guard = self.lock.read();
        self.ensure_live()?;
        let IndexVariant::Vector(vector) = &self.variant else {
            return Err(self.kind_mismatch(IndexKind::Vector));
        };
        if k == 0 || candidates < k {
            return Err(LucernaError::invalid_argument(format!(
                "need 0 < k <= candidates, got k={k} candidates={candidates}"
            )));
        }
        vector.check_dimensions(query)?;
        self.reader.load().knn(query, k, candidates)
    }

    /// Ids of the best `limit` matches of `query`.
    pub fn search(&self, query: &Query, limit: usize) -> Result<Vec<String>> {
        Ok(self
            .search_hits(query, limit)?
            .into_iter()
            .map(|hit| hit.id)
            .collect())
    }

    pub fn search_hits(&self, query: &Query, limit: usize) -> Result<Vec<Hit>> {
        let _guard = self.lock.read();
        self.ensure_live()?;
        if !matches!(self.variant, IndexVariant::Text(_)) {
            return Err(self.kind_mismatch(IndexKind::Text));
        }
        self.reader.load().search(query, limit)
    }

    /// Build `spec` with this index's analyzers and run it.
    pub fn search_spec(&self, spec: &QuerySpec, limit: usize) -> Result<Vec<String>> {
        let IndexVariant::Text(text) = &self.variant else {
            return Err(self.kind_mismatch(IndexKind::Text));
        };
        let query = spec.to_query(text.analyzer())?;
        self.search(&query, limit)
    }

    pub fn state(&self) -> IndexState {
        if self.is_dropped() {
            IndexState::Dropped
        } else if self.backup.lock().is_some() {
            IndexState::BackupActive
        } else {
            IndexState::Open
        }
    }

    pub fn stats(&self) -> IndexStats {
        let snapshot = self.reader.load();
        IndexStats {
            name: self.name.clone(),
            kind: self.kind(),
            num_docs: snapshot.num_docs(),
            num_segments: snapshot.num_segments(),
            generation: snapshot.generation(),
            ram_bytes: self.ram_bytes_used(),
            last_commit_millis: self.last_commit_millis(),
            write_ts: self.write_timestamp(),
            committed_ts: self.committed_timestamp(),
            state: self.state(),
        }
    }

    pub fn is_dropped(&self) -> bool {
        self.dropped.load(Ordering::SeqCst)
    }

    /// Release any backup, commit, delete every document and close the
    /// writer. Called by the catalog once the handle is unregistered.
    pub(crate) fn drop_index(&self) -> Result<()> {
        let _guard = self.lock.write();
        self.ensure_live()?;
        self.release_backup();
        self.commit_locked()?;
        self.writer.delete_all()?;
        self.writer.close()?;
        self.dropped.store(true, Ordering::SeqCst);
        tracing::info!(index = %self.name, "dropped index");
        Ok(())
    }

    /// Commit pending writes and close the writer.
    pub(crate) fn close(&self) -> Result<()> {
        let _guard = self.lock.write();
        if self.is_dropped() || self.writer.is_closed() {
            return Ok(());
        }
        self.release_backup();
        self.commit_locked()?;
        self.writer.close()
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_dropped() {
            return Err(LucernaError::IndexDropped(self.name.clone()));
        }
        Ok(())
    }

    fn kind_mismatch(&self, expected: IndexKind) -> LucernaError {
        LucernaError::IndexKindMismatch {
            index: self.name.clone(),
            expected: expected.as_str(),
            actual: self.kind().as_str(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::engine::document::TextField;
    use crate::engine::similarity::Similarity;
    use crate::storage::index_config::{TextConfig, VectorConfig};
    use tempfile::TempDir;

    fn open(config: IndexConfig, root: &Path, clock: Arc<ManualClock>) -> IndexAccess {
        let params = Arc::new(Parameters::default());
        let scheduler = Arc::new(MergeScheduler::new(Arc::clone(&params)));
        IndexAccess::open(config, root, &params, clock, scheduler).unwrap()
    }

    fn vector_config() -> IndexConfig {
        IndexConfig::vector("v1", "v1_dir", VectorConfig::new(2, Similarity::Euclidean))
    }

    #[test]
    fn test_batch_write_and_knn() {
        let temp_dir = TempDir::new().unwrap();
        let index = open(vector_config(), temp_dir.path(), Arc::new(ManualClock::new(0)));

        let batch = WriteBatch::new("v1")
            .insert_vector("a", vec![0.0, 0.0])
            .insert_vector("b", vec![10.0, 10.0])
            .with_auto_commit(true);
        index.batch_write(&batch).unwrap();

        assert_eq!(index.knn(&[0.0, 1.0], 1, 10).unwrap(), vec!["a"]);
        assert_eq!(index.knn(&[9.0, 9.0], 2, 10).unwrap(), vec!["b", "a"]);
    }

    #[test]
    fn test_writes_invisible_until_commit() {
        let temp_dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(100));
        let index = open(vector_config(), temp_dir.path(), Arc::clone(&clock));

        index
            .batch_write(&WriteBatch::new("v1").insert_vector("a", vec![1.0, 1.0]))
            .unwrap();
        assert!(index.knn(&[1.0, 1.0], 1, 1).unwrap().is_empty());
        assert!(index.ram_bytes_used() > 0);

        clock.set(500);
        index.commit_and_refresh_reader().unwrap();
        assert_eq!(index.knn(&[1.0, 1.0], 1, 1).unwrap(), vec!["a"]);
        assert_eq!(index.last_commit_millis(), 500);
        assert_eq!(index.ram_bytes_used(), 0);
    }

    #[test]
    fn test_batch_is_all_or_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let index = open(vector_config(), temp_dir.path(), Arc::new(ManualClock::new(0)));

        let batch = WriteBatch::new("v1")
            .insert_vector("a", vec![0.0, 0.0])
            .insert_vector("bad", vec![1.0, 2.0, 3.0])
            .with_auto_commit(true);
        let err = index.batch_write(&batch).unwrap_err();
        assert!(matches!(err, LucernaError::DimensionMismatch { expected: 2, actual: 3 }));

        index.commit_and_refresh_reader().unwrap();
        assert_eq!(index.snapshot().unwrap().num_docs(), 0);
    }

    #[test]
    fn test_knn_arguments() {
        let temp_dir = TempDir::new().unwrap();
        let index = open(vector_config(), temp_dir.path(), Arc::new(ManualClock::new(0)));

        assert!(matches!(index.knn(&[0.0, 0.0], 0, 10), Err(LucernaError::InvalidArgument(_))));
        assert!(matches!(index.knn(&[0.0, 0.0], 5, 2), Err(LucernaError::InvalidArgument(_))));
        assert!(matches!(
            index.knn(&[0.0], 1, 2),
            Err(LucernaError::DimensionMismatch { expected: 2, actual: 1 })
        ));
        assert!(matches!(
            index.search(&Query::MatchAll, 10),
            Err(LucernaError::IndexKindMismatch { .. })
        ));
    }

    #[test]
    fn test_timestamps() {
        let temp_dir = TempDir::new().unwrap();
        let index = open(vector_config(), temp_dir.path(), Arc::new(ManualClock::new(0)));

        index.advance_write_timestamp(5).unwrap();
        index.advance_write_timestamp(5).unwrap();
        assert_eq!(index.write_timestamp(), 5);
        assert_eq!(index.committed_timestamp(), 0);

        match index.advance_write_timestamp(3) {
            Err(LucernaError::MonotonicityViolation { index: name, current, requested }) => {
                assert_eq!((name.as_str(), current, requested), ("v1", 5, 3));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(index.write_timestamp(), 5);

        index.commit_and_refresh_reader().unwrap();
        assert_eq!(index.committed_timestamp(), 5);
    }

    #[test]
    fn test_timestamps_restored_on_reopen() {
        let temp_dir = TempDir::new().unwrap();
        {
            let index = open(vector_config(), temp_dir.path(), Arc::new(ManualClock::new(0)));
            index.advance_write_timestamp(42).unwrap();
            index
                .batch_write(&WriteBatch::new("v1").insert_vector("a", vec![0.0, 0.0]).with_auto_commit(true))
                .unwrap();
            index.close().unwrap();
        }

        let index = open(vector_config(), temp_dir.path(), Arc::new(ManualClock::new(0)));
        assert_eq!(index.committed_timestamp(), 42);
        assert_eq!(index.write_timestamp(), 42);
        assert_eq!(index.snapshot().unwrap().num_docs(), 1);
    }

    #[test]
    fn test_commit_keeps_newer_persisted_timestamp() {
        let temp_dir = TempDir::new().unwrap();
        {
            let index = open(vector_config(), temp_dir.path(), Arc::new(ManualClock::new(0)));
            index.advance_write_timestamp(10).unwrap();

            // A commit that landed first with a later timestamp.
            let mut user_data = BTreeMap::new();
            user_data.insert(COMMITTED_TIMESTAMP_KEY.to_string(), "50".to_string());
            index.writer.commit(user_data).unwrap();

            index.commit_and_refresh_reader().unwrap();
            assert_eq!(index.committed_timestamp(), 50);
            assert_eq!(index.snapshot().unwrap().user_data()[COMMITTED_TIMESTAMP_KEY], "50");
            index.close().unwrap();
        }

        let index = open(vector_config(), temp_dir.path(), Arc::new(ManualClock::new(0)));
        assert_eq!(index.committed_timestamp(), 50);
    }

    #[test]
    fn test_backup_conflict() {
        let temp_dir = TempDir::new().unwrap();
        let index = open(vector_config(), temp_dir.path(), Arc::new(ManualClock::new(0)));

        index.end_backup().unwrap();
        let files = index.begin_backup().unwrap();
        assert!(files.iter().any(|f| f.starts_with("segments_")));
        assert_eq!(index.state(), IndexState::BackupActive);
        assert!(matches!(index.begin_backup(), Err(LucernaError::BackupConflict(_))));

        index.end_backup().unwrap();
        assert_eq!(index.state(), IndexState::Open);
        index.begin_backup().unwrap();
    }

    #[test]
    fn test_drop_index() {
        let temp_dir = TempDir::new().unwrap();
        let index = open(vector_config(), temp_dir.path(), Arc::new(ManualClock::new(0)));
        index
            .batch_write(&WriteBatch::new("v1").insert_vector("a", vec![0.0, 0.0]))
            .unwrap();
        index.begin_backup().unwrap();

        index.drop_index().unwrap();
        assert_eq!(index.state(), IndexState::Dropped);
        assert_eq!(index.ram_bytes_used(), 0);
        assert!(matches!(index.knn(&[0.0, 0.0], 1, 1), Err(LucernaError::IndexDropped(_))));
        assert!(matches!(
            index.batch_write(&WriteBatch::new("v1").delete("a")),
            Err(LucernaError::IndexDropped(_))
        ));
        assert!(matches!(index.drop_index(), Err(LucernaError::IndexDropped(_))));
    }

    #[test]
    fn test_text_search() {
        let temp_dir = TempDir::new().unwrap();
        let config = IndexConfig::text("t1", "t1", TextConfig::default());
        let index = open(config, temp_dir.path(), Arc::new(ManualClock::new(0)));

        let batch = WriteBatch::new("t1")
            .insert_text("a", vec![TextField::new("title", "Red running shoes").stored()])
            .insert_text("b", vec![TextField::new("title", "Blue shoes")])
            .with_auto_commit(true);
        index.batch_write(&batch).unwrap();

        let spec = QuerySpec::from_json(r#"{"text": {"query": "red", "path": "title"}}"#).unwrap();
        assert_eq!(index.search_spec(&spec, 10).unwrap(), vec!["a"]);

        let stored = index.stored_fields("a").unwrap().unwrap();
        assert_eq!(stored[0].text, "Red running shoes");
        assert!(matches!(
            index.knn(&[0.0], 1, 1),
            Err(LucernaError::IndexKindMismatch { .. })
        ));
    }
}
