//! The index catalog.
//!
//! An [`IndexCatalog`] owns a root directory holding one subdirectory per
//! index and the metadata file listing their definitions. It creates, drops
//! and looks up indexes, fans timestamp and backup requests out to all of
//! them, and runs the background maintenance thread that commits indexes
//! according to the memory and staleness limits.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use lucerna::clock::SystemClock;
//! use lucerna::config::Parameters;
//! use lucerna::engine::Similarity;
//! use lucerna::storage::{IndexCatalog, IndexConfig, VectorConfig, WriteBatch};
//!
//! let catalog = IndexCatalog::start_new(
//!     "/var/lib/lucerna",
//!     Arc::new(Parameters::default()),
//!     Arc::new(SystemClock),
//! )?;
//! catalog.create_index(IndexConfig::vector("v1", "v1", VectorConfig::new(2, Similarity::Euclidean)))?;
//!
//! let batch = WriteBatch::new("v1")
//!     .insert_vector("a", vec![0.0, 0.0])
//!     .insert_vector("b", vec![10.0, 10.0])
//!     .with_auto_commit(true);
//! catalog.batch_write("v1", &batch)?;
//! assert_eq!(catalog.knn("v1", &[0.0, 1.0], 1, 10)?, vec!["a"]);
//! # Ok::<(), lucerna::error::LucernaError>(())
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use crate::clock::Clock;
use crate::config::Parameters;
use crate::engine::merge::MergeScheduler;
use crate::engine::query::Query;
use crate::error::{LucernaError, Result};
use crate::storage::index_access::{IndexAccess, IndexStats};
use crate::storage::index_config::IndexConfig;
use crate::storage::maintenance::{self, MaintenanceReport, MaintenanceThread};
use crate::storage::metadata::{CatalogEntry, META_FILE, MetadataFile};
use crate::storage::query_spec::QuerySpec;
use crate::storage::write_batch::WriteBatch;

/// Lifecycle of a catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CatalogState {
    Created,
    Running,
    Stopping,
    Stopped,
}

#[derive(Debug)]
struct CatalogInner {
    root: PathBuf,
    params: Arc<Parameters>,
    clock: Arc<dyn Clock>,
    merge_scheduler: Arc<MergeScheduler>,
    metadata: MetadataFile,
    indexes: Mutex<BTreeMap<String, Arc<IndexAccess>>>,
    state: Mutex<CatalogState>,
}

impl CatalogInner {
    fn ensure_open(&self) -> Result<()> {
        match *self.state.lock() {
            CatalogState::Created | CatalogState::Running => Ok(()),
            CatalogState::Stopping | CatalogState::Stopped => Err(LucernaError::CatalogClosed),
        }
    }

    fn handles(&self) -> Vec<Arc<IndexAccess>> {
        self.indexes.lock().values().cloned().collect()
    }

    fn lookup(&self, name: &str) -> Result<Arc<IndexAccess>> {
        self.ensure_open()?;
        self.indexes
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| LucernaError::not_found(name))
    }

    fn run_maintenance_tick(&self) -> Result<MaintenanceReport> {
        self.ensure_open()?;
        let handles = self.handles();
        Ok(maintenance::tick(&handles, &self.params, self.clock.millis()))
    }
}

fn entries_of(indexes: &BTreeMap<String, Arc<IndexAccess>>) -> Vec<CatalogEntry> {
    indexes
        .values()
        .map(|index| CatalogEntry::new(index.config().clone()))
        .collect()
}

fn remove_dir(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn paths_overlap(a: &str, b: &str) -> bool {
    let (a, b) = (Path::new(a), Path::new(b));
    a.starts_with(b) || b.starts_with(a)
}

/// Registry of the indexes under one root directory.
#[derive(Debug)]
pub struct IndexCatalog {
    inner: Arc<CatalogInner>,
    maintenance: Mutex<Option<MaintenanceThread>>,
}

impl IndexCatalog {
    /// Open the catalog in `root` and every index it lists.
    ///
    /// Entries left tombstoned by an interrupted drop are purged first. The
    /// maintenance thread is not started; see [`IndexCatalog::start`].
    pub fn open<P: AsRef<Path>>(root: P, params: Arc<Parameters>, clock: Arc<dyn Clock>) -> Result<Self> {
        fs::create_dir_all(root.as_ref())?;
        // Backup file lists are handed out as absolute paths.
        let root = fs::canonicalize(root.as_ref())?;
        let metadata = MetadataFile::new(&root);

        let (dropped, live): (Vec<_>, Vec<_>) = metadata.load()?.into_iter().partition(|e| e.dropped);
        if !dropped.is_empty() {
            for entry in &dropped {
                tracing::warn!(index = %entry.config.name, path = %entry.config.path, "purging dropped index");
                remove_dir(&root.join(&entry.config.path))?;
            }
            metadata.save(&live)?;
        }

        let merge_scheduler = Arc::new(MergeScheduler::new(Arc::clone(&params)));
        let mut indexes = BTreeMap::new();
        for entry in live {
            let name = entry.config.name.clone();
            if indexes.contains_key(&name) {
                return Err(LucernaError::corruption(format!("{META_FILE} lists index {name} twice")));
            }
            let index = IndexAccess::open(
                entry.config,
                &root,
                &params,
                Arc::clone(&clock),
                Arc::clone(&merge_scheduler),
            )?;
            indexes.insert(name, Arc::new(index));
        }

        tracing::info!(root = %root.display(), indexes = indexes.len(), "opened index catalog");
        Ok(IndexCatalog {
            inner: Arc::new(CatalogInner {
                root,
                params,
                clock,
                merge_scheduler,
                metadata,
                indexes: Mutex::new(indexes),
                state: Mutex::new(CatalogState::Created),
            }),
            maintenance: Mutex::new(None),
        })
    }

    /// [`IndexCatalog::open`] followed by [`IndexCatalog::start`].
    pub fn start_new<P: AsRef<Path>>(root: P, params: Arc<Parameters>, clock: Arc<dyn Clock>) -> Result<Self> {
        let catalog = Self::open(root, params, clock)?;
        catalog.start()?;
        Ok(catalog)
    }

    /// Start the maintenance thread.
    pub fn start(&self) -> Result<()> {
        let mut state = self.inner.state.lock();
        match *state {
            CatalogState::Created => {}
            CatalogState::Running => return Ok(()),
            CatalogState::Stopping | CatalogState::Stopped => return Err(LucernaError::CatalogClosed),
        }

        let inner = Arc::clone(&self.inner);
        let thread = MaintenanceThread::spawn(self.inner.params.maintenance_interval(), move || {
            match inner.run_maintenance_tick() {
                Ok(_) | Err(LucernaError::CatalogClosed) => {}
                Err(e) => tracing::error!(error = %e, "maintenance tick failed"),
            }
        })?;
        *self.maintenance.lock() = Some(thread);
        *state = CatalogState::Running;
        Ok(())
    }

    /// Stop maintenance and close every index. Further calls fail with
    /// [`LucernaError::CatalogClosed`].
    pub fn close(&self) -> Result<()> {
        {
            let mut state = self.inner.state.lock();
            match *state {
                CatalogState::Stopping | CatalogState::Stopped => return Ok(()),
                CatalogState::Created | CatalogState::Running => *state = CatalogState::Stopping,
            }
        }

        if let Some(thread) = self.maintenance.lock().take() {
            thread.stop();
        }

        let indexes = self.inner.indexes.lock();
        for index in indexes.values() {
            if let Err(e) = index.close() {
                tracing::error!(index = %index.name(), error = %e, "failed to close index");
            }
        }
        *self.inner.state.lock() = CatalogState::Stopped;
        tracing::info!(root = %self.inner.root.display(), "closed index catalog");
        Ok(())
    }

    pub fn state(&self) -> CatalogState {
        *self.inner.state.lock()
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    pub fn params(&self) -> &Arc<Parameters> {
        &self.inner.params
    }

    pub fn merge_scheduler(&self) -> &Arc<MergeScheduler> {
        &self.inner.merge_scheduler
    }

    /// Create an index and persist its definition.
    ///
    /// The index becomes visible only after the metadata file has been
    /// rewritten. If that fails the new index is closed and its directory
    /// removed.
    pub fn create_index(&self, config: IndexConfig) -> Result<Arc<IndexAccess>> {
        self.inner.ensure_open()?;
        let mut indexes = self.inner.indexes.lock();
        if indexes.contains_key(&config.name) {
            return Err(LucernaError::duplicate_name(&config.name));
        }
        config.validate()?;
        if config.path == META_FILE {
            return Err(LucernaError::config(format!("index path {META_FILE} is reserved")));
        }
        if let Some(other) = indexes
            .values()
            .find(|index| paths_overlap(&index.config().path, &config.path))
        {
            return Err(LucernaError::config(format!(
                "index path {} conflicts with index {}",
                config.path,
                other.name()
            )));
        }

        let dir = self.inner.root.join(&config.path);
        if dir.exists() {
            tracing::warn!(index = %config.name, path = %dir.display(), "removing stale index directory");
            remove_dir(&dir)?;
        }

        let index = Arc::new(IndexAccess::open(
            config.clone(),
            &self.inner.root,
            &self.inner.params,
            Arc::clone(&self.inner.clock),
            Arc::clone(&self.inner.merge_scheduler),
        )?);

        let mut entries = entries_of(&indexes);
        entries.push(CatalogEntry::new(config.clone()));
        if let Err(e) = self.inner.metadata.save(&entries) {
            tracing::error!(index = %config.name, error = %e, "failed to persist catalog metadata");
            if let Err(close_err) = index.close() {
                tracing::warn!(index = %config.name, error = %close_err, "failed to close new index");
            }
            if let Err(rm_err) = remove_dir(&dir) {
                tracing::warn!(index = %config.name, error = %rm_err, "failed to remove new index directory");
            }
            return Err(e);
        }

        indexes.insert(config.name.clone(), Arc::clone(&index));
        tracing::info!(index = %config.name, kind = %config.kind(), path = %config.path, "created index");
        Ok(index)
    }

    /// Drop an index and delete its directory.
    ///
    /// The metadata entry is tombstoned before the directory is removed, so
    /// an interrupted drop is completed by the next [`IndexCatalog::open`].
    pub fn drop_index(&self, name: &str) -> Result<()> {
        self.inner.ensure_open()?;
        let mut indexes = self.inner.indexes.lock();
        let Some(index) = indexes.remove(name) else {
            return Err(LucernaError::not_found(name));
        };
        if let Err(e) = index.drop_index() {
            indexes.insert(name.to_string(), index);
            return Err(e);
        }

        let mut entries = entries_of(&indexes);
        entries.push(CatalogEntry {
            config: index.config().clone(),
            dropped: true,
        });
        self.inner.metadata.save(&entries)?;
        remove_dir(index.directory())?;
        entries.pop();
        self.inner.metadata.save(&entries)?;
        tracing::info!(index = %name, "removed index directory");
        Ok(())
    }

    /// Handle of a registered index. `None` for unknown names and once the
    /// catalog is closed.
    pub fn get_index(&self, name: &str) -> Option<Arc<IndexAccess>> {
        self.inner.lookup(name).ok()
    }

    pub fn index_names(&self) -> Result<BTreeSet<String>> {
        self.inner.ensure_open()?;
        Ok(self.inner.indexes.lock().keys().cloned().collect())
    }

    pub fn index_configs(&self) -> Result<Vec<IndexConfig>> {
        self.inner.ensure_open()?;
        Ok(self
            .inner
            .indexes
            .lock()
            .values()
            .map(|index| index.config().clone())
            .collect())
    }

    pub fn index_stats(&self) -> Result<Vec<IndexStats>> {
        self.inner.ensure_open()?;
        Ok(self.inner.handles().iter().map(|index| index.stats()).collect())
    }

    /// Apply `batch` to the index `name`.
    pub fn batch_write(&self, name: &str, batch: &WriteBatch) -> Result<()> {
        if !batch.index_name().is_empty() && batch.index_name() != name {
            return Err(LucernaError::invalid_argument(format!(
                "batch for index {} sent to index {name}",
                batch.index_name()
            )));
        }
        self.inner.lookup(name)?.batch_write(batch)
    }

    pub fn commit(&self, name: &str) -> Result<()> {
        self.inner.lookup(name)?.commit_and_refresh_reader()
    }

    pub fn knn(&self, name: &str, query: &[f32], k: usize, candidates: usize) -> Result<Vec<String>> {
        self.inner.lookup(name)?.knn(query, k, candidates)
    }

    pub fn search(&self, name: &str, query: &Query, limit: usize) -> Result<Vec<String>> {
        self.inner.lookup(name)?.search(query, limit)
    }

    pub fn search_spec(&self, name: &str, spec: &QuerySpec, limit: usize) -> Result<Vec<String>> {
        self.inner.lookup(name)?.search_spec(spec, limit)
    }

    /// Raise the write timestamp of every index to `ts`.
    ///
    /// Either every index accepts `ts` or none is changed; the error names
    /// the first index that would have gone backwards.
    pub fn advance_write_timestamp(&self, ts: u64) -> Result<()> {
        self.inner.ensure_open()?;
        let indexes = self.inner.indexes.lock();
        for index in indexes.values() {
            index.check_write_timestamp(ts)?;
        }
        for index in indexes.values() {
            index
                .advance_write_timestamp(ts)
                .map_err(|e| e.with_index(index.name()))?;
        }
        Ok(())
    }

    /// Lowest committed timestamp over all indexes; `u64::MAX` without
    /// indexes.
    pub fn committed_timestamp(&self) -> Result<u64> {
        self.inner.ensure_open()?;
        Ok(self
            .inner
            .indexes
            .lock()
            .values()
            .map(|index| index.committed_timestamp())
            .min()
            .unwrap_or(u64::MAX))
    }

    /// Retain the current commit of every index and return the absolute
    /// paths of the files to copy.
    ///
    /// If any index fails, the backups already taken by this call are
    /// released before the error is returned.
    pub fn begin_backup(&self) -> Result<Vec<PathBuf>> {
        self.inner.ensure_open()?;
        let indexes = self.inner.indexes.lock();
        let mut taken: Vec<&Arc<IndexAccess>> = Vec::new();
        let mut paths = Vec::new();
        for index in indexes.values() {
            match index.begin_backup() {
                Ok(files) => {
                    paths.extend(files.iter().map(|file| index.directory().join(file)));
                    taken.push(index);
                }
                Err(e) => {
                    for done in taken {
                        if let Err(release_err) = done.end_backup() {
                            tracing::warn!(index = %done.name(), error = %release_err, "failed to release backup");
                        }
                    }
                    return Err(e);
                }
            }
        }
        tracing::info!(indexes = indexes.len(), files = paths.len(), "catalog backup started");
        Ok(paths)
    }

    /// Release the backups of every index. Every index is attempted; the
    /// first error is returned.
    pub fn end_backup(&self) -> Result<()> {
        self.inner.ensure_open()?;
        let indexes = self.inner.indexes.lock();
        let mut first_error = None;
        for index in indexes.values() {
            if let Err(e) = index.end_backup() {
                tracing::error!(index = %index.name(), error = %e, "failed to end backup");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Run one maintenance tick on the calling thread.
    pub fn run_maintenance_tick(&self) -> Result<MaintenanceReport> {
        self.inner.run_maintenance_tick()
    }
}

impl Drop for IndexCatalog {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::error!(error = %e, "failed to close index catalog");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::engine::similarity::Similarity;
    use crate::storage::index_config::{TextConfig, VectorConfig};
    use tempfile::TempDir;

    fn open(root: &Path) -> IndexCatalog {
        IndexCatalog::open(root, Arc::new(Parameters::default()), Arc::new(ManualClock::new(0))).unwrap()
    }

    fn vector(name: &str, path: &str) -> IndexConfig {
        IndexConfig::vector(name, path, VectorConfig::new(2, Similarity::Euclidean))
    }

    #[test]
    fn test_create_and_lookup() {
        let temp_dir = TempDir::new().unwrap();
        let catalog = open(temp_dir.path());

        catalog.create_index(vector("v1", "v1_dir")).unwrap();
        assert!(temp_dir.path().join("v1_dir").is_dir());
        assert!(catalog.get_index("v1").is_some());
        assert!(catalog.get_index("v2").is_none());
        assert_eq!(catalog.index_names().unwrap().into_iter().collect::<Vec<_>>(), vec!["v1"]);

        let entries = MetadataFile::new(temp_dir.path()).load().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].config.path, "v1_dir");
    }

    #[test]
    fn test_create_rejections() {
        let temp_dir = TempDir::new().unwrap();
        let catalog = open(temp_dir.path());
        catalog.create_index(vector("v1", "shared")).unwrap();

        assert!(matches!(
            catalog.create_index(vector("v1", "other")),
            Err(LucernaError::DuplicateName(_))
        ));
        assert!(matches!(catalog.create_index(vector("v2", "shared")), Err(LucernaError::Config(_))));
        assert!(matches!(
            catalog.create_index(vector("v2", "shared/nested")),
            Err(LucernaError::Config(_))
        ));
        assert!(matches!(
            catalog.create_index(vector("v2", META_FILE)),
            Err(LucernaError::Config(_))
        ));
        assert!(matches!(catalog.create_index(vector("v2", "../x")), Err(LucernaError::Config(_))));
        assert_eq!(catalog.index_names().unwrap().len(), 1);
    }

    #[test]
    fn test_drop_index() {
        let temp_dir = TempDir::new().unwrap();
        let catalog = open(temp_dir.path());
        let index = catalog.create_index(vector("v1", "v1")).unwrap();

        catalog.drop_index("v1").unwrap();
        assert!(!temp_dir.path().join("v1").exists());
        assert!(catalog.get_index("v1").is_none());
        assert!(matches!(index.knn(&[0.0, 0.0], 1, 1), Err(LucernaError::IndexDropped(_))));
        assert!(MetadataFile::new(temp_dir.path()).load().unwrap().is_empty());

        assert!(matches!(catalog.drop_index("v1"), Err(LucernaError::NotFound(_))));
        catalog.create_index(vector("v1", "v1")).unwrap();
    }

    #[test]
    fn test_committed_timestamp_is_minimum() {
        let temp_dir = TempDir::new().unwrap();
        let catalog = open(temp_dir.path());
        assert_eq!(catalog.committed_timestamp().unwrap(), u64::MAX);

        catalog.create_index(vector("v1", "v1")).unwrap();
        catalog
            .create_index(IndexConfig::text("t1", "t1", TextConfig::default()))
            .unwrap();
        catalog.advance_write_timestamp(10).unwrap();
        catalog.commit("v1").unwrap();
        assert_eq!(catalog.committed_timestamp().unwrap(), 0);
        catalog.commit("t1").unwrap();
        assert_eq!(catalog.committed_timestamp().unwrap(), 10);
    }

    #[test]
    fn test_advance_is_all_or_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let catalog = open(temp_dir.path());
        let a = catalog.create_index(vector("a", "a")).unwrap();
        let b = catalog.create_index(vector("b", "b")).unwrap();

        b.advance_write_timestamp(20).unwrap();
        match catalog.advance_write_timestamp(15) {
            Err(LucernaError::MonotonicityViolation { index, current, requested }) => {
                assert_eq!((index.as_str(), current, requested), ("b", 20, 15));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(a.write_timestamp(), 0);

        catalog.advance_write_timestamp(25).unwrap();
        assert_eq!(a.write_timestamp(), 25);
        assert_eq!(b.write_timestamp(), 25);
    }

    #[test]
    fn test_begin_backup_rolls_back() {
        let temp_dir = TempDir::new().unwrap();
        let catalog = open(temp_dir.path());
        let a = catalog.create_index(vector("a", "a")).unwrap();
        let b = catalog.create_index(vector("b", "b")).unwrap();

        b.begin_backup().unwrap();
        assert!(matches!(catalog.begin_backup(), Err(LucernaError::BackupConflict(_))));
        assert!(a.begin_backup().is_ok());
        a.end_backup().unwrap();
        b.end_backup().unwrap();

        let paths = catalog.begin_backup().unwrap();
        assert!(paths.iter().all(|p| p.is_absolute()));
        assert!(paths.iter().all(|p| p.exists()));
        catalog.end_backup().unwrap();
    }

    #[test]
    fn test_relative_root_gives_absolute_backup_paths() {
        let temp_dir = TempDir::new_in(".").unwrap();
        assert!(temp_dir.path().is_relative());
        let catalog = open(temp_dir.path());
        catalog.create_index(vector("v1", "v1")).unwrap();

        assert!(catalog.root().is_absolute());
        let paths = catalog.begin_backup().unwrap();
        assert!(!paths.is_empty());
        assert!(paths.iter().all(|p| p.is_absolute() && p.exists()), "{paths:?}");
        catalog.end_backup().unwrap();
        catalog.close().unwrap();
    }

    #[test]
    fn test_closed_catalog() {
        let temp_dir = TempDir::new().unwrap();
        let catalog = open(temp_dir.path());
        catalog.create_index(vector("v1", "v1")).unwrap();
        catalog.start().unwrap();
        assert_eq!(catalog.state(), CatalogState::Running);

        catalog.close().unwrap();
        assert_eq!(catalog.state(), CatalogState::Stopped);
        assert!(matches!(catalog.index_names(), Err(LucernaError::CatalogClosed)));
        assert!(matches!(catalog.create_index(vector("v2", "v2")), Err(LucernaError::CatalogClosed)));
        assert!(matches!(catalog.knn("v1", &[0.0, 0.0], 1, 1), Err(LucernaError::CatalogClosed)));
        assert!(catalog.get_index("v1").is_none());
        catalog.close().unwrap();
    }
}
