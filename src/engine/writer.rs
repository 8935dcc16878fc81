//! The index writer.
//!
//! An [`IndexWriter`] owns one index directory. Documents are buffered in
//! memory (text is analyzed before the buffer lock is taken) and flushed into
//! a new segment when the buffer outgrows its RAM budget. Deletions mark
//! documents in the live-docs bit set of their segment. Nothing becomes
//! visible to readers until [`IndexWriter::commit`] writes a new commit point
//! and returns the snapshot of it.
//!
//! All mutations, flushes and commits of one writer are serialized by a
//! single state lock, so every commit captures a prefix of the writes that
//! completed before it.

use std::collections::BTreeMap;
use std::mem;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use bit_vec::BitVec;
use parking_lot::Mutex;

use crate::engine::commit::{
    CommitHandle, CommitPoint, SegmentCommitInfo, SnapshotDeletionPolicy, list_generations,
};
use crate::engine::directory::{Directory, is_index_file, segment_number};
use crate::engine::document::{Document, DocumentBody};
use crate::engine::inverted::AnalyzedDocument;
use crate::engine::merge::{MergeScheduler, SegmentSize, TieredMergePolicy, merge_segments};
use crate::engine::schema::Schema;
use crate::engine::segment::{Segment, SegmentData, read_deletions, segment_name, write_deletions};
use crate::engine::snapshot::{IndexSnapshot, SegmentView};
use crate::error::{LucernaError, Result};

/// Tuning of one writer.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Buffered bytes after which the buffer is flushed into a segment.
    pub ram_buffer_bytes: u64,
    pub merge_policy: TieredMergePolicy,
}

impl Default for WriterConfig {
    fn default() -> Self {
        WriterConfig {
            ram_buffer_bytes: 64 * 1024 * 1024,
            merge_policy: TieredMergePolicy::default(),
        }
    }
}

#[derive(Debug)]
enum BufferedBody {
    Vector(Vec<f32>),
    Text(AnalyzedDocument),
}

#[derive(Debug)]
struct BufferedDoc {
    id: String,
    body: BufferedBody,
    ram_bytes: u64,
}

#[derive(Debug)]
struct LiveSegment {
    segment: Arc<Segment>,
    live: BitVec,
    del_count: u32,
    del_gen: u64,
    /// Deletions not yet written to a `.del` file.
    dirty: bool,
}

impl LiveSegment {
    fn new(segment: Arc<Segment>) -> Self {
        let live = BitVec::from_elem(segment.doc_count() as usize, true);
        LiveSegment {
            segment,
            live,
            del_count: 0,
            del_gen: 0,
            dirty: false,
        }
    }

    fn live_docs(&self) -> u32 {
        self.segment.doc_count() - self.del_count
    }

    fn commit_info(&self) -> SegmentCommitInfo {
        SegmentCommitInfo {
            name: self.segment.name().to_string(),
            doc_count: self.segment.doc_count(),
            size_bytes: self.segment.size_bytes(),
            del_gen: self.del_gen,
            del_count: self.del_count,
        }
    }
}

#[derive(Debug)]
struct WriterState {
    buffer: Vec<BufferedDoc>,
    segments: Vec<LiveSegment>,
    next_segment: u64,
    last_commit: CommitPoint,
    snapshot: Arc<IndexSnapshot>,
    deletion_policy: SnapshotDeletionPolicy,
}

/// Thread-safe writer of one index.
#[derive(Debug)]
pub struct IndexWriter {
    dir: Directory,
    schema: Schema,
    config: WriterConfig,
    merge_scheduler: Arc<MergeScheduler>,
    state: Mutex<WriterState>,
    ram_bytes: AtomicU64,
    closed: AtomicBool,
}

impl IndexWriter {
    /// Open the index in `dir`, creating an empty one if there is none.
    ///
    /// The newest readable commit point is loaded; files it does not
    /// reference are deleted.
    pub fn open(
        dir: Directory,
        schema: Schema,
        config: WriterConfig,
        merge_scheduler: Arc<MergeScheduler>,
    ) -> Result<Self> {
        let files = dir.list()?;
        let next_segment = files
            .iter()
            .filter_map(|name| segment_number(name))
            .max()
            .map_or(0, |n| n + 1);

        let generations = list_generations(&dir)?;
        let (last_commit, segments) = if generations.is_empty() {
            let commit = CommitPoint::empty(1);
            commit.write(&dir)?;
            dir.sync()?;
            (commit, Vec::new())
        } else {
            load_newest_commit(&dir, &generations)?
        };

        let referenced = last_commit.files();
        for name in files.iter().filter(|name| is_index_file(name)) {
            if !referenced.contains(name) {
                tracing::debug!(path = %dir.path().display(), file = %name, "deleting unreferenced file");
                dir.delete(name)?;
            }
        }

        let snapshot = Arc::new(snapshot_of(&last_commit, &segments, &schema));
        tracing::debug!(
            path = %dir.path().display(),
            generation = last_commit.generation,
            segments = segments.len(),
            "opened index writer"
        );

        Ok(IndexWriter {
            dir,
            schema,
            config,
            merge_scheduler,
            state: Mutex::new(WriterState {
                buffer: Vec::new(),
                segments,
                next_segment,
                last_commit,
                snapshot,
                deletion_policy: SnapshotDeletionPolicy::new(),
            }),
            ram_bytes: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        })
    }

    pub fn directory(&self) -> &Directory {
        &self.dir
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn add_document(&self, doc: Document) -> Result<()> {
        let buffered = self.prepare(doc)?;
        let mut state = self.lock_open()?;
        self.push(&mut state, buffered)
    }

    /// Replace every document with `id` by `doc`.
    pub fn update_document(&self, id: &str, doc: Document) -> Result<()> {
        let buffered = self.prepare(doc)?;
        let mut state = self.lock_open()?;
        self.delete_locked(&mut state, id);
        self.push(&mut state, buffered)
    }

    /// Delete every document with `id`, buffered or flushed.
    pub fn delete_documents(&self, id: &str) -> Result<()> {
        let mut state = self.lock_open()?;
        self.delete_locked(&mut state, id);
        Ok(())
    }

    /// Delete every document of the index.
    pub fn delete_all(&self) -> Result<()> {
        let mut state = self.lock_open()?;
        state.buffer.clear();
        state.segments.clear();
        self.ram_bytes.store(0, Ordering::SeqCst);
        Ok(())
    }

    /// Make all completed writes durable and visible.
    pub fn commit(&self, user_data: BTreeMap<String, String>) -> Result<Arc<IndexSnapshot>> {
        self.commit_with(|_| user_data)
    }

    /// Commit with user data computed from the previous commit's user data.
    ///
    /// `user_data` runs under the commit lock, so values it reads are ordered
    /// the same way as the commit generations.
    pub fn commit_with<F>(&self, user_data: F) -> Result<Arc<IndexSnapshot>>
    where
        F: FnOnce(&BTreeMap<String, String>) -> BTreeMap<String, String>,
    {
        let mut state = self.lock_open()?;
        let user_data = user_data(&state.last_commit.user_data);
        self.commit_locked(&mut state, user_data)
    }

    /// Snapshot of the last commit.
    pub fn snapshot(&self) -> Arc<IndexSnapshot> {
        Arc::clone(&self.state.lock().snapshot)
    }

    /// Retain the files of the last commit until released.
    pub fn snapshot_commit(&self) -> Result<CommitHandle> {
        let mut state = self.lock_open()?;
        let state = &mut *state;
        Ok(state.deletion_policy.snapshot(&state.last_commit))
    }

    /// Release a retained commit. Its files go away with the next commit.
    pub fn release_commit(&self, handle: &CommitHandle) -> bool {
        self.state.lock().deletion_policy.release(handle)
    }

    /// Estimated bytes of buffered, unflushed documents.
    pub fn ram_bytes_used(&self) -> u64 {
        self.ram_bytes.load(Ordering::SeqCst)
    }

    pub fn buffered_docs(&self) -> usize {
        self.state.lock().buffer.len()
    }

    /// Commit pending changes and refuse further calls.
    pub fn close(&self) -> Result<()> {
        let mut state = self.state.lock();
        if self.closed.load(Ordering::SeqCst) {
            return Ok(());
        }
        let user_data = state.last_commit.user_data.clone();
        self.commit_locked(&mut state, user_data)?;
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn lock_open(&self) -> Result<parking_lot::MutexGuard<'_, WriterState>> {
        let state = self.state.lock();
        if self.closed.load(Ordering::SeqCst) {
            return Err(LucernaError::closed(self.dir.path().display().to_string()));
        }
        Ok(state)
    }

    /// Validate and analyze a document without holding the state lock.
    fn prepare(&self, doc: Document) -> Result<BufferedDoc> {
        if self.is_closed() {
            return Err(LucernaError::closed(self.dir.path().display().to_string()));
        }
        self.schema.check(&doc)?;
        let Document { id, body } = doc;
        let (body, ram_bytes) = match (body, &self.schema) {
            (DocumentBody::Vector(vector), _) => {
                let ram = (vector.len() * mem::size_of::<f32>()) as u64 + 64;
                (BufferedBody::Vector(vector), ram)
            }
            (DocumentBody::Text(fields), Schema::Text { analyzer }) => {
                let analyzed = AnalyzedDocument::analyze(&fields, analyzer)?;
                let ram = analyzed.ram_bytes();
                (BufferedBody::Text(analyzed), ram)
            }
            (DocumentBody::Text(_), Schema::Vector { .. }) => {
                return Err(LucernaError::invalid_operation(
                    "cannot add a text document to a vector index",
                ));
            }
        };
        let ram_bytes = ram_bytes + id.len() as u64;
        Ok(BufferedDoc {
            id,
            body,
            ram_bytes,
        })
    }

    fn push(&self, state: &mut WriterState, doc: BufferedDoc) -> Result<()> {
        let used = self.ram_bytes.fetch_add(doc.ram_bytes, Ordering::SeqCst) + doc.ram_bytes;
        state.buffer.push(doc);
        if used >= self.config.ram_buffer_bytes {
            self.flush_locked(state)?;
        }
        Ok(())
    }

    fn delete_locked(&self, state: &mut WriterState, id: &str) {
        let mut freed = 0;
        state.buffer.retain(|doc| {
            if doc.id == id {
                freed += doc.ram_bytes;
                false
            } else {
                true
            }
        });
        self.ram_bytes.fetch_sub(freed, Ordering::SeqCst);

        for live_segment in &mut state.segments {
            for &ordinal in live_segment.segment.ordinals_of(id) {
                if live_segment.live.get(ordinal as usize).unwrap_or(false) {
                    live_segment.live.set(ordinal as usize, false);
                    live_segment.del_count += 1;
                    live_segment.dirty = true;
                }
            }
        }
    }

    /// Write the buffer as a new, uncommitted segment.
    fn flush_locked(&self, state: &mut WriterState) -> Result<()> {
        if state.buffer.is_empty() {
            return Ok(());
        }

        let ids: Vec<String> = state.buffer.iter().map(|doc| doc.id.clone()).collect();
        let data = match &self.schema {
            Schema::Vector {
                similarity, hnsw, ..
            } => {
                let vectors: Vec<Vec<f32>> = state
                    .buffer
                    .iter()
                    .filter_map(|doc| match &doc.body {
                        BufferedBody::Vector(vector) => Some(vector.clone()),
                        BufferedBody::Text(_) => None,
                    })
                    .collect();
                SegmentData::vector(ids, vectors, *similarity, hnsw)
            }
            Schema::Text { .. } => {
                let docs: Vec<AnalyzedDocument> = state
                    .buffer
                    .iter()
                    .filter_map(|doc| match &doc.body {
                        BufferedBody::Text(analyzed) => Some(analyzed.clone()),
                        BufferedBody::Vector(_) => None,
                    })
                    .collect();
                SegmentData::text(ids, &docs)
            }
        };

        let name = segment_name(state.next_segment);
        state.next_segment += 1;
        let segment = Segment::write(&self.dir, &name, data)?;
        tracing::debug!(
            path = %self.dir.path().display(),
            segment = %name,
            docs = segment.doc_count(),
            bytes = segment.size_bytes(),
            "flushed segment"
        );

        state.segments.push(LiveSegment::new(Arc::new(segment)));
        state.buffer.clear();
        self.ram_bytes.store(0, Ordering::SeqCst);
        Ok(())
    }

    fn commit_locked(
        &self,
        state: &mut WriterState,
        user_data: BTreeMap<String, String>,
    ) -> Result<Arc<IndexSnapshot>> {
        self.flush_locked(state)?;
        state.segments.retain(|s| s.live_docs() > 0);

        for live_segment in state.segments.iter_mut().filter(|s| s.dirty) {
            let deleted: Vec<u32> = live_segment
                .live
                .iter()
                .enumerate()
                .filter(|(_, live)| !live)
                .map(|(ordinal, _)| ordinal as u32)
                .collect();
            let del_gen = live_segment.del_gen + 1;
            write_deletions(&self.dir, live_segment.segment.name(), del_gen, &deleted)?;
            live_segment.del_gen = del_gen;
            live_segment.dirty = false;
        }

        self.maybe_merge(state)?;

        let commit = CommitPoint {
            generation: state.last_commit.generation + 1,
            segments: state.segments.iter().map(LiveSegment::commit_info).collect(),
            user_data,
        };
        self.dir.sync()?;
        commit.write(&self.dir)?;
        self.dir.sync()?;

        let snapshot = Arc::new(snapshot_of(&commit, &state.segments, &self.schema));
        tracing::debug!(
            path = %self.dir.path().display(),
            generation = commit.generation,
            segments = commit.segments.len(),
            docs = snapshot.num_docs(),
            "committed"
        );
        state.last_commit = commit;
        state.snapshot = Arc::clone(&snapshot);

        if let Err(e) = self.delete_unreferenced(state) {
            tracing::warn!(path = %self.dir.path().display(), error = %e, "failed to delete old index files");
        }
        Ok(snapshot)
    }

    fn maybe_merge(&self, state: &mut WriterState) -> Result<()> {
        let sizes: Vec<SegmentSize> = state
            .segments
            .iter()
            .map(|s| SegmentSize {
                size_bytes: s.segment.size_bytes(),
                doc_count: s.segment.doc_count(),
                live_docs: s.live_docs(),
            })
            .collect();
        let Some(selected) = self.config.merge_policy.find_merge(&sizes) else {
            return Ok(());
        };
        let Some(_permit) = self.merge_scheduler.acquire() else {
            tracing::debug!(path = %self.dir.path().display(), "merge queue full, merge skipped");
            return Ok(());
        };

        let data = {
            let inputs: Vec<(&Segment, &BitVec)> = selected
                .iter()
                .map(|&i| (state.segments[i].segment.as_ref(), &state.segments[i].live))
                .collect();
            merge_segments(&inputs, &self.schema)?
        };
        let name = segment_name(state.next_segment);
        state.next_segment += 1;
        let merged = Segment::write(&self.dir, &name, data)?;
        tracing::info!(
            path = %self.dir.path().display(),
            segment = %name,
            merged = selected.len(),
            docs = merged.doc_count(),
            "merged segments"
        );

        let first = selected[0];
        for &i in selected.iter().rev() {
            state.segments.remove(i);
        }
        state
            .segments
            .insert(first, LiveSegment::new(Arc::new(merged)));
        Ok(())
    }

    /// Delete index files referenced neither by the last commit nor by a
    /// retained one.
    fn delete_unreferenced(&self, state: &WriterState) -> Result<()> {
        let mut keep = state.last_commit.files();
        keep.extend(state.deletion_policy.protected_files());
        for name in self.dir.list()? {
            if is_index_file(&name) && !keep.contains(&name) {
                self.dir.delete(&name)?;
            }
        }
        Ok(())
    }
}

fn load_newest_commit(
    dir: &Directory,
    generations: &[u64],
) -> Result<(CommitPoint, Vec<LiveSegment>)> {
    for &generation in generations {
        match load_commit(dir, generation) {
            Ok(loaded) => return Ok(loaded),
            Err(e) => tracing::warn!(
                path = %dir.path().display(),
                generation,
                error = %e,
                "skipping unreadable commit point"
            ),
        }
    }
    Err(LucernaError::corruption(format!(
        "no readable commit point in {}",
        dir.path().display()
    )))
}

fn load_commit(dir: &Directory, generation: u64) -> Result<(CommitPoint, Vec<LiveSegment>)> {
    let commit = CommitPoint::read(dir, generation)?;
    let mut segments = Vec::with_capacity(commit.segments.len());
    for info in &commit.segments {
        let segment = Segment::read(dir, &info.name, info.doc_count)?;
        let mut live_segment = LiveSegment::new(Arc::new(segment));
        if info.del_gen > 0 {
            for ordinal in read_deletions(dir, &info.name, info.del_gen)? {
                if ordinal >= info.doc_count {
                    return Err(LucernaError::corruption(format!(
                        "deletion file of segment {} lists ordinal {ordinal} of {} docs",
                        info.name, info.doc_count
                    )));
                }
                live_segment.live.set(ordinal as usize, false);
            }
        }
        live_segment.del_gen = info.del_gen;
        live_segment.del_count = info.del_count;
        segments.push(live_segment);
    }
    Ok((commit, segments))
}

fn snapshot_of(commit: &CommitPoint, segments: &[LiveSegment], schema: &Schema) -> IndexSnapshot {
    let views = segments
        .iter()
        .map(|s| SegmentView::new(Arc::clone(&s.segment), s.live.clone()))
        .collect();
    IndexSnapshot::new(
        commit.generation,
        views,
        commit.user_data.clone(),
        schema.similarity(),
    )
}
