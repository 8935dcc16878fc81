//! Segment merging.
//!
//! [`TieredMergePolicy`] picks which segments of one index to merge,
//! [`MergeScheduler`] bounds how many merges run at once across every index
//! of a catalog, and [`merge_segments`] builds the merged segment.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bit_vec::BitVec;
use parking_lot::{Condvar, Mutex};

use crate::config::Parameters;
use crate::engine::inverted::InvertedIndex;
use crate::engine::schema::Schema;
use crate::engine::segment::{Segment, SegmentBody, SegmentData};
use crate::error::{LucernaError, Result};

/// Size information the merge policy decides on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentSize {
    pub size_bytes: u64,
    pub doc_count: u32,
    pub live_docs: u32,
}

impl SegmentSize {
    /// Size discounted by the share of deleted documents.
    fn effective_bytes(&self) -> u64 {
        if self.doc_count == 0 {
            return 0;
        }
        (self.size_bytes as u128 * self.live_docs as u128 / self.doc_count as u128) as u64
    }
}

/// Tiered merge policy.
///
/// Once an index has more than `segments_per_tier` segments, the smallest
/// ones are merged together, up to `max_merge_at_once` segments and
/// `max_merged_segment_bytes` combined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TieredMergePolicy {
    pub segments_per_tier: usize,
    pub max_merge_at_once: usize,
    pub max_merged_segment_bytes: u64,
}

impl Default for TieredMergePolicy {
    fn default() -> Self {
        TieredMergePolicy {
            segments_per_tier: 10,
            max_merge_at_once: 10,
            max_merged_segment_bytes: 1024 * 1024 * 1024,
        }
    }
}

impl TieredMergePolicy {
    pub fn new(max_merged_segment_bytes: u64) -> Self {
        TieredMergePolicy {
            max_merged_segment_bytes,
            ..Default::default()
        }
    }

    /// Indices (ascending) of the segments to merge, if any.
    pub fn find_merge(&self, segments: &[SegmentSize]) -> Option<Vec<usize>> {
        if segments.len() <= self.segments_per_tier {
            return None;
        }

        let mut by_size: Vec<usize> = (0..segments.len()).collect();
        by_size.sort_by_key(|&i| (segments[i].effective_bytes(), i));

        let mut selected = Vec::new();
        let mut total = 0u64;
        for i in by_size {
            if selected.len() >= self.max_merge_at_once {
                break;
            }
            let size = segments[i].effective_bytes();
            if total + size > self.max_merged_segment_bytes {
                break;
            }
            total += size;
            selected.push(i);
        }

        if selected.len() < 2 {
            return None;
        }
        selected.sort_unstable();
        Some(selected)
    }
}

#[derive(Debug, Default)]
struct SchedulerState {
    running: u64,
    waiting: u64,
}

/// Bounds concurrent merges across all indexes sharing it.
///
/// At most `maxMergeThreads` merges run at once and at most `maxMergeTasks`
/// wait for a slot; a merge that finds the queue full is skipped and the
/// policy will pick it up again on a later commit. Both limits are read on
/// every call, so runtime changes apply to the next merge.
#[derive(Debug)]
pub struct MergeScheduler {
    params: Arc<Parameters>,
    state: Mutex<SchedulerState>,
    slot_freed: Condvar,
    completed: AtomicU64,
    skipped: AtomicU64,
}

impl MergeScheduler {
    pub fn new(params: Arc<Parameters>) -> Self {
        MergeScheduler {
            params,
            state: Mutex::new(SchedulerState::default()),
            slot_freed: Condvar::new(),
            completed: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
        }
    }

    /// Wait for a merge slot. Returns `None` when the wait queue is full.
    pub fn acquire(&self) -> Option<MergePermit<'_>> {
        let mut state = self.state.lock();
        if state.running < self.params.max_merge_threads() {
            state.running += 1;
            return Some(MergePermit { scheduler: self });
        }
        if state.waiting >= self.params.max_merge_tasks() {
            self.skipped.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        state.waiting += 1;
        while state.running >= self.params.max_merge_threads() {
            self.slot_freed.wait(&mut state);
        }
        state.waiting -= 1;
        state.running += 1;
        Some(MergePermit { scheduler: self })
    }

    pub fn running(&self) -> u64 {
        self.state.lock().running
    }

    pub fn waiting(&self) -> u64 {
        self.state.lock().waiting
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    fn release(&self) {
        let mut state = self.state.lock();
        state.running -= 1;
        self.completed.fetch_add(1, Ordering::Relaxed);
        self.slot_freed.notify_one();
    }
}

/// A running merge slot; released on drop.
#[derive(Debug)]
pub struct MergePermit<'a> {
    scheduler: &'a MergeScheduler,
}

impl Drop for MergePermit<'_> {
    fn drop(&mut self) {
        self.scheduler.release();
    }
}

/// Build one segment from the live documents of `inputs`, in order.
pub fn merge_segments(inputs: &[(&Segment, &BitVec)], schema: &Schema) -> Result<SegmentData> {
    let mut ids = Vec::new();
    for (segment, live) in inputs {
        for (ordinal, id) in segment.ids().iter().enumerate() {
            if live.get(ordinal).unwrap_or(false) {
                ids.push(id.clone());
            }
        }
    }

    match schema {
        Schema::Vector {
            similarity, hnsw, ..
        } => {
            let mut merged = Vec::with_capacity(ids.len());
            for (segment, live) in inputs {
                let SegmentBody::Vector { vectors, .. } = segment.body() else {
                    return Err(mismatched(segment));
                };
                for (ordinal, vector) in vectors.iter().enumerate() {
                    if live.get(ordinal).unwrap_or(false) {
                        merged.push(vector.clone());
                    }
                }
            }
            Ok(SegmentData::vector(ids, merged, *similarity, hnsw))
        }
        Schema::Text { .. } => {
            let mut parts = Vec::with_capacity(inputs.len());
            for (segment, live) in inputs {
                let SegmentBody::Text(index) = segment.body() else {
                    return Err(mismatched(segment));
                };
                let mut next = 0u32;
                let remap: Vec<Option<u32>> = (0..segment.doc_count() as usize)
                    .map(|ordinal| {
                        live.get(ordinal).unwrap_or(false).then(|| {
                            next += 1;
                            next - 1
                        })
                    })
                    .collect();
                parts.push(index.compact(&remap, next as usize));
            }
            Ok(SegmentData {
                ids,
                body: SegmentBody::Text(InvertedIndex::concat(parts)),
            })
        }
    }
}

fn mismatched(segment: &Segment) -> LucernaError {
    LucernaError::corruption(format!(
        "segment {} does not match the index schema",
        segment.name()
    ))
}
