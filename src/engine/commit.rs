//! Commit points and the snapshot deletion policy.
//!
//! A commit point `segments_<gen>` is a small JSON file naming the segments
//! (and their deletion generations) that make up the index at one moment.
//! It is written atomically, so a crash leaves either the previous or the new
//! commit visible, never a torn one.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::engine::directory::{COMMIT_PREFIX, Directory};
use crate::engine::segment::{del_file_name, segment_file_name};
use crate::error::Result;

/// Per-segment entry of a commit point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentCommitInfo {
    pub name: String,
    pub doc_count: u32,
    pub size_bytes: u64,
    /// Generation of the `.del` file; 0 when the segment has no deletions.
    pub del_gen: u64,
    pub del_count: u32,
}

impl SegmentCommitInfo {
    pub fn files(&self) -> Vec<String> {
        let mut files = vec![segment_file_name(&self.name)];
        if self.del_gen > 0 {
            files.push(del_file_name(&self.name, self.del_gen));
        }
        files
    }
}

/// Contents of a `segments_<gen>` file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitPoint {
    pub generation: u64,
    pub segments: Vec<SegmentCommitInfo>,
    #[serde(default)]
    pub user_data: BTreeMap<String, String>,
}

impl CommitPoint {
    pub fn empty(generation: u64) -> Self {
        CommitPoint {
            generation,
            segments: Vec::new(),
            user_data: BTreeMap::new(),
        }
    }

    pub fn file_name(&self) -> String {
        commit_file_name(self.generation)
    }

    /// Every file this commit needs, including the commit point itself.
    pub fn files(&self) -> BTreeSet<String> {
        let mut files: BTreeSet<String> = self.segments.iter().flat_map(|s| s.files()).collect();
        files.insert(self.file_name());
        files
    }

    pub fn write(&self, dir: &Directory) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        dir.write_atomic(&self.file_name(), &json)
    }

    pub fn read(dir: &Directory, generation: u64) -> Result<Self> {
        let bytes = dir.read(&commit_file_name(generation))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

pub fn commit_file_name(generation: u64) -> String {
    format!("{COMMIT_PREFIX}{generation}")
}

/// Generations of all commit points in `dir`, newest first.
pub fn list_generations(dir: &Directory) -> Result<Vec<u64>> {
    let mut generations: Vec<u64> = dir
        .list()?
        .iter()
        .filter_map(|name| name.strip_prefix(COMMIT_PREFIX)?.parse().ok())
        .collect();
    generations.sort_unstable_by(|a, b| b.cmp(a));
    Ok(generations)
}

/// A retained commit, returned by [`SnapshotDeletionPolicy::snapshot`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitHandle {
    generation: u64,
    files: Vec<String>,
}

impl CommitHandle {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// File names of the commit, relative to the index directory.
    pub fn files(&self) -> &[String] {
        &self.files
    }
}

/// Keeps only the latest commit, plus any commit a caller has snapshotted.
#[derive(Debug, Default)]
pub struct SnapshotDeletionPolicy {
    /// generation -> (reference count, files)
    retained: BTreeMap<u64, (usize, BTreeSet<String>)>,
}

impl SnapshotDeletionPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Retain `commit` until the returned handle is released.
    pub fn snapshot(&mut self, commit: &CommitPoint) -> CommitHandle {
        let files = commit.files();
        let entry = self
            .retained
            .entry(commit.generation)
            .or_insert_with(|| (0, files.clone()));
        entry.0 += 1;
        CommitHandle {
            generation: commit.generation,
            files: files.into_iter().collect(),
        }
    }

    /// Drop one reference to a retained commit. Returns false when the
    /// handle was not retained.
    pub fn release(&mut self, handle: &CommitHandle) -> bool {
        let Some(entry) = self.retained.get_mut(&handle.generation) else {
            return false;
        };
        entry.0 -= 1;
        if entry.0 == 0 {
            self.retained.remove(&handle.generation);
        }
        true
    }

    /// Files that must survive cleanup besides those of the current commit.
    pub fn protected_files(&self) -> BTreeSet<String> {
        self.retained
            .values()
            .flat_map(|(_, files)| files.iter().cloned())
            .collect()
    }

    pub fn retained_count(&self) -> usize {
        self.retained.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn commit(generation: u64, segments: &[(&str, u64)]) -> CommitPoint {
        CommitPoint {
            generation,
            segments: segments
                .iter()
                .map(|(name, del_gen)| SegmentCommitInfo {
                    name: name.to_string(),
                    doc_count: 1,
                    size_bytes: 10,
                    del_gen: *del_gen,
                    del_count: u32::from(*del_gen > 0),
                })
                .collect(),
            user_data: BTreeMap::new(),
        }
    }

    #[test]
    fn test_commit_files() {
        let point = commit(3, &[("_0", 0), ("_1", 2)]);
        let files: Vec<String> = point.files().into_iter().collect();
        assert_eq!(files, vec!["_0.seg", "_1.seg", "_1_2.del", "segments_3"]);
    }

    #[test]
    fn test_write_read_and_list() {
        let temp_dir = TempDir::new().unwrap();
        let dir = Directory::open(temp_dir.path()).unwrap();

        let mut point = commit(2, &[("_0", 0)]);
        point.user_data.insert("ts".into(), "42".into());
        point.write(&dir).unwrap();
        CommitPoint::empty(1).write(&dir).unwrap();
        CommitPoint::empty(10).write(&dir).unwrap();

        assert_eq!(list_generations(&dir).unwrap(), vec![10, 2, 1]);
        assert_eq!(CommitPoint::read(&dir, 2).unwrap(), point);

        let json = String::from_utf8(dir.read("segments_2").unwrap()).unwrap();
        assert!(json.contains("\"userData\""));
        assert!(json.contains("\"delGen\""));
    }

    #[test]
    fn test_snapshot_policy_reference_counts() {
        let mut policy = SnapshotDeletionPolicy::new();
        let point = commit(5, &[("_2", 0)]);

        let a = policy.snapshot(&point);
        let b = policy.snapshot(&point);
        assert_eq!(a.generation(), 5);
        assert!(a.files().contains(&"_2.seg".to_string()));
        assert!(policy.protected_files().contains("segments_5"));

        assert!(policy.release(&a));
        assert_eq!(policy.retained_count(), 1);
        assert!(policy.release(&b));
        assert_eq!(policy.retained_count(), 0);
        assert!(policy.protected_files().is_empty());
        assert!(!policy.release(&b));
    }
}
