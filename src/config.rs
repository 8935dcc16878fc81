//! Server tunables consumed by the catalog and index constructors.
//!
//! [`ServerParameters`] is a plain, serde-deserializable struct with one field
//! per named parameter. Parameter names on the wire and in parameter files are
//! camelCase (`maxBufferedMemoryMBAllIndexes`, ...). A catalog receives its
//! parameters wrapped in [`Parameters`], which is shared between the catalog,
//! the maintenance thread and the merge scheduler, and lets the
//! runtime-changeable subset be updated while the server is running.
//!
//! # Example
//!
//! ```
//! use lucerna::config::{Parameters, ServerParameters};
//!
//! let mut params = ServerParameters::default();
//! params.max_index_in_memory_millis = 5_000;
//! let params = Parameters::new(params).unwrap();
//!
//! params.set_at_runtime("maxIndexInMemoryMillis", 10_000).unwrap();
//! assert_eq!(params.max_index_in_memory_millis(), 10_000);
//!
//! // Buffer ceilings are fixed for the lifetime of the process.
//! assert!(params.set_at_runtime("maxBufferedMemoryMBAllIndexes", 1).is_err());
//! ```

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LucernaError, Result};

const MB: u64 = 1024 * 1024;

/// Named tunables of the storage layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct ServerParameters {
    /// Maximum number of merges running at once across all indexes.
    pub max_merge_threads: u64,

    /// Maximum number of merges allowed to wait for a merge thread.
    pub max_merge_tasks: u64,

    /// Largest segment a merge may produce for vector indexes.
    #[serde(rename = "hnswMaxSegmentSizeMB")]
    pub hnsw_max_segment_size_mb: u64,

    /// Largest segment a merge may produce for text indexes.
    #[serde(rename = "invertedIndexMaxSegmentSizeMB")]
    pub inverted_index_max_segment_size_mb: u64,

    /// Buffered bytes after which a single index flushes a segment.
    #[serde(rename = "maxBufferedMemoryMBPerIndex")]
    pub max_buffered_memory_mb_per_index: u64,

    /// Buffered bytes across all indexes after which every index commits.
    #[serde(rename = "maxBufferedMemoryMBAllIndexes")]
    pub max_buffered_memory_mb_all_indexes: u64,

    /// Longest time writes may stay uncommitted under normal load.
    pub max_index_in_memory_millis: u64,

    /// Period of the background maintenance loop.
    pub maintenance_interval_millis: u64,
}

impl Default for ServerParameters {
    fn default() -> Self {
        ServerParameters {
            max_merge_threads: 4,
            max_merge_tasks: 8,
            hnsw_max_segment_size_mb: 1024,
            inverted_index_max_segment_size_mb: 1024,
            max_buffered_memory_mb_per_index: 64,
            max_buffered_memory_mb_all_indexes: 1024,
            max_index_in_memory_millis: 60 * 1000,
            maintenance_interval_millis: 1000,
        }
    }
}

impl ServerParameters {
    /// Build parameters from a JSON object of `name -> value`.
    ///
    /// Names not present keep their default. Unknown names are rejected.
    pub fn from_map(map: serde_json::Map<String, serde_json::Value>) -> Result<Self> {
        let params: ServerParameters = serde_json::from_value(serde_json::Value::Object(map))
            .map_err(|e| LucernaError::config(format!("invalid server parameters: {e}")))?;
        params.validate()?;
        Ok(params)
    }

    /// Load parameters from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let value: serde_json::Value = serde_json::from_str(&text)?;
        match value {
            serde_json::Value::Object(map) => Self::from_map(map),
            _ => Err(LucernaError::config(format!(
                "parameter file {} must contain a JSON object",
                path.as_ref().display()
            ))),
        }
    }

    /// Validate the parameter values.
    pub fn validate(&self) -> Result<()> {
        let non_zero = [
            ("maxMergeThreads", self.max_merge_threads),
            ("hnswMaxSegmentSizeMB", self.hnsw_max_segment_size_mb),
            (
                "invertedIndexMaxSegmentSizeMB",
                self.inverted_index_max_segment_size_mb,
            ),
            (
                "maxBufferedMemoryMBPerIndex",
                self.max_buffered_memory_mb_per_index,
            ),
            (
                "maxBufferedMemoryMBAllIndexes",
                self.max_buffered_memory_mb_all_indexes,
            ),
            ("maintenanceIntervalMillis", self.maintenance_interval_millis),
        ];
        for (name, value) in non_zero {
            if value == 0 {
                return Err(LucernaError::config(format!("{name} must be > 0")));
            }
        }
        Ok(())
    }
}

/// Shared, partially mutable view over [`ServerParameters`].
///
/// Fixed parameters are read from the snapshot taken at construction time.
/// `maxMergeThreads`, `maxMergeTasks` and `maxIndexInMemoryMillis` can be
/// changed with [`Parameters::set_at_runtime`].
#[derive(Debug)]
pub struct Parameters {
    fixed: ServerParameters,
    max_merge_threads: AtomicU64,
    max_merge_tasks: AtomicU64,
    max_index_in_memory_millis: AtomicU64,
}

impl Parameters {
    /// Wrap validated parameters.
    pub fn new(params: ServerParameters) -> Result<Self> {
        params.validate()?;
        Ok(Parameters {
            max_merge_threads: AtomicU64::new(params.max_merge_threads),
            max_merge_tasks: AtomicU64::new(params.max_merge_tasks),
            max_index_in_memory_millis: AtomicU64::new(params.max_index_in_memory_millis),
            fixed: params,
        })
    }

    /// Change a runtime-changeable parameter by name.
    pub fn set_at_runtime(&self, name: &str, value: u64) -> Result<()> {
        let slot = match name {
            "maxMergeThreads" => {
                if value == 0 {
                    return Err(LucernaError::config("maxMergeThreads must be > 0"));
                }
                &self.max_merge_threads
            }
            "maxMergeTasks" => &self.max_merge_tasks,
            "maxIndexInMemoryMillis" => &self.max_index_in_memory_millis,
            "hnswMaxSegmentSizeMB"
            | "invertedIndexMaxSegmentSizeMB"
            | "maxBufferedMemoryMBPerIndex"
            | "maxBufferedMemoryMBAllIndexes"
            | "maintenanceIntervalMillis" => {
                return Err(LucernaError::config(format!(
                    "param {name} can not change at runtime"
                )));
            }
            _ => {
                return Err(LucernaError::config(format!(
                    "{name} is not a known param"
                )));
            }
        };
        slot.store(value, Ordering::SeqCst);
        tracing::info!(param = name, value, "server parameter changed");
        Ok(())
    }

    /// Current values as a plain struct.
    pub fn snapshot(&self) -> ServerParameters {
        ServerParameters {
            max_merge_threads: self.max_merge_threads(),
            max_merge_tasks: self.max_merge_tasks(),
            max_index_in_memory_millis: self.max_index_in_memory_millis(),
            ..self.fixed.clone()
        }
    }

    pub fn max_merge_threads(&self) -> u64 {
        self.max_merge_threads.load(Ordering::SeqCst)
    }

    pub fn max_merge_tasks(&self) -> u64 {
        self.max_merge_tasks.load(Ordering::SeqCst)
    }

    pub fn max_index_in_memory_millis(&self) -> u64 {
        self.max_index_in_memory_millis.load(Ordering::SeqCst)
    }

    /// Merge ceiling for vector indexes, in bytes.
    pub fn hnsw_max_segment_bytes(&self) -> u64 {
        self.fixed.hnsw_max_segment_size_mb * MB
    }

    /// Merge ceiling for text indexes, in bytes.
    pub fn inverted_index_max_segment_bytes(&self) -> u64 {
        self.fixed.inverted_index_max_segment_size_mb * MB
    }

    /// Per-index RAM buffer, in bytes.
    pub fn ram_buffer_bytes_per_index(&self) -> u64 {
        self.fixed.max_buffered_memory_mb_per_index * MB
    }

    /// Aggregate RAM ceiling across all indexes, in bytes.
    pub fn max_buffered_bytes_all_indexes(&self) -> u64 {
        self.fixed.max_buffered_memory_mb_all_indexes * MB
    }

    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_millis(self.fixed.maintenance_interval_millis)
    }
}

impl Default for Parameters {
    fn default() -> Self {
        let params = ServerParameters::default();
        Parameters {
            max_merge_threads: AtomicU64::new(params.max_merge_threads),
            max_merge_tasks: AtomicU64::new(params.max_merge_tasks),
            max_index_in_memory_millis: AtomicU64::new(params.max_index_in_memory_millis),
            fixed: params,
        }
    }
}
