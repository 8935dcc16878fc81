//! The catalog metadata file.
//!
//! `index_catalog.json` in the catalog root holds the pretty-printed list of
//! index definitions. Every rewrite goes to a temporary file that is renamed
//! over the old one, so readers see either the previous or the new list.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use atomic_write_file::AtomicWriteFile;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::storage::index_config::IndexConfig;

/// Name of the metadata file in the catalog root.
pub const META_FILE: &str = "index_catalog.json";

fn is_false(value: &bool) -> bool {
    !*value
}

/// One persisted index definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    #[serde(flatten)]
    pub config: IndexConfig,
    /// Set while a drop is in progress; such entries are purged on open.
    #[serde(default, skip_serializing_if = "is_false")]
    pub dropped: bool,
}

impl CatalogEntry {
    pub fn new(config: IndexConfig) -> Self {
        CatalogEntry {
            config,
            dropped: false,
        }
    }
}

/// Reader and writer of the metadata file.
#[derive(Debug, Clone)]
pub struct MetadataFile {
    path: PathBuf,
}

impl MetadataFile {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        MetadataFile {
            path: root.as_ref().join(META_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All entries; an absent file is an empty catalog.
    pub fn load(&self) -> Result<Vec<CatalogEntry>> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Atomically replace the file with `entries`.
    pub fn save(&self, entries: &[CatalogEntry]) -> Result<()> {
        let json = serde_json::to_vec_pretty(entries)?;
        let mut file = AtomicWriteFile::open(&self.path)?;
        file.write_all(&json)?;
        file.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::similarity::Similarity;
    use crate::storage::index_config::{TextConfig, VectorConfig};
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let metadata = MetadataFile::new(temp_dir.path());
        assert!(metadata.load().unwrap().is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let metadata = MetadataFile::new(temp_dir.path());

        let mut dropped = CatalogEntry::new(IndexConfig::text("t", "t", TextConfig::default()));
        dropped.dropped = true;
        let entries = vec![
            CatalogEntry::new(IndexConfig::vector("v", "v_dir", VectorConfig::new(3, Similarity::DotProduct))),
            dropped,
        ];
        metadata.save(&entries).unwrap();
        assert_eq!(metadata.load().unwrap(), entries);

        let json = fs::read_to_string(metadata.path()).unwrap();
        assert!(json.contains("\"hnswConfig\""));
        assert_eq!(json.matches("\"dropped\"").count(), 1);

        let files: Vec<_> = fs::read_dir(temp_dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
    }
}
